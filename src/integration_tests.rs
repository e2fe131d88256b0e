//! End-to-end scenario tests exercising mount, directory, and file
//! operations together, grounded on the scenarios enumerated in the
//! project's testable-properties notes. Backed by a sparse in-memory block
//! device so a realistically-sized FAT32 image (>= 65525 data clusters, the
//! format's own minimum) doesn't require allocating gigabytes up front.

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec;

use spin::Mutex;

use crate::device::{BlockDevice, SECTOR_SIZE};
use crate::dir::{ATTR_ARCHIVE, ATTR_DIRECTORY};
use crate::error::Error;
use crate::fat::END_OF_CLUSTER;
use crate::file::mode;
use crate::layout::FsInfo;
use crate::volume::Volume;

struct SparseMemDevice(Mutex<BTreeMap<u32, [u8; SECTOR_SIZE]>>);

impl SparseMemDevice {
    fn new() -> Self {
        Self(Mutex::new(BTreeMap::new()))
    }

    fn poke(&self, sector: u32, bytes: &[u8], offset: usize) {
        let mut map = self.0.lock();
        let entry = map.entry(sector).or_insert([0u8; SECTOR_SIZE]);
        entry[offset..offset + bytes.len()].copy_from_slice(bytes);
    }
}

impl BlockDevice for SparseMemDevice {
    fn read(&self, sector: u32, buf: &mut [u8; SECTOR_SIZE]) -> bool {
        let map = self.0.lock();
        match map.get(&sector) {
            Some(s) => buf.copy_from_slice(s),
            None => buf.fill(0),
        }
        true
    }

    fn write(&self, sector: u32, buf: &[u8; SECTOR_SIZE]) -> bool {
        self.0.lock().insert(sector, *buf);
        true
    }
}

const SECTORS_PER_CLUSTER: u8 = 1;
const SECTORS_PER_FAT: u32 = 512;
const RESERVED_SECTORS: u32 = 32;
const TOTAL_CLUSTERS: u32 = 65525;
const TOTAL_SECTORS: u32 = RESERVED_SECTORS + 2 * SECTORS_PER_FAT + TOTAL_CLUSTERS;
const ROOT_CLUSTER: u32 = 2;

fn format_image() -> Arc<SparseMemDevice> {
    let dev = Arc::new(SparseMemDevice::new());

    // BPB at sector 0.
    let mut bpb = vec![0u8; SECTOR_SIZE];
    bpb[0] = 0xEB;
    bpb[11..13].copy_from_slice(&(SECTOR_SIZE as u16).to_le_bytes());
    bpb[13] = SECTORS_PER_CLUSTER;
    bpb[14..16].copy_from_slice(&(RESERVED_SECTORS as u16).to_le_bytes());
    bpb[16] = 2; // fat count
    bpb[32..36].copy_from_slice(&TOTAL_SECTORS.to_le_bytes());
    bpb[36..40].copy_from_slice(&SECTORS_PER_FAT.to_le_bytes());
    bpb[44..48].copy_from_slice(&ROOT_CLUSTER.to_le_bytes());
    bpb[48..50].copy_from_slice(&1u16.to_le_bytes()); // fsinfo sector
    bpb[82..90].copy_from_slice(b"FAT32   ");
    bpb[510] = 0x55;
    bpb[511] = 0xAA;
    dev.poke(0, &bpb, 0);

    // FSInfo at sector 1: root cluster already consumed.
    let info = FsInfo {
        free_count: TOTAL_CLUSTERS - 1,
        next_free: ROOT_CLUSTER + 1,
    };
    let mut fsinfo_sector = [0u8; SECTOR_SIZE];
    info.encode(&mut fsinfo_sector);
    dev.poke(1, &fsinfo_sector, 0);

    // Mark the root cluster's FAT entry as end-of-chain in both FATs.
    let fat1_sector = RESERVED_SECTORS + ROOT_CLUSTER / 128;
    let fat2_sector = RESERVED_SECTORS + SECTORS_PER_FAT + ROOT_CLUSTER / 128;
    let entry_offset = ((ROOT_CLUSTER % 128) * 4) as usize;
    dev.poke(fat1_sector, &END_OF_CLUSTER.to_le_bytes(), entry_offset);
    dev.poke(fat2_sector, &END_OF_CLUSTER.to_le_bytes(), entry_offset);

    dev
}

fn mount(dev: Arc<SparseMemDevice>) -> Volume {
    Volume::open_default_clock(dev, 0, "m").expect("mount should succeed on a freshly formatted image")
}

#[test]
fn scenario_create_write_close_reopen_stat_read() {
    let dev = format_image();
    let mut v = mount(dev.clone());

    let root = v.root_cluster();
    let mut f = v.open_file(root, "a.txt", mode::WRITE | mode::CREATE).unwrap();
    let n = v.write_file(&mut f, b"hello\n").unwrap();
    assert_eq!(n, 6);
    v.close_file(f).unwrap();

    let info = v.stat(root, "a.txt").unwrap();
    assert_eq!(info.size, 6);
    assert!(info.attr & ATTR_ARCHIVE != 0);

    let mut f = v.open_file(root, "a.txt", mode::READ).unwrap();
    let mut buf = [0u8; 6];
    let n = v.read_file(&mut f, &mut buf).unwrap();
    assert_eq!(n, 6);
    assert_eq!(&buf, b"hello\n");
    v.close_file(f).unwrap();
}

#[test]
fn scenario_readdir_lists_created_files_in_order() {
    let dev = format_image();
    let mut v = mount(dev);
    let root = v.root_cluster();

    let names = ["one.txt", "two.txt", "three.txt", "four.txt"];
    for name in names {
        let f = v.open_file(root, name, mode::WRITE | mode::CREATE).unwrap();
        v.close_file(f).unwrap();
    }

    let entries = v.readdir(root).unwrap();
    let listed: alloc::vec::Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(listed, names);
}

#[test]
fn scenario_create_subdir_unlink_rules() {
    let dev = format_image();
    let mut v = mount(dev);
    let root = v.root_cluster();

    let free_before = v.free_cluster_count();
    let sub = v.create_subdirectory(root, "d").unwrap();

    let f = v.open_file(sub, "f.txt", mode::WRITE | mode::CREATE).unwrap();
    v.close_file(f).unwrap();

    // non-empty directory cannot be unlinked
    assert_eq!(v.unlink(root, "d").unwrap_err(), Error::Denied);

    v.unlink(sub, "f.txt").unwrap();
    v.unlink(root, "d").unwrap();

    assert_eq!(v.free_cluster_count(), free_before);
}

#[test]
fn scenario_seek_round_trip_across_clusters() {
    let dev = format_image();
    let mut v = mount(dev);
    let root = v.root_cluster();

    let payload: alloc::vec::Vec<u8> = (0u32..2048).map(|i| (i % 256) as u8).collect();
    let mut f = v.open_file(root, "big.bin", mode::WRITE | mode::CREATE).unwrap();
    v.write_file(&mut f, &payload).unwrap();
    v.seek(&mut f, 0).unwrap();

    let mut readback = vec![0u8; payload.len()];
    let mut total = 0;
    while total < readback.len() {
        let n = v.read_file(&mut f, &mut readback[total..]).unwrap();
        if n == 0 {
            break;
        }
        total += n;
    }
    v.close_file(f).unwrap();
    assert_eq!(readback, payload);
}

#[test]
fn scenario_truncate_resets_size() {
    let dev = format_image();
    let mut v = mount(dev);
    let root = v.root_cluster();

    let mut f = v.open_file(root, "x.txt", mode::WRITE | mode::CREATE).unwrap();
    v.write_file(&mut f, b"0123456789").unwrap();
    v.close_file(f).unwrap();

    let f = v.open_file(root, "x.txt", mode::WRITE | mode::TRUNCATE).unwrap();
    v.close_file(f).unwrap();

    let info = v.stat(root, "x.txt").unwrap();
    assert_eq!(info.size, 0);
}

#[test]
fn fresh_subdirectory_of_root_is_otherwise_empty() {
    let dev = format_image();
    let mut v = mount(dev);
    let root = v.root_cluster();
    let sub = v.create_subdirectory(root, "d").unwrap();

    assert_ne!(sub, root);
    let entries = v.readdir(sub).unwrap();
    assert!(entries.is_empty(), "readdir skips . and ..; a fresh subdir has no other entries");

    let info = v.stat(root, "d").unwrap();
    assert!(info.attr & ATTR_DIRECTORY != 0);
}

#[test]
fn long_name_requires_at_least_one_lfn_fragment() {
    assert_eq!(crate::name::lfn_fragment_count(3), 1);
}
