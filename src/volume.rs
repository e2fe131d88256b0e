//! `Volume`: one mounted FAT32 partition, tying the layout, window, FAT
//! table and cluster allocator together.
//!
//! Grounded on the pack's `fs.rs` (`FileSystem`), generalized from a single
//! implicit global filesystem into one of possibly several volumes held by
//! the mount registry, each behind its own `Arc<RwLock<Volume>>` the way the
//! pack already wraps `FileSystem`/`VirtFile`.

use alloc::string::String;
use alloc::sync::Arc;

use crate::alloc_table::Allocator;
use crate::device::{BlockDevice, SECTOR_SIZE};
use crate::error::{Error, Result};
use crate::fat::FatTable;
use crate::layout::{locate_volume_lba, FsInfo, Geometry};
use crate::time::{Clock, EpochClock};
use crate::window::Window;
use log::info;

/// Maximum length, in bytes, of a mount's logical name.
pub const MAX_MOUNT_NAME: usize = 31;

pub struct Volume {
    pub(crate) device: Arc<dyn BlockDevice>,
    pub(crate) geometry: Geometry,
    pub(crate) window: Window,
    pub(crate) fat: FatTable,
    pub(crate) allocator: Allocator,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) name: String,
}

impl Volume {
    /// Locate the FAT32 volume (whole-disk BPB, or MBR partition
    /// `partition_index`), decode its layout, validate FSInfo, and construct
    /// a `Volume` ready for directory/file operations. `name` is the mount
    /// name subsequent paths will use as their first component.
    pub fn open(
        device: Arc<dyn BlockDevice>,
        partition_index: usize,
        name: &str,
        clock: Arc<dyn Clock>,
    ) -> Result<Volume> {
        if name.is_empty() || name.len() > MAX_MOUNT_NAME {
            return Err(Error::Param);
        }

        let mut sector0 = [0u8; SECTOR_SIZE];
        if !device.read(0, &mut sector0) {
            return Err(Error::Io);
        }
        let partition_lba = locate_volume_lba(&sector0, partition_index)?;

        let boot_sector = if partition_lba == 0 {
            sector0
        } else {
            let mut s = [0u8; SECTOR_SIZE];
            if !device.read(partition_lba, &mut s) {
                return Err(Error::Io);
            }
            s
        };
        let geometry = Geometry::decode(&boot_sector, partition_lba)?;

        let mut fsinfo_sector = [0u8; SECTOR_SIZE];
        if !device.read(geometry.fsinfo_sector_lba(), &mut fsinfo_sector) {
            return Err(Error::Io);
        }
        let fsinfo = FsInfo::decode(&fsinfo_sector)?;

        let fat = FatTable::new(&geometry);
        let allocator = Allocator::new(&geometry, fsinfo);
        let window = Window::new(device.clone());

        info!(
            "mounted '{name}' at lba {partition_lba}: {} clusters, {} free",
            geometry.total_clusters(),
            allocator.free_count()
        );

        Ok(Volume {
            device,
            geometry,
            window,
            fat,
            allocator,
            clock,
            name: String::from(name),
        })
    }

    /// Convenience constructor using the default (1980-01-01) clock.
    pub fn open_default_clock(device: Arc<dyn BlockDevice>, partition_index: usize, name: &str) -> Result<Volume> {
        Self::open(device, partition_index, name, Arc::new(EpochClock))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root_cluster(&self) -> u32 {
        self.geometry.root_cluster
    }

    pub fn free_cluster_count(&self) -> u32 {
        self.allocator.free_count()
    }

    /// Flush the window and any pending FSInfo update.
    pub fn sync(&mut self) -> Result<()> {
        self.allocator.sync_fs(&mut self.window)
    }

    pub(crate) fn read_entry(&mut self, sector: u32, offset: usize) -> Result<[u8; 32]> {
        self.window.update(sector)?;
        let mut buf = [0u8; 32];
        buf.copy_from_slice(&self.window.bytes()[offset..offset + 32]);
        Ok(buf)
    }

    pub(crate) fn write_entry(&mut self, sector: u32, offset: usize, entry: &[u8; 32]) -> Result<()> {
        self.window.update(sector)?;
        self.window.bytes_mut()[offset..offset + 32].copy_from_slice(entry);
        self.window.mark_dirty();
        Ok(())
    }
}
