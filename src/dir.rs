//! Directory operations: search, insert, remove, stat, readdir,
//! create_subdirectory, unlink.
//!
//! Grounded on the pack's `dir.rs` (`Dir` trait for `VirtFile`), with the
//! filename-matching policy changed to encode-and-compare (spec decision,
//! see DESIGN.md) in place of the pack's case-insensitive decode-and-compare,
//! and FAT mirroring/FSInfo-sync plumbed through every mutation.

use alloc::string::String;
use alloc::vec::Vec;

use crate::dirwalk::{self, Cursor};
use crate::error::{Error, Result};
use crate::name::{
    self, decode_lfn_fragment, decode_sfn, encode_lfn_fragment, encode_sfn, lfn_checksum,
    lfn_fragment_count, lfn_is_last, lfn_sequence, name_to_units, sfn_checksum, ATTR_LFN, SFN_LEN,
};
use crate::time::Timestamp;
use crate::volume::Volume;

pub const ATTR_READ_ONLY: u8 = 0x01;
pub const ATTR_HIDDEN: u8 = 0x02;
pub const ATTR_SYSTEM: u8 = 0x04;
pub const ATTR_VOLUME_ID: u8 = 0x08;
pub const ATTR_DIRECTORY: u8 = 0x10;
pub const ATTR_ARCHIVE: u8 = 0x20;

const FREE_MARK: u8 = 0xE5;
const END_MARK: u8 = 0x00;

/// A resolved directory entry: the SFN slot, plus where its logical group
/// (LFN fragments, if any) started.
#[derive(Debug, Clone)]
pub struct Located {
    pub group_start: Cursor,
    pub sfn_cursor: Cursor,
    pub attr: u8,
    pub first_cluster: u32,
    pub size: u32,
    /// The entry's real name: LFN-decoded text when a long-name group
    /// preceded the SFN, or the SFN decoded as-is otherwise. Not necessarily
    /// equal to the string a caller searched for — `search` matches an SFN
    /// by encode-and-compare, so a query's case/padding can differ from what
    /// is actually on disk.
    pub name: String,
}

/// Decoded entry information as returned by `stat`/`readdir`.
#[derive(Debug, Clone)]
pub struct DirEntryInfo {
    pub name: String,
    pub attr: u8,
    pub size: u32,
    pub first_cluster: u32,
    pub created: Timestamp,
    pub modified: Timestamp,
}

fn entry_is_free(raw: &[u8; 32]) -> bool {
    raw[0] == FREE_MARK
}

fn entry_is_end(raw: &[u8; 32]) -> bool {
    raw[0] == END_MARK
}

fn sfn_bytes(raw: &[u8; 32]) -> [u8; SFN_LEN] {
    let mut out = [0u8; SFN_LEN];
    out.copy_from_slice(&raw[0..SFN_LEN]);
    out
}

/// Attr, first cluster, and size out of a short-name entry's raw bytes.
fn decode_fields(raw: &[u8; 32]) -> (u8, u32, u32) {
    let attr = raw[11];
    let hi = u16::from_le_bytes([raw[20], raw[21]]) as u32;
    let lo = u16::from_le_bytes([raw[26], raw[27]]) as u32;
    let size = u32::from_le_bytes([raw[28], raw[29], raw[30], raw[31]]);
    (attr, (hi << 16) | lo, size)
}

fn decode_short(raw: &[u8; 32], name: String) -> Located {
    let (attr, first_cluster, size) = decode_fields(raw);
    Located {
        group_start: Cursor::at_start(0), // filled by caller
        sfn_cursor: Cursor::at_start(0),  // filled by caller
        attr,
        first_cluster,
        size,
        name,
    }
}

fn decode_timestamp(raw: &[u8; 32], date_off: usize, time_off: usize) -> Timestamp {
    let date = u16::from_le_bytes([raw[date_off], raw[date_off + 1]]);
    let time = u16::from_le_bytes([raw[time_off], raw[time_off + 1]]);
    Timestamp::unpack(date, time)
}

impl Volume {
    fn entry_at(&mut self, cursor: Cursor) -> Result<[u8; 32]> {
        let sector = cursor.sector(&self.geometry);
        self.read_entry(sector, cursor.offset_in_sector as usize)
    }

    fn put_entry(&mut self, cursor: Cursor, raw: &[u8; 32]) -> Result<()> {
        let sector = cursor.sector(&self.geometry);
        self.write_entry(sector, cursor.offset_in_sector as usize, raw)
    }

    fn advance(&mut self, cursor: Cursor) -> Result<Cursor> {
        dirwalk::next(cursor, &self.geometry, &mut self.window, &self.fat)
    }

    fn advance_extend(&mut self, cursor: Cursor) -> Result<Cursor> {
        dirwalk::next_or_extend(cursor, &self.geometry, &mut self.window, &self.fat, &mut self.allocator)
    }

    /// Search `dir_cluster` for `name`, matching by encode-and-compare
    /// against the on-disk SFN, or by an LFN group's decoded text.
    pub fn search(&mut self, dir_cluster: u32, name: &str) -> Result<Located> {
        let target_sfn = encode_sfn(name);
        let mut cursor = Cursor::at_start(dir_cluster);
        loop {
            let raw = self.entry_at(cursor)?;
            if entry_is_end(&raw) {
                return Err(Error::Eof);
            }
            if entry_is_free(&raw) {
                cursor = self.advance(cursor)?;
                continue;
            }
            if raw[11] == ATTR_LFN {
                let group_start = cursor;
                let (decoded_name, matched_sfn_raw, sfn_cursor) = self.read_lfn_group(cursor, &raw)?;
                if sfn_bytes(&matched_sfn_raw) == target_sfn || decoded_name == name {
                    let mut loc = decode_short(&matched_sfn_raw, decoded_name);
                    loc.group_start = group_start;
                    loc.sfn_cursor = sfn_cursor;
                    return Ok(loc);
                }
                cursor = self.advance(sfn_cursor)?;
                continue;
            }
            if sfn_bytes(&raw) == target_sfn {
                let mut loc = decode_short(&raw, decode_sfn(&sfn_bytes(&raw)));
                loc.group_start = cursor;
                loc.sfn_cursor = cursor;
                return Ok(loc);
            }
            cursor = self.advance(cursor)?;
        }
    }

    /// Read one LFN group starting at `cursor` (already confirmed to hold
    /// the leading fragment `lead_raw`); returns (decoded name, SFN raw
    /// bytes, cursor now pointing at the SFN).
    fn read_lfn_group(&mut self, cursor: Cursor, lead_raw: &[u8; 32]) -> Result<(String, [u8; 32], Cursor)> {
        if !lfn_is_last(lead_raw) {
            return Err(Error::Broken);
        }
        let count = lfn_sequence(lead_raw);
        if count == 0 || count > 20 {
            return Err(Error::Broken);
        }
        let checksum = lfn_checksum(lead_raw);
        let mut fragments: Vec<[u16; 13]> = Vec::with_capacity(count as usize);
        fragments.push(decode_lfn_fragment(lead_raw));

        let mut cur = cursor;
        for expected_seq in (1..count).rev() {
            cur = self.advance(cur)?;
            let raw = self.entry_at(cur)?;
            if entry_is_free(&raw) || entry_is_end(&raw) || raw[11] != ATTR_LFN {
                return Err(Error::Broken);
            }
            if lfn_sequence(&raw) != expected_seq || lfn_checksum(&raw) != checksum {
                return Err(Error::Broken);
            }
            fragments.push(decode_lfn_fragment(&raw));
        }
        cur = self.advance(cur)?;
        let sfn_raw = self.entry_at(cur)?;
        if entry_is_free(&sfn_raw) || entry_is_end(&sfn_raw) || sfn_raw[11] == ATTR_LFN {
            return Err(Error::Broken);
        }
        if sfn_checksum(&sfn_bytes(&sfn_raw)) != checksum {
            return Err(Error::Broken);
        }
        let decoded = name::assemble_lfn(&fragments)?;
        Ok((decoded, sfn_raw, cur))
    }

    /// Insert a new directory entry. Always emits at least one LFN fragment
    /// (to preserve case) followed by the SFN. Rejects SFN collisions
    /// without disambiguation.
    pub fn insert(&mut self, dir_cluster: u32, leaf: &str, attr: u8, first_cluster: u32) -> Result<Located> {
        let sfn = encode_sfn(leaf);
        if self.search(dir_cluster, leaf).is_ok() {
            return Err(Error::Denied);
        }

        let units = name_to_units(leaf)?;
        let frag_count = lfn_fragment_count(leaf.len());
        let checksum = sfn_checksum(&sfn);

        let run_len = frag_count + 1;
        let mut run_start = Cursor::at_start(dir_cluster);
        let mut cursor = run_start;
        let mut consecutive = 0usize;

        loop {
            let raw = self.entry_at(cursor)?;
            if entry_is_free(&raw) || entry_is_end(&raw) {
                if consecutive == 0 {
                    run_start = cursor;
                }
                consecutive += 1;
                if consecutive == run_len {
                    break;
                }
            } else {
                consecutive = 0;
            }
            cursor = self.advance_extend(cursor)?;
        }

        let now = self.clock.now();
        let (date, time) = now.pack();

        let mut cur = run_start;
        for i in 0..frag_count {
            let seq = (frag_count - i) as u8;
            let start = i * 13;
            let end = (start + 13).min(units.len());
            let chunk = &units[start..end];
            let frag = encode_lfn_fragment(chunk, seq, i == 0, checksum);
            self.put_entry(cur, &frag)?;
            cur = self.advance(cur)?;
        }

        let mut sfn_raw = [0u8; 32];
        sfn_raw[0..SFN_LEN].copy_from_slice(&sfn);
        sfn_raw[11] = attr;
        sfn_raw[13] = 0; // crt_time_tenth
        sfn_raw[14..16].copy_from_slice(&time.to_le_bytes());
        sfn_raw[16..18].copy_from_slice(&date.to_le_bytes());
        sfn_raw[18..20].copy_from_slice(&date.to_le_bytes()); // last access date
        sfn_raw[20..22].copy_from_slice(&((first_cluster >> 16) as u16).to_le_bytes());
        sfn_raw[22..24].copy_from_slice(&time.to_le_bytes());
        sfn_raw[24..26].copy_from_slice(&date.to_le_bytes());
        sfn_raw[26..28].copy_from_slice(&((first_cluster & 0xFFFF) as u16).to_le_bytes());
        sfn_raw[28..32].copy_from_slice(&0u32.to_le_bytes());
        self.put_entry(cur, &sfn_raw)?;

        self.sync()?;

        Ok(Located {
            group_start: run_start,
            sfn_cursor: cur,
            attr,
            first_cluster,
            size: 0,
            name: String::from(leaf),
        })
    }

    /// Mark every entry from `group_start` through `sfn_cursor` free.
    pub fn remove(&mut self, located: &Located) -> Result<()> {
        let mut cursor = located.group_start;
        loop {
            let mut raw = self.entry_at(cursor)?;
            raw[0] = FREE_MARK;
            self.put_entry(cursor, &raw)?;
            if cursor == located.sfn_cursor {
                break;
            }
            cursor = self.advance(cursor)?;
        }
        self.sync()
    }

    /// Allocate a directory cluster, write `.`/`..`, and insert it into
    /// `parent_cluster`.
    pub fn create_subdirectory(&mut self, parent_cluster: u32, leaf: &str) -> Result<u32> {
        if self.search(parent_cluster, leaf).is_ok() {
            return Err(Error::Denied);
        }
        let cluster = self.allocator.allocate(&mut self.window, &self.fat)?;
        self.allocator.clear_cluster(&mut self.window, &self.geometry, cluster)?;

        let parent_ref = if parent_cluster == self.root_cluster() {
            0
        } else {
            parent_cluster
        };

        self.write_dot_entries(cluster, cluster, parent_ref)?;
        self.insert(parent_cluster, leaf, ATTR_DIRECTORY, cluster)?;
        self.sync()?;
        Ok(cluster)
    }

    fn write_dot_entries(&mut self, dir_cluster: u32, self_cluster: u32, parent_cluster: u32) -> Result<()> {
        let now = self.clock.now();
        let (date, time) = now.pack();
        let make = |name: &[u8; SFN_LEN], cluster: u32| -> [u8; 32] {
            let mut raw = [0u8; 32];
            raw[0..SFN_LEN].copy_from_slice(name);
            raw[11] = ATTR_DIRECTORY;
            raw[14..16].copy_from_slice(&time.to_le_bytes());
            raw[16..18].copy_from_slice(&date.to_le_bytes());
            raw[18..20].copy_from_slice(&date.to_le_bytes());
            raw[20..22].copy_from_slice(&((cluster >> 16) as u16).to_le_bytes());
            raw[22..24].copy_from_slice(&time.to_le_bytes());
            raw[24..26].copy_from_slice(&date.to_le_bytes());
            raw[26..28].copy_from_slice(&((cluster & 0xFFFF) as u16).to_le_bytes());
            raw
        };
        let dot = *b".          ";
        let dotdot = *b"..         ";
        let dot_cursor = Cursor::at_start(dir_cluster);
        self.put_entry(dot_cursor, &make(&dot, self_cluster))?;
        let dotdot_cursor = self.advance(dot_cursor)?;
        self.put_entry(dotdot_cursor, &make(&dotdot, parent_cluster))?;
        Ok(())
    }

    /// Reject if root/read-only/system; if a directory, require it contain
    /// only `.`/`..`/free entries; free its chain and mark entries free.
    pub fn unlink(&mut self, parent_cluster: u32, leaf: &str) -> Result<()> {
        let located = self.search(parent_cluster, leaf)?;
        if located.attr & (ATTR_READ_ONLY | ATTR_SYSTEM) != 0 {
            return Err(Error::Denied);
        }
        if located.attr & ATTR_DIRECTORY != 0 {
            self.assert_directory_empty(located.first_cluster)?;
        }
        if located.first_cluster >= 2 {
            self.allocator.free(&mut self.window, &self.fat, located.first_cluster)?;
        }
        self.remove(&located)?;
        self.sync()
    }

    fn assert_directory_empty(&mut self, dir_cluster: u32) -> Result<()> {
        let mut cursor = Cursor::at_start(dir_cluster);
        loop {
            let raw = self.entry_at(cursor)?;
            if entry_is_end(&raw) {
                return Ok(());
            }
            if !entry_is_free(&raw) {
                let name = decode_sfn(&sfn_bytes(&raw));
                if name != "." && name != ".." && raw[11] != ATTR_LFN {
                    return Err(Error::Denied);
                }
            }
            cursor = match self.advance(cursor) {
                Ok(c) => c,
                Err(Error::Eof) => return Ok(()),
                Err(e) => return Err(e),
            };
        }
    }

    /// Resolve `leaf` in `dir_cluster` and decode its full entry info.
    pub fn stat(&mut self, dir_cluster: u32, leaf: &str) -> Result<DirEntryInfo> {
        let located = self.search(dir_cluster, leaf)?;
        let raw = self.entry_at(located.sfn_cursor)?;
        Ok(DirEntryInfo {
            name: located.name,
            attr: located.attr,
            size: located.size,
            first_cluster: located.first_cluster,
            created: decode_timestamp(&raw, 16, 14),
            modified: decode_timestamp(&raw, 24, 22),
        })
    }

    /// List every logical entry of a directory (skips `.`/`..`).
    pub fn readdir(&mut self, dir_cluster: u32) -> Result<Vec<DirEntryInfo>> {
        let mut out = Vec::new();
        let mut cursor = Cursor::at_start(dir_cluster);
        loop {
            let raw = self.entry_at(cursor)?;
            if entry_is_end(&raw) {
                break;
            }
            if entry_is_free(&raw) {
                cursor = match self.advance(cursor) {
                    Ok(c) => c,
                    Err(Error::Eof) => break,
                    Err(e) => return Err(e),
                };
                continue;
            }
            if raw[11] == ATTR_LFN {
                let (decoded, sfn_raw, sfn_cursor) = self.read_lfn_group(cursor, &raw)?;
                let (attr, first_cluster, size) = decode_fields(&sfn_raw);
                out.push(DirEntryInfo {
                    name: decoded,
                    attr,
                    size,
                    first_cluster,
                    created: decode_timestamp(&sfn_raw, 16, 14),
                    modified: decode_timestamp(&sfn_raw, 24, 22),
                });
                cursor = match self.advance(sfn_cursor) {
                    Ok(c) => c,
                    Err(Error::Eof) => break,
                    Err(e) => return Err(e),
                };
                continue;
            }
            let name = decode_sfn(&sfn_bytes(&raw));
            if name != "." && name != ".." {
                let (attr, first_cluster, size) = decode_fields(&raw);
                out.push(DirEntryInfo {
                    name,
                    attr,
                    size,
                    first_cluster,
                    created: decode_timestamp(&raw, 16, 14),
                    modified: decode_timestamp(&raw, 24, 22),
                });
            }
            cursor = match self.advance(cursor) {
                Ok(c) => c,
                Err(Error::Eof) => break,
                Err(e) => return Err(e),
            };
        }
        Ok(out)
    }
}
