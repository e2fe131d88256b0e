//! File handle: open/read/write/seek/close with a private per-handle sector
//! buffer, distinct from the volume's metadata window.
//!
//! Grounded on the pack's `file.rs` (`File` trait) and `vfs.rs`
//! (`read_at`/`write_at`/`incerase_size`), rewritten from whole-file-at-once
//! semantics into the cursor/seek model this engine exposes.

use crate::device::SECTOR_SIZE;
use crate::dir::{ATTR_ARCHIVE, ATTR_DIRECTORY, ATTR_READ_ONLY};
use crate::error::{Error, Result};
use crate::fat::Class;
use crate::volume::Volume;

/// Bitmask of open-mode flags.
pub mod mode {
    pub const READ: u8 = 0x01;
    pub const WRITE: u8 = 0x02;
    pub const APPEND: u8 = 0x04;
    pub const TRUNCATE: u8 = 0x08;
    pub const CREATE: u8 = 0x10;
}

pub struct FileHandle {
    parent_cluster: u32,
    leaf_sector: u32,
    leaf_offset: usize,
    start_cluster: u32,
    current_cluster: u32,
    size: u32,
    offset: u32,
    buf: [u8; SECTOR_SIZE],
    buf_sector: u32,
    buf_dirty: bool,
    modified: bool,
    accessed: bool,
    writable: bool,
}

const INVALID_SECTOR: u32 = u32::MAX;

impl Volume {
    /// Open (optionally creating) a file whose short leaf name lives
    /// directly inside `parent_cluster`.
    pub fn open_file(&mut self, parent_cluster: u32, leaf: &str, flags: u8) -> Result<FileHandle> {
        let located = match self.search(parent_cluster, leaf) {
            Ok(loc) => {
                if loc.attr & ATTR_DIRECTORY != 0 {
                    return Err(Error::Param);
                }
                loc
            }
            Err(Error::Eof) if flags & mode::CREATE != 0 => {
                self.insert(parent_cluster, leaf, ATTR_ARCHIVE, 0)?
            }
            Err(e) => return Err(e),
        };

        if located.attr & ATTR_READ_ONLY != 0 && flags & mode::WRITE != 0 {
            return Err(Error::Denied);
        }

        let sector = located.sfn_cursor.sector(&self.geometry);
        let offset = located.sfn_cursor.offset_in_sector as usize;

        let mut size = located.size;
        let mut start_cluster = located.first_cluster;

        if flags & mode::TRUNCATE != 0 && size > 0 {
            if start_cluster >= 2 {
                self.allocator.free(&mut self.window, &self.fat, start_cluster)?;
            }
            size = 0;
            start_cluster = 0;
            self.update_leaf(sector, offset, start_cluster, size)?;
            self.sync()?;
        }

        let mut handle = FileHandle {
            parent_cluster,
            leaf_sector: sector,
            leaf_offset: offset,
            start_cluster,
            current_cluster: start_cluster,
            size,
            offset: 0,
            buf: [0u8; SECTOR_SIZE],
            buf_sector: INVALID_SECTOR,
            buf_dirty: false,
            modified: false,
            accessed: false,
            writable: flags & mode::WRITE != 0,
        };

        if flags & mode::APPEND != 0 {
            self.seek(&mut handle, size)?;
        }

        Ok(handle)
    }

    /// Rewrite cluster/size, flag `ATTR_ARCHIVE`, and stamp the write and
    /// access dates. Only called when the handle was actually written.
    fn update_leaf(&mut self, sector: u32, offset: usize, first_cluster: u32, size: u32) -> Result<()> {
        let mut raw = self.read_entry(sector, offset)?;
        raw[20..22].copy_from_slice(&((first_cluster >> 16) as u16).to_le_bytes());
        raw[26..28].copy_from_slice(&((first_cluster & 0xFFFF) as u16).to_le_bytes());
        raw[28..32].copy_from_slice(&size.to_le_bytes());
        raw[11] |= ATTR_ARCHIVE;
        let now = self.clock.now();
        let (date, time) = now.pack();
        raw[18..20].copy_from_slice(&date.to_le_bytes()); // last access date
        raw[22..24].copy_from_slice(&time.to_le_bytes());
        raw[24..26].copy_from_slice(&date.to_le_bytes());
        self.write_entry(sector, offset, &raw)
    }

    /// Stamp only the last-access date, for a handle that was read but never
    /// written — no cluster/size/archive-bit/write-time change.
    fn update_access_date(&mut self, sector: u32, offset: usize) -> Result<()> {
        let mut raw = self.read_entry(sector, offset)?;
        let (date, _time) = self.clock.now().pack();
        raw[18..20].copy_from_slice(&date.to_le_bytes());
        self.write_entry(sector, offset, &raw)
    }

    fn flush_buffer(&mut self, handle: &mut FileHandle) -> Result<()> {
        if handle.buf_dirty {
            if !self.device.write(handle.buf_sector, &handle.buf) {
                return Err(Error::Io);
            }
            handle.buf_dirty = false;
        }
        Ok(())
    }

    fn load_buffer(&mut self, handle: &mut FileHandle, sector: u32) -> Result<()> {
        if handle.buf_sector == sector {
            return Ok(());
        }
        self.flush_buffer(handle)?;
        if !self.device.read(sector, &mut handle.buf) {
            return Err(Error::Io);
        }
        handle.buf_sector = sector;
        Ok(())
    }

    /// Move the handle's cursor to absolute byte offset `target`, following
    /// (and, if writable, extending) the cluster chain as needed.
    pub fn seek(&mut self, handle: &mut FileHandle, target: u32) -> Result<()> {
        let cluster_bytes = self.geometry.sectors_per_cluster as u32 * SECTOR_SIZE as u32;
        let target_cluster_index = target / cluster_bytes;
        let current_cluster_index = handle.offset / cluster_bytes;

        if handle.start_cluster == 0 {
            if !handle.writable {
                handle.offset = target;
                return Ok(());
            }
            let first = self.allocator.allocate(&mut self.window, &self.fat)?;
            self.allocator.clear_cluster(&mut self.window, &self.geometry, first)?;
            handle.start_cluster = first;
            handle.current_cluster = first;
            self.update_leaf(handle.leaf_sector, handle.leaf_offset, first, handle.size)?;
            self.sync()?;
        }

        let mut cluster_index = current_cluster_index;
        if target_cluster_index < cluster_index || handle.offset == 0 {
            cluster_index = 0;
            handle.current_cluster = handle.start_cluster;
        }

        while cluster_index < target_cluster_index {
            match self.fat.get(&mut self.window, handle.current_cluster)? {
                Class::Used(next) => handle.current_cluster = next,
                Class::Last => {
                    if !handle.writable {
                        return Err(Error::Eof);
                    }
                    let next = self
                        .allocator
                        .extend(&mut self.window, &self.fat, handle.current_cluster)?;
                    self.allocator.clear_cluster(&mut self.window, &self.geometry, next)?;
                    handle.current_cluster = next;
                }
                Class::Free | Class::Bad => return Err(Error::Broken),
            }
            cluster_index += 1;
        }

        let sector_in_cluster = (target % cluster_bytes) / SECTOR_SIZE as u32;
        let sector = self.geometry.first_sector_of_cluster(handle.current_cluster) + sector_in_cluster;
        if sector != handle.buf_sector {
            self.load_buffer(handle, sector)?;
        }
        handle.offset = target;
        Ok(())
    }

    /// Read up to `buf.len()` bytes at the current offset, bounded by size.
    pub fn read_file(&mut self, handle: &mut FileHandle, buf: &mut [u8]) -> Result<usize> {
        if handle.offset >= handle.size {
            return Ok(0);
        }
        let mut total = 0;
        while total < buf.len() && handle.offset < handle.size {
            let idx = (handle.offset % SECTOR_SIZE as u32) as usize;
            let sector = self.geometry.first_sector_of_cluster(handle.current_cluster)
                + (handle.offset % (self.geometry.sectors_per_cluster as u32 * SECTOR_SIZE as u32))
                    / SECTOR_SIZE as u32;
            self.load_buffer(handle, sector)?;
            let room = SECTOR_SIZE - idx;
            let tail = (handle.size - handle.offset) as usize;
            let n = (buf.len() - total).min(room).min(tail);
            buf[total..total + n].copy_from_slice(&handle.buf[idx..idx + n]);
            total += n;
            let new_offset = handle.offset + n as u32;
            if n > 0 {
                self.seek(handle, new_offset)?;
            }
        }
        handle.accessed = true;
        Ok(total)
    }

    /// Write `buf` at the current offset, extending the chain and size as
    /// needed.
    pub fn write_file(&mut self, handle: &mut FileHandle, buf: &[u8]) -> Result<usize> {
        if !handle.writable {
            return Err(Error::Denied);
        }
        // Ensures a first cluster is allocated before any sector math below
        // assumes `handle.current_cluster` is valid.
        if !buf.is_empty() {
            self.seek(handle, handle.offset)?;
        }

        let mut total = 0;
        while total < buf.len() {
            let idx = (handle.offset % SECTOR_SIZE as u32) as usize;
            let sector = self.geometry.first_sector_of_cluster(handle.current_cluster)
                + (handle.offset % (self.geometry.sectors_per_cluster as u32 * SECTOR_SIZE as u32))
                    / SECTOR_SIZE as u32;
            self.load_buffer(handle, sector)?;
            let room = SECTOR_SIZE - idx;
            let n = (buf.len() - total).min(room);
            handle.buf[idx..idx + n].copy_from_slice(&buf[total..total + n]);
            handle.buf_dirty = true;
            total += n;
            let new_offset = handle.offset + n as u32;
            if new_offset > handle.size {
                handle.size = new_offset;
            }
            self.seek(handle, new_offset)?;
        }
        handle.modified = true;
        Ok(total)
    }

    /// Flush the private buffer, stamp size/archive-bit/write-time if
    /// written, or just the access date if merely read, and sync the volume.
    pub fn close_file(&mut self, mut handle: FileHandle) -> Result<()> {
        self.flush_buffer(&mut handle)?;
        if handle.modified {
            self.update_leaf(handle.leaf_sector, handle.leaf_offset, handle.start_cluster, handle.size)?;
        } else if handle.accessed {
            self.update_access_date(handle.leaf_sector, handle.leaf_offset)?;
        }
        self.sync()
    }
}

impl FileHandle {
    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn parent_cluster(&self) -> u32 {
        self.parent_cluster
    }
}
