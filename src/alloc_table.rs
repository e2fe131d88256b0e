//! Cluster allocator: allocate/extend/free, FSInfo free-count/next-hint sync.
//!
//! Grounded on the pack's `fs.rs` (`alloc_cluster`/`dealloc_cluster`), with
//! the free-count direction it already used (allocate decrements, free
//! increments) kept, and FSInfo write-back added after every mutation so the
//! hint sector never overcounts free space across a crash.

use log::warn;

use crate::error::{Error, Result};
use crate::fat::{Class, FatTable, END_OF_CLUSTER, FREE_CLUSTER};
use crate::layout::{FsInfo, Geometry};
use crate::window::Window;

pub struct Allocator {
    fsinfo_sector: u32,
    total_clusters: u32,
    free_count: u32,
    last_used: u32,
    fsinfo_dirty: bool,
}

impl Allocator {
    pub fn new(geometry: &Geometry, fsinfo: FsInfo) -> Self {
        let last_used = if fsinfo.next_free >= 2 && fsinfo.next_free < geometry.total_clusters() + 2 {
            fsinfo.next_free
        } else {
            2
        };
        Self {
            fsinfo_sector: geometry.fsinfo_sector_lba(),
            total_clusters: geometry.total_clusters(),
            free_count: fsinfo.free_count,
            last_used,
            fsinfo_dirty: false,
        }
    }

    pub fn free_count(&self) -> u32 {
        self.free_count
    }

    fn scan_free(&self, window: &mut Window, fat: &FatTable, start: u32) -> Result<u32> {
        let max = self.total_clusters + 2;
        let mut c = start;
        loop {
            if matches!(fat.get(window, c)?, Class::Free) {
                return Ok(c);
            }
            c += 1;
            if c >= max {
                c = 2;
            }
            if c == start {
                warn!("allocator: volume full, free_count={}", self.free_count);
                return Err(Error::Full);
            }
        }
    }

    /// Allocate one free cluster, unlinked.
    pub fn allocate(&mut self, window: &mut Window, fat: &FatTable) -> Result<u32> {
        let chosen = self.scan_free(window, fat, self.last_used + 1)?;
        fat.put(window, chosen, END_OF_CLUSTER)?;
        self.last_used = chosen;
        self.free_count = self.free_count.saturating_sub(1);
        self.fsinfo_dirty = true;
        if self.free_count < 16 {
            warn!("allocator: low free space, {} clusters remain", self.free_count);
        }
        Ok(chosen)
    }

    /// Allocate a cluster and link it after `prev`.
    pub fn extend(&mut self, window: &mut Window, fat: &FatTable, prev: u32) -> Result<u32> {
        let probe = if prev + 1 >= self.total_clusters + 2 {
            2
        } else {
            prev + 1
        };
        let chosen = if matches!(fat.get(window, probe)?, Class::Free) {
            probe
        } else {
            self.scan_free(window, fat, self.last_used + 1)?
        };
        fat.put(window, chosen, END_OF_CLUSTER)?;
        fat.put(window, prev, chosen)?;
        self.last_used = chosen;
        self.free_count = self.free_count.saturating_sub(1);
        self.fsinfo_dirty = true;
        Ok(chosen)
    }

    /// Free an entire chain starting at `head`.
    pub fn free(&mut self, window: &mut Window, fat: &FatTable, head: u32) -> Result<()> {
        let mut cluster = head;
        loop {
            let class = fat.get(window, cluster)?;
            let next = match class {
                Class::Used(n) => Some(n),
                Class::Last => None,
                Class::Free | Class::Bad => return Err(Error::Broken),
            };
            fat.put(window, cluster, FREE_CLUSTER)?;
            self.free_count += 1;
            self.fsinfo_dirty = true;
            match next {
                Some(n) => cluster = n,
                None => break,
            }
        }
        Ok(())
    }

    /// Zero every sector of `cluster` through the window.
    pub fn clear_cluster(&self, window: &mut Window, geometry: &Geometry, cluster: u32) -> Result<()> {
        let first = geometry.first_sector_of_cluster(cluster);
        for i in 0..geometry.sectors_per_cluster as u32 {
            window.update(first + i)?;
            window.bytes_mut().fill(0);
            window.mark_dirty();
        }
        Ok(())
    }

    /// Flush the window, then (if dirty) rewrite FSInfo, then flush again.
    pub fn sync_fs(&mut self, window: &mut Window) -> Result<()> {
        window.flush()?;
        if self.fsinfo_dirty {
            window.update(self.fsinfo_sector)?;
            let info = FsInfo {
                free_count: self.free_count,
                next_free: self.last_used,
            };
            info.encode(window.bytes_mut());
            window.mark_dirty();
            window.flush()?;
            self.fsinfo_dirty = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::Geometry;

    fn geo() -> Geometry {
        // hand-built minimal geometry for allocator unit tests
        Geometry {
            bytes_per_sector: 512,
            sectors_per_cluster: 1,
            reserved_sectors: 32,
            fat_count: 2,
            sectors_per_fat: 8,
            total_sectors: 32 + 16 + 1000,
            root_cluster: 2,
            fsinfo_sector: 1,
            mirroring_disabled: false,
            active_fat: 0,
            partition_lba: 0,
        }
    }

    #[test]
    fn new_picks_valid_next_free_hint() {
        let g = geo();
        let info = FsInfo {
            free_count: 900,
            next_free: 5,
        };
        let a = Allocator::new(&g, info);
        assert_eq!(a.last_used, 5);
        assert_eq!(a.free_count(), 900);
    }

    #[test]
    fn new_rejects_out_of_range_hint() {
        let g = geo();
        let info = FsInfo {
            free_count: 900,
            next_free: 0xFFFF_FFFF,
        };
        let a = Allocator::new(&g, info);
        assert_eq!(a.last_used, 2);
    }
}
