//! Directory cursor: advance 32 bytes at a time through a directory's
//! cluster chain, optionally stretching it when inserting.
//!
//! Grounded on the pack's `vfs.rs` cluster-chain traversal embedded in
//! `read_at`/`write_at`, pulled out into a standalone cursor the way the
//! directory-operations and file-operations layers both need it.

use crate::alloc_table::Allocator;
use crate::error::{Error, Result};
use crate::fat::{Class, FatTable};
use crate::layout::Geometry;
use crate::window::Window;

/// Points at one 32-byte directory-entry slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub cluster: u32,
    pub sector_in_cluster: u32,
    pub offset_in_sector: u32,
}

impl Cursor {
    pub fn at_start(start_cluster: u32) -> Self {
        Cursor {
            cluster: start_cluster,
            sector_in_cluster: 0,
            offset_in_sector: 0,
        }
    }

    pub fn sector(&self, geometry: &Geometry) -> u32 {
        geometry.first_sector_of_cluster(self.cluster) + self.sector_in_cluster
    }
}

/// Advance past the end of a directory without extending it; `Eof` at the
/// terminal link.
pub fn next(cursor: Cursor, geometry: &Geometry, window: &mut Window, fat: &FatTable) -> Result<Cursor> {
    step(cursor, geometry, window, fat, None)
}

/// Advance like [`next`], but extend the chain by one cleared cluster
/// instead of returning `Eof` when the chain ends. Used by insert.
pub fn next_or_extend(
    cursor: Cursor,
    geometry: &Geometry,
    window: &mut Window,
    fat: &FatTable,
    allocator: &mut Allocator,
) -> Result<Cursor> {
    step(cursor, geometry, window, fat, Some(allocator))
}

fn step(
    mut cursor: Cursor,
    geometry: &Geometry,
    window: &mut Window,
    fat: &FatTable,
    mut extend: Option<&mut Allocator>,
) -> Result<Cursor> {
    cursor.offset_in_sector += 32;
    if cursor.offset_in_sector < 512 {
        return Ok(cursor);
    }
    cursor.offset_in_sector = 0;
    cursor.sector_in_cluster += 1;
    if cursor.sector_in_cluster < geometry.sectors_per_cluster as u32 {
        return Ok(cursor);
    }
    cursor.sector_in_cluster = 0;

    match fat.get(window, cursor.cluster)? {
        Class::Used(next_cluster) => {
            cursor.cluster = next_cluster;
            Ok(cursor)
        }
        Class::Last => match extend.take() {
            Some(allocator) => {
                let new_cluster = allocator.extend(window, fat, cursor.cluster)?;
                allocator.clear_cluster(window, geometry, new_cluster)?;
                cursor.cluster = new_cluster;
                Ok(cursor)
            }
            None => Err(Error::Eof),
        },
        Class::Free | Class::Bad => Err(Error::Broken),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geo() -> Geometry {
        Geometry {
            bytes_per_sector: 512,
            sectors_per_cluster: 1,
            reserved_sectors: 32,
            fat_count: 2,
            sectors_per_fat: 8,
            total_sectors: 32 + 16 + 1000,
            root_cluster: 2,
            fsinfo_sector: 1,
            mirroring_disabled: true,
            active_fat: 0,
            partition_lba: 0,
        }
    }

    #[test]
    fn cursor_advances_within_sector() {
        let c = Cursor::at_start(2);
        let g = geo();
        assert_eq!(c.sector(&g), g.first_sector_of_cluster(2));
    }
}
