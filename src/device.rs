//! Block adapter contract.
//!
//! The core never performs I/O on its own; a caller-supplied implementation
//! of [`BlockDevice`] moves whole 512-byte sectors in and out. Grounded on
//! the pack's device trait, reduced to the bool-return contract this crate's
//! callers are expected to honor.

pub const SECTOR_SIZE: usize = 512;

/// A sector-addressable block device. Implementations are expected to be
/// blocking; the core never re-enters itself from inside a callback.
pub trait BlockDevice: Send + Sync {
    /// Read sector `sector` into `buf`. Returns `false` on any failure.
    fn read(&self, sector: u32, buf: &mut [u8; SECTOR_SIZE]) -> bool;

    /// Write `buf` to sector `sector`. Returns `false` on any failure.
    fn write(&self, sector: u32, buf: &[u8; SECTOR_SIZE]) -> bool;
}

#[cfg(feature = "std")]
pub mod std_file {
    //! A file-backed [`BlockDevice`] for tests and hosted use, grounded on
    //! the pack's `BlockFile` adapter (`std::fs::File` behind a lock).

    use super::{BlockDevice, SECTOR_SIZE};
    use spin::RwLock;
    use std::fs::File;
    use std::io::{Read, Seek, SeekFrom, Write};

    pub struct FileBlockDevice(RwLock<File>);

    impl FileBlockDevice {
        pub fn new(file: File) -> Self {
            Self(RwLock::new(file))
        }
    }

    impl BlockDevice for FileBlockDevice {
        fn read(&self, sector: u32, buf: &mut [u8; SECTOR_SIZE]) -> bool {
            let mut file = self.0.write();
            let offset = (sector as u64) * SECTOR_SIZE as u64;
            file.seek(SeekFrom::Start(offset)).is_ok() && file.read_exact(buf).is_ok()
        }

        fn write(&self, sector: u32, buf: &[u8; SECTOR_SIZE]) -> bool {
            let mut file = self.0.write();
            let offset = (sector as u64) * SECTOR_SIZE as u64;
            file.seek(SeekFrom::Start(offset)).is_ok() && file.write_all(buf).is_ok()
        }
    }
}
