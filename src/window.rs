//! Single-sector metadata window with a dirty flag.
//!
//! Grounded on the pack's `BlockCache` (buffer + dirty flag + sync-on-evict),
//! narrowed from a global multi-block LRU cache down to exactly one window
//! per volume, serving only metadata I/O (FAT, FSInfo, directory clusters).

use alloc::sync::Arc;
use log::debug;

use crate::device::{BlockDevice, SECTOR_SIZE};
use crate::error::{Error, Result};

const INVALID_SECTOR: u32 = u32::MAX;

pub struct Window {
    device: Arc<dyn BlockDevice>,
    buf: [u8; SECTOR_SIZE],
    sector: u32,
    dirty: bool,
}

impl Window {
    pub fn new(device: Arc<dyn BlockDevice>) -> Self {
        Self {
            device,
            buf: [0u8; SECTOR_SIZE],
            sector: INVALID_SECTOR,
            dirty: false,
        }
    }

    /// Ensure the window holds `sector`, flushing a dirty prior sector first.
    pub fn update(&mut self, sector: u32) -> Result<()> {
        if self.sector == sector {
            return Ok(());
        }
        self.flush()?;
        if !self.device.read(sector, &mut self.buf) {
            return Err(Error::Io);
        }
        debug!("window: loaded sector {sector}");
        self.sector = sector;
        self.dirty = false;
        Ok(())
    }

    /// Write the current sector back if dirty, and clear the dirty flag.
    pub fn flush(&mut self) -> Result<()> {
        if self.dirty {
            if self.sector == INVALID_SECTOR {
                return Err(Error::Param);
            }
            if !self.device.write(self.sector, &self.buf) {
                return Err(Error::Io);
            }
            debug!("window: flushed sector {}", self.sector);
            self.dirty = false;
        }
        Ok(())
    }

    pub fn current_sector(&self) -> u32 {
        self.sector
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn bytes(&self) -> &[u8; SECTOR_SIZE] {
        &self.buf
    }

    /// Mutable access; caller must mark the window dirty after writing.
    pub fn bytes_mut(&mut self) -> &mut [u8; SECTOR_SIZE] {
        &mut self.buf
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use alloc::vec::Vec;
    use spin::Mutex;

    struct MemDevice(Mutex<Vec<[u8; SECTOR_SIZE]>>);

    impl MemDevice {
        fn new(sectors: usize) -> Self {
            Self(Mutex::new(vec![[0u8; SECTOR_SIZE]; sectors]))
        }
    }

    impl BlockDevice for MemDevice {
        fn read(&self, sector: u32, buf: &mut [u8; SECTOR_SIZE]) -> bool {
            let data = self.0.lock();
            match data.get(sector as usize) {
                Some(s) => {
                    buf.copy_from_slice(s);
                    true
                }
                None => false,
            }
        }

        fn write(&self, sector: u32, buf: &[u8; SECTOR_SIZE]) -> bool {
            let mut data = self.0.lock();
            match data.get_mut(sector as usize) {
                Some(s) => {
                    s.copy_from_slice(buf);
                    true
                }
                None => false,
            }
        }
    }

    #[test]
    fn write_then_evict_persists() {
        let dev: Arc<dyn BlockDevice> = Arc::new(MemDevice::new(4));
        let mut w = Window::new(dev.clone());
        w.update(0).unwrap();
        w.bytes_mut()[0] = 0x42;
        w.mark_dirty();
        w.update(1).unwrap(); // evicts sector 0, must flush first
        assert!(!w.is_dirty());

        let mut check = [0u8; SECTOR_SIZE];
        assert!(dev.read(0, &mut check));
        assert_eq!(check[0], 0x42);
    }

    #[test]
    fn no_op_update_same_sector() {
        let dev: Arc<dyn BlockDevice> = Arc::new(MemDevice::new(2));
        let mut w = Window::new(dev);
        w.update(0).unwrap();
        w.bytes_mut()[1] = 7;
        w.mark_dirty();
        w.update(0).unwrap();
        assert!(w.is_dirty());
        assert_eq!(w.bytes()[1], 7);
    }
}
