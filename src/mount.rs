//! Process-wide mount registry, keyed by logical mount name.
//!
//! Grounded on the pack's `lazy_static! { BLOCK_CACHE_MANAGER }` pattern,
//! applied to volumes instead of block caches: one static registry, entries
//! held behind `Arc<RwLock<Volume>>` so open file/dir handles can keep a
//! stable reference independent of the registry's own lifetime.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use lazy_static::lazy_static;
use spin::RwLock;

use crate::device::BlockDevice;
use crate::error::{Error, Result};
use crate::time::Clock;
use crate::volume::Volume;

pub struct MountRegistry {
    mounts: RwLock<Vec<(String, Arc<RwLock<Volume>>)>>,
}

impl MountRegistry {
    fn new() -> Self {
        Self {
            mounts: RwLock::new(Vec::new()),
        }
    }

    /// Decode and validate `device` at MBR `partition_index` (or the whole
    /// disk, if sector 0 is itself a BPB), then register it under `name`.
    /// Fails with `Param` if the name is already taken.
    pub fn mount(
        &self,
        device: Arc<dyn BlockDevice>,
        partition_index: usize,
        name: &str,
        clock: Arc<dyn Clock>,
    ) -> Result<Arc<RwLock<Volume>>> {
        if self.get(name).is_some() {
            return Err(Error::Param);
        }
        let volume = Volume::open(device, partition_index, name, clock)?;
        let handle = Arc::new(RwLock::new(volume));
        self.mounts.write().push((String::from(name), handle.clone()));
        Ok(handle)
    }

    pub fn get(&self, name: &str) -> Option<Arc<RwLock<Volume>>> {
        self.mounts
            .read()
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
    }

    /// Flush and remove a mount. Fails with `Param` if not currently mounted.
    pub fn unmount(&self, name: &str) -> Result<()> {
        let handle = {
            let mounts = self.mounts.read();
            mounts.iter().find(|(n, _)| n == name).map(|(_, v)| v.clone())
        };
        let handle = handle.ok_or(Error::Param)?;
        handle.write().sync()?;
        self.mounts.write().retain(|(n, _)| n != name);
        Ok(())
    }
}

lazy_static! {
    pub static ref MOUNTS: MountRegistry = MountRegistry::new();
}
