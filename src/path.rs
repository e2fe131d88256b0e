//! Path resolution: forward-slash path split, mount lookup, directory walk.
//!
//! New relative to the pack (it never had a multi-volume registry to route
//! through), grounded on the composition the pack's `vfs.rs` `root()` +
//! `find` chain already performs for a single implicit filesystem.

use alloc::vec::Vec;

use crate::error::{Error, Result};
use crate::mount::MountRegistry;

/// Split an absolute path into (mount name, remaining segments).
fn split(path: &str) -> Result<(&str, Vec<&str>)> {
    let path = path.strip_prefix('/').ok_or(Error::Path)?;
    let mut segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return Err(Error::Path);
    }
    let mount = segments.remove(0);
    Ok((mount, segments))
}

/// Resolve `path` to the cluster of its containing directory and its leaf
/// name, looking the mount up in `registry`. Returns the mount name so the
/// caller can re-acquire the volume handle.
pub fn resolve_parent<'a>(registry: &MountRegistry, path: &'a str) -> Result<(alloc::string::String, u32, &'a str)> {
    let (mount_name, segments) = split(path)?;
    let volume = registry.get(mount_name).ok_or(Error::Path)?;
    let mut v = volume.write();

    let leaf = *segments.last().ok_or(Error::Path)?;
    let mut cluster = v.root_cluster();
    for seg in &segments[..segments.len() - 1] {
        if *seg == "." {
            continue;
        }
        let located = v.search(cluster, seg)?;
        if located.attr & crate::dir::ATTR_DIRECTORY == 0 {
            return Err(Error::Path);
        }
        cluster = if located.first_cluster == 0 {
            v.root_cluster()
        } else {
            located.first_cluster
        };
    }
    drop(v);
    Ok((alloc::string::String::from(mount_name), cluster, leaf))
}
