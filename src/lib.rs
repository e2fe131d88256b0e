//! A FAT32 filesystem engine: block-device-agnostic, single-threaded,
//! owning the on-disk state of one or more mounted volumes.
//!
//! See [`volume::Volume`] for the per-volume lifecycle, [`mount`] for the
//! process-wide mount registry, and [`path`] for turning `/mount/a/b.txt`
//! style paths into directory/file operations.

#![no_std]

extern crate alloc;

pub mod alloc_table;
pub mod device;
pub mod dir;
pub mod dirwalk;
pub mod error;
pub mod fat;
pub mod file;
pub mod layout;
pub mod mount;
pub mod name;
pub mod path;
pub mod time;
pub mod volume;
pub mod window;

pub use device::{BlockDevice, SECTOR_SIZE};
pub use error::{Error, Result};
pub use mount::MOUNTS;
pub use time::{Clock, EpochClock, Timestamp};
pub use volume::Volume;

pub const DIRENT_SIZE: usize = 32;
pub const LONG_NAME_LEN: usize = name::LFN_CHARS;

#[cfg(test)]
mod integration_tests;
