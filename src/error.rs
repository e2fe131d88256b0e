//! Unified error taxonomy for the filesystem core.

use core::fmt;

/// Failure reasons surfaced by every fallible operation in this crate.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Error {
    /// Sector 0 (and its MBR partition, if present) does not describe a
    /// FAT32 volume this crate can mount.
    NoFat,
    /// An on-disk structure violates the format at runtime (bad FAT class,
    /// malformed LFN group, checksum mismatch).
    Broken,
    /// The block adapter reported a failed read or write.
    Io,
    /// Caller misuse: bad arguments, wrong handle state, etc.
    Param,
    /// Path could not be parsed or resolved.
    Path,
    /// End of a traversal reached; also returned by reads/seeks past range.
    Eof,
    /// Operation rejected by attribute, mode, or non-empty-directory rules.
    Denied,
    /// No free cluster available.
    Full,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Error::NoFat => "not a FAT32 volume",
            Error::Broken => "on-disk structure is broken",
            Error::Io => "block device I/O failure",
            Error::Param => "invalid argument",
            Error::Path => "invalid or unresolved path",
            Error::Eof => "end of stream",
            Error::Denied => "operation denied",
            Error::Full => "volume full",
        };
        f.write_str(msg)
    }
}

pub type Result<T> = core::result::Result<T, Error>;
