//! Payloads returned by `stat` and `readdir`.
//!
//! Times are 32-bit UNIX timestamps, matching what constrained backends
//! store.

use serde::{Deserialize, Serialize};

/// Attribute bits shared by [`Stat::attr`] and [`DirEntry::attr`].
pub mod attr {
    /// Entry may not be written.
    pub const READONLY: u32 = 0x01;
    /// Entry is hidden from listings by convention.
    pub const HIDDEN: u32 = 0x02;
    /// Entry is a directory.
    pub const DIRECTORY: u32 = 0x10;
}

/// File status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stat {
    /// Size in bytes.
    pub size: u64,
    /// Attribute bits, see [`attr`].
    pub attr: u32,
    /// Creation time.
    pub ctime: u32,
    /// Last modification time.
    pub mtime: u32,
    /// Last access time.
    pub atime: u32,
}

impl Stat {
    /// Returns true if the attributes mark a directory.
    pub fn is_dir(&self) -> bool {
        self.attr & attr::DIRECTORY != 0
    }
}

/// Directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    /// Entry name (not full path).
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// Attribute bits, see [`attr`].
    pub attr: u32,
    /// Last modification time.
    pub time: u32,
}

impl DirEntry {
    /// Create a file entry.
    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            attr: 0,
            time: 0,
        }
    }

    /// Create a directory entry.
    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: 0,
            attr: attr::DIRECTORY,
            time: 0,
        }
    }

    /// Returns true if this entry is a directory.
    pub fn is_dir(&self) -> bool {
        self.attr & attr::DIRECTORY != 0
    }
}
