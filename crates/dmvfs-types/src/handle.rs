//! Handle identifiers.
//!
//! Handles given to callers are generation-tagged slot indices. A slot's
//! generation is bumped every time it is freed, so a handle kept after
//! `close` (or after its mount went away) never matches the slot again.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Slot index plus generation.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HandleId {
    pub index: u32,
    pub generation: u32,
}

impl HandleId {
    pub fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }
}

impl fmt::Debug for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}@{}", self.index, self.generation)
    }
}

/// Handle to an open file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileHandle(pub HandleId);

/// Handle to an open directory stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DirHandle(pub HandleId);

/// Opaque value a backend hands out for one of its open files or
/// directory streams. Only meaningful to the backend that issued it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BackendHandle(pub u64);

/// Identifier of the process/task that owns an open handle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerId(pub u32);

impl From<u32> for OwnerId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
