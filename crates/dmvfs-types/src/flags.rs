//! Open flags and seek origins.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::BitOr;

use crate::{VfsError, VfsResult};

/// Open file flags.
///
/// Bit layout follows the POSIX-like values every backend understands:
/// `RDONLY=0x0001`, `WRONLY=0x0002`, `RDWR=0x0003`, `CREAT=0x0100`,
/// `TRUNC=0x0200`, `APPEND=0x0400`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpenFlags(u32);

impl OpenFlags {
    pub const RDONLY: Self = Self(0x0001);
    pub const WRONLY: Self = Self(0x0002);
    pub const RDWR: Self = Self(0x0003);
    pub const CREAT: Self = Self(0x0100);
    pub const TRUNC: Self = Self(0x0200);
    pub const APPEND: Self = Self(0x0400);

    const ALL: u32 = 0x0003 | 0x0100 | 0x0200 | 0x0400;

    /// Wrap raw bits. Unknown bits are rejected.
    pub fn from_bits(bits: u32) -> VfsResult<Self> {
        if bits & !Self::ALL != 0 {
            return Err(VfsError::invalid_argument(format!(
                "unknown open flags 0x{bits:04x}"
            )));
        }
        Ok(Self(bits))
    }

    /// Raw bit value.
    pub fn bits(&self) -> u32 {
        self.0
    }

    /// True when every bit of `other` is set.
    pub fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Read-only access.
    pub fn read() -> Self {
        Self::RDONLY
    }

    /// Read/write access on an existing file.
    pub fn read_write() -> Self {
        Self::RDWR
    }

    /// Create with read/write access.
    pub fn create() -> Self {
        Self::RDWR | Self::CREAT
    }

    /// Create and truncate, write-only.
    pub fn create_truncate() -> Self {
        Self::WRONLY | Self::CREAT | Self::TRUNC
    }

    /// Returns true if the handle may read.
    pub fn readable(&self) -> bool {
        self.contains(Self::RDONLY)
    }

    /// Returns true if the handle may write.
    pub fn writable(&self) -> bool {
        self.contains(Self::WRONLY)
    }

    /// Returns true if a missing file should be created.
    pub fn creates(&self) -> bool {
        self.contains(Self::CREAT)
    }

    /// Returns true if an existing file should be emptied.
    pub fn truncates(&self) -> bool {
        self.contains(Self::TRUNC)
    }

    /// Returns true if writes start at end of file.
    pub fn appends(&self) -> bool {
        self.contains(Self::APPEND)
    }

    /// Parse an `fopen`-style mode string.
    ///
    /// | mode | flags                      |
    /// |------|----------------------------|
    /// | `r`  | `RDONLY`                   |
    /// | `r+` | `RDWR`                     |
    /// | `w`  | `WRONLY \| CREAT \| TRUNC`  |
    /// | `w+` | `RDWR \| CREAT \| TRUNC`    |
    /// | `a`  | `WRONLY \| CREAT \| APPEND` |
    /// | `a+` | `RDWR \| CREAT \| APPEND`   |
    ///
    /// A `b` anywhere after the first character is accepted and ignored.
    pub fn from_mode_str(mode: &str) -> VfsResult<Self> {
        let mut chars = mode.chars();
        let base = chars
            .next()
            .ok_or_else(|| VfsError::invalid_argument("empty open mode"))?;

        let mut plus = false;
        for c in chars {
            match c {
                '+' => plus = true,
                'b' => {}
                _ => {
                    return Err(VfsError::invalid_argument(format!(
                        "bad open mode '{mode}'"
                    )));
                }
            }
        }

        let access = if plus { Self::RDWR } else { Self::WRONLY };
        let flags = match base {
            'r' if plus => Self::RDWR,
            'r' => Self::RDONLY,
            'w' => access | Self::CREAT | Self::TRUNC,
            'a' => access | Self::CREAT | Self::APPEND,
            _ => {
                return Err(VfsError::invalid_argument(format!(
                    "bad open mode '{mode}'"
                )));
            }
        };
        Ok(flags)
    }
}

impl BitOr for OpenFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for OpenFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OpenFlags(0x{:04x})", self.0)
    }
}

/// Seek origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i32)]
pub enum Whence {
    /// From the start of the file.
    Set = 0,
    /// From the current position.
    Cur = 1,
    /// From the end of the file.
    End = 2,
}

impl TryFrom<i32> for Whence {
    type Error = VfsError;

    fn try_from(value: i32) -> VfsResult<Self> {
        match value {
            0 => Ok(Self::Set),
            1 => Ok(Self::Cur),
            2 => Ok(Self::End),
            other => Err(VfsError::invalid_argument(format!("bad whence {other}"))),
        }
    }
}
