//! VFS backends.
//!
//! In-tree [`FsDriver`](super::FsDriver) implementations. Both are
//! registered by [`Registry::with_builtin`](super::Registry::with_builtin).

mod ramfs;
mod testfs;

pub use ramfs::{DEFAULT_MAX_FILES, MAX_FILE_SIZE, RamFs, RamFsDriver};
pub use testfs::{Call, IOCTL_ECHO_LEN, TestFs, TestFsDriver, TestProbe};
