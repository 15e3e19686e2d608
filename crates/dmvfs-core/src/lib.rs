//! # dmvfs-core
//!
//! Virtual filesystem dispatch layer. Filesystem backends are mounted at
//! path prefixes and every file or directory operation is routed to the
//! backend owning the path, so callers see one namespace.
//!
//! ```
//! use dmvfs_core::{OpenFlags, OwnerId, Vfs};
//!
//! let vfs = Vfs::default();
//! vfs.init(4, 8).unwrap();
//! vfs.mount("ramfs", "/mnt", None).unwrap();
//!
//! let fh = vfs.open("/mnt/hello.txt", OpenFlags::create(), 0, OwnerId(1)).unwrap();
//! vfs.write(fh, b"hello").unwrap();
//! vfs.close(fh).unwrap();
//!
//! assert_eq!(vfs.stat("/mnt/hello.txt").unwrap().size, 5);
//! vfs.deinit().unwrap();
//! ```

pub mod config;
pub mod vfs;

pub use config::{ConfigError, MountSpec, VfsConfig};
pub use vfs::{
    FsContext, FsDriver, MAX_TABLE_SLOTS, MountInfo, RamFs, Registry, TestFs, TestFsDriver, TestProbe,
    Vfs,
};

pub use dmvfs_types::{
    BACKEND_CODE_BASE, BackendHandle, DirEntry, DirHandle, ErrorClass, FileHandle, HandleId, OK, Op, OpenFlags,
    OwnerId, Stat, VfsError, VfsResult, Whence, attr,
};
