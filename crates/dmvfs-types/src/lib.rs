//! # dmvfs-types
//!
//! Shared vocabulary for the dmvfs dispatch layer and its filesystem
//! backends:
//!
//! - [`VfsError`] / [`VfsResult`] - error enum with stable negative status codes
//! - [`OpenFlags`] / [`Whence`] - POSIX-like open flags and seek origins
//! - [`Stat`] / [`DirEntry`] - payloads returned by `stat` and `readdir`
//! - [`FileHandle`] / [`DirHandle`] - generation-checked handle ids
//! - [`Op`] - names of the backend capabilities, used in `Unsupported` errors
//!
//! The engine and the backend traits live in `dmvfs-core`.

mod error;
mod flags;
mod handle;
mod op;
mod stat;

pub use error::{BACKEND_CODE_BASE, ErrorClass, VfsError, VfsResult, OK};
pub use flags::{OpenFlags, Whence};
pub use handle::{BackendHandle, DirHandle, FileHandle, HandleId, OwnerId};
pub use op::Op;
pub use stat::{attr, DirEntry, Stat};
