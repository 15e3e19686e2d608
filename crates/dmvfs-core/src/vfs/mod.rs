//! Virtual filesystem dispatch.
//!
//! Key components:
//!
//! - [`FsDriver`] / [`FsContext`] - Backend traits, one method per operation
//! - [`Registry`] - Named drivers with mount usage counts
//! - [`Vfs`] - Mount table, handle table and working directory behind one lock
//! - [`RamFs`] - In-memory filesystem
//! - [`TestFs`] - RamFs that records every call, for tests
//!
//! ## Design Decisions
//!
//! - **Longest-prefix routing**: a path goes to the most specific mount
//!   whose prefix ends at a `/` boundary of the path.
//! - **Generation-tagged handles**: closing a handle or unmounting its
//!   filesystem bumps the slot generation, so stale handles fail with
//!   `InvalidHandle` instead of reaching a different file.
//! - **One lock**: every operation, backend call included, runs under a
//!   single mutex.

pub mod backends;
mod dispatch;
mod handles;
mod lock;
mod mount;
mod ops;
pub mod path;
mod registry;
mod state;

pub use backends::{RamFs, RamFsDriver, TestFs, TestFsDriver, TestProbe};
pub use dispatch::{MAX_TABLE_SLOTS, Vfs};
pub use mount::MountInfo;
pub use ops::{FsContext, FsDriver};
pub use registry::Registry;
