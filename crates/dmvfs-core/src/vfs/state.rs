//! Initialized VFS state: both tables plus the working directories.

use dmvfs_types::{BackendHandle, HandleId, OwnerId, VfsError, VfsResult};

use super::handles::{HandleKind, HandleTable, OpenEntry};
use super::mount::{MountId, MountTable};
use super::ops::FsContext;
use super::path::{relative_to_mount, to_absolute};

#[derive(Debug)]
pub(crate) struct VfsState {
    pub mounts: MountTable,
    pub handles: HandleTable,
    pub cwd: String,
    pub pwd: String,
}

impl VfsState {
    pub fn new(max_mounts: usize, max_handles: usize) -> Self {
        Self {
            mounts: MountTable::with_capacity(max_mounts),
            handles: HandleTable::with_capacity(max_handles),
            cwd: "/".to_string(),
            pwd: "/".to_string(),
        }
    }

    /// Absolute form of `path` against the current working directory.
    pub fn absolute(&self, path: &str) -> VfsResult<String> {
        to_absolute(path, &self.cwd)
    }

    /// Absolute path and the mount that owns it.
    pub fn resolve(&self, path: &str) -> VfsResult<(String, MountId)> {
        let abs = self.absolute(path)?;
        match self.mounts.find_owning(&abs) {
            Some(id) => Ok((abs, id)),
            None => Err(VfsError::not_mounted(abs)),
        }
    }

    /// Route a path operation to the owning mount's backend.
    ///
    /// `f` receives the backend context and the mount-relative path.
    pub fn dispatch_path<T, F>(&mut self, path: &str, f: F) -> VfsResult<T>
    where
        F: FnOnce(&mut dyn FsContext, &str) -> VfsResult<T>,
    {
        let (abs, id) = self.resolve(path)?;
        self.dispatch_at(id, &abs, f)
    }

    /// Like [`dispatch_path`](Self::dispatch_path) for an already resolved path.
    pub fn dispatch_at<T, F>(&mut self, id: MountId, abs: &str, f: F) -> VfsResult<T>
    where
        F: FnOnce(&mut dyn FsContext, &str) -> VfsResult<T>,
    {
        let mount = self
            .mounts
            .get_mut(id)
            .ok_or_else(|| VfsError::not_mounted(abs))?;
        let rel = relative_to_mount(abs, &mount.prefix);
        tracing::trace!(path = %abs, mount = %mount.prefix, rel, "dispatch");
        f(mount.context.as_mut(), rel)
    }

    /// Live entry for a handle of the given kind.
    pub fn entry(&self, id: HandleId, kind: HandleKind) -> VfsResult<OpenEntry> {
        self.handles
            .get(id, kind)
            .copied()
            .ok_or(VfsError::InvalidHandle)
    }

    /// Route a handle operation to the mount that issued the handle.
    pub fn dispatch_handle<T, F>(&mut self, id: HandleId, kind: HandleKind, f: F) -> VfsResult<T>
    where
        F: FnOnce(&mut dyn FsContext, BackendHandle) -> VfsResult<T>,
    {
        let entry = self.entry(id, kind)?;
        let mount = self
            .mounts
            .get_mut(entry.mount)
            .ok_or(VfsError::InvalidHandle)?;
        f(mount.context.as_mut(), entry.backend)
    }

    /// Force-close every handle bound to `mount`.
    pub fn close_all_for_mount(&mut self, mount: MountId) -> bool {
        self.sweep(|e| e.mount == mount)
    }

    /// Close every handle owned by `owner`.
    pub fn close_all_for_owner(&mut self, owner: OwnerId) -> bool {
        self.sweep(|e| e.owner == owner)
    }

    fn sweep(&mut self, matches: impl Fn(&OpenEntry) -> bool) -> bool {
        let Self {
            mounts, handles, ..
        } = self;
        handles.sweep(matches, |entry| close_entry(mounts, entry))
    }
}

/// Close the backend side of a handle entry.
pub(crate) fn close_entry(mounts: &mut MountTable, entry: &OpenEntry) -> VfsResult<()> {
    let mount = mounts.get_mut(entry.mount).ok_or(VfsError::InvalidHandle)?;
    match entry.kind {
        HandleKind::File => mount.context.close(entry.backend),
        HandleKind::Dir => mount.context.closedir(entry.backend),
    }
}
