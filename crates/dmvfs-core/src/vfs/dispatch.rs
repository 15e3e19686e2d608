//! Public dispatch surface.
//!
//! Every operation takes the state lock, fails with `NotInitialized` when
//! there is no state, resolves its path or handle to a mount, and forwards
//! to that mount's backend. Backend payloads come back unchanged.

use std::sync::{Arc, OnceLock};

use dmvfs_types::{
    BackendHandle, DirEntry, DirHandle, FileHandle, OpenFlags, OwnerId, Stat, VfsError, VfsResult,
    Whence,
};

use super::handles::{HandleKind, OpenEntry};
use super::lock::StateLock;
use super::mount::{MountId, MountInfo, MountPoint};
use super::ops::{FsContext, FsDriver};
use super::path::{self, copy_to_buffer, normalize_mount_path};
use super::registry::Registry;
use super::state::{VfsState, close_entry};
use crate::config::VfsConfig;

/// Largest mount or handle table `init` accepts. Slot indices are `u32`.
pub const MAX_TABLE_SLOTS: usize = u32::MAX as usize;

/// Virtual filesystem: mount table, handle table and working directory
/// behind one lock.
///
/// Create one with [`Vfs::new`] or use the process-wide [`Vfs::global`].
/// Nothing works until [`init`](Vfs::init) has been called.
pub struct Vfs {
    registry: Arc<Registry>,
    state: StateLock,
}

impl std::fmt::Debug for Vfs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vfs")
            .field("registry", &self.registry)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

impl Default for Vfs {
    fn default() -> Self {
        Self::new(Arc::new(Registry::with_builtin()))
    }
}

impl Vfs {
    /// Create an uninitialized VFS that resolves drivers through `registry`.
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            state: StateLock::new(),
        }
    }

    /// Process-wide instance with the built-in drivers.
    pub fn global() -> &'static Vfs {
        static GLOBAL: OnceLock<Vfs> = OnceLock::new();
        GLOBAL.get_or_init(Vfs::default)
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Allocate the mount and handle tables and reset the working
    /// directories to `/`.
    pub fn init(&self, max_mounts: usize, max_handles: usize) -> VfsResult<()> {
        if max_mounts == 0 {
            return Err(VfsError::invalid_argument("max_mounts must be at least 1"));
        }
        if max_mounts > MAX_TABLE_SLOTS || max_handles > MAX_TABLE_SLOTS {
            return Err(VfsError::invalid_argument(format!(
                "table sizes are limited to {MAX_TABLE_SLOTS} slots"
            )));
        }

        let mut guard = self.state.lock();
        if guard.is_some() {
            tracing::warn!("vfs init called twice");
            return Err(VfsError::AlreadyInitialized);
        }
        *guard = Some(VfsState::new(max_mounts, max_handles));
        tracing::info!(max_mounts, max_handles, "vfs initialized");
        Ok(())
    }

    /// Unmount everything and return to the uninitialized state.
    pub fn deinit(&self) -> VfsResult<()> {
        let mut guard = self.state.lock();
        let Some(mut state) = guard.take() else {
            return Err(VfsError::NotInitialized);
        };

        let mounts = state.mounts.len();
        let ids: Vec<MountId> = state.mounts.iter().map(|(id, _)| id).collect();
        for id in ids {
            self.unmount_slot(&mut state, id);
        }
        if !state.handles.is_empty() || !state.mounts.is_empty() {
            tracing::warn!(handles = state.handles.len(), "state left behind after unmounting");
        }
        tracing::info!(mounts, "vfs deinitialized");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.state.is_initialized()
    }

    /// Initialize with the config's table sizes and mount every entry.
    ///
    /// If any mount fails the VFS is deinitialized again and the error
    /// returned.
    pub fn init_from_config(&self, config: &VfsConfig) -> VfsResult<()> {
        self.init(config.max_mount_points, config.max_open_files)?;

        for spec in &config.mounts {
            if let Err(e) = self.mount(&spec.fs, &spec.path, spec.config.as_deref()) {
                tracing::error!(fs = %spec.fs, mount = %spec.path, error = %e, "config mount failed");
                if let Err(deinit_err) = self.deinit() {
                    tracing::warn!(error = %deinit_err, "rollback deinit failed");
                }
                return Err(e);
            }
        }
        Ok(())
    }

    pub fn max_mount_points(&self) -> VfsResult<usize> {
        self.state.with_initialized(|state| Ok(state.mounts.capacity()))
    }

    pub fn max_open_files(&self) -> VfsResult<usize> {
        self.state.with_initialized(|state| Ok(state.handles.capacity()))
    }

    // ========================================================================
    // Mounts
    // ========================================================================

    /// Mount driver `fs_name` at `mount_point`, handing `config` to its `init`.
    pub fn mount(&self, fs_name: &str, mount_point: &str, config: Option<&str>) -> VfsResult<()> {
        self.state.with_initialized(|state| {
            if fs_name.is_empty() {
                return Err(VfsError::invalid_argument("empty filesystem name"));
            }
            let prefix = normalize_mount_path(mount_point)?;
            if state.mounts.find_by_prefix(&prefix).is_some() {
                return Err(VfsError::AlreadyMounted(prefix));
            }
            let driver = self
                .registry
                .acquire(fs_name)
                .ok_or_else(|| VfsError::BackendNotFound(fs_name.to_string()))?;
            if let Err(e) = Self::attach(state, driver.as_ref(), &prefix, config) {
                self.registry.end_usage(fs_name);
                return Err(e);
            }

            tracing::info!(fs = %fs_name, mount = %prefix, "mounted filesystem");
            Ok(())
        })
    }

    /// Initialise a context from `driver` and place it in a free slot.
    fn attach(
        state: &mut VfsState,
        driver: &dyn FsDriver,
        prefix: &str,
        config: Option<&str>,
    ) -> VfsResult<()> {
        let fs_name = driver.name();
        let index = state.mounts.allocate_slot().ok_or(VfsError::NoFreeMounts)?;

        let mut context = driver.init(config).map_err(|e| match e {
            VfsError::BackendInit(_) => e,
            other => VfsError::BackendInit(other.to_string()),
        })?;
        if !context.is_valid() {
            if let Err(e) = context.deinit() {
                tracing::warn!(fs = %fs_name, error = %e, "deinit of invalid context failed");
            }
            return Err(VfsError::BackendInit(format!(
                "{fs_name} returned an invalid context"
            )));
        }

        state
            .mounts
            .insert(
                index,
                MountPoint {
                    prefix: prefix.to_string(),
                    fs_name: fs_name.to_string(),
                    context,
                },
            )
            .ok_or(VfsError::NoFreeMounts)?;
        Ok(())
    }

    /// Unmount the filesystem mounted exactly at `mount_point`.
    ///
    /// Handles still open on it are force-closed first.
    pub fn unmount(&self, mount_point: &str) -> VfsResult<()> {
        self.state.with_initialized(|state| {
            let prefix = normalize_mount_path(mount_point)?;
            let id = state
                .mounts
                .find_by_prefix(&prefix)
                .ok_or_else(|| VfsError::not_mounted(prefix))?;
            self.unmount_slot(state, id);
            Ok(())
        })
    }

    /// Close the mount's handles, deinit its backend and free its slot.
    ///
    /// Every step runs even if an earlier one failed.
    fn unmount_slot(&self, state: &mut VfsState, id: MountId) {
        let Some(prefix) = state.mounts.get(id).map(|m| m.prefix.clone()) else {
            return;
        };
        let open = state.handles.count_for_mount(id);
        if !state.close_all_for_mount(id) {
            tracing::warn!(mount = %prefix, open, "some handles failed to close during unmount");
        }

        let Some(mut mount) = state.mounts.remove(id) else {
            return;
        };
        if let Err(e) = mount.context.deinit() {
            tracing::warn!(mount = %mount.prefix, error = %e, "backend deinit failed");
        }
        self.registry.end_usage(&mount.fs_name);

        tracing::info!(mount = %mount.prefix, fs = %mount.fs_name, closed = open, "unmounted filesystem");
    }

    /// Active mounts in slot order.
    pub fn list_mounts(&self) -> VfsResult<Vec<MountInfo>> {
        self.state.with_initialized(|state| {
            Ok(state
                .mounts
                .iter()
                .map(|(id, mount)| MountInfo {
                    prefix: mount.prefix.clone(),
                    fs_name: mount.fs_name.clone(),
                    open_handles: state.handles.count_for_mount(id),
                })
                .collect())
        })
    }

    /// True when some mount owns `path`.
    pub fn is_mounted(&self, path: &str) -> VfsResult<bool> {
        self.state.with_initialized(|state| {
            let abs = state.absolute(path)?;
            Ok(state.mounts.find_owning(&abs).is_some())
        })
    }

    // ========================================================================
    // Files
    // ========================================================================

    /// Open a file. `attr` is passed through to the backend.
    pub fn open(&self, path: &str, flags: OpenFlags, attr: u32, owner: OwnerId) -> VfsResult<FileHandle> {
        self.state.with_initialized(|state| {
            let (abs, mount) = state.resolve(path)?;
            let backend = state.dispatch_at(mount, &abs, |ctx, rel| ctx.open(rel, flags, attr))?;

            let entry = OpenEntry {
                mount,
                backend,
                owner,
                kind: HandleKind::File,
            };
            match state.handles.allocate(entry) {
                Some(id) => {
                    tracing::debug!(path = %abs, handle = ?id, %owner, ?flags, "opened file");
                    Ok(FileHandle(id))
                }
                None => {
                    if let Err(e) = close_entry(&mut state.mounts, &entry) {
                        tracing::warn!(path = %abs, error = %e, "failed to release backend handle");
                    }
                    tracing::warn!(path = %abs, "handle table full");
                    Err(VfsError::NoFreeHandles)
                }
            }
        })
    }

    /// Open with an `fopen`-style mode string (`"r"`, `"w+"`, `"ab"`, ...).
    pub fn open_mode(&self, path: &str, mode: &str, owner: OwnerId) -> VfsResult<FileHandle> {
        let flags = OpenFlags::from_mode_str(mode)?;
        self.open(path, flags, 0, owner)
    }

    /// Close a file. The handle is invalid afterwards even if the backend
    /// reports an error.
    pub fn close(&self, fh: FileHandle) -> VfsResult<()> {
        self.state.with_initialized(|state| {
            state.entry(fh.0, HandleKind::File)?;
            let entry = state.handles.free(fh.0).ok_or(VfsError::InvalidHandle)?;
            tracing::debug!(handle = ?fh.0, "closing file");
            close_entry(&mut state.mounts, &entry)
        })
    }

    /// Close every file and directory stream owned by `owner`.
    pub fn close_process(&self, owner: OwnerId) -> VfsResult<()> {
        self.state.with_initialized(|state| {
            let before = state.handles.len();
            let all_ok = state.close_all_for_owner(owner);
            let closed = before - state.handles.len();
            tracing::info!(%owner, closed, "closed process handles");
            if all_ok {
                Ok(())
            } else {
                Err(VfsError::other(format!(
                    "some handles of owner {owner} failed to close"
                )))
            }
        })
    }

    /// Read into `buf`. Returns the byte count; 0 at end of file.
    pub fn read(&self, fh: FileHandle, buf: &mut [u8]) -> VfsResult<usize> {
        if buf.is_empty() {
            return self.file_op(fh, |_, _| Err(VfsError::invalid_argument("zero-sized read")));
        }
        self.file_op(fh, |ctx, bh| ctx.read(bh, buf))
    }

    pub fn write(&self, fh: FileHandle, data: &[u8]) -> VfsResult<usize> {
        if data.is_empty() {
            return self.file_op(fh, |_, _| Err(VfsError::invalid_argument("zero-sized write")));
        }
        self.file_op(fh, |ctx, bh| ctx.write(bh, data))
    }

    /// Move the file position. Returns the new offset.
    pub fn seek(&self, fh: FileHandle, offset: i64, whence: Whence) -> VfsResult<u64> {
        self.file_op(fh, |ctx, bh| ctx.seek(bh, offset, whence))
    }

    pub fn tell(&self, fh: FileHandle) -> VfsResult<u64> {
        self.file_op(fh, |ctx, bh| ctx.tell(bh))
    }

    pub fn eof(&self, fh: FileHandle) -> VfsResult<bool> {
        self.file_op(fh, |ctx, bh| ctx.eof(bh))
    }

    /// Current size of the open file.
    pub fn size(&self, fh: FileHandle) -> VfsResult<u64> {
        self.file_op(fh, |ctx, bh| ctx.size(bh))
    }

    pub fn flush(&self, fh: FileHandle) -> VfsResult<()> {
        self.file_op(fh, |ctx, bh| ctx.flush(bh))
    }

    /// Backend error indicator for the handle.
    pub fn error(&self, fh: FileHandle) -> VfsResult<i32> {
        self.file_op(fh, |ctx, bh| ctx.error(bh))
    }

    /// Next byte, `None` at end of file.
    pub fn getc(&self, fh: FileHandle) -> VfsResult<Option<u8>> {
        self.file_op(fh, |ctx, bh| ctx.getc(bh))
    }

    pub fn putc(&self, fh: FileHandle, byte: u8) -> VfsResult<u8> {
        self.file_op(fh, |ctx, bh| ctx.putc(bh, byte))
    }

    /// Backend-defined control call. `arg` is passed through in both directions.
    pub fn ioctl(&self, fh: FileHandle, cmd: u32, arg: &mut [u8]) -> VfsResult<i32> {
        self.file_op(fh, |ctx, bh| ctx.ioctl(bh, cmd, arg))
    }

    pub fn sync(&self, fh: FileHandle) -> VfsResult<()> {
        self.file_op(fh, |ctx, bh| ctx.sync(bh))
    }

    fn file_op<T, F>(&self, fh: FileHandle, f: F) -> VfsResult<T>
    where
        F: FnOnce(&mut dyn FsContext, BackendHandle) -> VfsResult<T>,
    {
        self.state
            .with_initialized(|state| state.dispatch_handle(fh.0, HandleKind::File, f))
    }

    // ========================================================================
    // Paths
    // ========================================================================

    pub fn stat(&self, path: &str) -> VfsResult<Stat> {
        self.state
            .with_initialized(|state| state.dispatch_path(path, |ctx, rel| ctx.stat(rel)))
    }

    /// Remove a file.
    pub fn unlink(&self, path: &str) -> VfsResult<()> {
        self.state.with_initialized(|state| {
            state.dispatch_path(path, |ctx, rel| ctx.unlink(rel))?;
            tracing::debug!(path, "unlinked");
            Ok(())
        })
    }

    /// Same as [`unlink`](Vfs::unlink).
    pub fn remove(&self, path: &str) -> VfsResult<()> {
        self.unlink(path)
    }

    /// Rename within one mount. Paths on different mounts fail with
    /// [`VfsError::CrossDevice`].
    pub fn rename(&self, from: &str, to: &str) -> VfsResult<()> {
        self.state.with_initialized(|state| {
            let (from_abs, from_mount) = state.resolve(from)?;
            let (to_abs, to_mount) = state.resolve(to)?;
            if from_mount != to_mount {
                return Err(VfsError::CrossDevice);
            }

            let mount = state
                .mounts
                .get_mut(from_mount)
                .ok_or_else(|| VfsError::not_mounted(from_abs.as_str()))?;
            let from_rel = path::relative_to_mount(&from_abs, &mount.prefix);
            let to_rel = path::relative_to_mount(&to_abs, &mount.prefix);
            mount.context.rename(from_rel, to_rel)?;
            tracing::debug!(from = %from_abs, to = %to_abs, "renamed");
            Ok(())
        })
    }

    pub fn chmod(&self, path: &str, mode: u32) -> VfsResult<()> {
        self.state
            .with_initialized(|state| state.dispatch_path(path, |ctx, rel| ctx.chmod(rel, mode)))
    }

    pub fn utime(&self, path: &str, atime: u32, mtime: u32) -> VfsResult<()> {
        self.state.with_initialized(|state| {
            state.dispatch_path(path, |ctx, rel| ctx.utime(rel, atime, mtime))
        })
    }

    pub fn mkdir(&self, path: &str, mode: u32) -> VfsResult<()> {
        self.state
            .with_initialized(|state| state.dispatch_path(path, |ctx, rel| ctx.mkdir(rel, mode)))
    }

    /// Remove an empty directory.
    pub fn rmdir(&self, path: &str) -> VfsResult<()> {
        self.state
            .with_initialized(|state| state.dispatch_path(path, |ctx, rel| ctx.rmdir(rel)))
    }

    pub fn direxists(&self, path: &str) -> VfsResult<bool> {
        self.state
            .with_initialized(|state| state.dispatch_path(path, |ctx, rel| ctx.direxists(rel)))
    }

    // ========================================================================
    // Directories
    // ========================================================================

    /// Change the working directory. On failure the old one is kept.
    pub fn chdir(&self, path: &str) -> VfsResult<()> {
        self.state.with_initialized(|state| {
            let (abs, mount) = state.resolve(path)?;
            let exists = state.dispatch_at(mount, &abs, |ctx, rel| match ctx.direxists(rel) {
                Err(VfsError::Unsupported(_)) => match ctx.stat(rel) {
                    Ok(stat) => Ok(stat.is_dir()),
                    Err(VfsError::NotFound(_)) => Ok(false),
                    Err(e) => Err(e),
                },
                other => other,
            })?;
            if !exists {
                return Err(VfsError::not_found(abs));
            }

            tracing::info!(cwd = %abs, "working directory changed");
            state.cwd = abs;
            Ok(())
        })
    }

    pub fn opendir(&self, path: &str, owner: OwnerId) -> VfsResult<DirHandle> {
        self.state.with_initialized(|state| {
            let (abs, mount) = state.resolve(path)?;
            let backend = state.dispatch_at(mount, &abs, |ctx, rel| ctx.opendir(rel))?;

            let entry = OpenEntry {
                mount,
                backend,
                owner,
                kind: HandleKind::Dir,
            };
            match state.handles.allocate(entry) {
                Some(id) => {
                    tracing::debug!(path = %abs, handle = ?id, %owner, "opened directory");
                    Ok(DirHandle(id))
                }
                None => {
                    if let Err(e) = close_entry(&mut state.mounts, &entry) {
                        tracing::warn!(path = %abs, error = %e, "failed to release backend dir handle");
                    }
                    Err(VfsError::NoFreeHandles)
                }
            }
        })
    }

    /// Next entry of the stream, `None` when exhausted.
    pub fn readdir(&self, dh: DirHandle) -> VfsResult<Option<DirEntry>> {
        self.state.with_initialized(|state| {
            state.dispatch_handle(dh.0, HandleKind::Dir, |ctx, bh| ctx.readdir(bh))
        })
    }

    /// Close a directory stream. The handle is invalid afterwards.
    pub fn closedir(&self, dh: DirHandle) -> VfsResult<()> {
        self.state.with_initialized(|state| {
            state.entry(dh.0, HandleKind::Dir)?;
            let entry = state.handles.free(dh.0).ok_or(VfsError::InvalidHandle)?;
            close_entry(&mut state.mounts, &entry)
        })
    }

    // ========================================================================
    // Working directory and absolute paths
    // ========================================================================

    /// Current working directory.
    pub fn cwd(&self) -> VfsResult<String> {
        self.state.with_initialized(|state| Ok(state.cwd.clone()))
    }

    /// Process working directory.
    pub fn pwd(&self) -> VfsResult<String> {
        self.state.with_initialized(|state| Ok(state.pwd.clone()))
    }

    /// Copy the working directory and a NUL into `buf`. Returns its length.
    pub fn getcwd(&self, buf: &mut [u8]) -> VfsResult<usize> {
        self.state
            .with_initialized(|state| copy_to_buffer(&state.cwd, buf))
    }

    /// Copy the process working directory and a NUL into `buf`.
    pub fn getpwd(&self, buf: &mut [u8]) -> VfsResult<usize> {
        self.state
            .with_initialized(|state| copy_to_buffer(&state.pwd, buf))
    }

    /// Absolute form of `path`.
    ///
    /// Works before `init` when `path` is already absolute; relative
    /// paths need the working directory.
    pub fn to_absolute(&self, path: &str) -> VfsResult<String> {
        if path.starts_with('/') {
            return path::to_absolute(path, "/");
        }
        self.state.with_initialized(|state| state.absolute(path))
    }

    /// [`to_absolute`](Vfs::to_absolute) into a caller buffer, NUL-terminated.
    pub fn toabs(&self, path: &str, buf: &mut [u8]) -> VfsResult<usize> {
        let abs = self.to_absolute(path)?;
        copy_to_buffer(&abs, buf)
    }
}
