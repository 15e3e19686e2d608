//! Backend traits.
//!
//! A filesystem backend is split in two:
//!
//! - [`FsDriver`] is what the [`Registry`](super::Registry) holds. It has a
//!   name and knows how to build a mounted instance from a config string.
//! - [`FsContext`] is one mounted instance. It is owned by exactly one mount
//!   point and receives every operation routed to that mount.
//!
//! Paths handed to a context are relative to its mount root and may be empty
//! (the mount root itself) or start with `/`.

use dmvfs_types::{BackendHandle, DirEntry, OpenFlags, Op, Stat, VfsError, VfsResult, Whence};

/// Registered filesystem module.
pub trait FsDriver: Send + Sync {
    /// Name used by `mount` to select this driver.
    fn name(&self) -> &str;

    /// Build a new mounted instance from the mount's config string.
    fn init(&self, config: Option<&str>) -> VfsResult<Box<dyn FsContext>>;
}

/// Mounted filesystem instance.
///
/// Everything except [`open`](FsContext::open) and
/// [`close`](FsContext::close) is optional; the default implementations
/// report [`VfsError::Unsupported`] naming the missing capability.
///
/// Implementations must not call back into the [`Vfs`](super::Vfs) that
/// mounted them. The dispatch lock is held for the whole call.
#[allow(unused_variables)]
pub trait FsContext: Send {
    /// False when the context is unusable; mounting then fails.
    fn is_valid(&self) -> bool {
        true
    }

    /// Release backend resources. Called once, by `unmount`.
    fn deinit(&mut self) -> VfsResult<()> {
        Ok(())
    }

    // ========================================================================
    // Files
    // ========================================================================

    fn open(&mut self, path: &str, flags: OpenFlags, attr: u32) -> VfsResult<BackendHandle>;

    fn close(&mut self, handle: BackendHandle) -> VfsResult<()>;

    /// Read into `buf`, returning the number of bytes read. Zero at end of file.
    fn read(&mut self, handle: BackendHandle, buf: &mut [u8]) -> VfsResult<usize> {
        Err(VfsError::Unsupported(Op::Read))
    }

    /// Write `data`, returning the number of bytes written.
    fn write(&mut self, handle: BackendHandle, data: &[u8]) -> VfsResult<usize> {
        Err(VfsError::Unsupported(Op::Write))
    }

    /// Move the file position and return the new absolute offset.
    fn seek(&mut self, handle: BackendHandle, offset: i64, whence: Whence) -> VfsResult<u64> {
        Err(VfsError::Unsupported(Op::Seek))
    }

    fn tell(&self, handle: BackendHandle) -> VfsResult<u64> {
        Err(VfsError::Unsupported(Op::Tell))
    }

    fn eof(&self, handle: BackendHandle) -> VfsResult<bool> {
        Err(VfsError::Unsupported(Op::Eof))
    }

    fn size(&self, handle: BackendHandle) -> VfsResult<u64> {
        Err(VfsError::Unsupported(Op::Size))
    }

    fn flush(&mut self, handle: BackendHandle) -> VfsResult<()> {
        Err(VfsError::Unsupported(Op::Flush))
    }

    /// Backend-specific error indicator of the handle, 0 when clear.
    fn error(&self, handle: BackendHandle) -> VfsResult<i32> {
        Err(VfsError::Unsupported(Op::Error))
    }

    /// Next byte, or `None` at end of file.
    fn getc(&mut self, handle: BackendHandle) -> VfsResult<Option<u8>> {
        Err(VfsError::Unsupported(Op::Getc))
    }

    /// Write one byte and return it.
    fn putc(&mut self, handle: BackendHandle, byte: u8) -> VfsResult<u8> {
        Err(VfsError::Unsupported(Op::Putc))
    }

    fn ioctl(&mut self, handle: BackendHandle, cmd: u32, arg: &mut [u8]) -> VfsResult<i32> {
        Err(VfsError::Unsupported(Op::Ioctl))
    }

    fn sync(&mut self, handle: BackendHandle) -> VfsResult<()> {
        Err(VfsError::Unsupported(Op::Sync))
    }

    // ========================================================================
    // Paths
    // ========================================================================

    fn stat(&self, path: &str) -> VfsResult<Stat> {
        Err(VfsError::Unsupported(Op::Stat))
    }

    /// Remove a file.
    fn unlink(&mut self, path: &str) -> VfsResult<()> {
        Err(VfsError::Unsupported(Op::Unlink))
    }

    /// Rename within this filesystem. Fails if `to` exists.
    fn rename(&mut self, from: &str, to: &str) -> VfsResult<()> {
        Err(VfsError::Unsupported(Op::Rename))
    }

    fn chmod(&mut self, path: &str, mode: u32) -> VfsResult<()> {
        Err(VfsError::Unsupported(Op::Chmod))
    }

    fn utime(&mut self, path: &str, atime: u32, mtime: u32) -> VfsResult<()> {
        Err(VfsError::Unsupported(Op::Utime))
    }

    fn mkdir(&mut self, path: &str, mode: u32) -> VfsResult<()> {
        Err(VfsError::Unsupported(Op::Mkdir))
    }

    /// Remove an empty directory.
    fn rmdir(&mut self, path: &str) -> VfsResult<()> {
        Err(VfsError::Unsupported(Op::Rmdir))
    }

    fn direxists(&self, path: &str) -> VfsResult<bool> {
        Err(VfsError::Unsupported(Op::DirExists))
    }

    // ========================================================================
    // Directory streams
    // ========================================================================

    fn opendir(&mut self, path: &str) -> VfsResult<BackendHandle> {
        Err(VfsError::Unsupported(Op::OpenDir))
    }

    /// Next entry, or `None` once the stream is exhausted.
    fn readdir(&mut self, handle: BackendHandle) -> VfsResult<Option<DirEntry>> {
        Err(VfsError::Unsupported(Op::ReadDir))
    }

    fn closedir(&mut self, handle: BackendHandle) -> VfsResult<()> {
        Err(VfsError::Unsupported(Op::CloseDir))
    }
}
