//! Call-recording filesystem backend.
//!
//! Stores data in a [`RamFs`] and records every call in a shared
//! [`TestProbe`], so callers can check which backend a request reached,
//! with which relative path, and how many times. Faults can be switched on
//! through the mount config string:
//!
//! | option        | effect                                   |
//! |---------------|------------------------------------------|
//! | `fail_init`   | `init` fails                             |
//! | `invalid`     | the context reports itself invalid       |
//! | `fail_close`  | `close`/`closedir` release, then fail    |
//! | `fail_deinit` | `deinit` fails                           |
//!
//! Any other option is handed to the inner [`RamFs`].

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dmvfs_types::{
    BackendHandle, DirEntry, OpenFlags, Op, Stat, VfsError, VfsResult, Whence,
};

use super::ramfs::RamFs;
use crate::vfs::ops::{FsContext, FsDriver};

/// `ioctl` command answered by every test context: returns the argument length.
pub const IOCTL_ECHO_LEN: u32 = 0x5446_0001;

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub op: Op,
    /// Mount-relative path for path operations, empty otherwise.
    pub path: String,
}

/// Shared record of what the contexts of one driver were asked to do.
#[derive(Debug, Default)]
pub struct TestProbe {
    calls: Mutex<Vec<Call>>,
    open_files: AtomicUsize,
    live_contexts: AtomicUsize,
}

impl TestProbe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn record(&self, op: Op, path: &str) {
        self.calls.lock().push(Call {
            op,
            path: path.to_string(),
        });
    }

    /// All calls so far, oldest first.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// How many times `op` was called.
    pub fn count(&self, op: Op) -> usize {
        self.calls.lock().iter().filter(|c| c.op == op).count()
    }

    /// Relative paths passed to `op`, in call order.
    pub fn paths(&self, op: Op) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.op == op)
            .map(|c| c.path.clone())
            .collect()
    }

    /// Files currently open on the backend side.
    pub fn open_files(&self) -> usize {
        self.open_files.load(Ordering::SeqCst)
    }

    /// Contexts initialized and not yet deinitialized.
    pub fn live_contexts(&self) -> usize {
        self.live_contexts.load(Ordering::SeqCst)
    }

    /// Forget recorded calls. Counters are kept.
    pub fn clear(&self) {
        self.calls.lock().clear();
    }
}

/// Driver for [`TestFs`].
#[derive(Debug)]
pub struct TestFsDriver {
    name: String,
    probe: Arc<TestProbe>,
}

impl Default for TestFsDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl TestFsDriver {
    /// Driver registered as `testfs` with its own probe.
    pub fn new() -> Self {
        Self::named("testfs", TestProbe::new())
    }

    /// Driver under a custom name, reporting to `probe`.
    pub fn named(name: impl Into<String>, probe: Arc<TestProbe>) -> Self {
        Self {
            name: name.into(),
            probe,
        }
    }

    pub fn probe(&self) -> &Arc<TestProbe> {
        &self.probe
    }
}

impl FsDriver for TestFsDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&self, config: Option<&str>) -> VfsResult<Box<dyn FsContext>> {
        self.probe.record(Op::Init, "");

        let mut faults = Faults::default();
        let mut passthrough = Vec::new();
        for item in config
            .unwrap_or("")
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
        {
            match item {
                "fail_init" => faults.init = true,
                "invalid" => faults.invalid = true,
                "fail_close" => faults.close = true,
                "fail_deinit" => faults.deinit = true,
                other => passthrough.push(other),
            }
        }
        if faults.init {
            return Err(VfsError::BackendInit(format!("{}: fail_init set", self.name)));
        }

        let inner = RamFs::from_config(Some(&passthrough.join(",")))?;
        self.probe.live_contexts.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(TestFs {
            inner,
            probe: Arc::clone(&self.probe),
            faults,
        }))
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Faults {
    init: bool,
    invalid: bool,
    close: bool,
    deinit: bool,
}

/// Mounted test filesystem.
#[derive(Debug)]
pub struct TestFs {
    inner: RamFs,
    probe: Arc<TestProbe>,
    faults: Faults,
}

impl FsContext for TestFs {
    fn is_valid(&self) -> bool {
        self.probe.record(Op::IsContextValid, "");
        !self.faults.invalid
    }

    fn deinit(&mut self) -> VfsResult<()> {
        self.probe.record(Op::Deinit, "");
        self.probe.live_contexts.fetch_sub(1, Ordering::SeqCst);
        self.inner.deinit()?;
        if self.faults.deinit {
            return Err(VfsError::BackendDeinit("fail_deinit set".to_string()));
        }
        Ok(())
    }

    fn open(&mut self, path: &str, flags: OpenFlags, attr: u32) -> VfsResult<BackendHandle> {
        self.probe.record(Op::Open, path);
        let handle = self.inner.open(path, flags, attr)?;
        self.probe.open_files.fetch_add(1, Ordering::SeqCst);
        Ok(handle)
    }

    fn close(&mut self, handle: BackendHandle) -> VfsResult<()> {
        self.probe.record(Op::Close, "");
        self.inner.close(handle)?;
        self.probe.open_files.fetch_sub(1, Ordering::SeqCst);
        if self.faults.close {
            return Err(VfsError::Backend(-100));
        }
        Ok(())
    }

    fn read(&mut self, handle: BackendHandle, buf: &mut [u8]) -> VfsResult<usize> {
        self.probe.record(Op::Read, "");
        self.inner.read(handle, buf)
    }

    fn write(&mut self, handle: BackendHandle, data: &[u8]) -> VfsResult<usize> {
        self.probe.record(Op::Write, "");
        self.inner.write(handle, data)
    }

    fn seek(&mut self, handle: BackendHandle, offset: i64, whence: Whence) -> VfsResult<u64> {
        self.probe.record(Op::Seek, "");
        self.inner.seek(handle, offset, whence)
    }

    fn tell(&self, handle: BackendHandle) -> VfsResult<u64> {
        self.probe.record(Op::Tell, "");
        self.inner.tell(handle)
    }

    fn eof(&self, handle: BackendHandle) -> VfsResult<bool> {
        self.probe.record(Op::Eof, "");
        self.inner.eof(handle)
    }

    fn size(&self, handle: BackendHandle) -> VfsResult<u64> {
        self.probe.record(Op::Size, "");
        self.inner.size(handle)
    }

    fn flush(&mut self, handle: BackendHandle) -> VfsResult<()> {
        self.probe.record(Op::Flush, "");
        self.inner.flush(handle)
    }

    fn error(&self, handle: BackendHandle) -> VfsResult<i32> {
        self.probe.record(Op::Error, "");
        self.inner.error(handle)
    }

    fn getc(&mut self, handle: BackendHandle) -> VfsResult<Option<u8>> {
        self.probe.record(Op::Getc, "");
        self.inner.getc(handle)
    }

    fn putc(&mut self, handle: BackendHandle, byte: u8) -> VfsResult<u8> {
        self.probe.record(Op::Putc, "");
        self.inner.putc(handle, byte)
    }

    fn ioctl(&mut self, handle: BackendHandle, cmd: u32, arg: &mut [u8]) -> VfsResult<i32> {
        self.probe.record(Op::Ioctl, "");
        self.inner.tell(handle)?;
        match cmd {
            IOCTL_ECHO_LEN => Ok(arg.len() as i32),
            other => Err(VfsError::invalid_argument(format!("unknown ioctl 0x{other:08x}"))),
        }
    }

    fn sync(&mut self, handle: BackendHandle) -> VfsResult<()> {
        self.probe.record(Op::Sync, "");
        self.inner.sync(handle)
    }

    fn stat(&self, path: &str) -> VfsResult<Stat> {
        self.probe.record(Op::Stat, path);
        self.inner.stat(path)
    }

    fn unlink(&mut self, path: &str) -> VfsResult<()> {
        self.probe.record(Op::Unlink, path);
        self.inner.unlink(path)
    }

    fn rename(&mut self, from: &str, to: &str) -> VfsResult<()> {
        self.probe.record(Op::Rename, from);
        self.inner.rename(from, to)
    }

    fn chmod(&mut self, path: &str, mode: u32) -> VfsResult<()> {
        self.probe.record(Op::Chmod, path);
        self.inner.chmod(path, mode)
    }

    fn utime(&mut self, path: &str, atime: u32, mtime: u32) -> VfsResult<()> {
        self.probe.record(Op::Utime, path);
        self.inner.utime(path, atime, mtime)
    }

    fn mkdir(&mut self, path: &str, mode: u32) -> VfsResult<()> {
        self.probe.record(Op::Mkdir, path);
        self.inner.mkdir(path, mode)
    }

    fn rmdir(&mut self, path: &str) -> VfsResult<()> {
        self.probe.record(Op::Rmdir, path);
        self.inner.rmdir(path)
    }

    fn direxists(&self, path: &str) -> VfsResult<bool> {
        self.probe.record(Op::DirExists, path);
        self.inner.direxists(path)
    }

    fn opendir(&mut self, path: &str) -> VfsResult<BackendHandle> {
        self.probe.record(Op::OpenDir, path);
        self.inner.opendir(path)
    }

    fn readdir(&mut self, handle: BackendHandle) -> VfsResult<Option<DirEntry>> {
        self.probe.record(Op::ReadDir, "");
        self.inner.readdir(handle)
    }

    fn closedir(&mut self, handle: BackendHandle) -> VfsResult<()> {
        self.probe.record(Op::CloseDir, "");
        self.inner.closedir(handle)?;
        if self.faults.close {
            return Err(VfsError::Backend(-100));
        }
        Ok(())
    }
}
