//! In-memory filesystem backend.
//!
//! Hierarchical, with per-handle file positions. All data is lost on
//! unmount. Config string: `max_files=N` bounds the number of files and
//! directories (root not counted).

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::{SystemTime, UNIX_EPOCH};

use dmvfs_types::{
    BackendHandle, DirEntry, OpenFlags, Stat, VfsError, VfsResult, Whence, attr,
};

use crate::vfs::ops::{FsContext, FsDriver};

/// Entry limit when the config does not set one.
pub const DEFAULT_MAX_FILES: usize = 256;

/// Largest size a single file may grow to.
pub const MAX_FILE_SIZE: u64 = 1 << 30;

/// Driver for [`RamFs`], registered as `ramfs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RamFsDriver;

impl FsDriver for RamFsDriver {
    fn name(&self) -> &str {
        "ramfs"
    }

    fn init(&self, config: Option<&str>) -> VfsResult<Box<dyn FsContext>> {
        Ok(Box::new(RamFs::from_config(config)?))
    }
}

#[derive(Debug)]
enum Node {
    File(Vec<u8>),
    Dir,
}

#[derive(Debug)]
struct Inode {
    node: Node,
    attr: u32,
    ctime: u32,
    mtime: u32,
    atime: u32,
    /// Still reachable by path.
    linked: bool,
    /// Open file handles on this inode.
    open_count: usize,
}

impl Inode {
    fn new(node: Node, mode: u32, attr: u32) -> Self {
        let now = now();
        Self {
            node,
            attr: apply_mode(attr, mode),
            ctime: now,
            mtime: now,
            atime: now,
            linked: true,
            open_count: 0,
        }
    }

    fn is_dir(&self) -> bool {
        matches!(self.node, Node::Dir)
    }

    fn len(&self) -> u64 {
        match &self.node {
            Node::File(data) => data.len() as u64,
            Node::Dir => 0,
        }
    }

    fn stat(&self) -> Stat {
        Stat {
            size: self.len(),
            attr: self.full_attr(),
            ctime: self.ctime,
            mtime: self.mtime,
            atime: self.atime,
        }
    }

    fn full_attr(&self) -> u32 {
        if self.is_dir() {
            self.attr | attr::DIRECTORY
        } else {
            self.attr
        }
    }
}

#[derive(Debug)]
struct OpenFile {
    ino: u64,
    position: u64,
    flags: OpenFlags,
}

/// In-memory filesystem instance.
#[derive(Debug)]
pub struct RamFs {
    /// Normalized path ("" is the root) to inode number.
    entries: BTreeMap<String, u64>,
    inodes: HashMap<u64, Inode>,
    files: HashMap<u64, OpenFile>,
    dirs: HashMap<u64, VecDeque<DirEntry>>,
    next_ino: u64,
    next_handle: u64,
    max_files: usize,
}

impl Default for RamFs {
    fn default() -> Self {
        Self::new()
    }
}

impl RamFs {
    /// Create an empty filesystem with the default entry limit.
    pub fn new() -> Self {
        Self::with_max_files(DEFAULT_MAX_FILES)
    }

    pub fn with_max_files(max_files: usize) -> Self {
        let mut fs = Self {
            entries: BTreeMap::new(),
            inodes: HashMap::new(),
            files: HashMap::new(),
            dirs: HashMap::new(),
            next_ino: 1,
            next_handle: 1,
            max_files,
        };
        // Root directory always exists
        fs.insert_inode(String::new(), Inode::new(Node::Dir, 0o755, 0));
        fs
    }

    /// Parse a `key=value` config string (comma or whitespace separated).
    pub fn from_config(config: Option<&str>) -> VfsResult<Self> {
        let mut max_files = DEFAULT_MAX_FILES;
        for item in config
            .unwrap_or("")
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
        {
            match item.split_once('=') {
                Some(("max_files", value)) => {
                    max_files = value.trim().parse().map_err(|_| {
                        VfsError::BackendInit(format!("ramfs: bad max_files '{value}'"))
                    })?;
                }
                _ => {
                    return Err(VfsError::BackendInit(format!(
                        "ramfs: unknown config option '{item}'"
                    )));
                }
            }
        }
        Ok(Self::with_max_files(max_files))
    }

    /// Number of files and directories, root excluded.
    pub fn entry_count(&self) -> usize {
        self.entries.len().saturating_sub(1)
    }

    /// Number of open file handles.
    pub fn open_file_count(&self) -> usize {
        self.files.len()
    }

    /// Normalize a backend path: drop leading `/`, resolve `.` and `..`.
    fn normalize(path: &str) -> String {
        let mut parts: Vec<&str> = Vec::new();
        for part in path.split('/') {
            match part {
                "" | "." => {}
                ".." => {
                    parts.pop();
                }
                other => parts.push(other),
            }
        }
        parts.join("/")
    }

    /// Parent key of a normalized non-root key.
    fn parent_of(key: &str) -> &str {
        key.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("")
    }

    /// Path string for error messages.
    fn path_str(key: &str) -> String {
        format!("/{key}")
    }

    fn insert_inode(&mut self, key: String, inode: Inode) -> u64 {
        let ino = self.next_ino;
        self.next_ino += 1;
        self.inodes.insert(ino, inode);
        self.entries.insert(key, ino);
        ino
    }

    fn next_handle(&mut self) -> BackendHandle {
        let handle = self.next_handle;
        self.next_handle += 1;
        BackendHandle(handle)
    }

    fn lookup(&self, key: &str) -> VfsResult<(u64, &Inode)> {
        self.entries
            .get(key)
            .and_then(|ino| self.inodes.get(ino).map(|inode| (*ino, inode)))
            .ok_or_else(|| VfsError::not_found(Self::path_str(key)))
    }

    fn lookup_mut(&mut self, key: &str) -> VfsResult<&mut Inode> {
        self.entries
            .get(key)
            .and_then(|ino| self.inodes.get_mut(ino))
            .ok_or_else(|| VfsError::not_found(Self::path_str(key)))
    }

    /// Check that a new entry may be created at `key`.
    fn check_create(&self, key: &str) -> VfsResult<()> {
        if self.entries.contains_key(key) {
            return Err(VfsError::already_exists(Self::path_str(key)));
        }
        let parent = Self::parent_of(key);
        match self.lookup(parent) {
            Ok((_, inode)) if inode.is_dir() => {}
            Ok(_) => return Err(VfsError::not_a_directory(Self::path_str(parent))),
            Err(e) => return Err(e),
        }
        if self.entry_count() >= self.max_files {
            return Err(VfsError::NoSpace);
        }
        Ok(())
    }

    /// Drop an inode once it is neither linked nor open.
    fn reap(&mut self, ino: u64) {
        if self
            .inodes
            .get(&ino)
            .is_some_and(|inode| !inode.linked && inode.open_count == 0)
        {
            self.inodes.remove(&ino);
        }
    }

    /// Direct children of a directory key, sorted by name.
    fn children(&self, key: &str) -> Vec<DirEntry> {
        let prefix = if key.is_empty() {
            String::new()
        } else {
            format!("{key}/")
        };
        self.entries
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .filter(|(k, _)| !k.is_empty() && !k[prefix.len()..].contains('/'))
            .filter_map(|(k, ino)| {
                let inode = self.inodes.get(ino)?;
                Some(DirEntry {
                    name: k[prefix.len()..].to_string(),
                    size: inode.len(),
                    attr: inode.full_attr(),
                    time: inode.mtime,
                })
            })
            .collect()
    }

    fn open_file(&self, handle: BackendHandle) -> VfsResult<&OpenFile> {
        self.files.get(&handle.0).ok_or(VfsError::InvalidHandle)
    }

    /// Open file plus its data.
    fn file_mut(&mut self, handle: BackendHandle) -> VfsResult<(&mut OpenFile, &mut Inode)> {
        let file = self.files.get_mut(&handle.0).ok_or(VfsError::InvalidHandle)?;
        let inode = self.inodes.get_mut(&file.ino).ok_or(VfsError::InvalidHandle)?;
        Ok((file, inode))
    }
}

impl FsContext for RamFs {
    fn deinit(&mut self) -> VfsResult<()> {
        self.files.clear();
        self.dirs.clear();
        self.inodes.clear();
        self.entries.clear();
        Ok(())
    }

    // ========================================================================
    // Files
    // ========================================================================

    fn open(&mut self, path: &str, flags: OpenFlags, attr: u32) -> VfsResult<BackendHandle> {
        if !flags.readable() && !flags.writable() {
            return Err(VfsError::invalid_argument(format!(
                "no access mode in {flags:?}"
            )));
        }
        let key = Self::normalize(path);

        let ino = match self.entries.get(&key).copied() {
            Some(ino) => {
                let inode = self
                    .inodes
                    .get_mut(&ino)
                    .ok_or_else(|| VfsError::not_found(Self::path_str(&key)))?;
                match &mut inode.node {
                    Node::Dir => return Err(VfsError::is_a_directory(Self::path_str(&key))),
                    Node::File(data) => {
                        if flags.truncates() && flags.writable() {
                            data.clear();
                            inode.mtime = now();
                        }
                    }
                }
                ino
            }
            None if flags.creates() => {
                self.check_create(&key)?;
                let mode = if attr & attr::READONLY != 0 { 0o444 } else { 0o644 };
                self.insert_inode(
                    key.clone(),
                    Inode::new(Node::File(Vec::new()), mode, attr & !attr::DIRECTORY),
                )
            }
            None => return Err(VfsError::not_found(Self::path_str(&key))),
        };

        let inode = self
            .inodes
            .get_mut(&ino)
            .ok_or_else(|| VfsError::not_found(Self::path_str(&key)))?;
        inode.open_count += 1;
        let position = if flags.appends() { inode.len() } else { 0 };

        let handle = self.next_handle();
        self.files.insert(
            handle.0,
            OpenFile {
                ino,
                position,
                flags,
            },
        );
        Ok(handle)
    }

    fn close(&mut self, handle: BackendHandle) -> VfsResult<()> {
        let file = self.files.remove(&handle.0).ok_or(VfsError::InvalidHandle)?;
        if let Some(inode) = self.inodes.get_mut(&file.ino) {
            inode.open_count = inode.open_count.saturating_sub(1);
        }
        self.reap(file.ino);
        Ok(())
    }

    fn read(&mut self, handle: BackendHandle, buf: &mut [u8]) -> VfsResult<usize> {
        let (file, inode) = self.file_mut(handle)?;
        if !file.flags.readable() {
            return Err(VfsError::permission_denied("handle not open for reading"));
        }
        let Node::File(data) = &inode.node else {
            return Err(VfsError::is_a_directory("open handle"));
        };

        let start = usize::try_from(file.position).map_or(data.len(), |p| p.min(data.len()));
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        file.position += n as u64;
        inode.atime = now();
        Ok(n)
    }

    fn write(&mut self, handle: BackendHandle, bytes: &[u8]) -> VfsResult<usize> {
        let (file, inode) = self.file_mut(handle)?;
        if !file.flags.writable() {
            return Err(VfsError::permission_denied("handle not open for writing"));
        }
        let Node::File(data) = &mut inode.node else {
            return Err(VfsError::is_a_directory("open handle"));
        };

        if file.flags.appends() {
            file.position = data.len() as u64;
        }
        let end = file
            .position
            .checked_add(bytes.len() as u64)
            .filter(|end| *end <= MAX_FILE_SIZE)
            .and_then(|end| usize::try_from(end).ok())
            .ok_or(VfsError::NoSpace)?;
        let offset = end - bytes.len();
        // Extend if necessary
        if end > data.len() {
            data.resize(end, 0);
        }
        data[offset..end].copy_from_slice(bytes);
        file.position += bytes.len() as u64;
        inode.mtime = now();
        Ok(bytes.len())
    }

    fn seek(&mut self, handle: BackendHandle, offset: i64, whence: Whence) -> VfsResult<u64> {
        let (file, inode) = self.file_mut(handle)?;
        let base = match whence {
            Whence::Set => 0,
            Whence::Cur => file.position,
            Whence::End => inode.len(),
        };
        let target = (base as i64)
            .checked_add(offset)
            .filter(|t| *t >= 0)
            .ok_or_else(|| VfsError::invalid_argument(format!("seek to {base}{offset:+}")))?;
        file.position = target as u64;
        Ok(file.position)
    }

    fn tell(&self, handle: BackendHandle) -> VfsResult<u64> {
        Ok(self.open_file(handle)?.position)
    }

    fn eof(&self, handle: BackendHandle) -> VfsResult<bool> {
        let file = self.open_file(handle)?;
        let len = self.inodes.get(&file.ino).map(Inode::len).unwrap_or(0);
        Ok(file.position >= len)
    }

    fn size(&self, handle: BackendHandle) -> VfsResult<u64> {
        let file = self.open_file(handle)?;
        Ok(self.inodes.get(&file.ino).map(Inode::len).unwrap_or(0))
    }

    fn flush(&mut self, handle: BackendHandle) -> VfsResult<()> {
        self.open_file(handle).map(|_| ())
    }

    fn error(&self, handle: BackendHandle) -> VfsResult<i32> {
        self.open_file(handle).map(|_| 0)
    }

    fn getc(&mut self, handle: BackendHandle) -> VfsResult<Option<u8>> {
        let mut byte = [0u8; 1];
        match self.read(handle, &mut byte)? {
            0 => Ok(None),
            _ => Ok(Some(byte[0])),
        }
    }

    fn putc(&mut self, handle: BackendHandle, byte: u8) -> VfsResult<u8> {
        self.write(handle, &[byte])?;
        Ok(byte)
    }

    fn sync(&mut self, handle: BackendHandle) -> VfsResult<()> {
        self.open_file(handle).map(|_| ())
    }

    // ========================================================================
    // Paths
    // ========================================================================

    fn stat(&self, path: &str) -> VfsResult<Stat> {
        let key = Self::normalize(path);
        self.lookup(&key).map(|(_, inode)| inode.stat())
    }

    fn unlink(&mut self, path: &str) -> VfsResult<()> {
        let key = Self::normalize(path);
        if key.is_empty() {
            return Err(VfsError::permission_denied("cannot remove root"));
        }

        let (ino, inode) = self.lookup(&key)?;
        if inode.is_dir() {
            return Err(VfsError::is_a_directory(Self::path_str(&key)));
        }
        self.entries.remove(&key);
        if let Some(inode) = self.inodes.get_mut(&ino) {
            inode.linked = false;
        }
        self.reap(ino);
        Ok(())
    }

    fn rename(&mut self, from: &str, to: &str) -> VfsResult<()> {
        let from_key = Self::normalize(from);
        let to_key = Self::normalize(to);
        if from_key.is_empty() || to_key.is_empty() {
            return Err(VfsError::permission_denied("cannot rename root"));
        }

        let (_, inode) = self.lookup(&from_key)?;
        let is_dir = inode.is_dir();
        if self.entries.contains_key(&to_key) {
            return Err(VfsError::already_exists(Self::path_str(&to_key)));
        }
        let to_parent = Self::parent_of(&to_key);
        match self.lookup(to_parent) {
            Ok((_, parent)) if parent.is_dir() => {}
            Ok(_) => return Err(VfsError::not_a_directory(Self::path_str(to_parent))),
            Err(e) => return Err(e),
        }
        if is_dir && to_key.starts_with(&format!("{from_key}/")) {
            return Err(VfsError::invalid_argument(format!(
                "cannot move {} into itself",
                Self::path_str(&from_key)
            )));
        }

        // Move the entry, and for directories everything below it.
        let child_prefix = format!("{from_key}/");
        let moved: Vec<String> = self
            .entries
            .keys()
            .filter(|k| **k == from_key || (is_dir && k.starts_with(&child_prefix)))
            .cloned()
            .collect();
        for old in moved {
            if let Some(ino) = self.entries.remove(&old) {
                let new = format!("{to_key}{}", &old[from_key.len()..]);
                self.entries.insert(new, ino);
            }
        }
        Ok(())
    }

    fn chmod(&mut self, path: &str, mode: u32) -> VfsResult<()> {
        let key = Self::normalize(path);
        let inode = self.lookup_mut(&key)?;
        inode.attr = apply_mode(inode.attr, mode);
        inode.ctime = now();
        Ok(())
    }

    fn utime(&mut self, path: &str, atime: u32, mtime: u32) -> VfsResult<()> {
        let key = Self::normalize(path);
        let inode = self.lookup_mut(&key)?;
        inode.atime = atime;
        inode.mtime = mtime;
        Ok(())
    }

    fn mkdir(&mut self, path: &str, mode: u32) -> VfsResult<()> {
        let key = Self::normalize(path);
        self.check_create(&key)?;
        self.insert_inode(key, Inode::new(Node::Dir, mode, 0));
        Ok(())
    }

    fn rmdir(&mut self, path: &str) -> VfsResult<()> {
        let key = Self::normalize(path);
        if key.is_empty() {
            return Err(VfsError::permission_denied("cannot remove root"));
        }

        let (ino, inode) = self.lookup(&key)?;
        if !inode.is_dir() {
            return Err(VfsError::not_a_directory(Self::path_str(&key)));
        }
        if !self.children(&key).is_empty() {
            return Err(VfsError::directory_not_empty(Self::path_str(&key)));
        }
        self.entries.remove(&key);
        self.inodes.remove(&ino);
        Ok(())
    }

    fn direxists(&self, path: &str) -> VfsResult<bool> {
        let key = Self::normalize(path);
        Ok(self.lookup(&key).is_ok_and(|(_, inode)| inode.is_dir()))
    }

    // ========================================================================
    // Directory streams
    // ========================================================================

    fn opendir(&mut self, path: &str) -> VfsResult<BackendHandle> {
        let key = Self::normalize(path);
        let (_, inode) = self.lookup(&key)?;
        if !inode.is_dir() {
            return Err(VfsError::not_a_directory(Self::path_str(&key)));
        }

        let listing: VecDeque<DirEntry> = self.children(&key).into();
        let handle = self.next_handle();
        self.dirs.insert(handle.0, listing);
        Ok(handle)
    }

    fn readdir(&mut self, handle: BackendHandle) -> VfsResult<Option<DirEntry>> {
        let listing = self.dirs.get_mut(&handle.0).ok_or(VfsError::InvalidHandle)?;
        Ok(listing.pop_front())
    }

    fn closedir(&mut self, handle: BackendHandle) -> VfsResult<()> {
        self.dirs
            .remove(&handle.0)
            .map(|_| ())
            .ok_or(VfsError::InvalidHandle)
    }
}

/// READONLY is set exactly when `mode` has no write bit.
fn apply_mode(attr: u32, mode: u32) -> u32 {
    if mode & 0o222 == 0 {
        attr | attr::READONLY
    } else {
        attr & !attr::READONLY
    }
}

/// Seconds since the epoch, truncated to 32 bits.
fn now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}
