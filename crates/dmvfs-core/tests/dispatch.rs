//! Integration tests for path and handle dispatch.
//!
//! Routing tests mount several `TestFsDriver`s, each under its own name and
//! with its own probe, so a test can tell exactly which backend a call
//! reached and with which relative path.

use std::sync::Arc;

use dmvfs_core::vfs::backends::IOCTL_ECHO_LEN;
use dmvfs_core::{
    DirHandle, Op, OpenFlags, OwnerId, Registry, TestFsDriver, TestProbe, Vfs, VfsError, Whence,
    attr,
};

// ============================================================================
// Shared test setup
// ============================================================================

const OWNER: OwnerId = OwnerId(1);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// VFS with the built-in drivers and a ramfs at `/mnt`.
fn ram_vfs() -> Vfs {
    init_tracing();
    let vfs = Vfs::default();
    vfs.init(8, 16).unwrap();
    vfs.mount("ramfs", "/mnt", None).unwrap();
    vfs
}

/// VFS whose registry has one probed test driver per name.
fn probed_vfs(names: &[&str], max_handles: usize) -> (Vfs, Vec<Arc<TestProbe>>) {
    init_tracing();
    let registry = Registry::with_builtin();
    let probes: Vec<Arc<TestProbe>> = names
        .iter()
        .map(|name| {
            let probe = TestProbe::new();
            registry
                .register(Arc::new(TestFsDriver::named(*name, Arc::clone(&probe))))
                .unwrap();
            probe
        })
        .collect();

    let vfs = Vfs::new(Arc::new(registry));
    vfs.init(8, max_handles).unwrap();
    (vfs, probes)
}

fn write_file(vfs: &Vfs, path: &str, data: &[u8]) {
    let fh = vfs.open(path, OpenFlags::create_truncate(), 0, OWNER).unwrap();
    assert_eq!(vfs.write(fh, data).unwrap(), data.len());
    vfs.close(fh).unwrap();
}

// ============================================================================
// Routing
// ============================================================================

#[test]
fn test_longest_prefix_dispatch() {
    let (vfs, probes) = probed_vfs(&["fs_root", "fs_mnt", "fs_sub"], 16);
    vfs.mount("fs_root", "/", None).unwrap();
    vfs.mount("fs_mnt", "/mnt", None).unwrap();
    vfs.mount("fs_sub", "/mnt/sub", None).unwrap();

    for path in ["/mnt/sub/x", "/mnt/x", "/other", "/mnt2"] {
        let _ = vfs.stat(path);
    }

    assert_eq!(probes[2].paths(Op::Stat), vec!["/x"]);
    assert_eq!(probes[1].paths(Op::Stat), vec!["/x"]);
    assert_eq!(probes[0].paths(Op::Stat), vec!["other", "mnt2"]);
}

#[test]
fn test_unmounted_path() {
    let (vfs, probes) = probed_vfs(&["fs_mnt"], 16);
    vfs.mount("fs_mnt", "/mnt", None).unwrap();

    assert!(matches!(vfs.stat("/other"), Err(VfsError::NotMounted(_))));
    assert!(matches!(vfs.stat("/mnt2/file"), Err(VfsError::NotMounted(_))));
    assert!(matches!(
        vfs.open("/other/f", OpenFlags::create(), 0, OWNER),
        Err(VfsError::NotMounted(_))
    ));
    assert_eq!(probes[0].count(Op::Stat), 0);
    assert!(!vfs.is_mounted("/other").unwrap());
    assert!(vfs.is_mounted("/mnt/deep/path").unwrap());
}

#[test]
fn test_mount_root_path_is_empty() {
    let (vfs, probes) = probed_vfs(&["fs_mnt"], 16);
    vfs.mount("fs_mnt", "/mnt", None).unwrap();

    assert!(vfs.direxists("/mnt").unwrap());
    assert_eq!(probes[0].paths(Op::DirExists), vec![""]);
}

#[test]
fn test_handle_stays_with_its_mount() {
    let (vfs, probes) = probed_vfs(&["fs_a", "fs_b"], 16);
    vfs.mount("fs_a", "/data", None).unwrap();

    let fh = vfs.open("/data/sub/file", OpenFlags::create(), 0, OWNER);
    // Parent directory does not exist yet on fs_a.
    assert!(matches!(fh, Err(VfsError::NotFound(_))));
    vfs.mkdir("/data/sub", 0o755).unwrap();
    let fh = vfs.open("/data/sub/file", OpenFlags::create(), 0, OWNER).unwrap();

    // A deeper mount added later shadows the path, not the handle.
    vfs.mount("fs_b", "/data/sub", None).unwrap();
    probes[0].clear();

    vfs.write(fh, b"abc").unwrap();
    vfs.seek(fh, 0, Whence::Set).unwrap();
    let mut buf = [0u8; 3];
    vfs.read(fh, &mut buf).unwrap();
    vfs.tell(fh).unwrap();
    vfs.close(fh).unwrap();

    assert_eq!(&buf, b"abc");
    assert_eq!(probes[0].count(Op::Write), 1);
    assert_eq!(probes[0].count(Op::Close), 1);
    assert!(probes[1].calls().iter().all(|c| c.op == Op::Init || c.op == Op::IsContextValid));

    // New path lookups go to the deeper mount.
    assert!(matches!(vfs.stat("/data/sub/file"), Err(VfsError::NotFound(_))));
    assert_eq!(probes[1].paths(Op::Stat), vec!["/file"]);
}

#[test]
fn test_rename_across_mounts() {
    let vfs = ram_vfs();
    vfs.mount("ramfs", "/other", None).unwrap();
    write_file(&vfs, "/mnt/a", b"x");

    assert!(matches!(vfs.rename("/mnt/a", "/other/a"), Err(VfsError::CrossDevice)));
    assert!(vfs.stat("/mnt/a").is_ok());
}

// ============================================================================
// Handle table
// ============================================================================

#[test]
fn test_open_with_full_table_leaks_nothing() {
    let (vfs, probes) = probed_vfs(&["fs_mnt"], 2);
    vfs.mount("fs_mnt", "/mnt", None).unwrap();

    let a = vfs.open("/mnt/a", OpenFlags::create(), 0, OWNER).unwrap();
    let b = vfs.open("/mnt/b", OpenFlags::create(), 0, OWNER).unwrap();
    assert_eq!(probes[0].open_files(), 2);

    let result = vfs.open("/mnt/c", OpenFlags::create(), 0, OWNER);
    assert!(matches!(result, Err(VfsError::NoFreeHandles)));
    assert_eq!(probes[0].open_files(), 2);
    assert_eq!(probes[0].count(Op::Close), 1);

    vfs.close(a).unwrap();
    vfs.close(b).unwrap();
    assert_eq!(probes[0].open_files(), 0);
}

#[test]
fn test_double_close() {
    let (vfs, probes) = probed_vfs(&["fs_mnt"], 4);
    vfs.mount("fs_mnt", "/mnt", None).unwrap();

    let fh = vfs.open("/mnt/f", OpenFlags::create(), 0, OWNER).unwrap();
    vfs.close(fh).unwrap();
    assert!(matches!(vfs.close(fh), Err(VfsError::InvalidHandle)));
    assert_eq!(probes[0].count(Op::Close), 1);

    // The freed slot is reused, but the old handle still does not work.
    let again = vfs.open("/mnt/f", OpenFlags::read(), 0, OWNER).unwrap();
    assert_eq!(again.0.index, fh.0.index);
    assert!(matches!(vfs.tell(fh), Err(VfsError::InvalidHandle)));
    assert_eq!(vfs.tell(again).unwrap(), 0);
    vfs.close(again).unwrap();
}

#[test]
fn test_close_reports_backend_error_but_frees_slot() {
    let (vfs, probes) = probed_vfs(&["fs_mnt"], 1);
    vfs.mount("fs_mnt", "/mnt", Some("fail_close")).unwrap();

    let fh = vfs.open("/mnt/f", OpenFlags::create(), 0, OWNER).unwrap();
    assert!(matches!(vfs.close(fh), Err(VfsError::Backend(-100))));
    assert!(matches!(vfs.close(fh), Err(VfsError::InvalidHandle)));
    assert_eq!(probes[0].count(Op::Close), 1);

    // Only one slot, and it is free again.
    let fh = vfs.open("/mnt/f", OpenFlags::read(), 0, OWNER).unwrap();
    let _ = vfs.close(fh);
}

#[test]
fn test_unmount_reclaims_handles() {
    let (vfs, probes) = probed_vfs(&["fs_mnt", "fs_keep"], 16);
    vfs.mount("fs_mnt", "/mnt", None).unwrap();
    vfs.mount("fs_keep", "/keep", None).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|i| {
            vfs.open(&format!("/mnt/f{i}"), OpenFlags::create(), 0, OWNER)
                .unwrap()
        })
        .collect();
    let dir = vfs.opendir("/mnt", OWNER).unwrap();
    let kept = vfs.open("/keep/f", OpenFlags::create(), 0, OWNER).unwrap();
    assert_eq!(vfs.list_mounts().unwrap()[0].open_handles, 5);

    vfs.unmount("/mnt").unwrap();
    assert_eq!(probes[0].count(Op::Close), 4);
    assert_eq!(probes[0].count(Op::CloseDir), 1);
    assert_eq!(probes[0].count(Op::Deinit), 1);
    assert_eq!(probes[0].open_files(), 0);
    assert_eq!(probes[0].live_contexts(), 0);

    let mut buf = [0u8; 4];
    for fh in handles {
        assert!(matches!(vfs.read(fh, &mut buf), Err(VfsError::InvalidHandle)));
        assert!(matches!(vfs.close(fh), Err(VfsError::InvalidHandle)));
    }
    assert!(matches!(vfs.readdir(dir), Err(VfsError::InvalidHandle)));

    // Remounting the same prefix does not revive old handles.
    vfs.mount("fs_mnt", "/mnt", None).unwrap();
    assert!(matches!(vfs.closedir(dir), Err(VfsError::InvalidHandle)));

    // Other mounts are untouched.
    vfs.write(kept, b"still open").unwrap();
    vfs.close(kept).unwrap();
}

#[test]
fn test_unmount_survives_backend_failures() {
    let (vfs, probes) = probed_vfs(&["fs_mnt"], 4);
    vfs.mount("fs_mnt", "/mnt", Some("fail_close,fail_deinit")).unwrap();
    vfs.open("/mnt/a", OpenFlags::create(), 0, OWNER).unwrap();
    vfs.open("/mnt/b", OpenFlags::create(), 0, OWNER).unwrap();

    vfs.unmount("/mnt").unwrap();
    assert_eq!(probes[0].count(Op::Close), 2);
    assert_eq!(probes[0].count(Op::Deinit), 1);
    assert!(vfs.list_mounts().unwrap().is_empty());
    assert_eq!(vfs.registry().usage("fs_mnt"), 0);
}

#[test]
fn test_close_process() {
    let (vfs, probes) = probed_vfs(&["fs_mnt"], 8);
    vfs.mount("fs_mnt", "/mnt", None).unwrap();

    let mine = vfs.open("/mnt/a", OpenFlags::create(), 0, OwnerId(7)).unwrap();
    let dir = vfs.opendir("/mnt", OwnerId(7)).unwrap();
    let theirs = vfs.open("/mnt/b", OpenFlags::create(), 0, OwnerId(8)).unwrap();

    vfs.close_process(OwnerId(7)).unwrap();
    assert!(matches!(vfs.tell(mine), Err(VfsError::InvalidHandle)));
    assert!(matches!(vfs.readdir(dir), Err(VfsError::InvalidHandle)));
    assert_eq!(vfs.tell(theirs).unwrap(), 0);
    assert_eq!(probes[0].open_files(), 1);

    // Nothing left for owner 7.
    vfs.close_process(OwnerId(7)).unwrap();
    vfs.close(theirs).unwrap();
}

#[test]
fn test_close_process_completes_on_failure() {
    let (vfs, _) = probed_vfs(&["fs_bad"], 8);
    vfs.mount("fs_bad", "/bad", Some("fail_close")).unwrap();
    vfs.mount("ramfs", "/good", None).unwrap();

    let bad = vfs.open("/bad/a", OpenFlags::create(), 0, OWNER).unwrap();
    let good = vfs.open("/good/a", OpenFlags::create(), 0, OWNER).unwrap();

    assert!(vfs.close_process(OWNER).is_err());
    assert!(matches!(vfs.tell(bad), Err(VfsError::InvalidHandle)));
    assert!(matches!(vfs.tell(good), Err(VfsError::InvalidHandle)));
    assert!(vfs.list_mounts().unwrap().iter().all(|m| m.open_handles == 0));
}

// ============================================================================
// File operations
// ============================================================================

#[test]
fn test_write_read_roundtrip() {
    let vfs = ram_vfs();
    write_file(&vfs, "/mnt/test.txt", b"Hello, DMVFS!");

    let fh = vfs.open("/mnt/test.txt", OpenFlags::read(), 0, OWNER).unwrap();
    let mut buf = [0u8; 64];
    let n = vfs.read(fh, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"Hello, DMVFS!");
    assert_eq!(n, 13);
    assert!(vfs.eof(fh).unwrap());
    assert_eq!(vfs.read(fh, &mut buf).unwrap(), 0);
    vfs.close(fh).unwrap();
}

#[test]
fn test_seek_tell() {
    let vfs = ram_vfs();
    write_file(&vfs, "/mnt/seek.txt", b"0123456789");

    let fh = vfs.open_mode("/mnt/seek.txt", "r", OWNER).unwrap();
    assert_eq!(vfs.seek(fh, 5, Whence::Set).unwrap(), 5);
    assert_eq!(vfs.tell(fh).unwrap(), 5);

    let mut buf = [0u8; 5];
    assert_eq!(vfs.read(fh, &mut buf).unwrap(), 5);
    assert_eq!(&buf, b"56789");
    assert_eq!(vfs.size(fh).unwrap(), 10);
    vfs.close(fh).unwrap();
}

#[test]
fn test_raw_flags() {
    let vfs = ram_vfs();
    let flags = OpenFlags::from_bits(0x103).unwrap();
    let fh = vfs.open("/mnt/raw", flags, 0, OWNER).unwrap();
    vfs.write(fh, b"rw").unwrap();
    vfs.seek(fh, 0, Whence::Set).unwrap();
    let mut buf = [0u8; 2];
    vfs.read(fh, &mut buf).unwrap();
    assert_eq!(&buf, b"rw");
    vfs.close(fh).unwrap();
}

#[test]
fn test_byte_io() {
    let vfs = ram_vfs();
    let fh = vfs.open_mode("/mnt/bytes", "w+", OWNER).unwrap();
    assert_eq!(vfs.putc(fh, b'a').unwrap(), b'a');
    assert_eq!(vfs.putc(fh, b'b').unwrap(), b'b');
    vfs.flush(fh).unwrap();
    vfs.sync(fh).unwrap();
    assert_eq!(vfs.error(fh).unwrap(), 0);

    vfs.seek(fh, 0, Whence::Set).unwrap();
    assert_eq!(vfs.getc(fh).unwrap(), Some(b'a'));
    assert_eq!(vfs.getc(fh).unwrap(), Some(b'b'));
    assert_eq!(vfs.getc(fh).unwrap(), None);
    vfs.close(fh).unwrap();
}

#[test]
fn test_ioctl_capability() {
    let vfs = ram_vfs();
    vfs.mount("testfs", "/test", None).unwrap();

    let ram = vfs.open_mode("/mnt/f", "w", OWNER).unwrap();
    let mut arg = [0u8; 3];
    assert!(matches!(
        vfs.ioctl(ram, IOCTL_ECHO_LEN, &mut arg),
        Err(VfsError::Unsupported(Op::Ioctl))
    ));
    vfs.close(ram).unwrap();

    let test = vfs.open_mode("/test/f", "w", OWNER).unwrap();
    assert_eq!(vfs.ioctl(test, IOCTL_ECHO_LEN, &mut arg).unwrap(), 3);
    vfs.close(test).unwrap();
}

// ============================================================================
// Path operations
// ============================================================================

#[test]
fn test_rename_unlink_visibility() {
    let vfs = ram_vfs();
    write_file(&vfs, "/mnt/old.txt", b"data");

    vfs.rename("/mnt/old.txt", "/mnt/new.txt").unwrap();
    assert!(matches!(vfs.stat("/mnt/old.txt"), Err(VfsError::NotFound(_))));
    assert_eq!(vfs.stat("/mnt/new.txt").unwrap().size, 4);

    vfs.remove("/mnt/new.txt").unwrap();
    assert!(matches!(vfs.stat("/mnt/new.txt"), Err(VfsError::NotFound(_))));
    assert!(matches!(vfs.unlink("/mnt/new.txt"), Err(VfsError::NotFound(_))));
}

#[test]
fn test_rename_onto_existing() {
    let vfs = ram_vfs();
    write_file(&vfs, "/mnt/a", b"a");
    write_file(&vfs, "/mnt/b", b"b");
    assert!(matches!(vfs.rename("/mnt/a", "/mnt/b"), Err(VfsError::AlreadyExists(_))));
}

#[test]
fn test_mkdir_direxists() {
    let vfs = ram_vfs();
    vfs.mkdir("/mnt/dir", 0o755).unwrap();
    assert!(vfs.direxists("/mnt/dir").unwrap());
    assert!(vfs.stat("/mnt/dir").unwrap().is_dir());

    let err = vfs.mkdir("/mnt/dir", 0o755).unwrap_err();
    assert!(matches!(err, VfsError::AlreadyExists(_)));
    assert_eq!(err.class(), dmvfs_core::ErrorClass::Conflict);

    vfs.rmdir("/mnt/dir").unwrap();
    assert!(!vfs.direxists("/mnt/dir").unwrap());
}

#[test]
fn test_rmdir_is_not_unlink() {
    let vfs = ram_vfs();
    vfs.mkdir("/mnt/dir", 0o755).unwrap();
    write_file(&vfs, "/mnt/dir/f", b"");

    assert!(matches!(vfs.unlink("/mnt/dir"), Err(VfsError::IsADirectory(_))));
    assert!(matches!(vfs.rmdir("/mnt/dir/f"), Err(VfsError::NotADirectory(_))));
    assert!(matches!(vfs.rmdir("/mnt/dir"), Err(VfsError::DirectoryNotEmpty(_))));
}

#[test]
fn test_chmod_utime() {
    let vfs = ram_vfs();
    write_file(&vfs, "/mnt/f", b"");

    vfs.chmod("/mnt/f", 0o444).unwrap();
    assert_ne!(vfs.stat("/mnt/f").unwrap().attr & attr::READONLY, 0);

    vfs.utime("/mnt/f", 1_000, 2_000).unwrap();
    let stat = vfs.stat("/mnt/f").unwrap();
    assert_eq!(stat.atime, 1_000);
    assert_eq!(stat.mtime, 2_000);
}

#[test]
fn test_readdir() {
    let vfs = ram_vfs();
    vfs.mkdir("/mnt/sub", 0o755).unwrap();
    write_file(&vfs, "/mnt/one.txt", b"1");
    write_file(&vfs, "/mnt/two.txt", b"22");

    let dir: DirHandle = vfs.opendir("/mnt", OWNER).unwrap();
    let mut entries = Vec::new();
    while let Some(entry) = vfs.readdir(dir).unwrap() {
        entries.push(entry);
    }
    vfs.closedir(dir).unwrap();
    assert!(matches!(vfs.closedir(dir), Err(VfsError::InvalidHandle)));

    let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["one.txt", "sub", "two.txt"]);
    assert!(entries[1].is_dir());
    assert_eq!(entries[2].size, 2);

    assert!(matches!(
        vfs.opendir("/mnt/one.txt", OWNER),
        Err(VfsError::NotADirectory(_))
    ));
}

#[test]
fn test_relative_paths_follow_cwd() {
    let vfs = ram_vfs();
    vfs.mkdir("/mnt/home", 0o755).unwrap();
    vfs.chdir("/mnt/home").unwrap();

    write_file(&vfs, "notes.txt", b"n");
    assert!(vfs.stat("/mnt/home/notes.txt").is_ok());
    assert!(vfs.stat("../home/notes.txt").is_ok());
    assert_eq!(vfs.to_absolute("notes.txt").unwrap(), "/mnt/home/notes.txt");
}

#[test]
fn test_getcwd_buffer() {
    let vfs = ram_vfs();
    vfs.chdir("/mnt").unwrap();

    let mut buf = [0u8; 5];
    assert_eq!(vfs.getcwd(&mut buf).unwrap(), 4);
    assert_eq!(&buf, b"/mnt\0");

    let mut small = [0u8; 4];
    assert!(matches!(
        vfs.getcwd(&mut small),
        Err(VfsError::BufferTooSmall { needed: 5, available: 4 })
    ));

    let mut pwd = [0u8; 2];
    assert_eq!(vfs.getpwd(&mut pwd).unwrap(), 1);
    assert_eq!(&pwd, b"/\0");
}

#[test]
fn test_toabs() {
    let vfs = ram_vfs();
    vfs.chdir("/mnt").unwrap();

    let mut buf = [0u8; 32];
    let n = vfs.toabs("file.txt", &mut buf).unwrap();
    assert_eq!(&buf[..n], b"/mnt/file.txt");
    let n = vfs.toabs("/abs/path", &mut buf).unwrap();
    assert_eq!(&buf[..n], b"/abs/path");

    let mut tiny = [0u8; 4];
    assert!(matches!(
        vfs.toabs("file.txt", &mut tiny),
        Err(VfsError::BufferTooSmall { .. })
    ));
}
