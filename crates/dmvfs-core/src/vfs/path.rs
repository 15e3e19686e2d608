//! Path utilities.
//!
//! VFS paths are plain `/`-separated strings, not `std::path::Path`: they
//! never touch the host filesystem and must behave the same on every
//! platform.

use dmvfs_types::{VfsError, VfsResult};

/// Collapse repeated slashes and resolve `.` and `..` in an absolute path.
///
/// `..` at the root stays at the root. The result never has a trailing
/// slash unless it is `/` itself.
pub fn normalize(abs: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in abs.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }

    if parts.is_empty() {
        return "/".to_string();
    }

    let mut out = String::with_capacity(abs.len());
    for part in parts {
        out.push('/');
        out.push_str(part);
    }
    out
}

/// Build an absolute path from `path` and the current working directory.
///
/// Absolute inputs ignore `cwd`. Relative inputs are joined onto `cwd`
/// without doubling the slash when `cwd` is `/`.
pub fn to_absolute(path: &str, cwd: &str) -> VfsResult<String> {
    if path.is_empty() {
        return Err(VfsError::invalid_argument("empty path"));
    }

    if path.starts_with('/') {
        return Ok(normalize(path));
    }

    let joined = if cwd.ends_with('/') {
        format!("{cwd}{path}")
    } else {
        format!("{cwd}/{path}")
    };
    Ok(normalize(&joined))
}

/// Normalize a mount path: ensure it starts with `/` and has no trailing slash.
pub fn normalize_mount_path(path: &str) -> VfsResult<String> {
    if path.is_empty() {
        return Err(VfsError::invalid_argument("empty mount point"));
    }
    if path.starts_with('/') {
        Ok(normalize(path))
    } else {
        Ok(normalize(&format!("/{path}")))
    }
}

/// True when `prefix` owns `abs`.
///
/// The character after the prefix must be `/` or end-of-string, so mount
/// `/mnt` does not claim `/mnt2`. The root mount owns every absolute path.
pub fn prefix_matches(abs: &str, prefix: &str) -> bool {
    if prefix == "/" {
        return abs.starts_with('/');
    }
    match abs.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Backend-relative view of `abs` under `prefix`.
///
/// Strips exactly `prefix.len()` bytes; the caller must already have
/// matched the prefix with [`prefix_matches`].
pub fn relative_to_mount<'a>(abs: &'a str, prefix: &str) -> &'a str {
    abs.get(prefix.len()..).unwrap_or("")
}

/// Copy `s` into `buf` followed by a NUL byte.
///
/// Returns the number of bytes copied, not counting the terminator.
pub(crate) fn copy_to_buffer(s: &str, buf: &mut [u8]) -> VfsResult<usize> {
    if buf.is_empty() {
        return Err(VfsError::invalid_argument("zero-sized buffer"));
    }
    let needed = s.len() + 1;
    if needed > buf.len() {
        return Err(VfsError::BufferTooSmall {
            needed,
            available: buf.len(),
        });
    }
    buf[..s.len()].copy_from_slice(s.as_bytes());
    buf[s.len()] = 0;
    Ok(s.len())
}
