//! VFS error types and status codes.

use std::io;
use thiserror::Error;

use crate::Op;

/// Status code returned for a successful operation.
pub const OK: i32 = 0;

/// Start of the band of status codes carrying backend-specific errors.
///
/// `Backend(c)` reports `BACKEND_CODE_BASE - |c|`, which keeps it clear of
/// [`OK`] and of every VFS status code.
pub const BACKEND_CODE_BASE: i32 = -1000;

/// VFS error type.
///
/// Every variant has a distinct negative status code (see [`VfsError::code`]),
/// so callers on the other side of a C-style boundary can still tell the
/// failures apart.
#[derive(Debug, Error)]
pub enum VfsError {
    /// Null, empty or zero-sized input.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// File or directory not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Path already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Backend ran out of room.
    #[error("no space left on filesystem")]
    NoSpace,

    /// Operation attempted before `init` or after `deinit`.
    #[error("vfs is not initialized")]
    NotInitialized,

    /// `init` called twice.
    #[error("vfs is already initialized")]
    AlreadyInitialized,

    /// No mount point owns the path.
    #[error("no mount point for path: {0}")]
    NotMounted(String),

    /// A filesystem is already mounted at exactly this prefix.
    #[error("already mounted: {0}")]
    AlreadyMounted(String),

    /// No backend registered under this name.
    #[error("filesystem not registered: {0}")]
    BackendNotFound(String),

    /// The backend does not implement this capability.
    #[error("operation not supported by backend: {0}")]
    Unsupported(Op),

    /// Mount table is full.
    #[error("no free mount point slots")]
    NoFreeMounts,

    /// Handle table is full.
    #[error("no free file handles")]
    NoFreeHandles,

    /// Handle is closed, stale, or of the wrong kind.
    #[error("invalid or stale handle")]
    InvalidHandle,

    /// Backend `init` refused the configuration.
    #[error("backend init failed: {0}")]
    BackendInit(String),

    /// Backend `deinit` reported failure.
    #[error("backend deinit failed: {0}")]
    BackendDeinit(String),

    /// Caller-supplied buffer cannot hold the result plus terminator.
    #[error("buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },

    /// Rename across two different mounts.
    #[error("cross-device link")]
    CrossDevice,

    /// Backend is still in use by a mount.
    #[error("filesystem busy: {0}")]
    Busy(String),

    /// Expected a directory.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// Expected a file.
    #[error("is a directory: {0}")]
    IsADirectory(String),

    /// Directory not empty.
    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),

    /// Access mode of the handle forbids the operation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Backend-specific failure code, opaque to the VFS. Reported in the
    /// band below [`BACKEND_CODE_BASE`].
    #[error("backend error code {0}")]
    Backend(i32),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// Coarse classification of failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Null/empty/zero-size inputs.
    Argument,
    /// Wrong lifecycle state.
    State,
    /// A bounded table is full.
    ResourceExhaustion,
    /// Path, mount, file or directory missing.
    NotFound,
    /// Something is already there.
    Conflict,
    /// Backend lacks the capability.
    Capability,
    /// Backend reported its own failure.
    Backend,
    /// Handle null, closed or foreign.
    InvalidHandle,
}

impl VfsError {
    /// Create an InvalidArgument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a NotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create an AlreadyExists error.
    pub fn already_exists(path: impl Into<String>) -> Self {
        Self::AlreadyExists(path.into())
    }

    /// Create a NotMounted error.
    pub fn not_mounted(path: impl Into<String>) -> Self {
        Self::NotMounted(path.into())
    }

    /// Create a NotADirectory error.
    pub fn not_a_directory(path: impl Into<String>) -> Self {
        Self::NotADirectory(path.into())
    }

    /// Create an IsADirectory error.
    pub fn is_a_directory(path: impl Into<String>) -> Self {
        Self::IsADirectory(path.into())
    }

    /// Create a DirectoryNotEmpty error.
    pub fn directory_not_empty(path: impl Into<String>) -> Self {
        Self::DirectoryNotEmpty(path.into())
    }

    /// Create a PermissionDenied error.
    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }

    /// Create an Other error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Negative status code for this error.
    pub fn code(&self) -> i32 {
        match self {
            Self::InvalidArgument(_) => -1,
            Self::NotFound(_) => -2,
            Self::AlreadyExists(_) => -3,
            Self::NoSpace => -4,
            Self::NotInitialized => -5,
            Self::AlreadyInitialized => -6,
            Self::NotMounted(_) => -7,
            Self::AlreadyMounted(_) => -8,
            Self::BackendNotFound(_) => -9,
            Self::Unsupported(_) => -10,
            Self::NoFreeMounts => -11,
            Self::NoFreeHandles => -12,
            Self::InvalidHandle => -13,
            Self::BackendInit(_) => -14,
            Self::BackendDeinit(_) => -15,
            Self::BufferTooSmall { .. } => -16,
            Self::CrossDevice => -17,
            Self::Busy(_) => -18,
            Self::NotADirectory(_) => -19,
            Self::IsADirectory(_) => -20,
            Self::DirectoryNotEmpty(_) => -21,
            Self::PermissionDenied(_) => -22,
            Self::Other(_) => -99,
            Self::Backend(code) => {
                let magnitude = i32::try_from(code.unsigned_abs()).unwrap_or(i32::MAX);
                BACKEND_CODE_BASE.saturating_sub(magnitude)
            }
        }
    }

    /// Rebuild an error from a status code.
    ///
    /// Payload strings are lost in the round trip. Codes in the backend band
    /// come back as [`VfsError::Backend`] with a negative payload. Returns
    /// `None` for [`OK`], positive values and unassigned codes.
    pub fn from_code(code: i32) -> Option<Self> {
        let err = match code {
            c if c >= OK => return None,
            c if c <= BACKEND_CODE_BASE => Self::Backend(c - BACKEND_CODE_BASE),
            -1 => Self::InvalidArgument(String::new()),
            -2 => Self::NotFound(String::new()),
            -3 => Self::AlreadyExists(String::new()),
            -4 => Self::NoSpace,
            -5 => Self::NotInitialized,
            -6 => Self::AlreadyInitialized,
            -7 => Self::NotMounted(String::new()),
            -8 => Self::AlreadyMounted(String::new()),
            -9 => Self::BackendNotFound(String::new()),
            -10 => Self::Unsupported(Op::Ioctl),
            -11 => Self::NoFreeMounts,
            -12 => Self::NoFreeHandles,
            -13 => Self::InvalidHandle,
            -14 => Self::BackendInit(String::new()),
            -15 => Self::BackendDeinit(String::new()),
            -16 => Self::BufferTooSmall {
                needed: 0,
                available: 0,
            },
            -17 => Self::CrossDevice,
            -18 => Self::Busy(String::new()),
            -19 => Self::NotADirectory(String::new()),
            -20 => Self::IsADirectory(String::new()),
            -21 => Self::DirectoryNotEmpty(String::new()),
            -22 => Self::PermissionDenied(String::new()),
            -99 => Self::Other(String::new()),
            _ => return None,
        };
        Some(err)
    }

    /// Taxonomy class of this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidArgument(_) | Self::BufferTooSmall { .. } => ErrorClass::Argument,
            Self::NotInitialized | Self::AlreadyInitialized => ErrorClass::State,
            Self::NoFreeMounts | Self::NoFreeHandles | Self::NoSpace => {
                ErrorClass::ResourceExhaustion
            }
            Self::NotFound(_) | Self::NotMounted(_) | Self::BackendNotFound(_) => {
                ErrorClass::NotFound
            }
            Self::AlreadyExists(_)
            | Self::AlreadyMounted(_)
            | Self::CrossDevice
            | Self::Busy(_)
            | Self::DirectoryNotEmpty(_) => ErrorClass::Conflict,
            Self::Unsupported(_) => ErrorClass::Capability,
            Self::InvalidHandle => ErrorClass::InvalidHandle,
            Self::BackendInit(_)
            | Self::BackendDeinit(_)
            | Self::NotADirectory(_)
            | Self::IsADirectory(_)
            | Self::PermissionDenied(_)
            | Self::Backend(_)
            | Self::Other(_) => ErrorClass::Backend,
        }
    }
}

/// Convert VfsError to std::io::Error for compatibility.
impl From<VfsError> for io::Error {
    fn from(e: VfsError) -> Self {
        match e {
            VfsError::InvalidArgument(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
            VfsError::NotFound(msg) | VfsError::NotMounted(msg) => {
                io::Error::new(io::ErrorKind::NotFound, msg)
            }
            VfsError::AlreadyExists(msg) | VfsError::AlreadyMounted(msg) => {
                io::Error::new(io::ErrorKind::AlreadyExists, msg)
            }
            VfsError::NoSpace => io::Error::new(io::ErrorKind::StorageFull, "no space left"),
            VfsError::Unsupported(op) => {
                io::Error::new(io::ErrorKind::Unsupported, format!("{op} not supported"))
            }
            VfsError::NotADirectory(msg) => io::Error::new(io::ErrorKind::NotADirectory, msg),
            VfsError::IsADirectory(msg) => io::Error::new(io::ErrorKind::IsADirectory, msg),
            VfsError::DirectoryNotEmpty(msg) => {
                io::Error::new(io::ErrorKind::DirectoryNotEmpty, msg)
            }
            VfsError::PermissionDenied(msg) => {
                io::Error::new(io::ErrorKind::PermissionDenied, msg)
            }
            VfsError::CrossDevice => io::Error::new(io::ErrorKind::CrossesDevices, "cross-device link"),
            VfsError::Busy(msg) => io::Error::new(io::ErrorKind::ResourceBusy, msg),
            VfsError::InvalidHandle => {
                io::Error::new(io::ErrorKind::InvalidInput, "invalid or stale handle")
            }
            other => io::Error::other(other.to_string()),
        }
    }
}

/// VFS result type.
pub type VfsResult<T> = Result<T, VfsError>;
