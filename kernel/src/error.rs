//! Filesystem error codes
//!
//! Every VFS and SFS operation returns [`FsResult`]. The numeric codes match
//! the ones the shell and the syscall layer expect from the storage layer.

use core::fmt;

use crate::device::BlockError;

/// Success code returned across the syscall boundary.
pub const SUCCESS: i32 = 0;
pub const EINVAL: i32 = -2;
pub const ENOENT: i32 = -3;
pub const EEXIST: i32 = -4;
pub const EPERM: i32 = -5;
pub const ENOMEM: i32 = -6;
pub const ENOSPC: i32 = -7;
pub const EIO: i32 = -8;

/// Filesystem error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    /// Malformed argument, bad path, invalid block or inode number
    InvalidArgument,
    /// Missing path component, unknown filesystem type or device
    NotFound,
    /// Duplicate directory entry, mountpoint or registration
    AlreadyExists,
    /// Structural refusal (non-empty rmdir, write to a directory, ...)
    PermissionDenied,
    /// Heap allocation failed
    OutOfMemory,
    /// No free blocks, inodes, mount slots or open-file slots
    NoSpace,
    /// Underlying block read/write failed
    Io,
}

impl FsError {
    /// Numeric error code for this error
    pub fn code(&self) -> i32 {
        match self {
            FsError::InvalidArgument => EINVAL,
            FsError::NotFound => ENOENT,
            FsError::AlreadyExists => EEXIST,
            FsError::PermissionDenied => EPERM,
            FsError::OutOfMemory => ENOMEM,
            FsError::NoSpace => ENOSPC,
            FsError::Io => EIO,
        }
    }

    /// Map a numeric code back to an error. `SUCCESS` and unknown codes give `None`.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            EINVAL => Some(FsError::InvalidArgument),
            ENOENT => Some(FsError::NotFound),
            EEXIST => Some(FsError::AlreadyExists),
            EPERM => Some(FsError::PermissionDenied),
            ENOMEM => Some(FsError::OutOfMemory),
            ENOSPC => Some(FsError::NoSpace),
            EIO => Some(FsError::Io),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FsError::InvalidArgument => "invalid argument",
            FsError::NotFound => "no such file or directory",
            FsError::AlreadyExists => "already exists",
            FsError::PermissionDenied => "operation not permitted",
            FsError::OutOfMemory => "out of memory",
            FsError::NoSpace => "no space left on device",
            FsError::Io => "i/o error",
        }
    }
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<BlockError> for FsError {
    fn from(err: BlockError) -> Self {
        match err {
            BlockError::InvalidBlock | BlockError::BufferSize => FsError::InvalidArgument,
            BlockError::ReadOnly => FsError::PermissionDenied,
            BlockError::NotReady | BlockError::ReadFailed | BlockError::WriteFailed => {
                FsError::Io
            }
        }
    }
}

/// Result type used throughout the storage layer
pub type FsResult<T> = Result<T, FsError>;
