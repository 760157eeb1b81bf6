//! Filesystem contract
//!
//! Three trait objects stand in for the operation tables a filesystem type
//! registers with the VFS:
//!
//! - [`FileSystemType`]: one per type, registered by name; builds instances.
//! - [`FileSystem`]: one per mount; path-based operations.
//! - [`FileOps`]: one per open file; offset-based I/O on a single inode.
//!
//! Paths handed to a [`FileSystem`] are already normalized and relative to
//! its mount point (always absolute, `/` is the filesystem root).

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;

use super::types::{DirEntry, FsStats, Metadata, MountFlags, OpenFlags};
use crate::device::BlockDevice;
use crate::error::{FsError, FsResult};

/// A registrable filesystem type
pub trait FileSystemType: Send + Sync {
    /// Registry key (e.g. "sfs")
    fn name(&self) -> &str;

    /// Build a filesystem instance.
    ///
    /// `device` is `None` for purely in-memory types.
    fn mount(
        &self,
        device: Option<Arc<dyn BlockDevice>>,
        flags: MountFlags,
    ) -> FsResult<Box<dyn FileSystem>>;

    /// Write an empty filesystem onto `device`
    fn format(&self, device: &Arc<dyn BlockDevice>) -> FsResult<()> {
        let _ = device;
        Err(FsError::InvalidArgument)
    }
}

/// A mounted filesystem instance
pub trait FileSystem: Send + Sync {
    /// Name of the type that built this instance
    fn type_name(&self) -> &str;

    /// Open (and with `CREAT`, create) the object at `path`.
    ///
    /// Honors `CREAT`, `EXCL` and `TRUNC`. Access mode checks and `APPEND`
    /// are the VFS's business.
    fn open(&self, path: &str, flags: OpenFlags, mode: u32) -> FsResult<Box<dyn FileOps>>;

    /// Create an empty regular file
    fn create(&self, path: &str, mode: u32) -> FsResult<()>;

    fn mkdir(&self, path: &str, mode: u32) -> FsResult<()>;

    /// Remove an empty directory
    fn rmdir(&self, path: &str) -> FsResult<()>;

    /// Remove a non-directory and release its storage
    fn unlink(&self, path: &str) -> FsResult<()>;

    /// Whether [`FileSystem::rename`] is implemented natively
    fn supports_rename(&self) -> bool {
        false
    }

    fn rename(&self, old: &str, new: &str) -> FsResult<()> {
        let _ = (old, new);
        Err(FsError::PermissionDenied)
    }

    fn stat(&self, path: &str) -> FsResult<Metadata>;

    fn statfs(&self) -> FsResult<FsStats>;

    /// Flush filesystem metadata and the underlying device
    fn sync(&self) -> FsResult<()>;

    /// Final flush before the instance is dropped
    fn unmount(&self) -> FsResult<()>;
}

/// Operations on one open file or directory
pub trait FileOps: Send {
    /// Read at `offset`; returns 0 at end-of-file
    fn read(&mut self, buf: &mut [u8], offset: u64) -> FsResult<usize>;

    /// Write at `offset`; may return a short count
    fn write(&mut self, buf: &[u8], offset: u64) -> FsResult<usize>;

    fn truncate(&mut self, len: u64) -> FsResult<()>;

    /// Up to `max` live directory entries, skipping the first `index`
    fn readdir(&mut self, index: usize, max: usize) -> FsResult<Vec<DirEntry>>;

    fn metadata(&self) -> FsResult<Metadata>;

    /// Persist inode metadata
    fn sync(&mut self) -> FsResult<()>;

    /// Release the file: sync the inode, then the device.
    ///
    /// Both steps run even if the first fails; the first error is returned.
    fn close(self: Box<Self>) -> FsResult<()>;
}

/// Entry in the VFS open-file table
pub struct OpenFile {
    pub(crate) ops: Box<dyn FileOps>,
    /// Byte offset for files, entry index for directories
    pub(crate) position: u64,
    pub(crate) flags: OpenFlags,
    /// Id of the mount that owns the file
    pub(crate) mount_id: u64,
    pub(crate) read_only: bool,
}

impl OpenFile {
    pub(crate) fn new(ops: Box<dyn FileOps>, flags: OpenFlags, mount_id: u64, read_only: bool) -> Self {
        Self {
            ops,
            position: 0,
            flags,
            mount_id,
            read_only,
        }
    }

    /// Close the underlying file
    pub(crate) fn release(self) -> FsResult<()> {
        self.ops.close()
    }
}
