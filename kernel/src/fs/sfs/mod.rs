//! Simple File System (SFS)
//!
//! On-disk filesystem over a 4 KiB-block [`BlockDevice`]: a block bitmap,
//! a fixed inode table and directories stored as arrays of fixed-size
//! entries. Files address at most 12 direct blocks (48 KiB).
//!
//! ```text
//! SfsType ──mount──► Sfs ─────────────┐
//!                     │ open          │ Arc<spin::Mutex<SfsState>>
//!                     ▼               │
//!                   SfsFile ──────────┘  (holds one InodeHandle)
//! ```
//!
//! Each mounted instance keeps its state behind one spin lock; every
//! `FileSystem` and `FileOps` entry point holds it for its whole duration.

mod bitmap;
mod dir;
mod file;
mod inode;
pub mod layout;
mod path;
mod volume;

pub use inode::InodeHandle;
pub use layout::{Superblock, DEFAULT_LABEL, MAX_FILE_SIZE, SFS_BLOCK_SIZE, SFS_MAGIC};
pub use volume::SfsState;

use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use spin::Mutex;

use crate::device::BlockDevice;
use crate::error::{FsError, FsResult};
use crate::fs::vfs::{
    DirEntry, FileKind, FileMode, FileOps, FileSystem, FileSystemType, FsStats, Metadata,
    MountFlags, OpenFlags,
};

/// Registry name of the SFS type
pub const SFS_TYPE_NAME: &str = "sfs";

fn zero_clock() -> u32 {
    0
}

// ═══════════════════════════════════════════════════════════════════════════════
// FILESYSTEM TYPE
// ═══════════════════════════════════════════════════════════════════════════════

/// SFS filesystem type, registered with the VFS as "sfs"
pub struct SfsType {
    clock: fn() -> u32,
    label: String,
}

impl Default for SfsType {
    fn default() -> Self {
        Self::new()
    }
}

impl SfsType {
    pub fn new() -> Self {
        Self {
            clock: zero_clock,
            label: String::from(DEFAULT_LABEL),
        }
    }

    /// Timestamp source for inodes and the superblock (seconds)
    pub fn with_clock(mut self, clock: fn() -> u32) -> Self {
        self.clock = clock;
        self
    }

    /// Volume label written by `format`
    pub fn with_label(mut self, label: &str) -> Self {
        self.label = String::from(label);
        self
    }
}

impl FileSystemType for SfsType {
    fn name(&self) -> &str {
        SFS_TYPE_NAME
    }

    fn mount(
        &self,
        device: Option<Arc<dyn BlockDevice>>,
        flags: MountFlags,
    ) -> FsResult<Box<dyn FileSystem>> {
        let device = device.ok_or(FsError::InvalidArgument)?;
        let fs = Sfs::mount(device, self.clock, flags.contains(MountFlags::READ_ONLY))?;
        Ok(Box::new(fs))
    }

    fn format(&self, device: &Arc<dyn BlockDevice>) -> FsResult<()> {
        volume::format(device, &self.label, (self.clock)())?;
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MOUNTED INSTANCE
// ═══════════════════════════════════════════════════════════════════════════════

/// A mounted SFS volume
pub struct Sfs {
    state: Arc<Mutex<SfsState>>,
}

impl Sfs {
    pub fn mount(device: Arc<dyn BlockDevice>, clock: fn() -> u32, read_only: bool) -> FsResult<Self> {
        let state = SfsState::mount(device, clock, read_only)?;
        Ok(Self {
            state: Arc::new(Mutex::new(state)),
        })
    }

    /// Copy of the in-memory superblock
    pub fn superblock(&self) -> Superblock {
        self.state.lock().superblock().clone()
    }

    pub fn label(&self) -> String {
        self.state.lock().superblock().label()
    }
}

impl SfsState {
    /// Allocate an inode of `mode` and link it at `path`.
    ///
    /// The inode is released again if the directory entry cannot be added.
    fn create_node(&mut self, path: &str, mode: FileMode) -> FsResult<InodeHandle> {
        let (mut parent, name) = self.extract_parent(path)?;
        match self.lookup(&parent, name) {
            Ok(_) => return Err(FsError::AlreadyExists),
            Err(FsError::NotFound) => {}
            Err(e) => return Err(e),
        }

        let node = self.alloc_inode(mode)?;
        if let Err(e) = self.add_dirent(&mut parent, name, node.ino()) {
            if let Err(free_err) = self.free_inode(node) {
                log::error!("sfs: leaked inode after failed link: {}", free_err);
            }
            return Err(e);
        }
        Ok(node)
    }

    fn remove_dir(&mut self, path: &str) -> FsResult<()> {
        if path::is_root(path) {
            return Err(FsError::PermissionDenied);
        }
        let node = self.resolve_path(path)?;
        if !node.is_dir() {
            return Err(FsError::InvalidArgument);
        }
        if !self.dir_is_empty(&node)? {
            return Err(FsError::PermissionDenied);
        }

        self.unlink_node(path, node)
    }

    fn remove_file(&mut self, path: &str) -> FsResult<()> {
        let node = self.resolve_path(path)?;
        if node.is_dir() {
            return Err(FsError::PermissionDenied);
        }
        self.unlink_node(path, node)
    }

    /// Drop the entry for `path`; storage goes now or at the last close
    fn unlink_node(&mut self, path: &str, node: InodeHandle) -> FsResult<()> {
        let (mut parent, name) = self.extract_parent(path)?;
        self.remove_dirent(&mut parent, name)?;
        drop(parent);
        if self.defer_release(node.ino()) {
            return Ok(());
        }
        self.reclaim_inode(node)
    }

    fn rename_node(&mut self, old: &str, new: &str) -> FsResult<()> {
        let (src_parent, src_name) = self.extract_parent(old)?;
        let node = self.lookup(&src_parent, src_name)?;
        let src_parent_ino = src_parent.ino();
        drop(src_parent);

        if node.is_dir() {
            let old_trimmed = old.trim_end_matches('/');
            let new_trimmed = new.trim_end_matches('/');
            let inside = new_trimmed
                .strip_prefix(old_trimmed)
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'));
            if inside {
                return Err(FsError::InvalidArgument);
            }
        }

        let (mut dst_parent, dst_name) = self.extract_parent(new)?;
        match self.lookup(&dst_parent, dst_name) {
            Ok(_) => return Err(FsError::AlreadyExists),
            Err(FsError::NotFound) => {}
            Err(e) => return Err(e),
        }
        self.add_dirent(&mut dst_parent, dst_name, node.ino())?;
        drop(dst_parent);

        // Re-read: the source and destination directory may be the same inode
        let mut src_parent = self.get_inode(src_parent_ino)?;
        self.remove_dirent(&mut src_parent, src_name)?;
        Ok(())
    }
}

impl FileSystem for Sfs {
    fn type_name(&self) -> &str {
        SFS_TYPE_NAME
    }

    fn open(&self, path: &str, flags: OpenFlags, mode: u32) -> FsResult<Box<dyn FileOps>> {
        let mut state = self.state.lock();
        let mut inode = match state.resolve_path(path) {
            Ok(inode) => {
                if flags.contains(OpenFlags::CREAT | OpenFlags::EXCL) {
                    return Err(FsError::AlreadyExists);
                }
                inode
            }
            Err(FsError::NotFound) if flags.contains(OpenFlags::CREAT) => {
                state.create_node(path, FileMode::new(FileKind::Regular, mode))?
            }
            Err(e) => return Err(e),
        };

        if flags.contains(OpenFlags::TRUNC) {
            state.truncate(&mut inode, 0)?;
            inode.sync()?;
        }
        state.pin(inode.ino());
        drop(state);

        Ok(Box::new(SfsFile {
            state: self.state.clone(),
            inode,
            released: false,
        }))
    }

    fn create(&self, path: &str, mode: u32) -> FsResult<()> {
        let mut state = self.state.lock();
        state
            .create_node(path, FileMode::new(FileKind::Regular, mode))?
            .put()
    }

    fn mkdir(&self, path: &str, mode: u32) -> FsResult<()> {
        let mut state = self.state.lock();
        state
            .create_node(path, FileMode::new(FileKind::Directory, mode))?
            .put()
    }

    fn rmdir(&self, path: &str) -> FsResult<()> {
        self.state.lock().remove_dir(path)
    }

    fn unlink(&self, path: &str) -> FsResult<()> {
        self.state.lock().remove_file(path)
    }

    fn supports_rename(&self) -> bool {
        true
    }

    fn rename(&self, old: &str, new: &str) -> FsResult<()> {
        self.state.lock().rename_node(old, new)
    }

    fn stat(&self, path: &str) -> FsResult<Metadata> {
        let state = self.state.lock();
        Ok(state.resolve_path(path)?.metadata())
    }

    fn statfs(&self) -> FsResult<FsStats> {
        Ok(self.state.lock().stats())
    }

    fn sync(&self) -> FsResult<()> {
        self.state.lock().flush()
    }

    fn unmount(&self) -> FsResult<()> {
        self.state.lock().unmount()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// OPEN FILE
// ═══════════════════════════════════════════════════════════════════════════════

/// An open SFS file or directory.
///
/// Changes to the inode are written through after every call, so several
/// files open on one inode always see each other's block pointers.
pub struct SfsFile {
    state: Arc<Mutex<SfsState>>,
    inode: InodeHandle,
    released: bool,
}

impl SfsFile {
    /// Write back and give up this file's hold on the inode, once
    fn release(&mut self, state: &mut SfsState) -> FsResult<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        let synced = self.inode.sync();
        let unpinned = state.unpin(self.inode.ino());
        synced.and(unpinned)
    }
}

impl FileOps for SfsFile {
    fn read(&mut self, buf: &mut [u8], offset: u64) -> FsResult<usize> {
        let state = self.state.lock();
        self.inode.reload()?;
        state.read_data(&self.inode, buf, offset)
    }

    fn write(&mut self, buf: &[u8], offset: u64) -> FsResult<usize> {
        let mut state = self.state.lock();
        self.inode.reload()?;
        let written = state.write_data(&mut self.inode, buf, offset);
        let synced = self.inode.sync();
        let n = written?;
        synced?;
        Ok(n)
    }

    fn truncate(&mut self, len: u64) -> FsResult<()> {
        let mut state = self.state.lock();
        self.inode.reload()?;
        let truncated = state.truncate(&mut self.inode, len);
        let synced = self.inode.sync();
        truncated.and(synced)
    }

    fn readdir(&mut self, index: usize, max: usize) -> FsResult<Vec<DirEntry>> {
        let state = self.state.lock();
        self.inode.reload()?;
        let mut entries = Vec::new();
        for (ino, name) in state.dir_entries(&self.inode)?.into_iter().skip(index).take(max) {
            let kind = state
                .get_inode(ino)?
                .kind()
                .unwrap_or(FileKind::Regular);
            entries.push(DirEntry { ino, kind, name });
        }
        Ok(entries)
    }

    fn metadata(&self) -> FsResult<Metadata> {
        let state = self.state.lock();
        if self.inode.is_dirty() {
            return Ok(self.inode.metadata());
        }
        Ok(state.get_inode(self.inode.ino())?.metadata())
    }

    fn sync(&mut self) -> FsResult<()> {
        let _state = self.state.lock();
        self.inode.sync()
    }

    fn close(mut self: Box<Self>) -> FsResult<()> {
        let shared = self.state.clone();
        let mut state = shared.lock();
        let release_result = self.release(&mut state);
        let device_result = state.device.sync().map_err(FsError::from);
        drop(state);
        release_result.and(device_result)
    }
}

impl Drop for SfsFile {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let shared = self.state.clone();
        let mut state = shared.lock();
        if let Err(e) = self.release(&mut state) {
            log::error!("sfs: failed to release inode {}: {}", self.inode.ino(), e);
        }
    }
}
