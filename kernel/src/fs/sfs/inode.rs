//! Inode store
//!
//! Inode `n` (1-based) lives in inode-table block `(n - 1) / 46` at slot
//! `(n - 1) % 46`. An [`InodeHandle`] owns a cached copy of one record; a
//! dirty handle writes itself back when dropped, so every acquire is paired
//! with a release by construction.

use alloc::sync::Arc;

use super::layout::{DiskInode, INODES_PER_BLOCK, INODE_SIZE, ROOT_INODE};
use super::volume::{block_buf, SfsState};
use crate::device::BlockDevice;
use crate::error::{FsError, FsResult};
use crate::fs::vfs::{FileKind, FileMode, Metadata};

/// Cached in-memory inode
pub struct InodeHandle {
    device: Arc<dyn BlockDevice>,
    ino: u32,
    block: u32,
    offset: usize,
    inode: DiskInode,
    dirty: bool,
}

impl InodeHandle {
    pub fn ino(&self) -> u32 {
        self.ino
    }

    pub fn inode(&self) -> &DiskInode {
        &self.inode
    }

    /// Mutable access; marks the handle dirty
    pub fn inode_mut(&mut self) -> &mut DiskInode {
        self.dirty = true;
        &mut self.inode
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn kind(&self) -> Option<FileKind> {
        FileKind::from_mode(self.inode.mode)
    }

    pub fn is_dir(&self) -> bool {
        self.kind() == Some(FileKind::Directory)
    }

    pub fn metadata(&self) -> Metadata {
        Metadata {
            ino: self.ino,
            kind: self.kind().unwrap_or(FileKind::Regular),
            mode: self.inode.mode,
            size: self.inode.size as u64,
            blocks: self.inode.blocks,
            created: self.inode.created,
            modified: self.inode.modified,
            accessed: self.inode.accessed,
            links: self.inode.links,
        }
    }

    /// Write the cached record back if dirty (read-modify-write of its block)
    pub fn sync(&mut self) -> FsResult<()> {
        if !self.dirty {
            return Ok(());
        }
        let mut buf = block_buf();
        self.device.read_block(self.block, &mut buf)?;
        self.inode.encode(&mut buf, self.offset);
        self.device.write_block(self.block, &buf)?;
        self.dirty = false;
        Ok(())
    }

    /// Re-read a clean handle from disk
    pub fn reload(&mut self) -> FsResult<()> {
        if self.dirty {
            return Ok(());
        }
        let mut buf = block_buf();
        self.device.read_block(self.block, &mut buf)?;
        self.inode = DiskInode::decode(&buf, self.offset);
        Ok(())
    }

    /// Sync and release, reporting a failed write-back
    pub fn put(mut self) -> FsResult<()> {
        let result = self.sync();
        self.dirty = false;
        result
    }
}

impl Drop for InodeHandle {
    fn drop(&mut self) {
        if let Err(e) = self.sync() {
            log::error!("sfs: lost update to inode {}: {}", self.ino, e);
        }
    }
}

impl SfsState {
    /// Block and byte offset of inode `ino`
    fn inode_location(&self, ino: u32) -> FsResult<(u32, usize)> {
        if ino == 0 || ino > self.sb.total_inodes() {
            return Err(FsError::InvalidArgument);
        }
        let index = ino - 1;
        let block = self.sb.inode_start() + index / INODES_PER_BLOCK;
        let offset = (index % INODES_PER_BLOCK) as usize * INODE_SIZE;
        Ok((block, offset))
    }

    fn handle(&self, ino: u32, block: u32, offset: usize, inode: DiskInode) -> InodeHandle {
        InodeHandle {
            device: self.device.clone(),
            ino,
            block,
            offset,
            inode,
            dirty: false,
        }
    }

    /// Load an in-use inode; `NotFound` for a free slot
    pub fn get_inode(&self, ino: u32) -> FsResult<InodeHandle> {
        let (block, offset) = self.inode_location(ino)?;
        let mut buf = block_buf();
        self.read_block(block, &mut buf)?;
        let inode = DiskInode::decode(&buf, offset);
        if inode.is_free() {
            return Err(FsError::NotFound);
        }
        Ok(self.handle(ino, block, offset, inode))
    }

    /// Claim the first free inode slot and initialize it with `mode`
    pub fn alloc_inode(&mut self, mode: FileMode) -> FsResult<InodeHandle> {
        if self.is_read_only() {
            return Err(FsError::PermissionDenied);
        }
        if mode.bits() == 0 {
            return Err(FsError::InvalidArgument);
        }

        let start = self.sb.inode_start();
        let mut buf = block_buf();
        for i in 0..self.sb.inode_blocks {
            self.read_block(start + i, &mut buf)?;
            for slot in 0..INODES_PER_BLOCK {
                let offset = slot as usize * INODE_SIZE;
                if !DiskInode::decode(&buf, offset).is_free() {
                    continue;
                }
                let ino = i * INODES_PER_BLOCK + slot + 1;
                let inode = DiskInode::new(mode.bits(), self.now());
                inode.encode(&mut buf, offset);
                self.write_block(start + i, &buf)?;

                self.sb.free_inodes = self.sb.free_inodes.saturating_sub(1);
                self.flush_superblock()?;
                log::debug!("sfs: allocated inode {} (mode {:#06x})", ino, mode.bits());
                return Ok(self.handle(ino, start + i, offset, inode));
            }
        }

        log::warn!("sfs: {} out of inodes", self.device.name());
        Err(FsError::NoSpace)
    }

    /// Zero the inode's slot and release the handle without syncing it.
    ///
    /// Data blocks are not touched; the caller frees them first.
    pub fn free_inode(&mut self, mut handle: InodeHandle) -> FsResult<()> {
        if handle.ino == ROOT_INODE {
            return Err(FsError::PermissionDenied);
        }
        handle.dirty = false;

        let mut buf = block_buf();
        self.read_block(handle.block, &mut buf)?;
        DiskInode::default().encode(&mut buf, handle.offset);
        self.write_block(handle.block, &buf)?;

        self.sb.free_inodes = (self.sb.free_inodes + 1).min(self.sb.total_inodes());
        self.flush_superblock()?;
        log::debug!("sfs: freed inode {}", handle.ino);
        Ok(())
    }

    /// Release an unlinked inode's data blocks, then its slot
    pub(super) fn reclaim_inode(&mut self, mut node: InodeHandle) -> FsResult<()> {
        if node.is_dir() {
            self.release_dir_blocks(&mut node)?;
        } else {
            self.truncate(&mut node, 0)?;
        }
        self.free_inode(node)
    }

    /// Record one more open file on `ino`
    pub(super) fn pin(&mut self, ino: u32) {
        self.open.entry(ino).or_default().count += 1;
    }

    /// Drop one open file on `ino`; the last one reclaims an unlinked inode
    pub(super) fn unpin(&mut self, ino: u32) -> FsResult<()> {
        let Some(entry) = self.open.get_mut(&ino) else {
            return Ok(());
        };
        entry.count = entry.count.saturating_sub(1);
        if entry.count > 0 {
            return Ok(());
        }
        let unlinked = entry.unlinked;
        self.open.remove(&ino);
        if unlinked {
            log::debug!("sfs: last close of unlinked inode {}", ino);
            let node = self.get_inode(ino)?;
            self.reclaim_inode(node)?;
        }
        Ok(())
    }

    /// Mark an open inode for reclaim at its last close.
    ///
    /// Returns false when nothing holds it open.
    pub(super) fn defer_release(&mut self, ino: u32) -> bool {
        match self.open.get_mut(&ino) {
            Some(entry) => {
                entry.unlinked = true;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::RamDisk;
    use crate::fs::sfs::layout::SFS_BLOCK_SIZE;
    use crate::fs::sfs::volume::format;

    fn clock() -> u32 {
        42
    }

    fn mounted() -> SfsState {
        let dev: Arc<dyn BlockDevice> = Arc::new(RamDisk::new("ram0", 128, SFS_BLOCK_SIZE));
        format(&dev, "test", 0).unwrap();
        SfsState::mount(dev, clock, false).unwrap()
    }

    fn file_mode() -> FileMode {
        FileMode::new(FileKind::Regular, 0o644)
    }

    #[test]
    fn test_root_inode() {
        let state = mounted();
        let root = state.get_inode(ROOT_INODE).unwrap();
        assert!(root.is_dir());
        assert_eq!(root.inode().size, 0);
        assert_eq!(root.inode().links, 1);
        assert_eq!(state.get_inode(0).err(), Some(FsError::InvalidArgument));
        assert_eq!(state.get_inode(2).err(), Some(FsError::NotFound));
    }

    #[test]
    fn test_inode_location_crosses_blocks() {
        let state = mounted();
        let start = state.superblock().inode_start();
        assert_eq!(state.inode_location(1).unwrap(), (start, 0));
        assert_eq!(state.inode_location(46).unwrap(), (start, 45 * INODE_SIZE));
        assert_eq!(state.inode_location(47).unwrap(), (start + 1, 0));
        let last = state.superblock().total_inodes();
        assert!(state.inode_location(last).is_ok());
        assert_eq!(state.inode_location(last + 1), Err(FsError::InvalidArgument));
    }

    #[test]
    fn test_alloc_and_dirty_writeback() {
        let mut state = mounted();
        let free = state.superblock().free_inodes;

        let mut handle = state.alloc_inode(file_mode()).unwrap();
        let ino = handle.ino();
        assert_eq!(ino, 2);
        assert_eq!(handle.inode().created, 42);
        assert_eq!(state.superblock().free_inodes, free - 1);

        handle.inode_mut().size = 1234;
        assert!(handle.is_dirty());
        drop(handle);

        let again = state.get_inode(ino).unwrap();
        assert_eq!(again.inode().size, 1234);
        assert_eq!(again.metadata().kind, FileKind::Regular);
    }

    #[test]
    fn test_put_writes_back() {
        let mut state = mounted();
        let mut handle = state.alloc_inode(file_mode()).unwrap();
        let ino = handle.ino();
        handle.inode_mut().blocks = 3;
        handle.put().unwrap();
        assert_eq!(state.get_inode(ino).unwrap().inode().blocks, 3);
    }

    #[test]
    fn test_free_slot_is_reused_without_stale_mode() {
        let mut state = mounted();
        let mut handle = state.alloc_inode(file_mode()).unwrap();
        let ino = handle.ino();
        handle.inode_mut().size = 99;
        let free = state.superblock().free_inodes;

        // A dirty handle must not resurrect the freed slot
        state.free_inode(handle).unwrap();
        assert_eq!(state.superblock().free_inodes, free + 1);
        assert_eq!(state.get_inode(ino).err(), Some(FsError::NotFound));

        let reused = state
            .alloc_inode(FileMode::new(FileKind::Directory, 0o755))
            .unwrap();
        assert_eq!(reused.ino(), ino);
        assert!(reused.is_dir());
        assert_eq!(reused.inode().size, 0);
    }

    #[test]
    fn test_root_cannot_be_freed() {
        let mut state = mounted();
        let root = state.get_inode(ROOT_INODE).unwrap();
        assert_eq!(state.free_inode(root), Err(FsError::PermissionDenied));
    }

    #[test]
    fn test_inode_exhaustion() {
        let mut state = mounted();
        let total = state.superblock().total_inodes();
        for _ in 1..total {
            state.alloc_inode(file_mode()).unwrap();
        }
        assert_eq!(state.superblock().free_inodes, 0);
        assert_eq!(state.alloc_inode(file_mode()).err(), Some(FsError::NoSpace));
    }

    #[test]
    fn test_unlinked_inode_reclaimed_at_last_unpin() {
        let mut state = mounted();
        let free_inodes = state.superblock().free_inodes;
        let free_blocks = state.superblock().free_blocks;
        let mut node = state.alloc_inode(file_mode()).unwrap();
        state.write_data(&mut node, b"data", 0).unwrap();
        let ino = node.ino();
        node.put().unwrap();

        state.pin(ino);
        state.pin(ino);
        assert!(state.defer_release(ino));
        state.unpin(ino).unwrap();
        assert_eq!(state.get_inode(ino).unwrap().inode().size, 4);

        state.unpin(ino).unwrap();
        assert_eq!(state.get_inode(ino).err(), Some(FsError::NotFound));
        assert_eq!(state.superblock().free_inodes, free_inodes);
        assert_eq!(state.superblock().free_blocks, free_blocks);
        assert!(!state.defer_release(ino));
    }

    #[test]
    fn test_unpin_without_unlink_keeps_inode() {
        let mut state = mounted();
        let ino = state.alloc_inode(file_mode()).unwrap().ino();
        state.pin(ino);
        state.unpin(ino).unwrap();
        assert!(state.get_inode(ino).is_ok());
        assert!(!state.defer_release(ino));
    }

    #[test]
    fn test_reload_picks_up_other_handle() {
        let mut state = mounted();
        let handle = state.alloc_inode(file_mode()).unwrap();
        let ino = handle.ino();
        let mut reader = state.get_inode(ino).unwrap();

        let mut writer = handle;
        writer.inode_mut().size = 7;
        writer.put().unwrap();

        assert_eq!(reader.inode().size, 0);
        reader.reload().unwrap();
        assert_eq!(reader.inode().size, 7);
    }
}
