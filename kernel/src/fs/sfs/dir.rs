//! Directory engine
//!
//! A directory's data blocks hold 15 fixed-size entry slots each. A slot
//! with inode 0 is free. Removal tombstones the slot in place; blocks are
//! never compacted or released while the directory lives. The directory's
//! `size` is the number of live entries times `DIRENT_SIZE`.

use alloc::string::String;
use alloc::vec::Vec;

use super::inode::InodeHandle;
use super::layout::{
    clear_dirent, write_dirent, RawDirent, DIRENTS_PER_BLOCK, DIRENT_SIZE, SFS_DIRECT_BLOCKS,
    SFS_MAX_NAME,
};
use super::volume::{block_buf, SfsState};
use crate::error::{FsError, FsResult};

/// Location of an entry: direct-pointer index and slot within the block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SlotRef {
    block: u32,
    slot: usize,
}

/// Reject names that cannot be stored as a single component
pub fn check_name(name: &str) -> FsResult<()> {
    if name.is_empty() || name.len() > SFS_MAX_NAME || name == "." || name == ".." {
        return Err(FsError::InvalidArgument);
    }
    if name.contains('/') || name.contains('\0') {
        return Err(FsError::InvalidArgument);
    }
    Ok(())
}

impl SfsState {
    /// Visit live entries in on-disk order until `f` returns `Some`
    fn scan_dir<T>(
        &self,
        dir: &InodeHandle,
        mut f: impl FnMut(SlotRef, u32, &[u8]) -> Option<T>,
    ) -> FsResult<Option<T>> {
        let mut buf = block_buf();
        for &block in dir.inode().direct.iter().filter(|&&b| b != 0) {
            self.read_block(block, &mut buf)?;
            for slot in 0..DIRENTS_PER_BLOCK {
                let entry = RawDirent::at(&buf, slot);
                if entry.is_free() {
                    continue;
                }
                if let Some(found) = f(SlotRef { block, slot }, entry.inode(), entry.name()) {
                    return Ok(Some(found));
                }
            }
        }
        Ok(None)
    }

    fn find_entry(&self, dir: &InodeHandle, name: &str) -> FsResult<Option<(SlotRef, u32)>> {
        self.scan_dir(dir, |at, ino, entry_name| {
            (entry_name == name.as_bytes()).then_some((at, ino))
        })
    }

    /// First free slot in the directory's allocated blocks
    fn find_free_slot(&self, dir: &InodeHandle) -> FsResult<Option<SlotRef>> {
        let mut buf = block_buf();
        for &block in dir.inode().direct.iter().filter(|&&b| b != 0) {
            self.read_block(block, &mut buf)?;
            if let Some(slot) = (0..DIRENTS_PER_BLOCK).find(|&s| RawDirent::at(&buf, s).is_free()) {
                return Ok(Some(SlotRef { block, slot }));
            }
        }
        Ok(None)
    }

    /// Find `name` in `dir` and load its inode
    pub fn lookup(&self, dir: &InodeHandle, name: &str) -> FsResult<InodeHandle> {
        if !dir.is_dir() {
            return Err(FsError::NotFound);
        }
        match self.find_entry(dir, name)? {
            Some((_, ino)) => self.get_inode(ino),
            None => Err(FsError::NotFound),
        }
    }

    /// Insert `name -> ino`, growing the directory by one block if every
    /// slot is taken. The directory inode is synced before returning.
    pub fn add_dirent(&mut self, dir: &mut InodeHandle, name: &str, ino: u32) -> FsResult<()> {
        check_name(name)?;
        if !dir.is_dir() {
            return Err(FsError::InvalidArgument);
        }
        if ino == 0 {
            return Err(FsError::InvalidArgument);
        }
        if self.find_entry(dir, name)?.is_some() {
            return Err(FsError::AlreadyExists);
        }

        let mut buf = block_buf();
        match self.find_free_slot(dir)? {
            Some(at) => {
                self.read_block(at.block, &mut buf)?;
                write_dirent(&mut buf, at.slot, ino, name.as_bytes());
                self.write_block(at.block, &buf)?;
            }
            None => {
                let index = dir
                    .inode()
                    .direct
                    .iter()
                    .position(|&b| b == 0)
                    .ok_or(FsError::NoSpace)?;
                let block = self.alloc_block()?;
                // Committed before the entry lands; a failed write below
                // leaves the block attached but empty
                let inode = dir.inode_mut();
                inode.direct[index] = block;
                inode.blocks += 1;

                write_dirent(&mut buf, 0, ino, name.as_bytes());
                self.write_block(block, &buf)?;
            }
        }

        let now = self.now();
        let inode = dir.inode_mut();
        inode.size += DIRENT_SIZE as u32;
        inode.modified = now;
        dir.sync()
    }

    /// Tombstone the entry for `name`; returns the inode it pointed to
    pub fn remove_dirent(&mut self, dir: &mut InodeHandle, name: &str) -> FsResult<u32> {
        if !dir.is_dir() {
            return Err(FsError::InvalidArgument);
        }
        let (at, ino) = self.find_entry(dir, name)?.ok_or(FsError::NotFound)?;

        let mut buf = block_buf();
        self.read_block(at.block, &mut buf)?;
        clear_dirent(&mut buf, at.slot);
        self.write_block(at.block, &buf)?;

        let now = self.now();
        let inode = dir.inode_mut();
        inode.size = inode.size.saturating_sub(DIRENT_SIZE as u32);
        inode.modified = now;
        dir.sync()?;
        Ok(ino)
    }

    /// Live entries as `(inode, name)` in on-disk order
    pub fn dir_entries(&self, dir: &InodeHandle) -> FsResult<Vec<(u32, String)>> {
        if !dir.is_dir() {
            return Err(FsError::InvalidArgument);
        }
        let mut entries = Vec::new();
        self.scan_dir(dir, |_, ino, name| {
            entries.push((ino, String::from_utf8_lossy(name).into_owned()));
            None::<()>
        })?;
        Ok(entries)
    }

    pub fn dir_is_empty(&self, dir: &InodeHandle) -> FsResult<bool> {
        Ok(self.scan_dir(dir, |_, _, _| Some(()))?.is_none())
    }

    /// Release every data block of a directory being removed
    pub(super) fn release_dir_blocks(&mut self, dir: &mut InodeHandle) -> FsResult<()> {
        for index in 0..SFS_DIRECT_BLOCKS {
            let block = dir.inode().direct[index];
            if block != 0 {
                self.free_block(block)?;
                dir.inode_mut().direct[index] = 0;
            }
        }
        let inode = dir.inode_mut();
        inode.blocks = 0;
        inode.size = 0;
        Ok(())
    }
}
