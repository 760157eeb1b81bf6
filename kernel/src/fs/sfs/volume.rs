//! Mounted-volume state: superblock, in-memory bitmap, device I/O.
//!
//! `SfsState` is owned by one filesystem instance and mutated only through
//! its allocator and inode-store methods.

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use super::layout::{
    DiskInode, Superblock, BITMAP_START, ROOT_INODE, SFS_BLOCK_SIZE, SUPERBLOCK_BLOCK,
};
use crate::device::BlockDevice;
use crate::error::{FsError, FsResult};
use crate::fs::vfs::{FileMode, FsStats};

pub struct SfsState {
    pub(super) device: Arc<dyn BlockDevice>,
    pub(super) sb: Superblock,
    /// `bitmap_blocks * SFS_BLOCK_SIZE` bytes mirroring the on-disk bitmap
    pub(super) bitmap: Vec<u8>,
    /// Inodes held by open files, keyed by inode number
    pub(super) open: BTreeMap<u32, OpenInode>,
    clock: fn() -> u32,
    read_only: bool,
}

/// Open-file bookkeeping for one inode
#[derive(Debug, Default)]
pub(super) struct OpenInode {
    pub(super) count: usize,
    /// Unlinked while open; freed when `count` drops to zero
    pub(super) unlinked: bool,
}

/// Zeroed buffer of one block
pub(super) fn block_buf() -> Vec<u8> {
    vec![0u8; SFS_BLOCK_SIZE]
}

fn check_device(device: &Arc<dyn BlockDevice>) -> FsResult<()> {
    if device.block_size() != SFS_BLOCK_SIZE {
        log::warn!(
            "sfs: {} has {}-byte blocks, need {}",
            device.name(),
            device.block_size(),
            SFS_BLOCK_SIZE
        );
        return Err(FsError::InvalidArgument);
    }
    Ok(())
}

/// Write an empty SFS onto `device`
///
/// Lays down the superblock, a bitmap with every metadata block marked
/// used, a zeroed inode table and the root directory inode. Data blocks are
/// left as they are; the allocator zero-fills them on first use.
pub fn format(device: &Arc<dyn BlockDevice>, label: &str, now: u32) -> FsResult<Superblock> {
    check_device(device)?;
    let sb = Superblock::new(device.num_blocks(), label, now)?;

    log::info!(
        "sfs: formatting {} ({} blocks, {} inode blocks, first data block {})",
        device.name(),
        sb.total_blocks,
        sb.inode_blocks,
        sb.first_data_block
    );

    let mut buf = block_buf();
    sb.encode(&mut buf);
    device.write_block(SUPERBLOCK_BLOCK, &buf)?;

    // Bits 0..first_data_block are metadata
    for i in 0..sb.bitmap_blocks {
        buf.fill(0);
        let first_bit = i * SFS_BLOCK_SIZE as u32 * 8;
        for bit in first_bit..sb.first_data_block.min(first_bit + SFS_BLOCK_SIZE as u32 * 8) {
            let local = (bit - first_bit) as usize;
            buf[local / 8] |= 1 << (local % 8);
        }
        device.write_block(BITMAP_START + i, &buf)?;
    }

    for i in 0..sb.inode_blocks {
        buf.fill(0);
        if i == 0 {
            DiskInode::new(FileMode::DEFAULT_DIR.bits(), now).encode(&mut buf, 0);
        }
        device.write_block(sb.inode_start() + i, &buf)?;
    }

    device.sync()?;
    Ok(sb)
}

impl SfsState {
    /// Read and validate the superblock and load the bitmap
    pub fn mount(device: Arc<dyn BlockDevice>, clock: fn() -> u32, read_only: bool) -> FsResult<Self> {
        check_device(&device)?;

        let mut buf = block_buf();
        device.read_block(SUPERBLOCK_BLOCK, &mut buf)?;
        let sb = Superblock::decode(&buf);
        sb.validate(device.num_blocks())?;

        let mut bitmap = vec![0u8; sb.bitmap_blocks as usize * SFS_BLOCK_SIZE];
        for (i, chunk) in bitmap.chunks_mut(SFS_BLOCK_SIZE).enumerate() {
            device.read_block(BITMAP_START + i as u32, chunk)?;
        }

        let read_only = read_only || device.is_read_only();
        let mut state = Self {
            device,
            sb,
            bitmap,
            open: BTreeMap::new(),
            clock,
            read_only,
        };

        let root = state.get_inode(ROOT_INODE)?;
        if !root.is_dir() {
            log::warn!("sfs: root inode is not a directory");
            return Err(FsError::InvalidArgument);
        }
        drop(root);

        if !state.read_only {
            state.sb.mount_count = state.sb.mount_count.wrapping_add(1);
            state.write_superblock()?;
        }

        log::info!(
            "sfs: mounted {} \"{}\" ({} free blocks, {} free inodes, mount #{}){}",
            state.device.name(),
            state.sb.label(),
            state.sb.free_blocks,
            state.sb.free_inodes,
            state.sb.mount_count,
            if state.read_only { " [ro]" } else { "" }
        );
        Ok(state)
    }

    pub fn now(&self) -> u32 {
        (self.clock)()
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn superblock(&self) -> &Superblock {
        &self.sb
    }

    pub(super) fn read_block(&self, block: u32, buf: &mut [u8]) -> FsResult<()> {
        self.device.read_block(block, buf)?;
        Ok(())
    }

    pub(super) fn write_block(&self, block: u32, buf: &[u8]) -> FsResult<()> {
        if self.read_only {
            return Err(FsError::PermissionDenied);
        }
        self.device.write_block(block, buf)?;
        Ok(())
    }

    fn write_superblock(&self) -> FsResult<()> {
        let mut buf = block_buf();
        self.sb.encode(&mut buf);
        self.write_block(SUPERBLOCK_BLOCK, &buf)
    }

    /// Persist the superblock after an allocation-state change
    pub(super) fn flush_superblock(&mut self) -> FsResult<()> {
        self.sb.modified_time = self.now();
        self.write_superblock()
    }

    /// Persist the bitmap block holding bit `bit`
    pub(super) fn flush_bitmap_for(&self, bit: u32) -> FsResult<()> {
        let index = bit / (SFS_BLOCK_SIZE as u32 * 8);
        let start = index as usize * SFS_BLOCK_SIZE;
        self.write_block(BITMAP_START + index, &self.bitmap[start..start + SFS_BLOCK_SIZE])
    }

    /// Write back the superblock and every bitmap block, then sync the device
    pub fn flush(&mut self) -> FsResult<()> {
        if self.read_only {
            self.device.sync()?;
            return Ok(());
        }
        self.write_superblock()?;
        for (i, chunk) in self.bitmap.chunks(SFS_BLOCK_SIZE).enumerate() {
            self.write_block(BITMAP_START + i as u32, chunk)?;
        }
        self.device.sync()?;
        Ok(())
    }

    pub fn unmount(&mut self) -> FsResult<()> {
        let result = self.flush();
        log::info!("sfs: unmounted {}", self.device.name());
        result
    }

    pub fn stats(&self) -> FsStats {
        FsStats {
            block_size: self.sb.block_size,
            total_blocks: self.sb.total_blocks,
            free_blocks: self.sb.free_blocks,
            total_inodes: self.sb.total_inodes(),
            free_inodes: self.sb.free_inodes,
        }
    }
}
