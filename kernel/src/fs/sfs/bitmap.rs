//! Block allocator over the in-memory bitmap
//!
//! Every change is written through: the touched bitmap block and the
//! superblock's `free_blocks` counter are flushed before the call returns.

use super::layout::SFS_BLOCK_SIZE;
use super::volume::{block_buf, SfsState};
use crate::error::{FsError, FsResult};

impl SfsState {
    pub fn test_bit(&self, bit: u32) -> bool {
        let byte = (bit / 8) as usize;
        byte < self.bitmap.len() && (self.bitmap[byte] >> (bit % 8)) & 1 == 1
    }

    fn set_bit(&mut self, bit: u32) {
        self.bitmap[(bit / 8) as usize] |= 1 << (bit % 8);
    }

    fn clear_bit(&mut self, bit: u32) {
        self.bitmap[(bit / 8) as usize] &= !(1 << (bit % 8));
    }

    /// First clear bit in the data region
    fn find_free(&self) -> Option<u32> {
        let total = self.sb.total_blocks;
        let mut bit = self.sb.first_data_block;
        while bit < total {
            // Skip whole bytes that are full
            if bit % 8 == 0 && self.bitmap[(bit / 8) as usize] == 0xFF {
                bit += 8;
                continue;
            }
            if !self.test_bit(bit) {
                return Some(bit);
            }
            bit += 1;
        }
        None
    }

    /// Allocate one data block and zero it on disk.
    ///
    /// Returns `NoSpace` when the device is full. A failed bitmap or
    /// superblock flush rolls the allocation back.
    pub fn alloc_block(&mut self) -> FsResult<u32> {
        if self.is_read_only() {
            return Err(FsError::PermissionDenied);
        }
        let Some(block) = self.find_free() else {
            log::warn!("sfs: {} out of blocks", self.device.name());
            return Err(FsError::NoSpace);
        };

        self.set_bit(block);
        if let Err(e) = self.flush_bitmap_for(block) {
            self.clear_bit(block);
            log::error!("sfs: bitmap flush failed, rolled back block {}: {}", block, e);
            return Err(e);
        }

        let free_before = self.sb.free_blocks;
        self.sb.free_blocks = free_before.saturating_sub(1);
        if let Err(e) = self.flush_superblock() {
            self.sb.free_blocks = free_before;
            self.clear_bit(block);
            log::error!("sfs: superblock flush failed, rolled back block {}: {}", block, e);
            if let Err(bitmap_err) = self.flush_bitmap_for(block) {
                log::error!("sfs: bitmap still marks block {} used: {}", block, bitmap_err);
            }
            return Err(e);
        }

        let zeros = block_buf();
        if let Err(e) = self.write_block(block, &zeros) {
            log::error!("sfs: zero-fill of block {} failed: {}", block, e);
            if let Err(free_err) = self.free_block(block) {
                log::error!("sfs: leaked block {} after failed zero-fill: {}", block, free_err);
            }
            return Err(FsError::Io);
        }

        Ok(block)
    }

    /// Return a data block to the free pool.
    ///
    /// Metadata blocks, out-of-range blocks and already-free blocks are
    /// ignored.
    pub fn free_block(&mut self, block: u32) -> FsResult<()> {
        if block == 0
            || block < self.sb.first_data_block
            || block >= self.sb.total_blocks
            || !self.test_bit(block)
        {
            return Ok(());
        }

        self.clear_bit(block);
        if let Err(e) = self.flush_bitmap_for(block) {
            self.set_bit(block);
            return Err(e);
        }
        self.sb.free_blocks = (self.sb.free_blocks + 1).min(self.sb.data_blocks);
        self.flush_superblock()
    }

    /// Count set bits in the data region
    pub fn used_data_blocks(&self) -> u32 {
        (self.sb.first_data_block..self.sb.total_blocks)
            .filter(|&b| self.test_bit(b))
            .count() as u32
    }
}
