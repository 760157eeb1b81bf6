//! RAM disk
//!
//! In-memory block device, zero-filled at creation. Used as the boot-time
//! scratch device and as the fixture for filesystem tests.

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};

use spin::Mutex;

use super::block::{check_request, BlockDevice, BlockError};

/// Per-device I/O counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockStats {
    pub reads: u64,
    pub writes: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
}

pub struct RamDisk {
    name: String,
    block_size: usize,
    num_blocks: u32,
    memory: Mutex<Vec<u8>>,
    reads: AtomicU64,
    writes: AtomicU64,
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
}

impl RamDisk {
    /// Create a zero-filled RAM disk of `num_blocks` blocks of `block_size` bytes
    pub fn new(name: &str, num_blocks: u32, block_size: usize) -> Self {
        log::debug!(
            "ramdisk: creating {} ({} blocks x {} bytes)",
            name,
            num_blocks,
            block_size
        );
        Self {
            name: String::from(name),
            block_size,
            num_blocks,
            memory: Mutex::new(vec![0u8; num_blocks as usize * block_size]),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            bytes_read: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
        }
    }

    /// Snapshot of the I/O counters
    pub fn stats(&self) -> BlockStats {
        BlockStats {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
        }
    }

    /// Copy of the raw device contents
    pub fn snapshot(&self) -> Vec<u8> {
        self.memory.lock().clone()
    }
}

impl BlockDevice for RamDisk {
    fn name(&self) -> &str {
        &self.name
    }

    fn block_size(&self) -> usize {
        self.block_size
    }

    fn num_blocks(&self) -> u32 {
        self.num_blocks
    }

    fn read_block(&self, block: u32, buf: &mut [u8]) -> Result<(), BlockError> {
        check_request(block, buf.len(), self.block_size, self.num_blocks)?;
        let start = block as usize * self.block_size;
        let memory = self.memory.lock();
        buf.copy_from_slice(&memory[start..start + self.block_size]);
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.bytes_read
            .fetch_add(self.block_size as u64, Ordering::Relaxed);
        Ok(())
    }

    fn write_block(&self, block: u32, buf: &[u8]) -> Result<(), BlockError> {
        check_request(block, buf.len(), self.block_size, self.num_blocks)?;
        let start = block as usize * self.block_size;
        let mut memory = self.memory.lock();
        memory[start..start + self.block_size].copy_from_slice(buf);
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.bytes_written
            .fetch_add(self.block_size as u64, Ordering::Relaxed);
        Ok(())
    }
}
