//! Device abstraction layer
//!
//! The storage layer only depends on block devices. Everything above this
//! module talks to storage through the [`BlockDevice`] trait, so the same
//! filesystem code runs on a RAM disk, a host disk image or real hardware.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                Filesystem Code                  │
//! │            (fs/vfs, fs/sfs, mkfs)               │
//! └───────────────────┬─────────────────────────────┘
//!                     │
//! ┌───────────────────┴─────────────────────────────┐
//! │        BlockDevice trait + DeviceRegistry       │
//! └───────────────────┬─────────────────────────────┘
//!                     │
//!         ┌───────────┴───────────┐
//!         │                       │
//!    ┌────┴────┐            ┌─────┴─────┐
//!    │ RamDisk │            │ disk image│
//!    └─────────┘            └───────────┘
//! ```

pub mod block;
pub mod ramdisk;
pub mod registry;

pub use block::{BlockDevice, BlockError};
pub use ramdisk::{BlockStats, RamDisk};
pub use registry::DeviceRegistry;

#[cfg(test)]
pub(crate) mod testing {
    //! Fault-injecting device used by allocator and error-path tests.

    use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    use super::{BlockDevice, BlockError, RamDisk};

    /// No block targeted by `fail_writes_to`
    const NO_BLOCK: u32 = u32::MAX;

    pub struct FaultyDisk {
        inner: RamDisk,
        failing_writes: AtomicU32,
        failing_reads: AtomicBool,
        failing_block: AtomicU32,
    }

    impl FaultyDisk {
        pub fn new(num_blocks: u32) -> Self {
            Self {
                inner: RamDisk::new("faulty0", num_blocks, crate::SFS_BLOCK_SIZE),
                failing_writes: AtomicU32::new(0),
                failing_reads: AtomicBool::new(false),
                failing_block: AtomicU32::new(NO_BLOCK),
            }
        }

        /// Make the next `count` writes fail
        pub fn fail_next_writes(&self, count: u32) {
            self.failing_writes.store(count, Ordering::SeqCst);
        }

        /// Make every write to `block` fail until cleared with `None`
        pub fn fail_writes_to(&self, block: Option<u32>) {
            self.failing_block
                .store(block.unwrap_or(NO_BLOCK), Ordering::SeqCst);
        }

        pub fn fail_reads(&self, fail: bool) {
            self.failing_reads.store(fail, Ordering::SeqCst);
        }
    }

    impl BlockDevice for FaultyDisk {
        fn name(&self) -> &str {
            self.inner.name()
        }

        fn block_size(&self) -> usize {
            self.inner.block_size()
        }

        fn num_blocks(&self) -> u32 {
            self.inner.num_blocks()
        }

        fn read_block(&self, block: u32, buf: &mut [u8]) -> Result<(), BlockError> {
            if self.failing_reads.load(Ordering::SeqCst) {
                return Err(BlockError::ReadFailed);
            }
            self.inner.read_block(block, buf)
        }

        fn write_block(&self, block: u32, buf: &[u8]) -> Result<(), BlockError> {
            if block == self.failing_block.load(Ordering::SeqCst) {
                return Err(BlockError::WriteFailed);
            }
            let remaining = self.failing_writes.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failing_writes.store(remaining - 1, Ordering::SeqCst);
                return Err(BlockError::WriteFailed);
            }
            self.inner.write_block(block, buf)
        }
    }
}
