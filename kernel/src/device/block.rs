//! Block device abstraction
//!
//! Synchronous, fixed-size block I/O keyed by block number. Block numbers are
//! dense in `0..num_blocks()`; anything outside that range is rejected with
//! [`BlockError::InvalidBlock`], never clamped.

/// Block device error types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockError {
    /// Device not ready or not present
    NotReady,
    /// Block number outside `0..num_blocks`
    InvalidBlock,
    /// Read operation failed
    ReadFailed,
    /// Write operation failed
    WriteFailed,
    /// Buffer length is not a whole number of blocks
    BufferSize,
    /// Write attempted on a read-only device
    ReadOnly,
}

/// Block device trait
///
/// Implemented by storage device drivers (RAM disk, disk image, MMC, ...).
/// Calls never suspend; a failed call is not retried by the filesystem.
pub trait BlockDevice: Send + Sync {
    /// Registry name (e.g. "ram0")
    fn name(&self) -> &str;

    /// Block size in bytes
    fn block_size(&self) -> usize;

    /// Total number of blocks
    fn num_blocks(&self) -> u32;

    /// Read one block into `buf`
    ///
    /// # Arguments
    /// * `block` - Block number, `0..num_blocks()`
    /// * `buf` - Destination, exactly `block_size()` bytes
    fn read_block(&self, block: u32, buf: &mut [u8]) -> Result<(), BlockError>;

    /// Write one block from `buf` (exactly `block_size()` bytes)
    fn write_block(&self, block: u32, buf: &[u8]) -> Result<(), BlockError>;

    /// Read consecutive blocks starting at `start` into `buf`
    fn read_blocks(&self, start: u32, buf: &mut [u8]) -> Result<(), BlockError> {
        let bs = self.block_size();
        if bs == 0 || buf.len() % bs != 0 {
            return Err(BlockError::BufferSize);
        }
        for (i, chunk) in buf.chunks_mut(bs).enumerate() {
            let block = start.checked_add(i as u32).ok_or(BlockError::InvalidBlock)?;
            self.read_block(block, chunk)?;
        }
        Ok(())
    }

    /// Write consecutive blocks starting at `start` from `buf`
    fn write_blocks(&self, start: u32, buf: &[u8]) -> Result<(), BlockError> {
        let bs = self.block_size();
        if bs == 0 || buf.len() % bs != 0 {
            return Err(BlockError::BufferSize);
        }
        for (i, chunk) in buf.chunks(bs).enumerate() {
            let block = start.checked_add(i as u32).ok_or(BlockError::InvalidBlock)?;
            self.write_block(block, chunk)?;
        }
        Ok(())
    }

    /// Flush any cached writes to the device
    fn sync(&self) -> Result<(), BlockError> {
        Ok(())
    }

    /// Check if device is read-only
    fn is_read_only(&self) -> bool {
        false
    }

    /// Device capacity in bytes
    fn size_bytes(&self) -> u64 {
        self.num_blocks() as u64 * self.block_size() as u64
    }
}

/// Validate a single-block request against a device's geometry.
///
/// Shared by device implementations so every driver rejects the same inputs.
pub fn check_request(
    block: u32,
    buf_len: usize,
    block_size: usize,
    num_blocks: u32,
) -> Result<(), BlockError> {
    if block >= num_blocks {
        return Err(BlockError::InvalidBlock);
    }
    if buf_len != block_size {
        return Err(BlockError::BufferSize);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_request() {
        assert_eq!(check_request(0, 512, 512, 4), Ok(()));
        assert_eq!(check_request(3, 512, 512, 4), Ok(()));
        assert_eq!(check_request(4, 512, 512, 4), Err(BlockError::InvalidBlock));
        assert_eq!(check_request(1, 100, 512, 4), Err(BlockError::BufferSize));
    }
}
