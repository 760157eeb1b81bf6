//! File data I/O over the 12 direct block pointers.
//!
//! Data blocks are written synchronously; the inode (size, block count,
//! timestamps) is only marked dirty and reaches disk on sync or release.
//! Files end at `MAX_FILE_SIZE`: a write that crosses it is cut short.

use super::inode::InodeHandle;
use super::layout::{MAX_FILE_SIZE, SFS_BLOCK_SIZE, SFS_DIRECT_BLOCKS};
use super::volume::{block_buf, SfsState};
use crate::error::{FsError, FsResult};

impl SfsState {
    /// Read from `offset` into `buf`; returns 0 at end-of-file
    pub fn read_data(&self, inode: &InodeHandle, buf: &mut [u8], offset: u64) -> FsResult<usize> {
        let size = inode.inode().size as u64;
        if offset >= size || buf.is_empty() {
            return Ok(0);
        }
        let count = buf.len().min((size - offset) as usize);

        let mut block_data = block_buf();
        let mut done = 0;
        while done < count {
            let pos = offset + done as u64;
            let index = (pos / SFS_BLOCK_SIZE as u64) as usize;
            if index >= SFS_DIRECT_BLOCKS {
                break;
            }
            let block = inode.inode().direct[index];
            if block == 0 {
                break;
            }

            let within = (pos % SFS_BLOCK_SIZE as u64) as usize;
            let chunk = (SFS_BLOCK_SIZE - within).min(count - done);
            self.read_block(block, &mut block_data)?;
            buf[done..done + chunk].copy_from_slice(&block_data[within..within + chunk]);
            done += chunk;
        }
        Ok(done)
    }

    /// Write `buf` at `offset`, allocating blocks on first touch.
    ///
    /// Returns the bytes written, which is short when the direct-block
    /// ceiling or the device runs out part way. `NoSpace` when nothing fits.
    pub fn write_data(&mut self, inode: &mut InodeHandle, buf: &[u8], offset: u64) -> FsResult<usize> {
        if self.is_read_only() || inode.is_dir() {
            return Err(FsError::PermissionDenied);
        }
        if buf.is_empty() {
            return Ok(0);
        }
        if offset >= MAX_FILE_SIZE {
            return Err(FsError::NoSpace);
        }

        // Blocks skipped over by a seek past end-of-file are allocated (and
        // therefore zeroed) so the file never has holes below its size
        let first = (offset / SFS_BLOCK_SIZE as u64) as usize;
        for index in 0..first {
            if inode.inode().direct[index] == 0 {
                self.attach_block(inode, index)?;
            }
        }

        let mut block_data = block_buf();
        let mut done = 0;
        let mut failure = None;
        while done < buf.len() {
            let pos = offset + done as u64;
            let index = (pos / SFS_BLOCK_SIZE as u64) as usize;
            if index >= SFS_DIRECT_BLOCKS {
                break;
            }
            let within = (pos % SFS_BLOCK_SIZE as u64) as usize;
            let chunk = (SFS_BLOCK_SIZE - within).min(buf.len() - done);

            let mut block = inode.inode().direct[index];
            let fresh = block == 0;
            if fresh {
                block = match self.attach_block(inode, index) {
                    Ok(b) => b,
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                };
            }

            if chunk < SFS_BLOCK_SIZE {
                if fresh {
                    block_data.fill(0);
                } else if let Err(e) = self.read_block(block, &mut block_data) {
                    failure = Some(e);
                    break;
                }
            }
            block_data[within..within + chunk].copy_from_slice(&buf[done..done + chunk]);
            if let Err(e) = self.write_block(block, &block_data) {
                failure = Some(e);
                break;
            }
            done += chunk;
        }

        if done == 0 {
            return Err(failure.unwrap_or(FsError::NoSpace));
        }

        let now = self.now();
        let disk = inode.inode_mut();
        let end = offset + done as u64;
        if end > disk.size as u64 {
            disk.size = end as u32;
        }
        disk.modified = now;
        Ok(done)
    }

    /// Allocate a zeroed block into direct slot `index`
    fn attach_block(&mut self, inode: &mut InodeHandle, index: usize) -> FsResult<u32> {
        let block = self.alloc_block()?;
        let disk = inode.inode_mut();
        disk.direct[index] = block;
        disk.blocks += 1;
        Ok(block)
    }

    /// Truncate to `len`; only 0 is supported
    pub fn truncate(&mut self, inode: &mut InodeHandle, len: u64) -> FsResult<()> {
        if self.is_read_only() || len != 0 || inode.is_dir() {
            return Err(FsError::PermissionDenied);
        }
        for index in 0..SFS_DIRECT_BLOCKS {
            let block = inode.inode().direct[index];
            if block != 0 {
                self.free_block(block)?;
                inode.inode_mut().direct[index] = 0;
            }
        }
        let now = self.now();
        let disk = inode.inode_mut();
        disk.size = 0;
        disk.blocks = 0;
        disk.modified = now;
        Ok(())
    }
}
