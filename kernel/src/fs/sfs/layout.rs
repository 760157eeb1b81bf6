//! SFS on-disk layout
//!
//! ```text
//! block 0                  superblock
//! 1 .. 1+B                 block bitmap    (B = ceil(total / 32768))
//! 1+B .. 1+B+I             inode table     (I = total / 8, 46 inodes per block)
//! 1+B+I .. total           data blocks     (first_data_block = 1 + B + I)
//! ```
//!
//! All integers are little-endian `u32` unless noted. Bitmap bit `n` lives in
//! byte `n / 8` at bit `n % 8` (LSB first).

use alloc::string::String;

use crate::error::{FsError, FsResult};

/// "SFS\0"
pub const SFS_MAGIC: u32 = 0x5346_5300;
pub const SFS_VERSION: u32 = 1;
pub const SFS_BLOCK_SIZE: usize = 4096;
pub const SFS_DIRECT_BLOCKS: usize = 12;
pub const SFS_MAX_NAME: usize = 255;
pub const ROOT_INODE: u32 = 1;
pub const SUPERBLOCK_BLOCK: u32 = 0;
pub const BITMAP_START: u32 = 1;
pub const DEFAULT_LABEL: &str = "MiniOS SFS";
pub const LABEL_LEN: usize = 32;

/// Smallest device `format` accepts
pub const MIN_BLOCKS: u32 = 16;

/// Bits tracked by one bitmap block
pub const BITS_PER_BLOCK: u32 = (SFS_BLOCK_SIZE * 8) as u32;

pub const INODE_SIZE: usize = 88;
pub const INODES_PER_BLOCK: u32 = (SFS_BLOCK_SIZE / INODE_SIZE) as u32;

pub const DIRENT_SIZE: usize = 264;
pub const DIRENTS_PER_BLOCK: usize = SFS_BLOCK_SIZE / DIRENT_SIZE;

/// Largest file the direct pointers can address
pub const MAX_FILE_SIZE: u64 = (SFS_DIRECT_BLOCKS * SFS_BLOCK_SIZE) as u64;

fn get_u32(buf: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

fn put_u32(buf: &mut [u8], off: usize, value: u32) {
    buf[off..off + 4].copy_from_slice(&value.to_le_bytes());
}

fn get_u16(buf: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([buf[off], buf[off + 1]])
}

fn put_u16(buf: &mut [u8], off: usize, value: u16) {
    buf[off..off + 2].copy_from_slice(&value.to_le_bytes());
}

// ═══════════════════════════════════════════════════════════════════════════════
// SUPERBLOCK
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Superblock {
    pub magic: u32,
    pub version: u32,
    pub block_size: u32,
    pub total_blocks: u32,
    pub inode_blocks: u32,
    pub data_blocks: u32,
    pub free_blocks: u32,
    pub free_inodes: u32,
    pub root_inode: u32,
    pub first_data_block: u32,
    pub bitmap_blocks: u32,
    pub created_time: u32,
    pub modified_time: u32,
    pub mount_count: u32,
    pub label: [u8; LABEL_LEN],
}

impl Superblock {
    /// Geometry for a fresh filesystem over `total_blocks` blocks
    pub fn new(total_blocks: u32, label: &str, now: u32) -> FsResult<Self> {
        if total_blocks < MIN_BLOCKS {
            return Err(FsError::InvalidArgument);
        }
        if label.len() >= LABEL_LEN {
            return Err(FsError::InvalidArgument);
        }
        let bitmap_blocks = total_blocks.div_ceil(BITS_PER_BLOCK);
        let inode_blocks = total_blocks / 8;
        let first_data_block = 1 + bitmap_blocks + inode_blocks;
        let data_blocks = total_blocks - first_data_block;

        let mut raw_label = [0u8; LABEL_LEN];
        raw_label[..label.len()].copy_from_slice(label.as_bytes());

        Ok(Self {
            magic: SFS_MAGIC,
            version: SFS_VERSION,
            block_size: SFS_BLOCK_SIZE as u32,
            total_blocks,
            inode_blocks,
            data_blocks,
            free_blocks: data_blocks,
            // Root inode is taken
            free_inodes: inode_blocks * INODES_PER_BLOCK - 1,
            root_inode: ROOT_INODE,
            first_data_block,
            bitmap_blocks,
            created_time: now,
            modified_time: now,
            mount_count: 0,
            label: raw_label,
        })
    }

    pub fn decode(buf: &[u8]) -> Self {
        let mut label = [0u8; LABEL_LEN];
        label.copy_from_slice(&buf[56..56 + LABEL_LEN]);
        Self {
            magic: get_u32(buf, 0),
            version: get_u32(buf, 4),
            block_size: get_u32(buf, 8),
            total_blocks: get_u32(buf, 12),
            inode_blocks: get_u32(buf, 16),
            data_blocks: get_u32(buf, 20),
            free_blocks: get_u32(buf, 24),
            free_inodes: get_u32(buf, 28),
            root_inode: get_u32(buf, 32),
            first_data_block: get_u32(buf, 36),
            bitmap_blocks: get_u32(buf, 40),
            created_time: get_u32(buf, 44),
            modified_time: get_u32(buf, 48),
            mount_count: get_u32(buf, 52),
            label,
        }
    }

    /// Serialize into the start of a block buffer; the rest is left untouched
    pub fn encode(&self, buf: &mut [u8]) {
        put_u32(buf, 0, self.magic);
        put_u32(buf, 4, self.version);
        put_u32(buf, 8, self.block_size);
        put_u32(buf, 12, self.total_blocks);
        put_u32(buf, 16, self.inode_blocks);
        put_u32(buf, 20, self.data_blocks);
        put_u32(buf, 24, self.free_blocks);
        put_u32(buf, 28, self.free_inodes);
        put_u32(buf, 32, self.root_inode);
        put_u32(buf, 36, self.first_data_block);
        put_u32(buf, 40, self.bitmap_blocks);
        put_u32(buf, 44, self.created_time);
        put_u32(buf, 48, self.modified_time);
        put_u32(buf, 52, self.mount_count);
        buf[56..56 + LABEL_LEN].copy_from_slice(&self.label);
    }

    /// Reject anything that is not a version-1 SFS with 4 KiB blocks that
    /// fits on a device of `device_blocks` blocks.
    pub fn validate(&self, device_blocks: u32) -> FsResult<()> {
        if self.magic != SFS_MAGIC {
            log::warn!("sfs: bad magic {:#010x}", self.magic);
            return Err(FsError::InvalidArgument);
        }
        if self.version != SFS_VERSION {
            log::warn!("sfs: unsupported version {}", self.version);
            return Err(FsError::InvalidArgument);
        }
        if self.block_size as usize != SFS_BLOCK_SIZE {
            log::warn!("sfs: unsupported block size {}", self.block_size);
            return Err(FsError::InvalidArgument);
        }
        let metadata_end = 1u64 + self.bitmap_blocks as u64 + self.inode_blocks as u64;
        if self.total_blocks > device_blocks
            || self.first_data_block as u64 != metadata_end
            || metadata_end > self.total_blocks as u64
            || (self.bitmap_blocks as u64) * (BITS_PER_BLOCK as u64) < self.total_blocks as u64
            || self.root_inode != ROOT_INODE
        {
            log::warn!("sfs: inconsistent superblock geometry");
            return Err(FsError::InvalidArgument);
        }
        Ok(())
    }

    pub fn inode_start(&self) -> u32 {
        BITMAP_START + self.bitmap_blocks
    }

    pub fn total_inodes(&self) -> u32 {
        self.inode_blocks * INODES_PER_BLOCK
    }

    /// Label up to the first NUL
    pub fn label(&self) -> String {
        let end = self.label.iter().position(|&b| b == 0).unwrap_or(LABEL_LEN);
        String::from_utf8_lossy(&self.label[..end]).into_owned()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// INODE
// ═══════════════════════════════════════════════════════════════════════════════

/// On-disk inode record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskInode {
    /// Type and permission bits; 0 marks a free slot
    pub mode: u32,
    pub size: u32,
    pub blocks: u32,
    pub direct: [u32; SFS_DIRECT_BLOCKS],
    /// Reserved; always 0
    pub indirect: u32,
    pub created: u32,
    pub modified: u32,
    pub accessed: u32,
    pub links: u32,
    pub flags: u32,
}

impl DiskInode {
    pub fn new(mode: u32, now: u32) -> Self {
        Self {
            mode,
            created: now,
            modified: now,
            accessed: now,
            links: 1,
            ..Self::default()
        }
    }

    pub fn is_free(&self) -> bool {
        self.mode == 0
    }

    /// Decode the record at byte `off` of an inode-table block
    pub fn decode(buf: &[u8], off: usize) -> Self {
        let rec = &buf[off..off + INODE_SIZE];
        let mut direct = [0u32; SFS_DIRECT_BLOCKS];
        for (i, slot) in direct.iter_mut().enumerate() {
            *slot = get_u32(rec, 12 + i * 4);
        }
        Self {
            mode: get_u32(rec, 0),
            size: get_u32(rec, 4),
            blocks: get_u32(rec, 8),
            direct,
            indirect: get_u32(rec, 60),
            created: get_u32(rec, 64),
            modified: get_u32(rec, 68),
            accessed: get_u32(rec, 72),
            links: get_u32(rec, 76),
            flags: get_u32(rec, 80),
        }
    }

    /// Encode the record at byte `off`, zeroing its reserved tail
    pub fn encode(&self, buf: &mut [u8], off: usize) {
        let rec = &mut buf[off..off + INODE_SIZE];
        put_u32(rec, 0, self.mode);
        put_u32(rec, 4, self.size);
        put_u32(rec, 8, self.blocks);
        for (i, ptr) in self.direct.iter().enumerate() {
            put_u32(rec, 12 + i * 4, *ptr);
        }
        put_u32(rec, 60, self.indirect);
        put_u32(rec, 64, self.created);
        put_u32(rec, 68, self.modified);
        put_u32(rec, 72, self.accessed);
        put_u32(rec, 76, self.links);
        put_u32(rec, 80, self.flags);
        rec[84..INODE_SIZE].fill(0);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DIRECTORY ENTRY
// ═══════════════════════════════════════════════════════════════════════════════

/// View of one directory-entry slot inside a directory block.
///
/// `inode | rec_len: u16 | name_len: u16 | name[255] | pad`
pub struct RawDirent<'a> {
    buf: &'a [u8],
}

impl<'a> RawDirent<'a> {
    /// Slot `index` of a directory block
    pub fn at(block: &'a [u8], index: usize) -> Self {
        let off = index * DIRENT_SIZE;
        Self {
            buf: &block[off..off + DIRENT_SIZE],
        }
    }

    pub fn inode(&self) -> u32 {
        get_u32(self.buf, 0)
    }

    pub fn is_free(&self) -> bool {
        self.inode() == 0
    }

    pub fn name(&self) -> &'a [u8] {
        let len = (get_u16(self.buf, 6) as usize).min(SFS_MAX_NAME);
        &self.buf[8..8 + len]
    }
}

/// Write an entry into slot `index` of a directory block
pub fn write_dirent(block: &mut [u8], index: usize, inode: u32, name: &[u8]) {
    let off = index * DIRENT_SIZE;
    let slot = &mut block[off..off + DIRENT_SIZE];
    slot.fill(0);
    put_u32(slot, 0, inode);
    put_u16(slot, 4, DIRENT_SIZE as u16);
    put_u16(slot, 6, name.len() as u16);
    slot[8..8 + name.len()].copy_from_slice(name);
}

/// Tombstone slot `index`: the whole slot is zeroed
pub fn clear_dirent(block: &mut [u8], index: usize) {
    let off = index * DIRENT_SIZE;
    block[off..off + DIRENT_SIZE].fill(0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_constants() {
        assert_eq!(INODES_PER_BLOCK, 46);
        assert_eq!(DIRENTS_PER_BLOCK, 15);
        assert_eq!(MAX_FILE_SIZE, 48 * 1024);
    }

    #[test]
    fn test_geometry_256_blocks() {
        let sb = Superblock::new(256, DEFAULT_LABEL, 0).unwrap();
        assert_eq!(sb.bitmap_blocks, 1);
        assert_eq!(sb.inode_blocks, 32);
        assert_eq!(sb.first_data_block, 34);
        assert_eq!(sb.data_blocks, 222);
        assert_eq!(sb.free_blocks, 222);
        assert_eq!(sb.free_inodes, 32 * 46 - 1);
        assert_eq!(sb.inode_start(), 2);
        assert!(sb.validate(256).is_ok());
    }

    #[test]
    fn test_geometry_multiple_bitmap_blocks() {
        let sb = Superblock::new(70_000, DEFAULT_LABEL, 0).unwrap();
        assert_eq!(sb.bitmap_blocks, 3);
        assert_eq!(sb.first_data_block, 1 + 3 + 8750);
    }

    #[test]
    fn test_superblock_rejects_bad_params() {
        assert_eq!(
            Superblock::new(MIN_BLOCKS - 1, DEFAULT_LABEL, 0),
            Err(FsError::InvalidArgument)
        );
        let long_label = "x".repeat(LABEL_LEN);
        assert_eq!(
            Superblock::new(256, &long_label, 0),
            Err(FsError::InvalidArgument)
        );
    }

    #[test]
    fn test_superblock_encoding() {
        let sb = Superblock::new(256, "disk", 7).unwrap();
        let mut block = vec![0u8; SFS_BLOCK_SIZE];
        sb.encode(&mut block);

        // Byte-exact offsets of the on-disk format
        assert_eq!(&block[0..4], &SFS_MAGIC.to_le_bytes());
        assert_eq!(get_u32(&block, 36), 34);
        assert_eq!(&block[56..60], b"disk");
        assert!(block[88..].iter().all(|&b| b == 0));

        let back = Superblock::decode(&block);
        assert_eq!(back, sb);
        assert_eq!(back.label(), "disk");
    }

    #[test]
    fn test_validate_rejects_foreign_data() {
        let mut sb = Superblock::new(256, DEFAULT_LABEL, 0).unwrap();
        assert_eq!(sb.validate(128), Err(FsError::InvalidArgument));
        sb.version = 2;
        assert_eq!(sb.validate(256), Err(FsError::InvalidArgument));
        sb.version = SFS_VERSION;
        sb.magic = 0;
        assert_eq!(sb.validate(256), Err(FsError::InvalidArgument));
    }

    #[test]
    fn test_inode_slot_encoding() {
        let mut block = vec![0xFFu8; SFS_BLOCK_SIZE];
        let mut inode = DiskInode::new(0x1000 | 0o644, 3);
        inode.size = 5000;
        inode.blocks = 2;
        inode.direct[0] = 40;
        inode.direct[1] = 41;
        inode.encode(&mut block, INODE_SIZE * 5);

        let back = DiskInode::decode(&block, INODE_SIZE * 5);
        assert_eq!(back, inode);
        assert_eq!(back.indirect, 0);
        assert_eq!(back.links, 1);
        // Neighbouring slots untouched
        assert_eq!(block[INODE_SIZE * 5 - 1], 0xFF);
        assert_eq!(block[INODE_SIZE * 6], 0xFF);
    }

    #[test]
    fn test_dirent_slots() {
        let mut block = vec![0u8; SFS_BLOCK_SIZE];
        write_dirent(&mut block, 14, 9, b"readme.txt");

        let entry = RawDirent::at(&block, 14);
        assert_eq!(entry.inode(), 9);
        assert_eq!(entry.name(), b"readme.txt");
        assert_eq!(get_u16(&block, 14 * DIRENT_SIZE + 4), DIRENT_SIZE as u16);
        assert!(RawDirent::at(&block, 13).is_free());

        clear_dirent(&mut block, 14);
        assert!(RawDirent::at(&block, 14).is_free());
        assert!(block.iter().all(|&b| b == 0));
    }
}
