//! Types shared between the VFS and filesystem implementations.

use alloc::string::String;
use bitflags::bitflags;

use crate::error::{FsError, FsResult};

bitflags! {
    /// Flags accepted by `Vfs::open`. Read-only is the empty set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OpenFlags: u32 {
        const WRONLY = 0x0001;
        const RDWR   = 0x0002;
        const CREAT  = 0x0100;
        const EXCL   = 0x0200;
        const TRUNC  = 0x1000;
        const APPEND = 0x2000;
    }
}

impl OpenFlags {
    pub const RDONLY: OpenFlags = OpenFlags::empty();

    pub fn readable(&self) -> bool {
        !self.contains(OpenFlags::WRONLY) || self.contains(OpenFlags::RDWR)
    }

    pub fn writable(&self) -> bool {
        self.intersects(OpenFlags::WRONLY | OpenFlags::RDWR)
    }
}

bitflags! {
    /// Flags passed to `Vfs::mount`
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MountFlags: u32 {
        const READ_ONLY = 0x0001;
    }
}

bitflags! {
    /// Inode mode: file type in the high nibble of the low 16 bits, permissions below.
    ///
    /// A mode of zero marks a free on-disk inode slot.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FileMode: u32 {
        const REGULAR   = 0x1000;
        const DIRECTORY = 0x4000;
        const SYMLINK   = 0x8000;
        const READ      = 0x0004;
        const WRITE     = 0x0002;
        const EXEC      = 0x0001;
    }
}

impl FileMode {
    pub const TYPE_MASK: u32 = 0xF000;
    pub const PERM_MASK: u32 = 0x0FFF;

    /// Default permissions for new directories and the root
    pub const DEFAULT_DIR: FileMode = FileMode::DIRECTORY
        .union(FileMode::READ)
        .union(FileMode::WRITE)
        .union(FileMode::EXEC);

    /// Build a mode from a type and caller-supplied permission bits
    pub fn new(kind: FileKind, perms: u32) -> Self {
        FileMode::from_bits_retain(kind.type_bits() | (perms & Self::PERM_MASK))
    }

    pub fn kind(&self) -> Option<FileKind> {
        FileKind::from_mode(self.bits())
    }

    pub fn permissions(&self) -> u32 {
        self.bits() & Self::PERM_MASK
    }
}

/// Type of a filesystem object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Regular,
    Directory,
    Symlink,
}

impl FileKind {
    pub fn type_bits(&self) -> u32 {
        match self {
            FileKind::Regular => FileMode::REGULAR.bits(),
            FileKind::Directory => FileMode::DIRECTORY.bits(),
            FileKind::Symlink => FileMode::SYMLINK.bits(),
        }
    }

    pub fn from_mode(mode: u32) -> Option<Self> {
        match mode & FileMode::TYPE_MASK {
            0x1000 => Some(FileKind::Regular),
            0x4000 => Some(FileKind::Directory),
            0x8000 => Some(FileKind::Symlink),
            _ => None,
        }
    }
}

/// Information about a file or directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metadata {
    pub ino: u32,
    pub kind: FileKind,
    /// Full mode word (type + permissions)
    pub mode: u32,
    pub size: u64,
    /// Data blocks allocated to the inode
    pub blocks: u32,
    pub created: u32,
    pub modified: u32,
    pub accessed: u32,
    pub links: u32,
}

impl Metadata {
    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == FileKind::Regular
    }
}

/// Entry returned by `readdir`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub ino: u32,
    pub kind: FileKind,
    pub name: String,
}

/// Filesystem-wide usage counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsStats {
    pub block_size: u32,
    pub total_blocks: u32,
    pub free_blocks: u32,
    pub total_inodes: u32,
    pub free_inodes: u32,
}

/// Seek origin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Set,
    Cur,
    End,
}

impl Whence {
    /// Decode the syscall-level constant (0 = SET, 1 = CUR, 2 = END)
    pub fn from_raw(raw: i32) -> FsResult<Self> {
        match raw {
            0 => Ok(Whence::Set),
            1 => Ok(Whence::Cur),
            2 => Ok(Whence::End),
            _ => Err(FsError::InvalidArgument),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_flags_access() {
        assert!(OpenFlags::RDONLY.readable());
        assert!(!OpenFlags::RDONLY.writable());
        assert!(!OpenFlags::WRONLY.readable());
        assert!(OpenFlags::WRONLY.writable());
        assert!(OpenFlags::RDWR.readable());
        assert!(OpenFlags::RDWR.writable());
        assert!((OpenFlags::CREAT | OpenFlags::RDWR).writable());
    }

    #[test]
    fn test_file_mode_kind() {
        let mode = FileMode::new(FileKind::Regular, 0o644);
        assert_eq!(mode.kind(), Some(FileKind::Regular));
        assert_eq!(mode.permissions(), 0o644);
        assert_eq!(mode.bits(), 0x1000 | 0o644);

        assert_eq!(FileMode::DEFAULT_DIR.kind(), Some(FileKind::Directory));
        assert_eq!(FileMode::from_bits_retain(0).kind(), None);
    }

    #[test]
    fn test_type_bits_cannot_leak_from_perms() {
        let mode = FileMode::new(FileKind::Regular, 0x4007);
        assert_eq!(mode.kind(), Some(FileKind::Regular));
        assert_eq!(mode.permissions(), 0x7);
    }

    #[test]
    fn test_whence_from_raw() {
        assert_eq!(Whence::from_raw(0), Ok(Whence::Set));
        assert_eq!(Whence::from_raw(2), Ok(Whence::End));
        assert_eq!(Whence::from_raw(3), Err(FsError::InvalidArgument));
    }
}
