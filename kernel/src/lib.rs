//! MiniOS storage layer
//!
//! Virtual File System dispatch plus the on-disk Simple File System (SFS),
//! written against a synchronous block-device contract.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │   shell / loader     │  (path-based callers)
//! └──────────┬───────────┘
//!            │
//! ┌──────────▼───────────┐
//! │         VFS          │  (type registry, mount table, open-file table)
//! └──────────┬───────────┘
//!            │  FileSystem / FileOps trait objects
//!     ┌──────┴──────┐
//! ┌───▼───┐    ┌────▼────┐
//! │  SFS  │    │  other  │  (filesystem implementations)
//! └───┬───┘    └─────────┘
//!     │
//! ┌───▼──────────────────┐
//! │    BlockDevice       │  (RamDisk, disk image, MMC, ...)
//! └──────────────────────┘
//! ```
//!
//! The crate is `no_std` and only needs `alloc`. It logs through the `log`
//! facade and never installs a logger itself.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod device;
pub mod error;
pub mod fs;

pub use device::{BlockDevice, BlockError, DeviceRegistry, RamDisk};
pub use error::{FsError, FsResult};
pub use fs::sfs::{SfsType, SFS_BLOCK_SIZE};
pub use fs::vfs::{
    DirEntry, FileKind, FileMode, FileOps, FileSystem, FileSystemType, FsStats, Metadata,
    MountFlags, OpenFlags, Vfs, Whence,
};
