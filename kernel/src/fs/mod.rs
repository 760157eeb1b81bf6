//! Filesystem Module
//!
//! Virtual File System dispatch plus the filesystem implementations that
//! plug into it:
//!
//! - **SFS**: Simple File System on block devices (default root filesystem)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐
//! │     VFS     │  (type registry, mounts, open files)
//! └──────┬──────┘
//!        │  FileSystemType / FileSystem / FileOps
//! ┌──────▼──────┐
//! │     SFS     │  (bitmap, inodes, dirents, file data)
//! └──────┬──────┘
//!        │
//! ┌──────▼──────┐
//! │ BlockDevice │
//! └─────────────┘
//! ```

pub mod sfs;
pub mod vfs;

pub use sfs::{Sfs, SfsType};
pub use vfs::{FileOps, FileSystem, FileSystemType, Vfs};
