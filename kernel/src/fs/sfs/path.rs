//! Path resolution from the root inode.
//!
//! Exactly one directory handle is live during a walk: the next component's
//! handle replaces the current one, which is released on the spot.

use super::dir::check_name;
use super::inode::InodeHandle;
use super::layout::ROOT_INODE;
use super::volume::SfsState;
use crate::error::{FsError, FsResult};

/// Split into components, ignoring empty ones and `.`
fn components(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|c| !c.is_empty() && *c != ".")
}

impl SfsState {
    /// Walk `path` from the root
    pub fn resolve_path(&self, path: &str) -> FsResult<InodeHandle> {
        if !path.starts_with('/') {
            return Err(FsError::InvalidArgument);
        }
        let mut current = self.get_inode(ROOT_INODE)?;
        for name in components(path) {
            if name == ".." {
                return Err(FsError::InvalidArgument);
            }
            current = self.lookup(&current, name)?;
        }
        Ok(current)
    }

    /// Resolve the parent directory of `path` and return it with the final
    /// component. Fails on `/`, which has no parent.
    pub fn extract_parent<'p>(&self, path: &'p str) -> FsResult<(InodeHandle, &'p str)> {
        let trimmed = path.trim_end_matches('/');
        let (parent, name) = match trimmed.rfind('/') {
            Some(pos) => (&trimmed[..pos], &trimmed[pos + 1..]),
            None => return Err(FsError::InvalidArgument),
        };
        check_name(name)?;

        let dir = self.resolve_path(if parent.is_empty() { "/" } else { parent })?;
        if !dir.is_dir() {
            return Err(FsError::NotFound);
        }
        Ok((dir, name))
    }
}

/// Whether `path` names the filesystem root
pub fn is_root(path: &str) -> bool {
    components(path).next().is_none()
}
