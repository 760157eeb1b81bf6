//! VFS path handling
//!
//! Every path entering the VFS is reduced to one canonical absolute form
//! before mount routing: no empty components, no `.`, no `..`, no trailing
//! slash. All of it is lexical; nothing here touches a filesystem.

use alloc::string::String;
use alloc::vec::Vec;

use crate::error::{FsError, FsResult};

/// Maximum path length in bytes
pub const VFS_MAX_PATH: usize = 1024;

/// Maximum length of one path component in bytes
pub const VFS_MAX_NAME: usize = 255;

/// Canonical form of `path`.
///
/// # Arguments
/// * `path` - Absolute path of at most `VFS_MAX_PATH` bytes, without NUL
///
/// `..` is resolved against the components seen so far; climbing above `/`
/// is `InvalidArgument`, as is any component longer than `VFS_MAX_NAME`.
pub fn normalize_path(path: &str) -> FsResult<String> {
    if !path.starts_with('/') || path.len() > VFS_MAX_PATH || path.contains('\0') {
        return Err(FsError::InvalidArgument);
    }

    let mut stack: Vec<&str> = Vec::new();
    for component in path.split('/').filter(|c| !c.is_empty() && *c != ".") {
        if component == ".." {
            stack.pop().ok_or(FsError::InvalidArgument)?;
        } else if component.len() > VFS_MAX_NAME {
            return Err(FsError::InvalidArgument);
        } else {
            stack.push(component);
        }
    }

    if stack.is_empty() {
        return Ok(String::from("/"));
    }
    Ok(stack.iter().fold(String::with_capacity(path.len()), |mut out, c| {
        out.push('/');
        out.push_str(c);
        out
    }))
}

/// Path of `name` inside the directory `dir`
pub fn join_path(dir: &str, name: &str) -> String {
    let mut joined = String::from(dir.trim_end_matches('/'));
    joined.push('/');
    joined.push_str(name);
    joined
}

/// Path relative to `mount` (still absolute), or `None` when `path` lies
/// outside it. Both arguments must be canonical.
pub fn strip_mount<'a>(path: &'a str, mount: &str) -> Option<&'a str> {
    if mount == "/" {
        return Some(path);
    }
    match path.strip_prefix(mount)? {
        "" => Some("/"),
        rest if rest.starts_with('/') => Some(rest),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_rejects_malformed() {
        assert_eq!(normalize_path(""), Err(FsError::InvalidArgument));
        assert_eq!(normalize_path("relative"), Err(FsError::InvalidArgument));
        assert_eq!(normalize_path("/a\0b"), Err(FsError::InvalidArgument));
        assert_eq!(normalize_path("/.."), Err(FsError::InvalidArgument));
        assert_eq!(normalize_path("/a/../.."), Err(FsError::InvalidArgument));

        let long = alloc::format!("/{}", "a".repeat(VFS_MAX_PATH));
        assert_eq!(normalize_path(&long), Err(FsError::InvalidArgument));
        let long_name = alloc::format!("/{}", "n".repeat(VFS_MAX_NAME + 1));
        assert_eq!(normalize_path(&long_name), Err(FsError::InvalidArgument));
    }

    #[test]
    fn test_normalize_canonical_form() {
        assert_eq!(normalize_path("/").unwrap(), "/");
        assert_eq!(normalize_path("//.//").unwrap(), "/");
        assert_eq!(normalize_path("//docs///a/").unwrap(), "/docs/a");
        assert_eq!(normalize_path("/docs/./a").unwrap(), "/docs/a");
        assert_eq!(normalize_path("/a/b/c/../../d").unwrap(), "/a/d");
    }

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("/", "docs"), "/docs");
        assert_eq!(join_path("/docs", "a"), "/docs/a");
        assert_eq!(join_path("/docs/", "a"), "/docs/a");
    }

    #[test]
    fn test_strip_mount() {
        assert_eq!(strip_mount("/mnt/disk/a", "/mnt/disk"), Some("/a"));
        assert_eq!(strip_mount("/mnt/disk", "/mnt/disk"), Some("/"));
        assert_eq!(strip_mount("/mnt/diskette", "/mnt/disk"), None);
        assert_eq!(strip_mount("/other", "/mnt"), None);
        assert_eq!(strip_mount("/anything", "/"), Some("/anything"));
    }
}
