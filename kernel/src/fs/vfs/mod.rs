//! Virtual File System (VFS)
//!
//! Routes path-based operations to mounted filesystem instances and keeps the
//! global open-file table.
//!
//! ```text
//!   register_filesystem ─► types   [name → FileSystemType]      (MAX_FS_TYPES)
//!   mount ──────────────► mounts  [path → Box<dyn FileSystem>]  (MAX_MOUNTS)
//!   open ───────────────► files   [fd → OpenFile]               (MAX_OPEN_FILES)
//! ```
//!
//! Mount points are kept sorted by path length, longest first, so the first
//! prefix match is the owning mount. The filesystem receives the path with
//! the mount prefix stripped.

mod file;
pub mod path;
mod types;

pub use file::{FileOps, FileSystem, FileSystemType, OpenFile};
pub use path::{VFS_MAX_NAME, VFS_MAX_PATH};
pub use types::{DirEntry, FileKind, FileMode, FsStats, Metadata, MountFlags, OpenFlags, Whence};

use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use spin::Mutex;

use crate::device::{BlockDevice, DeviceRegistry};
use crate::error::{FsError, FsResult};

/// Maximum number of registered filesystem types
pub const MAX_FS_TYPES: usize = 16;

/// Maximum number of simultaneous mounts
pub const MAX_MOUNTS: usize = 16;

/// Size of the open-file table
pub const MAX_OPEN_FILES: usize = 32;

/// Chunk size for the generic cross-filesystem rename copy
const COPY_CHUNK: usize = 4096;

/// Mount table entry
struct MountPoint {
    id: u64,
    path: String,
    device: Option<String>,
    fs: Box<dyn FileSystem>,
    flags: MountFlags,
}

impl MountPoint {
    fn read_only(&self) -> bool {
        self.flags.contains(MountFlags::READ_ONLY)
    }

    fn check_writable(&self) -> FsResult<()> {
        if self.read_only() {
            return Err(FsError::PermissionDenied);
        }
        Ok(())
    }
}

/// Open-file slot; shared between descriptors after `dup`
type FileSlot = Arc<Mutex<OpenFile>>;

/// Virtual File System Router
pub struct Vfs {
    types: Vec<Box<dyn FileSystemType>>,
    /// Sorted by path length descending for longest-prefix matching
    mounts: Vec<MountPoint>,
    files: Vec<Option<FileSlot>>,
    devices: DeviceRegistry,
    next_mount_id: u64,
}

impl Default for Vfs {
    fn default() -> Self {
        Self::new()
    }
}

impl Vfs {
    /// Create an empty VFS with no types, mounts or devices
    pub const fn new() -> Self {
        Self {
            types: Vec::new(),
            mounts: Vec::new(),
            files: Vec::new(),
            devices: DeviceRegistry::new(),
            next_mount_id: 1,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Filesystem types and devices
    // ═══════════════════════════════════════════════════════════════════════════

    /// Register a filesystem type under its name
    pub fn register_filesystem(&mut self, fstype: Box<dyn FileSystemType>) -> FsResult<()> {
        if fstype.name().is_empty() {
            return Err(FsError::InvalidArgument);
        }
        if self.find_type(fstype.name()).is_some() {
            return Err(FsError::AlreadyExists);
        }
        if self.types.len() >= MAX_FS_TYPES {
            return Err(FsError::NoSpace);
        }
        log::info!("vfs: registered filesystem type {}", fstype.name());
        self.types.push(fstype);
        Ok(())
    }

    /// Remove a filesystem type; refused while any instance is mounted
    pub fn unregister_filesystem(&mut self, name: &str) -> FsResult<()> {
        let idx = self
            .types
            .iter()
            .position(|t| t.name() == name)
            .ok_or(FsError::NotFound)?;
        if self.mounts.iter().any(|m| m.fs.type_name() == name) {
            return Err(FsError::PermissionDenied);
        }
        self.types.remove(idx);
        log::info!("vfs: unregistered filesystem type {}", name);
        Ok(())
    }

    /// Names of registered filesystem types
    pub fn filesystem_types(&self) -> Vec<&str> {
        self.types.iter().map(|t| t.name()).collect()
    }

    fn find_type(&self, name: &str) -> Option<&dyn FileSystemType> {
        self.types
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    pub fn register_device(&mut self, device: Arc<dyn BlockDevice>) -> FsResult<()> {
        self.devices.register(device)
    }

    pub fn devices(&self) -> &DeviceRegistry {
        &self.devices
    }

    pub fn devices_mut(&mut self) -> &mut DeviceRegistry {
        &mut self.devices
    }

    /// Format the named device with the named filesystem type
    pub fn format(&self, device: &str, fstype: &str) -> FsResult<()> {
        let fstype = self.find_type(fstype).ok_or(FsError::NotFound)?;
        let dev = self.devices.find(device).ok_or(FsError::NotFound)?;
        if self.mounts.iter().any(|m| m.device.as_deref() == Some(device)) {
            return Err(FsError::PermissionDenied);
        }
        fstype.format(&dev)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Mount table
    // ═══════════════════════════════════════════════════════════════════════════

    /// Mount a filesystem
    ///
    /// # Arguments
    /// * `device` - Registered device name; `None` for in-memory types
    /// * `mountpoint` - Absolute path; `/` becomes the root mount
    /// * `fstype` - Registered filesystem type name
    /// * `flags` - Mount flags
    pub fn mount(
        &mut self,
        device: Option<&str>,
        mountpoint: &str,
        fstype: &str,
        flags: MountFlags,
    ) -> FsResult<()> {
        let mountpoint = path::normalize_path(mountpoint)?;
        if self.mounts.iter().any(|m| m.path == mountpoint) {
            return Err(FsError::AlreadyExists);
        }
        if self.mounts.len() >= MAX_MOUNTS {
            return Err(FsError::NoSpace);
        }
        if device.is_some() && self.mounts.iter().any(|m| m.device.as_deref() == device) {
            return Err(FsError::AlreadyExists);
        }

        let fstype = self.find_type(fstype).ok_or(FsError::NotFound)?;
        let dev = match device {
            Some(name) => Some(self.devices.find(name).ok_or(FsError::NotFound)?),
            None => None,
        };
        let fs = fstype.mount(dev, flags)?;

        log::info!(
            "vfs: mounted {} ({}) at {}{}",
            device.unwrap_or("none"),
            fs.type_name(),
            mountpoint,
            if flags.contains(MountFlags::READ_ONLY) { " [ro]" } else { "" }
        );

        let id = self.next_mount_id;
        self.next_mount_id += 1;
        self.mounts.push(MountPoint {
            id,
            path: mountpoint,
            device: device.map(String::from),
            fs,
            flags,
        });
        self.mounts.sort_by(|a, b| b.path.len().cmp(&a.path.len()));
        Ok(())
    }

    /// Unmount the filesystem at `mountpoint`
    ///
    /// Refused with `PermissionDenied` while open files reference it. The
    /// entry is removed even if the final flush fails.
    pub fn unmount(&mut self, mountpoint: &str) -> FsResult<()> {
        let mountpoint = path::normalize_path(mountpoint)?;
        let idx = self
            .mounts
            .iter()
            .position(|m| m.path == mountpoint)
            .ok_or(FsError::NotFound)?;

        let id = self.mounts[idx].id;
        let busy = self
            .files
            .iter()
            .flatten()
            .any(|f| f.lock().mount_id == id);
        if busy {
            log::warn!("vfs: {} busy, not unmounting", mountpoint);
            return Err(FsError::PermissionDenied);
        }

        let mount = self.mounts.remove(idx);
        let result = mount.fs.unmount();
        match &result {
            Ok(()) => log::info!("vfs: unmounted {}", mountpoint),
            Err(e) => log::error!("vfs: unmount of {} failed: {}", mountpoint, e),
        }
        result
    }

    /// Mount point paths, longest first
    pub fn list_mounts(&self) -> Vec<&str> {
        self.mounts.iter().map(|m| m.path.as_str()).collect()
    }

    /// Whether a filesystem is mounted at `/`
    pub fn has_root(&self) -> bool {
        self.mounts.iter().any(|m| m.path == "/")
    }

    /// Normalize `path` and find its owning mount plus the mount-relative path
    fn resolve(&self, path: &str) -> FsResult<(&MountPoint, String)> {
        let normalized = path::normalize_path(path)?;
        for mount in &self.mounts {
            if let Some(relative) = path::strip_mount(&normalized, &mount.path) {
                return Ok((mount, String::from(relative)));
            }
        }
        Err(FsError::NotFound)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Open-file table
    // ═══════════════════════════════════════════════════════════════════════════

    fn slot(&self, fd: usize) -> FsResult<FileSlot> {
        self.files
            .get(fd)
            .and_then(|s| s.clone())
            .ok_or(FsError::InvalidArgument)
    }

    fn free_slot(&mut self) -> FsResult<usize> {
        if let Some(fd) = self.files.iter().position(|s| s.is_none()) {
            return Ok(fd);
        }
        if self.files.len() < MAX_OPEN_FILES {
            self.files.push(None);
            return Ok(self.files.len() - 1);
        }
        Err(FsError::NoSpace)
    }

    /// Number of occupied descriptors
    pub fn open_count(&self) -> usize {
        self.files.iter().flatten().count()
    }

    /// Open `path` and return a descriptor
    pub fn open(&mut self, path: &str, flags: OpenFlags, mode: u32) -> FsResult<usize> {
        let fd = self.free_slot()?;
        let (mount, relative) = self.resolve(path)?;
        if flags.writable() || flags.intersects(OpenFlags::CREAT | OpenFlags::TRUNC) {
            mount.check_writable()?;
        }

        let ops = mount.fs.open(&relative, flags, mode)?;
        let file = OpenFile::new(ops, flags, mount.id, mount.read_only());
        log::debug!("vfs: open {} -> fd {}", path, fd);
        self.files[fd] = Some(Arc::new(Mutex::new(file)));
        Ok(fd)
    }

    /// Close a descriptor; the file is released with its last descriptor
    pub fn close(&mut self, fd: usize) -> FsResult<()> {
        let slot = self
            .files
            .get_mut(fd)
            .and_then(|s| s.take())
            .ok_or(FsError::InvalidArgument)?;
        log::debug!("vfs: close fd {}", fd);
        match Arc::try_unwrap(slot) {
            Ok(file) => file.into_inner().release(),
            Err(_) => Ok(()),
        }
    }

    /// Duplicate a descriptor; both share one position
    pub fn dup(&mut self, fd: usize) -> FsResult<usize> {
        let slot = self.slot(fd)?;
        let new_fd = self.free_slot()?;
        self.files[new_fd] = Some(slot);
        Ok(new_fd)
    }

    /// Read at the current position and advance it
    pub fn read(&self, fd: usize, buf: &mut [u8]) -> FsResult<usize> {
        let slot = self.slot(fd)?;
        let mut file = slot.lock();
        if !file.flags.readable() {
            return Err(FsError::PermissionDenied);
        }
        let position = file.position;
        let n = file.ops.read(buf, position)?;
        file.position += n as u64;
        Ok(n)
    }

    /// Write at the current position (end-of-file with `APPEND`) and advance it
    pub fn write(&self, fd: usize, buf: &[u8]) -> FsResult<usize> {
        let slot = self.slot(fd)?;
        let mut file = slot.lock();
        if file.read_only || !file.flags.writable() {
            return Err(FsError::PermissionDenied);
        }
        if file.flags.contains(OpenFlags::APPEND) {
            file.position = file.ops.metadata()?.size;
        }
        let position = file.position;
        let n = file.ops.write(buf, position)?;
        file.position += n as u64;
        Ok(n)
    }

    /// Move the position; returns the new position
    pub fn seek(&self, fd: usize, offset: i64, whence: Whence) -> FsResult<u64> {
        let slot = self.slot(fd)?;
        let mut file = slot.lock();
        let base = match whence {
            Whence::Set => 0,
            Whence::Cur => file.position as i64,
            Whence::End => file.ops.metadata()?.size as i64,
        };
        let target = base.checked_add(offset).ok_or(FsError::InvalidArgument)?;
        if target < 0 {
            return Err(FsError::InvalidArgument);
        }
        file.position = target as u64;
        Ok(file.position)
    }

    pub fn sync(&self, fd: usize) -> FsResult<()> {
        let slot = self.slot(fd)?;
        let mut file = slot.lock();
        file.ops.sync()
    }

    /// Truncate the file behind `fd` to `len` bytes and rewind it
    ///
    /// SFS only supports `len == 0`.
    pub fn ftruncate(&self, fd: usize, len: u64) -> FsResult<()> {
        let slot = self.slot(fd)?;
        let mut file = slot.lock();
        if file.read_only || !file.flags.writable() {
            return Err(FsError::PermissionDenied);
        }
        file.ops.truncate(len)?;
        file.position = file.position.min(len);
        Ok(())
    }

    /// Read up to `count` entries from a directory descriptor
    ///
    /// The position is the entry cursor; an empty result means the end.
    pub fn readdir(&self, fd: usize, count: usize) -> FsResult<Vec<DirEntry>> {
        let slot = self.slot(fd)?;
        let mut file = slot.lock();
        if count == 0 {
            return Ok(Vec::new());
        }
        let index = file.position as usize;
        let entries = file.ops.readdir(index, count)?;
        file.position += entries.len() as u64;
        Ok(entries)
    }

    pub fn fstat(&self, fd: usize) -> FsResult<Metadata> {
        let slot = self.slot(fd)?;
        let file = slot.lock();
        file.ops.metadata()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Path operations
    // ═══════════════════════════════════════════════════════════════════════════

    /// Create an empty regular file
    pub fn create(&self, path: &str, mode: u32) -> FsResult<()> {
        let (mount, relative) = self.resolve(path)?;
        mount.check_writable()?;
        mount.fs.create(&relative, mode)
    }

    pub fn mkdir(&self, path: &str, mode: u32) -> FsResult<()> {
        let (mount, relative) = self.resolve(path)?;
        mount.check_writable()?;
        mount.fs.mkdir(&relative, mode)
    }

    pub fn rmdir(&self, path: &str) -> FsResult<()> {
        let (mount, relative) = self.resolve(path)?;
        mount.check_writable()?;
        mount.fs.rmdir(&relative)
    }

    pub fn unlink(&self, path: &str) -> FsResult<()> {
        let (mount, relative) = self.resolve(path)?;
        mount.check_writable()?;
        mount.fs.unlink(&relative)
    }

    pub fn stat(&self, path: &str) -> FsResult<Metadata> {
        let (mount, relative) = self.resolve(path)?;
        mount.fs.stat(&relative)
    }

    /// Usage counters of the filesystem owning `path`
    pub fn statfs(&self, path: &str) -> FsResult<FsStats> {
        let (mount, _) = self.resolve(path)?;
        mount.fs.statfs()
    }

    /// Rename within a filesystem natively, otherwise copy then unlink
    pub fn rename(&self, old: &str, new: &str) -> FsResult<()> {
        let (src, src_rel) = self.resolve(old)?;
        let (dst, dst_rel) = self.resolve(new)?;
        src.check_writable()?;
        dst.check_writable()?;

        if src.id == dst.id && src.fs.supports_rename() {
            return src.fs.rename(&src_rel, &dst_rel);
        }
        log::debug!("vfs: rename {} -> {} by copy", old, new);
        copy_then_unlink(src.fs.as_ref(), &src_rel, dst.fs.as_ref(), &dst_rel)
    }

    /// Flush every mounted filesystem; returns the first error
    pub fn sync_all(&self) -> FsResult<()> {
        let mut result = Ok(());
        for mount in &self.mounts {
            if let Err(e) = mount.fs.sync() {
                log::error!("vfs: sync of {} failed: {}", mount.path, e);
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        result
    }
}

/// Generic rename for regular files across filesystem instances
fn copy_then_unlink(
    src: &dyn FileSystem,
    src_path: &str,
    dst: &dyn FileSystem,
    dst_path: &str,
) -> FsResult<()> {
    let meta = src.stat(src_path)?;
    if !meta.is_file() {
        return Err(FsError::PermissionDenied);
    }
    match dst.stat(dst_path) {
        Ok(_) => return Err(FsError::AlreadyExists),
        Err(FsError::NotFound) => {}
        Err(e) => return Err(e),
    }

    let mut reader = src.open(src_path, OpenFlags::RDONLY, 0)?;
    let mut writer = match dst.open(
        dst_path,
        OpenFlags::CREAT | OpenFlags::EXCL | OpenFlags::WRONLY,
        meta.mode & FileMode::PERM_MASK,
    ) {
        Ok(w) => w,
        Err(e) => {
            let _ = reader.close();
            return Err(e);
        }
    };

    let mut buf = vec![0u8; COPY_CHUNK];
    let mut offset = 0u64;
    let copied = loop {
        let n = match reader.read(&mut buf, offset) {
            Ok(0) => break Ok(()),
            Ok(n) => n,
            Err(e) => break Err(e),
        };
        match writer.write(&buf[..n], offset) {
            Ok(written) if written == n => offset += n as u64,
            Ok(_) => break Err(FsError::NoSpace),
            Err(e) => break Err(e),
        }
    };

    let writer_closed = writer.close();
    let reader_closed = reader.close();
    copied?;
    writer_closed?;
    reader_closed?;
    src.unlink(src_path)
}
