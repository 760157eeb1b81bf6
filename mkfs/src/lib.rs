// mkfs/src/lib.rs
//
// Host-side image builder for SFS disk images. The image is formatted and
// populated through the same VFS and SFS code the kernel runs, over a
// file-backed block device.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use minios_storage::fs::sfs::layout::{LABEL_LEN, MIN_BLOCKS, SFS_MAX_NAME};
use minios_storage::fs::sfs::MAX_FILE_SIZE;
use minios_storage::fs::vfs::path::join_path;
use minios_storage::{
    BlockDevice, BlockError, FsError, FsStats, MountFlags, OpenFlags, SfsType, Vfs,
    SFS_BLOCK_SIZE,
};

/// Device name the image is registered under while it is being built
const IMAGE_DEVICE: &str = "image0";

// ═══════════════════════════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug)]
pub enum MkfsError {
    /// Host file I/O failed
    Io(io::Error),
    /// The storage layer refused an operation on `path`
    Fs { path: String, err: FsError },
    /// Fewer than the minimum number of blocks requested
    TooSmall(u32),
    /// Label does not fit the superblock field
    LabelTooLong(usize),
}

impl fmt::Display for MkfsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MkfsError::Io(e) => write!(f, "{}", e),
            MkfsError::Fs { path, err } => write!(f, "{}: {}", path, err),
            MkfsError::TooSmall(blocks) => {
                write!(f, "{} blocks is too small (minimum {})", blocks, MIN_BLOCKS)
            }
            MkfsError::LabelTooLong(len) => {
                write!(f, "label is {} bytes (maximum {})", len, LABEL_LEN - 1)
            }
        }
    }
}

impl std::error::Error for MkfsError {}

impl From<io::Error> for MkfsError {
    fn from(err: io::Error) -> Self {
        MkfsError::Io(err)
    }
}

/// Attach the path an `FsError` came from
trait FsContext<T> {
    fn at(self, path: &str) -> Result<T, MkfsError>;
}

impl<T> FsContext<T> for Result<T, FsError> {
    fn at(self, path: &str) -> Result<T, MkfsError> {
        self.map_err(|err| MkfsError::Fs {
            path: path.to_string(),
            err,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// File-backed block device
// ═══════════════════════════════════════════════════════════════════════════════

/// Block device over a host disk image
pub struct FileDisk {
    name: String,
    file: Mutex<File>,
    num_blocks: u32,
}

impl FileDisk {
    /// Create (or truncate) `path` as a zeroed image of `num_blocks` blocks
    pub fn create(path: &Path, name: &str, num_blocks: u32) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(num_blocks as u64 * SFS_BLOCK_SIZE as u64)?;
        Ok(Self {
            name: name.to_string(),
            file: Mutex::new(file),
            num_blocks,
        })
    }

    /// Open an existing image; trailing bytes past the last whole block are ignored
    pub fn open(path: &Path, name: &str) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len();
        let num_blocks = u32::try_from(len / SFS_BLOCK_SIZE as u64)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "image too large"))?;
        Ok(Self {
            name: name.to_string(),
            file: Mutex::new(file),
            num_blocks,
        })
    }

    fn check(&self, block: u32, len: usize) -> Result<u64, BlockError> {
        if block >= self.num_blocks {
            return Err(BlockError::InvalidBlock);
        }
        if len != SFS_BLOCK_SIZE {
            return Err(BlockError::BufferSize);
        }
        Ok(block as u64 * SFS_BLOCK_SIZE as u64)
    }
}

impl BlockDevice for FileDisk {
    fn name(&self) -> &str {
        &self.name
    }

    fn block_size(&self) -> usize {
        SFS_BLOCK_SIZE
    }

    fn num_blocks(&self) -> u32 {
        self.num_blocks
    }

    fn read_block(&self, block: u32, buf: &mut [u8]) -> Result<(), BlockError> {
        let pos = self.check(block, buf.len())?;
        let mut file = self.file.lock().map_err(|_| BlockError::NotReady)?;
        file.seek(SeekFrom::Start(pos))
            .and_then(|_| file.read_exact(buf))
            .map_err(|_| BlockError::ReadFailed)
    }

    fn write_block(&self, block: u32, buf: &[u8]) -> Result<(), BlockError> {
        let pos = self.check(block, buf.len())?;
        let mut file = self.file.lock().map_err(|_| BlockError::NotReady)?;
        file.seek(SeekFrom::Start(pos))
            .and_then(|_| file.write_all(buf))
            .map_err(|_| BlockError::WriteFailed)
    }

    fn sync(&self) -> Result<(), BlockError> {
        let file = self.file.lock().map_err(|_| BlockError::NotReady)?;
        file.sync_data().map_err(|_| BlockError::WriteFailed)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Image builder
// ═══════════════════════════════════════════════════════════════════════════════

/// Seconds since the Unix epoch, saturating at `u32::MAX`
pub fn wall_clock() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().min(u32::MAX as u64) as u32)
        .unwrap_or(0)
}

pub struct ImageOptions {
    pub output: PathBuf,
    pub blocks: u32,
    pub label: String,
    /// Host directory copied into the image root
    pub source: Option<PathBuf>,
    /// Print one line per imported entry
    pub verbose: bool,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub files: usize,
    pub directories: usize,
    pub skipped: usize,
    pub bytes: u64,
}

/// Format a fresh image and optionally populate it from a host directory.
///
/// Returns what was imported and the final usage counters.
pub fn build_image(opts: &ImageOptions) -> Result<(ImportSummary, FsStats), MkfsError> {
    if opts.blocks < MIN_BLOCKS {
        return Err(MkfsError::TooSmall(opts.blocks));
    }
    if opts.label.len() >= LABEL_LEN {
        return Err(MkfsError::LabelTooLong(opts.label.len()));
    }

    let disk = FileDisk::create(&opts.output, IMAGE_DEVICE, opts.blocks)?;

    let mut vfs = Vfs::new();
    vfs.register_filesystem(Box::new(
        SfsType::new().with_clock(wall_clock).with_label(&opts.label),
    ))
    .at("sfs")?;
    vfs.register_device(Arc::new(disk)).at(IMAGE_DEVICE)?;
    vfs.format(IMAGE_DEVICE, "sfs").at(IMAGE_DEVICE)?;
    vfs.mount(Some(IMAGE_DEVICE), "/", "sfs", MountFlags::empty())
        .at("/")?;

    let mut summary = ImportSummary::default();
    if let Some(source) = &opts.source {
        import_tree(&mut vfs, source, "/", opts.verbose, &mut summary)?;
    }

    let stats = vfs.statfs("/").at("/")?;
    vfs.unmount("/").at("/")?;
    Ok((summary, stats))
}

/// Copy `host_dir` recursively into the image directory `image_dir`.
///
/// Entries the image cannot hold (oversized files, long or non-UTF-8
/// names, symlinks) are skipped with a warning.
fn import_tree(
    vfs: &mut Vfs,
    host_dir: &Path,
    image_dir: &str,
    verbose: bool,
    summary: &mut ImportSummary,
) -> Result<(), MkfsError> {
    let mut entries = fs::read_dir(host_dir)?.collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let host_path = entry.path();
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            log::warn!("skipping {:?}: name is not UTF-8", host_path);
            summary.skipped += 1;
            continue;
        };
        if name.len() > SFS_MAX_NAME {
            log::warn!("skipping {:?}: name longer than {} bytes", host_path, SFS_MAX_NAME);
            summary.skipped += 1;
            continue;
        }

        let path = join_path(image_dir, &name);
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            if verbose {
                println!("  📁 {}", path);
            }
            vfs.mkdir(&path, 0o755).at(&path)?;
            summary.directories += 1;
            import_tree(vfs, &host_path, &path, verbose, summary)?;
        } else if file_type.is_file() {
            let len = entry.metadata()?.len();
            if len > MAX_FILE_SIZE {
                log::warn!(
                    "skipping {:?}: {} bytes exceeds the {} byte file limit",
                    host_path,
                    len,
                    MAX_FILE_SIZE
                );
                summary.skipped += 1;
                continue;
            }
            if verbose {
                println!("  📄 {} ({} bytes)", path, len);
            }
            let data = fs::read(&host_path)?;
            import_file(vfs, &path, &data)?;
            summary.files += 1;
            summary.bytes += data.len() as u64;
        } else {
            log::warn!("skipping {:?}: not a regular file or directory", host_path);
            summary.skipped += 1;
        }
    }
    Ok(())
}

fn import_file(vfs: &mut Vfs, path: &str, data: &[u8]) -> Result<(), MkfsError> {
    let fd = vfs
        .open(path, OpenFlags::CREAT | OpenFlags::EXCL | OpenFlags::WRONLY, 0o644)
        .at(path)?;
    let written = vfs.write(fd, data);
    let closed = vfs.close(fd);
    let written = written.at(path)?;
    closed.at(path)?;
    if written != data.len() {
        return Err(MkfsError::Fs {
            path: path.to_string(),
            err: FsError::NoSpace,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use minios_storage::FileKind;
    use tempfile::TempDir;

    fn options(dir: &TempDir, source: Option<PathBuf>) -> ImageOptions {
        ImageOptions {
            output: dir.path().join("disk.img"),
            blocks: 256,
            label: "test image".to_string(),
            source,
            verbose: false,
        }
    }

    fn mount_image(path: &Path) -> Vfs {
        let mut vfs = Vfs::new();
        vfs.register_filesystem(Box::new(SfsType::new())).unwrap();
        vfs.register_device(Arc::new(FileDisk::open(path, "img").unwrap()))
            .unwrap();
        vfs.mount(Some("img"), "/", "sfs", MountFlags::READ_ONLY)
            .unwrap();
        vfs
    }

    fn read_back(vfs: &mut Vfs, path: &str) -> Vec<u8> {
        let fd = vfs.open(path, OpenFlags::RDONLY, 0).unwrap();
        let size = vfs.fstat(fd).unwrap().size as usize;
        let mut buf = vec![0u8; size];
        assert_eq!(vfs.read(fd, &mut buf).unwrap(), size);
        vfs.close(fd).unwrap();
        buf
    }

    #[test]
    fn test_empty_image() {
        let dir = TempDir::new().unwrap();
        let opts = options(&dir, None);
        let (summary, stats) = build_image(&opts).unwrap();
        assert_eq!(summary, ImportSummary::default());
        assert_eq!(stats.total_blocks, 256);
        assert_eq!(stats.free_blocks, 222);
        assert_eq!(
            fs::metadata(&opts.output).unwrap().len(),
            256 * SFS_BLOCK_SIZE as u64
        );

        let vfs = mount_image(&opts.output);
        assert!(vfs.stat("/").unwrap().is_dir());
    }

    #[test]
    fn test_imports_tree() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("rootfs");
        fs::create_dir_all(src.join("etc/init.d")).unwrap();
        fs::write(src.join("motd"), b"welcome\n").unwrap();
        fs::write(src.join("etc/init.d/rc"), b"start all\n").unwrap();
        fs::write(src.join("huge.bin"), vec![0u8; MAX_FILE_SIZE as usize + 1]).unwrap();
        let blob: Vec<u8> = (0..20_000u32).map(|i| (i % 253) as u8).collect();
        fs::write(src.join("etc/blob"), &blob).unwrap();

        let opts = options(&dir, Some(src));
        let (summary, _) = build_image(&opts).unwrap();
        assert_eq!(summary.files, 3);
        assert_eq!(summary.directories, 2);
        assert_eq!(summary.skipped, 1);

        let mut vfs = mount_image(&opts.output);
        assert_eq!(read_back(&mut vfs, "/motd"), b"welcome\n");
        assert_eq!(read_back(&mut vfs, "/etc/init.d/rc"), b"start all\n");
        assert_eq!(read_back(&mut vfs, "/etc/blob"), blob);
        assert_eq!(vfs.stat("/huge.bin"), Err(FsError::NotFound));

        let fd = vfs.open("/etc", OpenFlags::RDONLY, 0).unwrap();
        let entries = vfs.readdir(fd, 8).unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["blob", "init.d"]);
        assert_eq!(entries[1].kind, FileKind::Directory);
        vfs.close(fd).unwrap();
    }

    #[test]
    fn test_rejects_bad_parameters() {
        let dir = TempDir::new().unwrap();
        let mut opts = options(&dir, None);
        opts.blocks = MIN_BLOCKS - 1;
        assert!(matches!(build_image(&opts), Err(MkfsError::TooSmall(_))));

        opts.blocks = 64;
        opts.label = "x".repeat(LABEL_LEN);
        assert!(matches!(build_image(&opts), Err(MkfsError::LabelTooLong(32))));
        assert!(!opts.output.exists());
    }

    #[test]
    fn test_file_disk_bounds() {
        let dir = TempDir::new().unwrap();
        let disk = FileDisk::create(&dir.path().join("d.img"), "d", 4).unwrap();
        let mut buf = vec![0u8; SFS_BLOCK_SIZE];
        assert_eq!(disk.read_block(4, &mut buf), Err(BlockError::InvalidBlock));
        assert_eq!(disk.write_block(0, &buf[..10]), Err(BlockError::BufferSize));

        buf.fill(0xAB);
        disk.write_block(3, &buf).unwrap();
        let mut back = vec![0u8; SFS_BLOCK_SIZE];
        disk.read_block(3, &mut back).unwrap();
        assert_eq!(back, buf);
    }
}
