//! End-to-end tests through the VFS onto SFS volumes backed by RAM disks.

use std::sync::Arc;

use minios_storage::{
    BlockDevice, FileKind, FsError, MountFlags, OpenFlags, RamDisk, SfsType, Vfs, Whence,
    SFS_BLOCK_SIZE,
};

fn disk(name: &str, blocks: u32) -> Arc<RamDisk> {
    Arc::new(RamDisk::new(name, blocks, SFS_BLOCK_SIZE))
}

/// VFS with SFS registered and `ram0` formatted and mounted at `/`
fn booted() -> (Vfs, Arc<RamDisk>) {
    let mut vfs = Vfs::new();
    vfs.register_filesystem(Box::new(SfsType::new())).unwrap();
    let ram0 = disk("ram0", 256);
    vfs.register_device(ram0.clone()).unwrap();
    vfs.format("ram0", "sfs").unwrap();
    vfs.mount(Some("ram0"), "/", "sfs", MountFlags::empty())
        .unwrap();
    (vfs, ram0)
}

fn write_file(vfs: &mut Vfs, path: &str, data: &[u8]) {
    let fd = vfs
        .open(path, OpenFlags::CREAT | OpenFlags::WRONLY | OpenFlags::TRUNC, 0o644)
        .unwrap();
    assert_eq!(vfs.write(fd, data).unwrap(), data.len());
    vfs.close(fd).unwrap();
}

fn read_file(vfs: &mut Vfs, path: &str) -> Vec<u8> {
    let fd = vfs.open(path, OpenFlags::RDONLY, 0).unwrap();
    let mut out = Vec::new();
    let mut buf = [0u8; 1000];
    loop {
        let n = vfs.read(fd, &mut buf).unwrap();
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    vfs.close(fd).unwrap();
    out
}

#[test]
fn test_document_lifecycle() {
    let (mut vfs, _ram0) = booted();

    vfs.mkdir("/docs", 0o755).unwrap();
    let fd = vfs
        .open("/docs/readme.txt", OpenFlags::CREAT | OpenFlags::RDWR, 0o644)
        .unwrap();
    assert_eq!(vfs.write(fd, b"hello").unwrap(), 5);
    vfs.close(fd).unwrap();

    assert_eq!(read_file(&mut vfs, "/docs/readme.txt"), b"hello");
    assert_eq!(vfs.stat("/docs/readme.txt").unwrap().size, 5);

    let dir = vfs.open("/docs", OpenFlags::RDONLY, 0).unwrap();
    let entries = vfs.readdir(dir, 16).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "readme.txt");
    assert_eq!(entries[0].kind, FileKind::Regular);
    assert!(vfs.readdir(dir, 16).unwrap().is_empty());
    vfs.close(dir).unwrap();

    assert_eq!(vfs.rmdir("/docs"), Err(FsError::PermissionDenied));
    vfs.unlink("/docs/readme.txt").unwrap();
    vfs.rmdir("/docs").unwrap();
    assert_eq!(vfs.stat("/docs"), Err(FsError::NotFound));
}

#[test]
fn test_data_survives_remount() {
    let (mut vfs, ram0) = booted();
    vfs.mkdir("/etc", 0o755).unwrap();
    let config: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
    write_file(&mut vfs, "/etc/config", &config);
    let before = vfs.statfs("/").unwrap();
    vfs.unmount("/").unwrap();
    assert!(!vfs.has_root());

    // Fresh VFS over the same bytes
    let mut vfs = Vfs::new();
    vfs.register_filesystem(Box::new(SfsType::new())).unwrap();
    vfs.register_device(ram0).unwrap();
    vfs.mount(Some("ram0"), "/", "sfs", MountFlags::empty())
        .unwrap();

    assert_eq!(read_file(&mut vfs, "/etc/config"), config);
    assert_eq!(vfs.statfs("/").unwrap(), before);
}

#[test]
fn test_cross_mount_rename_copies() {
    let (mut vfs, _ram0) = booted();
    let ram1 = disk("ram1", 64);
    vfs.register_device(ram1).unwrap();
    vfs.format("ram1", "sfs").unwrap();
    vfs.mkdir("/mnt", 0o755).unwrap();
    vfs.mount(Some("ram1"), "/mnt", "sfs", MountFlags::empty())
        .unwrap();

    let payload = vec![0x5Au8; SFS_BLOCK_SIZE + 123];
    write_file(&mut vfs, "/notes", &payload);
    let root_free = vfs.statfs("/").unwrap().free_blocks;

    vfs.rename("/notes", "/mnt/notes").unwrap();
    assert_eq!(vfs.stat("/notes"), Err(FsError::NotFound));
    assert_eq!(read_file(&mut vfs, "/mnt/notes"), payload);
    assert_eq!(vfs.statfs("/").unwrap().free_blocks, root_free + 2);

    // Native rename inside the second volume keeps the inode
    let ino = vfs.stat("/mnt/notes").unwrap().ino;
    vfs.rename("/mnt/notes", "/mnt/renamed").unwrap();
    assert_eq!(vfs.stat("/mnt/renamed").unwrap().ino, ino);
}

#[test]
fn test_read_only_mount_and_format_guard() {
    let (mut vfs, _ram0) = booted();
    let ram1 = disk("ram1", 64);
    vfs.register_device(ram1.clone()).unwrap();
    vfs.format("ram1", "sfs").unwrap();

    vfs.mkdir("/ro", 0o755).unwrap();
    vfs.mount(Some("ram1"), "/ro", "sfs", MountFlags::READ_ONLY)
        .unwrap();
    let untouched = ram1.snapshot();

    assert_eq!(vfs.create("/ro/x", 0o644), Err(FsError::PermissionDenied));
    assert_eq!(
        vfs.open("/ro/x", OpenFlags::CREAT | OpenFlags::WRONLY, 0o644),
        Err(FsError::PermissionDenied)
    );
    let root = vfs.open("/ro", OpenFlags::RDONLY, 0).unwrap();
    assert!(vfs.readdir(root, 4).unwrap().is_empty());
    vfs.close(root).unwrap();

    assert_eq!(vfs.format("ram1", "sfs"), Err(FsError::PermissionDenied));
    vfs.unmount("/ro").unwrap();
    assert_eq!(ram1.snapshot(), untouched);
}

#[test]
fn test_append_and_seek() {
    let (mut vfs, _ram0) = booted();
    write_file(&mut vfs, "/log", b"one\n");

    let fd = vfs
        .open("/log", OpenFlags::WRONLY | OpenFlags::APPEND, 0)
        .unwrap();
    vfs.seek(fd, 0, Whence::Set).unwrap();
    vfs.write(fd, b"two\n").unwrap();
    vfs.close(fd).unwrap();
    assert_eq!(read_file(&mut vfs, "/log"), b"one\ntwo\n");

    let fd = vfs.open("/log", OpenFlags::RDONLY, 0).unwrap();
    assert_eq!(vfs.seek(fd, -4, Whence::End).unwrap(), 4);
    let mut buf = [0u8; 8];
    assert_eq!(vfs.read(fd, &mut buf).unwrap(), 4);
    assert_eq!(&buf[..4], b"two\n");
    assert_eq!(vfs.seek(fd, -100, Whence::Cur), Err(FsError::InvalidArgument));
    vfs.close(fd).unwrap();
}

#[test]
fn test_file_size_ceiling_through_vfs() {
    let (mut vfs, _ram0) = booted();
    let fd = vfs
        .open("/big", OpenFlags::CREAT | OpenFlags::WRONLY, 0o644)
        .unwrap();
    let data = vec![1u8; 13 * SFS_BLOCK_SIZE];
    assert_eq!(vfs.write(fd, &data).unwrap(), 12 * SFS_BLOCK_SIZE);
    assert_eq!(vfs.write(fd, b"more"), Err(FsError::NoSpace));
    vfs.close(fd).unwrap();
    assert_eq!(vfs.stat("/big").unwrap().size, 12 * SFS_BLOCK_SIZE as u64);
}

#[test]
fn test_two_descriptors_share_one_file() {
    let (mut vfs, _ram0) = booted();
    let free = vfs.statfs("/").unwrap().free_blocks;

    let a = vfs
        .open("/shared", OpenFlags::CREAT | OpenFlags::RDWR, 0o644)
        .unwrap();
    let b = vfs.open("/shared", OpenFlags::WRONLY | OpenFlags::APPEND, 0).unwrap();
    vfs.write(a, b"aaaa").unwrap();
    vfs.write(b, b"bb").unwrap();
    vfs.seek(a, 0, Whence::Set).unwrap();
    vfs.write(a, b"c").unwrap();
    vfs.close(a).unwrap();
    vfs.close(b).unwrap();
    assert_eq!(read_file(&mut vfs, "/shared"), b"caaabb");

    // Unlinked while still open: data stays readable until the last close
    let fd = vfs.open("/shared", OpenFlags::RDONLY, 0).unwrap();
    vfs.unlink("/shared").unwrap();
    let mut buf = [0u8; 8];
    assert_eq!(vfs.read(fd, &mut buf).unwrap(), 6);
    vfs.close(fd).unwrap();

    // Only the root directory's entry block remains in use
    assert_eq!(vfs.statfs("/").unwrap().free_blocks, free - 1);
}

#[test]
fn test_unformatted_device_does_not_mount() {
    let mut vfs = Vfs::new();
    vfs.register_filesystem(Box::new(SfsType::new())).unwrap();
    let blank: Arc<dyn BlockDevice> = disk("blank", 64);
    vfs.register_device(blank).unwrap();
    assert_eq!(
        vfs.mount(Some("blank"), "/", "sfs", MountFlags::empty()),
        Err(FsError::InvalidArgument)
    );
    assert!(!vfs.has_root());
}
