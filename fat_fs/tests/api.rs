mod common;

use common::{formatted, FaultyDisk};
use fat_fs::{api, BlockDevice, FatFileSystem, FsError};
use std::sync::atomic::Ordering;
use std::sync::Arc;

// one test only: the mount point is shared by the whole process
#[test]
fn single_mount_point_lifecycle() {
    assert!(!api::is_mounted());
    assert_eq!(api::create("a"), Err(FsError::NotMounted));
    assert_eq!(api::unmount(), Err(FsError::NotMounted));

    let disk = formatted(10);
    api::mount(Arc::clone(&disk)).unwrap();
    assert_eq!(api::mount(formatted(10)), Err(FsError::AlreadyMounted));
    assert_eq!(api::mount(Arc::clone(&disk)), Err(FsError::AlreadyMounted));

    api::create("notes").unwrap();
    let h = api::open("notes").unwrap();
    assert_eq!(api::write(h, b"hello, disk").unwrap(), 11);
    assert_eq!(api::stat(h).unwrap(), 11);
    api::seek(h, 7).unwrap();
    assert_eq!(api::read(h, 100).unwrap(), b"disk");
    assert_eq!(api::read(h, 100).unwrap(), b"");
    assert_eq!(api::delete("notes"), Err(FsError::FileOpen));
    api::close(h).unwrap();
    assert_eq!(api::list().unwrap().len(), 1);
    assert_eq!(api::info().unwrap().fat_free, 6);
    api::unmount().unwrap();
    assert!(!api::is_mounted());

    // a failed write-back keeps the image mounted
    let faulty = Arc::new(FaultyDisk::new(10));
    let dev: Arc<dyn BlockDevice> = faulty.clone();
    FatFileSystem::format(&dev).unwrap();
    api::mount(dev).unwrap();
    faulty.fail_writes.store(true, Ordering::SeqCst);
    assert!(matches!(api::unmount(), Err(FsError::Io(_))));
    assert!(api::is_mounted());
    api::discard().unwrap();
    assert!(!api::is_mounted());

    api::mount(disk).unwrap();
    assert_eq!(api::list().unwrap()[0].size, 11);
    api::delete("notes").unwrap();
    api::unmount().unwrap();
}
