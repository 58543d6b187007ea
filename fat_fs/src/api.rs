//! Process-wide mount point.
//!
//! At most one image is mounted at a time; every call goes through the one
//! lock around the session.

use crate::{BlockDevice, FatFileSystem, FileHandle, FileStat, FsError, FsInfo};
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use lazy_static::lazy_static;
use spin::Mutex;

lazy_static! {
    static ref SESSION: Mutex<Option<FatFileSystem>> = Mutex::new(None);
}

fn with_session<T>(f: impl FnOnce(&mut FatFileSystem) -> Result<T, FsError>) -> Result<T, FsError> {
    let mut session = SESSION.lock();
    let fs = session.as_mut().ok_or(FsError::NotMounted)?;
    f(fs)
}

pub fn mount(block_device: Arc<dyn BlockDevice>) -> Result<(), FsError> {
    let mut session = SESSION.lock();
    if session.is_some() {
        return Err(FsError::AlreadyMounted);
    }
    *session = Some(FatFileSystem::mount(block_device)?);
    Ok(())
}

/// Write everything back and release the session. On failure the image
/// stays mounted.
pub fn unmount() -> Result<(), FsError> {
    let mut session = SESSION.lock();
    let fs = session.take().ok_or(FsError::NotMounted)?;
    fs.unmount().map_err(|(fs, err)| {
        *session = Some(fs);
        err
    })
}

/// Drop the session without writing anything back.
pub fn discard() -> Result<(), FsError> {
    SESSION.lock().take().map(|_| ()).ok_or(FsError::NotMounted)
}

pub fn is_mounted() -> bool {
    SESSION.lock().is_some()
}

pub fn info() -> Result<FsInfo, FsError> {
    with_session(|fs| Ok(fs.info()))
}

pub fn create(name: &str) -> Result<(), FsError> {
    with_session(|fs| fs.create(name))
}

pub fn delete(name: &str) -> Result<(), FsError> {
    with_session(|fs| fs.delete(name))
}

pub fn list() -> Result<Vec<FileStat>, FsError> {
    with_session(|fs| Ok(fs.list().collect()))
}

pub fn open(name: &str) -> Result<FileHandle, FsError> {
    with_session(|fs| fs.open(name))
}

pub fn close(handle: FileHandle) -> Result<(), FsError> {
    with_session(|fs| fs.close(handle))
}

pub fn stat(handle: FileHandle) -> Result<usize, FsError> {
    with_session(|fs| fs.stat(handle))
}

pub fn seek(handle: FileHandle, offset: usize) -> Result<(), FsError> {
    with_session(|fs| fs.seek(handle, offset))
}

pub fn write(handle: FileHandle, buf: &[u8]) -> Result<usize, FsError> {
    with_session(|fs| fs.write(handle, buf))
}

/// Read at most `max_len` bytes.
pub fn read(handle: FileHandle, max_len: usize) -> Result<Vec<u8>, FsError> {
    with_session(|fs| {
        let mut buf = vec![0u8; max_len.min(fs.stat(handle)?)];
        let len = fs.read(handle, &mut buf)?;
        buf.truncate(len);
        Ok(buf)
    })
}
