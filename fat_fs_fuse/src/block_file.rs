use fat_fs::{BlockDevice, IoError, BLOCK_SIZE};
use log::error;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Mutex;

/// Disk image on the host file system, one block every `BLOCK_SIZE` bytes.
pub struct BlockFile {
    file: Mutex<Option<File>>,
    block_count: u32,
}

impl BlockFile {
    /// Open an existing image; its length decides the block count.
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let block_count = (file.metadata()?.len() / BLOCK_SIZE as u64) as u32;
        Ok(Self {
            file: Mutex::new(Some(file)),
            block_count,
        })
    }

    /// Create (or resize) an image of `block_count` zeroed blocks.
    pub fn create(path: impl AsRef<Path>, block_count: u32) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(block_count as u64 * BLOCK_SIZE as u64)?;
        Ok(Self {
            file: Mutex::new(Some(file)),
            block_count,
        })
    }

    fn transfer(
        &self,
        block_id: usize,
        len: usize,
        op: impl FnOnce(&mut File) -> std::io::Result<()>,
    ) -> Result<(), IoError> {
        if len != BLOCK_SIZE {
            return Err(IoError::BadLength(len));
        }
        if block_id >= self.block_count as usize {
            return Err(IoError::OutOfRange(block_id));
        }
        let mut guard = self.file.lock().map_err(|_| IoError::Device)?;
        let file = guard.as_mut().ok_or(IoError::Closed)?;
        file.seek(SeekFrom::Start((block_id * BLOCK_SIZE) as u64))
            .and_then(|_| op(file))
            .map_err(|err| {
                error!("block {}: {}", block_id, err);
                IoError::Device
            })
    }
}

impl BlockDevice for BlockFile {
    fn block_count(&self) -> u32 {
        self.block_count
    }

    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<(), IoError> {
        self.transfer(block_id, buf.len(), |file| file.read_exact(buf))
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<(), IoError> {
        self.transfer(block_id, buf.len(), |file| file.write_all(buf))
    }

    fn close(&self) -> Result<(), IoError> {
        let mut guard = self.file.lock().map_err(|_| IoError::Device)?;
        let file = guard.as_ref().ok_or(IoError::Closed)?;
        file.sync_all().map_err(|err| {
            error!("sync on close: {}", err);
            IoError::Device
        })?;
        // dropping the handle closes it
        guard.take();
        Ok(())
    }
}
