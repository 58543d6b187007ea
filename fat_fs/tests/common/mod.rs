#![allow(dead_code)]

use fat_fs::{BlockDevice, FatFileSystem, IoError, RamDisk};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// RamDisk whose transfers can be made to fail on demand.
pub struct FaultyDisk {
    inner: RamDisk,
    pub fail_reads: AtomicBool,
    pub fail_writes: AtomicBool,
    pub closed: AtomicUsize,
}

impl FaultyDisk {
    pub fn new(block_count: u32) -> Self {
        Self {
            inner: RamDisk::new(block_count),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            closed: AtomicUsize::new(0),
        }
    }
}

impl BlockDevice for FaultyDisk {
    fn block_count(&self) -> u32 {
        self.inner.block_count()
    }

    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<(), IoError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(IoError::Device);
        }
        self.inner.read_block(block_id, buf)
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<(), IoError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(IoError::Device);
        }
        self.inner.write_block(block_id, buf)
    }

    fn close(&self) -> Result<(), IoError> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn formatted(block_count: u32) -> Arc<dyn BlockDevice> {
    let disk: Arc<dyn BlockDevice> = Arc::new(RamDisk::new(block_count));
    FatFileSystem::format(&disk).unwrap();
    disk
}

pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i % 251) as u8 ^ seed)
        .collect()
}
