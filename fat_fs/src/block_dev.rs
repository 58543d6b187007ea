use crate::BLOCK_SIZE;
use alloc::vec;
use alloc::vec::Vec;
use core::any::Any;
use core::fmt;
use spin::Mutex;

/// Failure reported by a block device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoError {
    /// block id past the end of the device
    OutOfRange(usize),
    /// buffer is not exactly one block long
    BadLength(usize),
    /// device has already been closed
    Closed,
    /// backing storage refused the transfer
    Device,
}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IoError::OutOfRange(block_id) => write!(f, "block {} out of range", block_id),
            IoError::BadLength(len) => write!(f, "buffer of {} bytes is not one block", len),
            IoError::Closed => write!(f, "device closed"),
            IoError::Device => write!(f, "device transfer failed"),
        }
    }
}

/// API provided for the file system.
///
/// Buffers passed to `read_block`/`write_block` are always `BLOCK_SIZE` long.
pub trait BlockDevice: Send + Sync + Any {
    /// number of blocks on the device
    fn block_count(&self) -> u32;
    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<(), IoError>;
    fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<(), IoError>;
    /// release the backing storage; called once at unmount
    fn close(&self) -> Result<(), IoError> {
        Ok(())
    }
}

/// Block device kept entirely in memory.
pub struct RamDisk {
    blocks: Mutex<Vec<[u8; BLOCK_SIZE]>>,
}

impl RamDisk {
    pub fn new(block_count: u32) -> Self {
        Self {
            blocks: Mutex::new(vec![[0u8; BLOCK_SIZE]; block_count as usize]),
        }
    }

    fn check(&self, block_id: usize, len: usize) -> Result<(), IoError> {
        if len != BLOCK_SIZE {
            return Err(IoError::BadLength(len));
        }
        if block_id >= self.blocks.lock().len() {
            return Err(IoError::OutOfRange(block_id));
        }
        Ok(())
    }
}

impl BlockDevice for RamDisk {
    fn block_count(&self) -> u32 {
        self.blocks.lock().len() as u32
    }

    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<(), IoError> {
        self.check(block_id, buf.len())?;
        buf.copy_from_slice(&self.blocks.lock()[block_id]);
        Ok(())
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<(), IoError> {
        self.check(block_id, buf.len())?;
        self.blocks.lock()[block_id].copy_from_slice(buf);
        Ok(())
    }
}
