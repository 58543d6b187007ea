use crate::afs::FatFileSystem;
use crate::{FileHandle, FsError, BLOCK_SIZE};
use log::{error, warn};

/// byte range transfers on top of the FAT chains
impl FatFileSystem {
    /// Read up to `buf.len()` bytes at the descriptor's offset.
    ///
    /// Never reads past end of file; returns 0 at end of file.
    pub fn read(&mut self, handle: FileHandle, buf: &mut [u8]) -> Result<usize, FsError> {
        let (slot, offset) = self.resolve(handle)?;
        let (size, first_block) = self
            .dir
            .entry(slot)
            .map(|file| (file.size, file.first_block))
            .ok_or(FsError::BadHandle)?;
        let count = buf.len().min(size.saturating_sub(offset));
        if count == 0 {
            return Ok(0);
        }

        let data_start = self.super_block.data_start_index as usize;
        // bytes to skip in the first block
        let mut lead = offset % BLOCK_SIZE;
        let blocks_touched = (count + lead).div_ceil(BLOCK_SIZE);
        let mut cur = self.fat.chain_block_at(first_block, offset / BLOCK_SIZE);
        let mut read_size = 0usize;
        for _ in 0..blocks_touched {
            let Some(block) = cur else {
                error!("chain of slot {} shorter than its size {}", slot, size);
                return Err(FsError::InvalidImage);
            };
            let block_id = data_start + block as usize;
            let block_read_size = (BLOCK_SIZE - lead).min(count - read_size);
            let dst = &mut buf[read_size..read_size + block_read_size];
            if block_read_size == BLOCK_SIZE {
                self.block_device.read_block(block_id, dst)?;
            } else {
                let mut bounce = [0u8; BLOCK_SIZE];
                self.block_device.read_block(block_id, &mut bounce)?;
                dst.copy_from_slice(&bounce[lead..lead + block_read_size]);
            }
            read_size += block_read_size;
            lead = 0;
            cur = self.fat.next(block);
        }

        self.fds.get_mut(handle)?.offset += read_size;
        Ok(read_size)
    }

    /// Write `buf` at the descriptor's offset, growing the file as needed.
    ///
    /// Returns fewer bytes than `buf.len()` when the disk fills up.
    pub fn write(&mut self, handle: FileHandle, buf: &[u8]) -> Result<usize, FsError> {
        let (slot, offset) = self.resolve(handle)?;
        if buf.is_empty() {
            return Ok(0);
        }
        let first_block = self
            .dir
            .entry(slot)
            .map(|file| file.first_block)
            .ok_or(FsError::BadHandle)?;

        let data_start = self.super_block.data_start_index as usize;
        let mut lead = offset % BLOCK_SIZE;
        let blocks_touched = (buf.len() + lead).div_ceil(BLOCK_SIZE);
        let skip = offset / BLOCK_SIZE;
        // `prev` is the block before `cur`; `cur` is None past the chain end
        let (mut prev, mut cur) = if skip == 0 {
            (None, first_block)
        } else {
            let prev = self.fat.chain_block_at(first_block, skip - 1);
            if prev.is_none() {
                error!("chain of slot {} shorter than offset {}", slot, offset);
                return Err(FsError::InvalidImage);
            }
            (prev, prev.and_then(|block| self.fat.next(block)))
        };

        let mut write_size = 0usize;
        for _ in 0..blocks_touched {
            let (block, fresh) = match cur {
                Some(block) => (block, false),
                None => {
                    let Some(new_block) = self.fat.allocate_one() else {
                        warn!("disk full after {} of {} bytes", write_size, buf.len());
                        break;
                    };
                    match prev {
                        Some(tail) => self.fat.link(tail, new_block),
                        None => {
                            if let Some(file) = self.dir.entry_mut(slot) {
                                file.first_block = Some(new_block);
                            }
                        }
                    }
                    (new_block, true)
                }
            };
            let block_id = data_start + block as usize;
            let block_write_size = (BLOCK_SIZE - lead).min(buf.len() - write_size);
            let src = &buf[write_size..write_size + block_write_size];
            if block_write_size == BLOCK_SIZE {
                self.block_device.write_block(block_id, src)?;
            } else {
                // merge with the bytes around the range; a fresh block has none
                let mut bounce = [0u8; BLOCK_SIZE];
                if !fresh {
                    self.block_device.read_block(block_id, &mut bounce)?;
                }
                bounce[lead..lead + block_write_size].copy_from_slice(src);
                self.block_device.write_block(block_id, &bounce)?;
            }
            write_size += block_write_size;
            lead = 0;
            prev = Some(block);
            cur = self.fat.next(block);
        }

        let fd = self.fds.get_mut(handle)?;
        fd.offset += write_size;
        let new_offset = fd.offset;
        if let Some(file) = self.dir.entry_mut(slot) {
            file.size = file.size.max(new_offset);
        }
        Ok(write_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BlockDevice, RamDisk};
    use alloc::sync::Arc;

    fn mounted(blocks: u32) -> FatFileSystem {
        let disk: Arc<dyn BlockDevice> = Arc::new(RamDisk::new(blocks));
        FatFileSystem::format(&disk).unwrap();
        FatFileSystem::mount(disk).unwrap()
    }

    #[test]
    fn partial_write_keeps_neighbouring_bytes() {
        let mut fs = mounted(10);
        fs.create("f").unwrap();
        let fd = fs.open("f").unwrap();
        assert_eq!(fs.write(fd, &[b'a'; 100]).unwrap(), 100);
        fs.seek(fd, 10).unwrap();
        assert_eq!(fs.write(fd, b"XYZ").unwrap(), 3);
        assert_eq!(fs.stat(fd).unwrap(), 100);
        assert_eq!(fs.tell(fd).unwrap(), 13);

        fs.seek(fd, 0).unwrap();
        let mut out = [0u8; 100];
        assert_eq!(fs.read(fd, &mut out).unwrap(), 100);
        assert_eq!(&out[..10], &[b'a'; 10]);
        assert_eq!(&out[10..13], b"XYZ");
        assert_eq!(&out[13..], &[b'a'; 87]);
    }

    #[test]
    fn append_at_block_boundary_links_new_block() {
        let mut fs = mounted(10);
        fs.create("f").unwrap();
        let fd = fs.open("f").unwrap();
        assert_eq!(fs.write(fd, &[1u8; BLOCK_SIZE]).unwrap(), BLOCK_SIZE);
        assert_eq!(fs.file_blocks("f").unwrap().len(), 1);
        assert_eq!(fs.write(fd, &[2u8; 10]).unwrap(), 10);
        assert_eq!(fs.file_blocks("f").unwrap().len(), 2);
        assert_eq!(fs.stat(fd).unwrap(), BLOCK_SIZE + 10);

        fs.seek(fd, BLOCK_SIZE - 2).unwrap();
        let mut out = [0u8; 4];
        assert_eq!(fs.read(fd, &mut out).unwrap(), 4);
        assert_eq!(out, [1, 1, 2, 2]);
    }

    #[test]
    fn zero_length_requests_are_no_ops() {
        let mut fs = mounted(10);
        fs.create("f").unwrap();
        let fd = fs.open("f").unwrap();
        assert_eq!(fs.write(fd, &[]).unwrap(), 0);
        assert_eq!(fs.read(fd, &mut []).unwrap(), 0);
        assert!(fs.file_blocks("f").unwrap().is_empty());
        assert_eq!(fs.list().next().unwrap().first_block, None);
    }

    #[test]
    fn closed_handle_is_rejected() {
        let mut fs = mounted(10);
        fs.create("f").unwrap();
        let fd = fs.open("f").unwrap();
        fs.close(fd).unwrap();
        assert_eq!(fs.write(fd, b"x"), Err(FsError::BadHandle));
        assert_eq!(fs.read(fd, &mut [0u8; 1]), Err(FsError::BadHandle));
    }
}
