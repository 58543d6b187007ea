use crate::descriptor::DescriptorTable;
use crate::directory::{check_name, Directory};
use crate::fat::{AllocationTable, BlockIndex};
use crate::layout::{SuperBlock, MAX_FILES};
use crate::{BlockDevice, FileHandle, FsError, BLOCK_SIZE};
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use log::{debug, info, warn};

/// superblock, fat, root directory, data
///
/// One mounted image. Superblock, FAT and directory live in memory between
/// `mount` and `unmount`; only data blocks are read and written in place.
pub struct FatFileSystem {
    pub(crate) block_device: Arc<dyn BlockDevice>,
    pub(crate) super_block: SuperBlock,
    pub(crate) fat: AllocationTable,
    pub(crate) dir: Directory,
    pub(crate) fds: DescriptorTable,
}

/// Layout and free space of a mounted image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsInfo {
    pub total_blocks: u16,
    pub fat_blocks: u8,
    pub root_dir_index: u16,
    pub data_start_index: u16,
    pub data_block_count: u16,
    pub fat_free: usize,
    pub dir_free: usize,
    pub max_files: usize,
}

impl fmt::Display for FsInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "FS Info:")?;
        writeln!(f, "total_blk_count={}", self.total_blocks)?;
        writeln!(f, "fat_blk_count={}", self.fat_blocks)?;
        writeln!(f, "rdir_blk={}", self.root_dir_index)?;
        writeln!(f, "data_blk={}", self.data_start_index)?;
        writeln!(f, "data_blk_count={}", self.data_block_count)?;
        writeln!(f, "fat_free_ratio={}/{}", self.fat_free, self.data_block_count)?;
        write!(f, "rdir_free_ratio={}/{}", self.dir_free, self.max_files)
    }
}

/// One line of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    pub name: String,
    pub size: usize,
    pub first_block: Option<BlockIndex>,
}

impl fmt::Display for FileStat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "file: {}, size: {}, data_blk: {}",
            self.name,
            self.size,
            self.first_block.unwrap_or(u16::MAX)
        )
    }
}

impl FatFileSystem {
    /// Write an empty file system onto the whole device.
    pub fn format(block_device: &Arc<dyn BlockDevice>) -> Result<(), FsError> {
        let total_blocks = block_device.block_count();
        let super_block = SuperBlock::for_block_count(total_blocks).ok_or_else(|| {
            warn!("cannot format a device of {} blocks", total_blocks);
            FsError::InvalidImage
        })?;
        let mut block = [0u8; BLOCK_SIZE];
        super_block.encode(&mut block);
        block_device.write_block(0, &block)?;
        AllocationTable::new(&super_block).store(&super_block, block_device)?;
        Directory::new().store(super_block.root_dir_index as usize, block_device)?;
        info!(
            "formatted {} blocks: {} fat, {} data",
            total_blocks, super_block.fat_blocks, super_block.data_block_count
        );
        Ok(())
    }

    /// Validate the superblock and load FAT and directory into memory.
    ///
    /// Nothing stops a second session on the same device; sessions do not
    /// see each other and the last unmount wins. [`crate::api::mount`] is
    /// the process-wide mount point that refuses a second mount.
    pub fn mount(block_device: Arc<dyn BlockDevice>) -> Result<Self, FsError> {
        let mut block = [0u8; BLOCK_SIZE];
        block_device.read_block(0, &mut block)?;
        let super_block = SuperBlock::decode(&block).ok_or_else(|| {
            warn!("bad signature");
            FsError::InvalidImage
        })?;
        let total_blocks = block_device.block_count();
        if super_block.total_blocks as u32 != total_blocks {
            warn!(
                "superblock claims {} blocks, device has {}",
                super_block.total_blocks, total_blocks
            );
            return Err(FsError::InvalidImage);
        }
        if SuperBlock::for_block_count(total_blocks) != Some(super_block) {
            warn!("inconsistent layout {:?}", super_block);
            return Err(FsError::InvalidImage);
        }

        let fat = AllocationTable::load(&super_block, &block_device)?;
        let dir = Directory::load(super_block.root_dir_index as usize, &block_device)?;
        let data_blocks = fat.data_blocks();
        if dir
            .iter()
            .any(|file| file.first_block.is_some_and(|b| b as usize >= data_blocks))
        {
            warn!("directory points outside of the data region");
            return Err(FsError::InvalidImage);
        }
        info!(
            "mounted {} blocks, {} of {} data blocks free",
            total_blocks,
            fat.free_count(),
            data_blocks
        );
        Ok(Self {
            block_device,
            super_block,
            fat,
            dir,
            fds: DescriptorTable::new(),
        })
    }

    /// Write superblock, FAT and directory back to the device.
    pub fn flush(&self) -> Result<(), FsError> {
        let mut block = [0u8; BLOCK_SIZE];
        self.super_block.encode(&mut block);
        self.block_device.write_block(0, &block)?;
        self.fat.store(&self.super_block, &self.block_device)?;
        self.dir
            .store(self.super_block.root_dir_index as usize, &self.block_device)
    }

    /// Flush metadata and close the device.
    ///
    /// On failure the session is handed back untouched so the caller may
    /// retry or drop it.
    pub fn unmount(self) -> Result<(), (Self, FsError)> {
        if let Err(err) = self.flush() {
            warn!("unmount failed: {}", err);
            return Err((self, err));
        }
        if let Err(err) = self.block_device.close() {
            warn!("closing device failed: {}", err);
            return Err((self, err.into()));
        }
        info!("unmounted");
        Ok(())
    }

    pub fn info(&self) -> FsInfo {
        let sb = &self.super_block;
        FsInfo {
            total_blocks: sb.total_blocks,
            fat_blocks: sb.fat_blocks,
            root_dir_index: sb.root_dir_index,
            data_start_index: sb.data_start_index,
            data_block_count: sb.data_block_count,
            fat_free: self.fat.free_count(),
            dir_free: self.dir.free_count(),
            max_files: MAX_FILES,
        }
    }

    /// Create an empty file. No block is taken until the first write, but
    /// creation still fails with `DiskFull` when no block is left.
    pub fn create(&mut self, name: &str) -> Result<(), FsError> {
        check_name(name)?;
        if self.dir.find_by_name(name).is_some() {
            return Err(FsError::AlreadyExists);
        }
        if self.dir.allocate_slot().is_none() {
            return Err(FsError::DirectoryFull);
        }
        if self.fat.free_count() == 0 {
            return Err(FsError::DiskFull);
        }
        let slot = self.dir.insert(name)?;
        debug!("create {} in slot {}", name, slot);
        Ok(())
    }

    pub fn delete(&mut self, name: &str) -> Result<(), FsError> {
        let slot = self.dir.find_by_name(name).ok_or(FsError::NotFound)?;
        if self.fds.is_open(name) {
            return Err(FsError::FileOpen);
        }
        if let Some(file) = self.dir.remove(slot) {
            self.fat.release_chain(file.first_block);
        }
        debug!("delete {}", name);
        Ok(())
    }

    /// Occupied directory entries in table order.
    pub fn list(&self) -> impl Iterator<Item = FileStat> + '_ {
        self.dir.iter().map(|file| FileStat {
            name: file.name.clone(),
            size: file.size,
            first_block: file.first_block,
        })
    }

    /// Data blocks of `name`, in chain order.
    pub fn file_blocks(&self, name: &str) -> Result<Vec<BlockIndex>, FsError> {
        let slot = self.dir.find_by_name(name).ok_or(FsError::NotFound)?;
        let first_block = self.dir.entry(slot).and_then(|file| file.first_block);
        Ok(self.fat.chain(first_block).collect())
    }

    pub fn open(&mut self, name: &str) -> Result<FileHandle, FsError> {
        if self.dir.find_by_name(name).is_none() {
            return Err(FsError::NotFound);
        }
        let handle = self.fds.open(name)?;
        debug!("open {} as {}", name, handle.index());
        Ok(handle)
    }

    pub fn close(&mut self, handle: FileHandle) -> Result<(), FsError> {
        self.fds.close(handle)?;
        debug!("close {}", handle.index());
        Ok(())
    }

    /// Size of the file behind `handle`.
    pub fn stat(&self, handle: FileHandle) -> Result<usize, FsError> {
        let (slot, _) = self.resolve(handle)?;
        Ok(self.dir.entry(slot).map_or(0, |file| file.size))
    }

    pub fn seek(&mut self, handle: FileHandle, offset: usize) -> Result<(), FsError> {
        if offset > self.stat(handle)? {
            return Err(FsError::OffsetOutOfRange);
        }
        self.fds.get_mut(handle)?.offset = offset;
        Ok(())
    }

    /// Current offset of `handle`.
    pub fn tell(&self, handle: FileHandle) -> Result<usize, FsError> {
        Ok(self.fds.get(handle)?.offset)
    }

    pub fn open_count(&self) -> usize {
        self.fds.open_count()
    }

    /// Directory slot and offset of the file behind `handle`.
    pub(crate) fn resolve(&self, handle: FileHandle) -> Result<(usize, usize), FsError> {
        let fd = self.fds.get(handle)?;
        // open files cannot be deleted, so the name always resolves
        let slot = self.dir.find_by_name(&fd.name).ok_or(FsError::BadHandle)?;
        Ok((slot, fd.offset))
    }
}

impl fmt::Debug for FatFileSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FatFileSystem")
            .field("super_block", &self.super_block)
            .field("files", &self.dir.iter().count())
            .field("open", &self.fds.open_count())
            .finish()
    }
}
