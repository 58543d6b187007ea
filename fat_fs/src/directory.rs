use crate::fat::BlockIndex;
use crate::layout::{DirEntry, DIR_ENTRY_SIZE, MAX_FILES, MAX_NAME_LENGTH};
use crate::{BlockDevice, FsError, BLOCK_SIZE};
use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;
use log::error;

/// An occupied directory slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub size: usize,
    /// `None` until the first write allocates a block
    pub first_block: Option<BlockIndex>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirSlot {
    Free,
    Occupied(FileEntry),
}

/// The flat root directory, one block on disk.
pub struct Directory {
    slots: Vec<DirSlot>,
}

/// Empty names, names longer than `MAX_NAME_LENGTH` bytes and names with a
/// NUL byte cannot be stored.
pub fn check_name(name: &str) -> Result<(), FsError> {
    if name.is_empty() || name.len() > MAX_NAME_LENGTH || name.as_bytes().contains(&0) {
        return Err(FsError::NameInvalid);
    }
    Ok(())
}

impl Directory {
    pub fn new() -> Self {
        Self {
            slots: alloc::vec![DirSlot::Free; MAX_FILES],
        }
    }

    pub fn load(block_id: usize, block_device: &Arc<dyn BlockDevice>) -> Result<Self, FsError> {
        let mut block = [0u8; BLOCK_SIZE];
        block_device.read_block(block_id, &mut block)?;
        let mut slots = Vec::with_capacity(MAX_FILES);
        for raw in block.chunks_exact(DIR_ENTRY_SIZE).take(MAX_FILES) {
            let entry = DirEntry::decode(raw);
            if entry.is_free() {
                slots.push(DirSlot::Free);
                continue;
            }
            let Some(name) = entry.name() else {
                error!("directory entry with a non utf-8 name");
                return Err(FsError::InvalidImage);
            };
            slots.push(DirSlot::Occupied(FileEntry {
                name: name.to_string(),
                size: entry.size as usize,
                first_block: entry.first_block(),
            }));
        }
        Ok(Self { slots })
    }

    pub fn store(&self, block_id: usize, block_device: &Arc<dyn BlockDevice>) -> Result<(), FsError> {
        let mut block = [0u8; BLOCK_SIZE];
        for (slot, raw) in self.slots.iter().zip(block.chunks_exact_mut(DIR_ENTRY_SIZE)) {
            let entry = match slot {
                DirSlot::Free => DirEntry::empty(),
                DirSlot::Occupied(file) => {
                    DirEntry::new(&file.name, file.size as u32, file.first_block)
                }
            };
            entry.encode(raw);
        }
        block_device.write_block(block_id, &block)?;
        Ok(())
    }

    pub fn find_by_name(&self, name: &str) -> Option<usize> {
        self.slots.iter().position(|slot| match slot {
            DirSlot::Occupied(file) => file.name == name,
            DirSlot::Free => false,
        })
    }

    pub fn allocate_slot(&self) -> Option<usize> {
        self.slots.iter().position(|slot| *slot == DirSlot::Free)
    }

    /// Put an empty file named `name` into the first free slot.
    ///
    /// Block reservation is the caller's business; see `FatFileSystem::create`.
    pub fn insert(&mut self, name: &str) -> Result<usize, FsError> {
        check_name(name)?;
        if self.find_by_name(name).is_some() {
            return Err(FsError::AlreadyExists);
        }
        let slot = self.allocate_slot().ok_or(FsError::DirectoryFull)?;
        self.slots[slot] = DirSlot::Occupied(FileEntry {
            name: name.to_string(),
            size: 0,
            first_block: None,
        });
        Ok(slot)
    }

    /// Clear `slot`, handing back what it held.
    pub fn remove(&mut self, slot: usize) -> Option<FileEntry> {
        match core::mem::replace(&mut self.slots[slot], DirSlot::Free) {
            DirSlot::Occupied(file) => Some(file),
            DirSlot::Free => None,
        }
    }

    pub fn entry(&self, slot: usize) -> Option<&FileEntry> {
        match &self.slots[slot] {
            DirSlot::Occupied(file) => Some(file),
            DirSlot::Free => None,
        }
    }

    pub fn entry_mut(&mut self, slot: usize) -> Option<&mut FileEntry> {
        match &mut self.slots[slot] {
            DirSlot::Occupied(file) => Some(file),
            DirSlot::Free => None,
        }
    }

    /// occupied entries in table order
    pub fn iter(&self) -> impl Iterator<Item = &FileEntry> + '_ {
        self.slots.iter().filter_map(|slot| match slot {
            DirSlot::Occupied(file) => Some(file),
            DirSlot::Free => None,
        })
    }

    pub fn free_count(&self) -> usize {
        self.slots.iter().filter(|slot| **slot == DirSlot::Free).count()
    }
}
