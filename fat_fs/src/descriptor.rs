use crate::layout::MAX_OPEN;
use crate::FsError;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

/// Handle to an open file; the slot index in the descriptor table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileHandle(usize);

impl FileHandle {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl From<usize> for FileHandle {
    fn from(index: usize) -> Self {
        FileHandle(index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenFile {
    /// resolved against the directory on every access
    pub name: String,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum FdSlot {
    Free,
    Open(OpenFile),
}

pub struct DescriptorTable {
    slots: Vec<FdSlot>,
}

impl DescriptorTable {
    pub fn new() -> Self {
        Self {
            slots: alloc::vec![FdSlot::Free; MAX_OPEN],
        }
    }

    pub fn open(&mut self, name: &str) -> Result<FileHandle, FsError> {
        let slot = self
            .slots
            .iter()
            .position(|slot| *slot == FdSlot::Free)
            .ok_or(FsError::TooManyOpen)?;
        self.slots[slot] = FdSlot::Open(OpenFile {
            name: name.to_string(),
            offset: 0,
        });
        Ok(FileHandle(slot))
    }

    pub fn close(&mut self, handle: FileHandle) -> Result<(), FsError> {
        self.get(handle)?;
        self.slots[handle.0] = FdSlot::Free;
        Ok(())
    }

    pub fn get(&self, handle: FileHandle) -> Result<&OpenFile, FsError> {
        match self.slots.get(handle.0) {
            Some(FdSlot::Open(file)) => Ok(file),
            _ => Err(FsError::BadHandle),
        }
    }

    pub fn get_mut(&mut self, handle: FileHandle) -> Result<&mut OpenFile, FsError> {
        match self.slots.get_mut(handle.0) {
            Some(FdSlot::Open(file)) => Ok(file),
            _ => Err(FsError::BadHandle),
        }
    }

    /// whether any descriptor refers to `name`
    pub fn is_open(&self, name: &str) -> bool {
        self.slots.iter().any(|slot| match slot {
            FdSlot::Open(file) => file.name == name,
            FdSlot::Free => false,
        })
    }

    pub fn open_count(&self) -> usize {
        self.slots.iter().filter(|slot| **slot != FdSlot::Free).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_close_reuses_slots() {
        let mut fds = DescriptorTable::new();
        let a = fds.open("a").unwrap();
        let b = fds.open("a").unwrap();
        assert_ne!(a, b);
        assert_eq!(fds.get(b).unwrap().offset, 0);
        assert!(fds.is_open("a"));

        fds.close(a).unwrap();
        assert_eq!(fds.close(a), Err(FsError::BadHandle));
        assert!(fds.is_open("a"));
        fds.close(b).unwrap();
        assert!(!fds.is_open("a"));
        assert_eq!(fds.open("c").unwrap(), a);
    }

    #[test]
    fn table_capacity_is_bounded() {
        let mut fds = DescriptorTable::new();
        for _ in 0..MAX_OPEN {
            fds.open("x").unwrap();
        }
        assert_eq!(fds.open("x"), Err(FsError::TooManyOpen));
        assert_eq!(fds.open_count(), MAX_OPEN);
        assert_eq!(fds.get(FileHandle::from(MAX_OPEN)), Err(FsError::BadHandle));
    }

    #[test]
    fn offsets_are_per_descriptor() {
        let mut fds = DescriptorTable::new();
        let a = fds.open("f").unwrap();
        let b = fds.open("f").unwrap();
        fds.get_mut(a).unwrap().offset = 42;
        assert_eq!(fds.get(a).unwrap().offset, 42);
        assert_eq!(fds.get(b).unwrap().offset, 0);
    }
}
