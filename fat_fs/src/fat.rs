use crate::layout::{decode_fat_block, encode_fat_block, SuperBlock, FAT_ENTRIES_PER_BLOCK};
use crate::{BlockDevice, FsError, BLOCK_SIZE};
use alloc::sync::Arc;
use alloc::vec::Vec;
use log::{debug, error};

/// index of a data block, relative to the first data block
pub type BlockIndex = u16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatEntry {
    Free,
    /// last block of a chain
    End,
    Next(BlockIndex),
}

/// In-memory copy of the file allocation table.
///
/// Entry 0 is reserved (End) by format, so a data block 0 is never handed
/// out and `Next(0)` never appears in a valid chain.
pub struct AllocationTable {
    entries: Vec<FatEntry>,
    /// entries past this are on-disk padding
    data_blocks: usize,
}

impl AllocationTable {
    /// Fresh table: everything free except the reserved entry 0.
    pub fn new(sb: &SuperBlock) -> Self {
        let mut entries = alloc::vec![FatEntry::Free; sb.fat_entries()];
        entries[0] = FatEntry::End;
        Self {
            entries,
            data_blocks: sb.data_block_count as usize,
        }
    }

    pub fn load(sb: &SuperBlock, block_device: &Arc<dyn BlockDevice>) -> Result<Self, FsError> {
        let mut entries = Vec::with_capacity(sb.fat_entries());
        let mut block = [0u8; BLOCK_SIZE];
        for i in 0..sb.fat_blocks as usize {
            block_device.read_block(1 + i, &mut block)?;
            entries.extend(decode_fat_block(&block));
        }
        let fat = Self {
            entries,
            data_blocks: sb.data_block_count as usize,
        };
        // Next(0) would encode as Free
        if fat.entries[0] != FatEntry::End {
            error!("reserved fat entry 0 is {:?}", fat.entries[0]);
            return Err(FsError::InvalidImage);
        }
        // links must stay inside the data range
        let bad_link = fat.entries[..fat.data_blocks].iter().any(|entry| match entry {
            FatEntry::Next(next) => *next as usize >= fat.data_blocks,
            _ => false,
        });
        if bad_link {
            error!("fat links outside of the data region");
            return Err(FsError::InvalidImage);
        }
        Ok(fat)
    }

    pub fn store(&self, sb: &SuperBlock, block_device: &Arc<dyn BlockDevice>) -> Result<(), FsError> {
        let mut block = [0u8; BLOCK_SIZE];
        for (i, chunk) in self.entries.chunks(FAT_ENTRIES_PER_BLOCK).enumerate() {
            if i >= sb.fat_blocks as usize {
                break;
            }
            encode_fat_block(chunk, &mut block);
            block_device.write_block(1 + i, &block)?;
        }
        Ok(())
    }

    #[cfg(test)]
    pub fn get(&self, block: BlockIndex) -> FatEntry {
        self.entries[block as usize]
    }

    /// block following `block` in its chain
    pub fn next(&self, block: BlockIndex) -> Option<BlockIndex> {
        match self.entries[block as usize] {
            FatEntry::Next(next) => Some(next),
            _ => None,
        }
    }

    /// Take the first free data block and mark it as the end of a chain.
    pub fn allocate_one(&mut self) -> Option<BlockIndex> {
        let pos = self.entries[..self.data_blocks]
            .iter()
            .position(|entry| *entry == FatEntry::Free)?;
        self.entries[pos] = FatEntry::End;
        debug!("allocate data block {}", pos);
        Some(pos as BlockIndex)
    }

    /// Append `new` after `tail`, which must be the end of its chain.
    pub fn link(&mut self, tail: BlockIndex, new: BlockIndex) {
        debug_assert_eq!(self.entries[tail as usize], FatEntry::End);
        self.entries[tail as usize] = FatEntry::Next(new);
    }

    /// Free every block of the chain rooted at `start`.
    pub fn release_chain(&mut self, start: Option<BlockIndex>) {
        let mut cur = start;
        // a chain can never be longer than the data region
        for _ in 0..self.data_blocks {
            let Some(block) = cur else {
                return;
            };
            cur = self.next(block);
            self.entries[block as usize] = FatEntry::Free;
        }
        if cur.is_some() {
            error!("cycle in chain starting at {:?}", start);
        }
    }

    /// Walk `links` steps forward from `start`.
    ///
    /// `None` if the chain ends first.
    pub fn chain_block_at(&self, start: Option<BlockIndex>, links: usize) -> Option<BlockIndex> {
        let mut cur = start?;
        for _ in 0..links {
            cur = self.next(cur)?;
        }
        Some(cur)
    }

    /// Blocks of the chain rooted at `start`, in order.
    ///
    /// Stops after `data_blocks` steps so a corrupt cyclic chain still ends.
    pub fn chain(&self, start: Option<BlockIndex>) -> impl Iterator<Item = BlockIndex> + '_ {
        let mut cur = start;
        core::iter::from_fn(move || {
            let block = cur?;
            cur = self.next(block);
            Some(block)
        })
        .take(self.data_blocks)
    }

    pub fn free_count(&self) -> usize {
        self.entries[..self.data_blocks]
            .iter()
            .filter(|entry| **entry == FatEntry::Free)
            .count()
    }

    pub fn data_blocks(&self) -> usize {
        self.data_blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(total_blocks: u32) -> AllocationTable {
        AllocationTable::new(&SuperBlock::for_block_count(total_blocks).unwrap())
    }

    #[test]
    fn allocate_skips_reserved_block_and_fills_up() {
        let mut fat = table(10);
        assert_eq!(fat.data_blocks(), 8);
        assert_eq!(fat.free_count(), 7);
        for expected in 1..8 {
            assert_eq!(fat.allocate_one(), Some(expected));
            assert_eq!(fat.get(expected), FatEntry::End);
        }
        assert_eq!(fat.allocate_one(), None);
        assert_eq!(fat.free_count(), 0);
    }

    #[test]
    fn chains_link_walk_and_release() {
        let mut fat = table(10);
        let a = fat.allocate_one().unwrap();
        let b = fat.allocate_one().unwrap();
        let other = fat.allocate_one().unwrap();
        let c = fat.allocate_one().unwrap();
        fat.link(a, b);
        fat.link(b, c);

        assert_eq!(fat.chain(Some(a)).collect::<Vec<_>>(), [a, b, c]);
        assert_eq!(fat.chain_block_at(Some(a), 0), Some(a));
        assert_eq!(fat.chain_block_at(Some(a), 2), Some(c));
        assert_eq!(fat.chain_block_at(Some(a), 3), None);
        assert_eq!(fat.chain_block_at(None, 0), None);

        fat.release_chain(Some(a));
        assert_eq!(fat.get(a), FatEntry::Free);
        assert_eq!(fat.get(b), FatEntry::Free);
        assert_eq!(fat.get(c), FatEntry::Free);
        assert_eq!(fat.get(other), FatEntry::End);

        // releasing an empty chain is a no-op
        fat.release_chain(None);
        assert_eq!(fat.free_count(), 6);
    }

    #[test]
    fn cyclic_chain_walk_terminates() {
        let mut fat = table(10);
        let a = fat.allocate_one().unwrap();
        let b = fat.allocate_one().unwrap();
        fat.link(a, b);
        fat.entries[b as usize] = FatEntry::Next(a);
        assert_eq!(fat.chain(Some(a)).count(), fat.data_blocks());
        fat.release_chain(Some(a));
        assert_eq!(fat.get(a), FatEntry::Free);
    }

    #[test]
    fn load_requires_reserved_entry() {
        let sb = SuperBlock::for_block_count(10).unwrap();
        let dev: Arc<dyn BlockDevice> = Arc::new(crate::RamDisk::new(10));
        table(10).store(&sb, &dev).unwrap();
        assert!(AllocationTable::load(&sb, &dev).is_ok());

        let mut zeroed = table(10);
        zeroed.entries[0] = FatEntry::Free;
        zeroed.store(&sb, &dev).unwrap();
        assert!(matches!(
            AllocationTable::load(&sb, &dev),
            Err(FsError::InvalidImage)
        ));
    }
}
