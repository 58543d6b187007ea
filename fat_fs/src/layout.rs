use crate::fat::FatEntry;

pub const BLOCK_SIZE: usize = 4096;
pub const SIGNATURE: &[u8; 8] = b"ECS150FS";

/// max number of files in the root directory
pub const MAX_FILES: usize = 128;
/// max number of simultaneously open descriptors
pub const MAX_OPEN: usize = 32;
/// bytes reserved for a name on disk, NUL terminator included
pub const FILENAME_LEN: usize = 16;
pub const MAX_NAME_LENGTH: usize = FILENAME_LEN - 1;

const FAT_FREE: u16 = 0;
const FAT_EOC: u16 = 0xFFFF;
pub const FAT_ENTRY_SIZE: usize = core::mem::size_of::<u16>();
pub const FAT_ENTRIES_PER_BLOCK: usize = BLOCK_SIZE / FAT_ENTRY_SIZE;

/// superblock, fat blocks, root directory, data blocks
///
/// On disk (little-endian, packed): sig[8], total_blocks u16,
/// root_dir_index u16, data_start_index u16, data_block_count u16,
/// fat_blocks u8, zero padding up to BLOCK_SIZE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuperBlock {
    pub total_blocks: u16,
    pub root_dir_index: u16,
    pub data_start_index: u16,
    pub data_block_count: u16,
    pub fat_blocks: u8,
}

impl SuperBlock {
    /// Layout a device of `total_blocks` blocks must have.
    ///
    /// `None` when the device cannot hold at least one data block or
    /// addresses more blocks than a 16 bit index can name.
    pub fn for_block_count(total_blocks: u32) -> Option<Self> {
        if total_blocks > u16::MAX as u32 {
            return None;
        }
        let fat_blocks = ((total_blocks as usize * FAT_ENTRY_SIZE).div_ceil(BLOCK_SIZE)).max(1);
        if total_blocks as usize <= fat_blocks + 2 {
            return None;
        }
        Some(Self {
            total_blocks: total_blocks as u16,
            root_dir_index: fat_blocks as u16 + 1,
            data_start_index: fat_blocks as u16 + 2,
            data_block_count: (total_blocks as usize - fat_blocks - 2) as u16,
            fat_blocks: fat_blocks as u8,
        })
    }

    /// `None` if the signature does not match.
    pub fn decode(block: &[u8]) -> Option<Self> {
        if &block[..8] != SIGNATURE {
            return None;
        }
        Some(Self {
            total_blocks: read_u16(block, 8),
            root_dir_index: read_u16(block, 10),
            data_start_index: read_u16(block, 12),
            data_block_count: read_u16(block, 14),
            fat_blocks: block[16],
        })
    }

    pub fn encode(&self, block: &mut [u8]) {
        block.fill(0);
        block[..8].copy_from_slice(SIGNATURE);
        write_u16(block, 8, self.total_blocks);
        write_u16(block, 10, self.root_dir_index);
        write_u16(block, 12, self.data_start_index);
        write_u16(block, 14, self.data_block_count);
        block[16] = self.fat_blocks;
    }

    /// number of FAT entries stored on disk, padding included
    pub fn fat_entries(&self) -> usize {
        self.fat_blocks as usize * FAT_ENTRIES_PER_BLOCK
    }
}

pub fn decode_fat_entry(raw: u16) -> FatEntry {
    match raw {
        FAT_FREE => FatEntry::Free,
        FAT_EOC => FatEntry::End,
        next => FatEntry::Next(next),
    }
}

pub fn encode_fat_entry(entry: FatEntry) -> u16 {
    match entry {
        FatEntry::Free => FAT_FREE,
        FatEntry::End => FAT_EOC,
        FatEntry::Next(next) => next,
    }
}

/// Encode `entries` into one FAT block, zero-filling past the end.
pub fn encode_fat_block(entries: &[FatEntry], block: &mut [u8]) {
    block.fill(0);
    for (i, entry) in entries.iter().take(FAT_ENTRIES_PER_BLOCK).enumerate() {
        write_u16(block, i * FAT_ENTRY_SIZE, encode_fat_entry(*entry));
    }
}

pub fn decode_fat_block(block: &[u8]) -> impl Iterator<Item = FatEntry> + '_ {
    block
        .chunks_exact(FAT_ENTRY_SIZE)
        .map(|raw| decode_fat_entry(u16::from_le_bytes([raw[0], raw[1]])))
}

/// should be 32 bytes: name[16], size u32, first_block u16, padding[10]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirEntry {
    pub name: [u8; FILENAME_LEN],
    pub size: u32,
    pub first_block: u16,
}

pub const DIR_ENTRY_SIZE: usize = 32;
pub const DIR_ENTRY_NUM: usize = BLOCK_SIZE / DIR_ENTRY_SIZE;

const _: () = assert!(DIR_ENTRY_NUM >= MAX_FILES);

impl DirEntry {
    pub fn empty() -> Self {
        Self {
            name: [0u8; FILENAME_LEN],
            size: 0,
            first_block: FAT_EOC,
        }
    }

    /// `name` must already be validated to fit.
    pub fn new(name: &str, size: u32, first_block: Option<u16>) -> Self {
        let mut raw = [0u8; FILENAME_LEN];
        raw[..name.len()].copy_from_slice(name.as_bytes());
        Self {
            name: raw,
            size,
            first_block: first_block.unwrap_or(FAT_EOC),
        }
    }

    pub fn is_free(&self) -> bool {
        self.name[0] == 0
    }

    /// Name bytes up to the first NUL; `None` if not UTF-8.
    pub fn name(&self) -> Option<&str> {
        let len = self
            .name
            .iter()
            .position(|&x| x == 0)
            .unwrap_or(FILENAME_LEN);
        core::str::from_utf8(&self.name[..len]).ok()
    }

    pub fn first_block(&self) -> Option<u16> {
        match self.first_block {
            FAT_EOC => None,
            block => Some(block),
        }
    }

    pub fn decode(raw: &[u8]) -> Self {
        let mut name = [0u8; FILENAME_LEN];
        name.copy_from_slice(&raw[..FILENAME_LEN]);
        Self {
            name,
            size: u32::from_le_bytes([raw[16], raw[17], raw[18], raw[19]]),
            first_block: read_u16(raw, 20),
        }
    }

    pub fn encode(&self, raw: &mut [u8]) {
        raw[..DIR_ENTRY_SIZE].fill(0);
        raw[..FILENAME_LEN].copy_from_slice(&self.name);
        raw[16..20].copy_from_slice(&self.size.to_le_bytes());
        write_u16(raw, 20, self.first_block);
    }
}

fn read_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([buf[offset], buf[offset + 1]])
}

fn write_u16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_follows_block_count() {
        let sb = SuperBlock::for_block_count(10).unwrap();
        assert_eq!(sb.fat_blocks, 1);
        assert_eq!(sb.root_dir_index, 2);
        assert_eq!(sb.data_start_index, 3);
        assert_eq!(sb.data_block_count, 8);

        // 8192 blocks need exactly 16384 bytes of FAT
        let sb = SuperBlock::for_block_count(8192).unwrap();
        assert_eq!(sb.fat_blocks, 4);
        let sb = SuperBlock::for_block_count(8193).unwrap();
        assert_eq!(sb.fat_blocks, 5);
        assert_eq!(sb.data_block_count, 8193 - 5 - 2);
    }

    #[test]
    fn layout_rejects_unusable_sizes() {
        assert!(SuperBlock::for_block_count(3).is_none());
        assert!(SuperBlock::for_block_count(4).is_some());
        assert!(SuperBlock::for_block_count(70_000).is_none());
    }

    #[test]
    fn superblock_bytes_are_packed_little_endian() {
        let sb = SuperBlock::for_block_count(8198).unwrap();
        let mut block = [0xEEu8; BLOCK_SIZE];
        sb.encode(&mut block);
        assert_eq!(&block[..8], b"ECS150FS");
        assert_eq!(&block[8..10], &8198u16.to_le_bytes());
        assert_eq!(block[16], sb.fat_blocks);
        assert!(block[17..].iter().all(|&b| b == 0));
        assert_eq!(SuperBlock::decode(&block), Some(sb));

        block[0] = b'X';
        assert_eq!(SuperBlock::decode(&block), None);
    }

    #[test]
    fn fat_sentinels_map_to_tags() {
        assert_eq!(decode_fat_entry(0), FatEntry::Free);
        assert_eq!(decode_fat_entry(0xFFFF), FatEntry::End);
        assert_eq!(decode_fat_entry(7), FatEntry::Next(7));
        assert_eq!(encode_fat_entry(FatEntry::End), 0xFFFF);

        let mut block = [0xAAu8; BLOCK_SIZE];
        encode_fat_block(&[FatEntry::End, FatEntry::Next(2), FatEntry::End], &mut block);
        assert_eq!(&block[..6], &[0xFF, 0xFF, 2, 0, 0xFF, 0xFF]);
        assert_eq!(decode_fat_block(&block).nth(3), Some(FatEntry::Free));
    }

    #[test]
    fn dir_entry_keeps_name_size_and_pointer() {
        let entry = DirEntry::new("hello.txt", 5000, Some(3));
        let mut raw = [0u8; DIR_ENTRY_SIZE];
        entry.encode(&mut raw);
        let back = DirEntry::decode(&raw);
        assert_eq!(back.name(), Some("hello.txt"));
        assert_eq!(back.size, 5000);
        assert_eq!(back.first_block(), Some(3));
        assert!(!back.is_free());

        let empty = DirEntry::new("a", 0, None);
        assert_eq!(empty.first_block, 0xFFFF);
        assert!(DirEntry::empty().is_free());
    }
}
