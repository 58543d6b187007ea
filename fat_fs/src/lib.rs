#![cfg_attr(not(test), no_std)]
extern crate alloc;

mod afs;
pub mod api;
mod block_dev;
mod descriptor;
mod directory;
mod error;
mod fat;
mod layout;
mod vfs;

pub use afs::{FatFileSystem, FileStat, FsInfo};
pub use block_dev::{BlockDevice, IoError, RamDisk};
pub use descriptor::FileHandle;
pub use error::FsError;
pub use fat::{BlockIndex, FatEntry};
pub use layout::{BLOCK_SIZE, MAX_FILES, MAX_NAME_LENGTH, MAX_OPEN, SIGNATURE};
