use crate::IoError;
use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    /// signature or layout mismatch at mount, or a corrupt table
    InvalidImage,
    Io(IoError),
    /// empty, over-length or NUL-containing name
    NameInvalid,
    AlreadyExists,
    NotFound,
    DirectoryFull,
    TooManyOpen,
    /// delete while a descriptor still references the file
    FileOpen,
    BadHandle,
    OffsetOutOfRange,
    NullBuffer,
    DiskFull,
    NotMounted,
    AlreadyMounted,
}

impl From<IoError> for FsError {
    fn from(err: IoError) -> Self {
        FsError::Io(err)
    }
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FsError::InvalidImage => write!(f, "invalid file system image"),
            FsError::Io(err) => write!(f, "i/o error: {}", err),
            FsError::NameInvalid => write!(f, "invalid file name"),
            FsError::AlreadyExists => write!(f, "file already exists"),
            FsError::NotFound => write!(f, "no such file"),
            FsError::DirectoryFull => write!(f, "root directory is full"),
            FsError::TooManyOpen => write!(f, "too many open files"),
            FsError::FileOpen => write!(f, "file is open"),
            FsError::BadHandle => write!(f, "bad file handle"),
            FsError::OffsetOutOfRange => write!(f, "offset past end of file"),
            FsError::NullBuffer => write!(f, "no buffer supplied"),
            FsError::DiskFull => write!(f, "disk full"),
            FsError::NotMounted => write!(f, "no file system mounted"),
            FsError::AlreadyMounted => write!(f, "a file system is already mounted"),
        }
    }
}
