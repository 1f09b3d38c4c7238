//! Error kinds produced by the file system core.

use thiserror::Error;

/// Everything a [`crate::fs::FileSystem`] operation can fail with.
#[derive(Debug, Error)]
pub enum FsError {
    #[error("no such file or directory")]
    NotFound,

    #[error("file already exists")]
    AlreadyExists,

    #[error("no space left on device")]
    NoSpaceOnDevice,

    #[error("directory is full")]
    DirectoryFull,

    #[error("no free file descriptor")]
    DescriptorTableFull,

    #[error("invalid path")]
    InvalidPath,

    #[error("directory is not empty")]
    DirectoryNotEmpty,

    #[error("sector {0} is out of range")]
    InvalidSector(u32),

    #[error("invalid disk geometry: {0}")]
    InvalidGeometry(&'static str),

    #[error("block device I/O failure")]
    IoFatal(#[from] std::io::Error),
}

pub type FsResult<T> = Result<T, FsError>;
