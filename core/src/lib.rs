//! A small educational on-disk file system: a free-sector bitmap, a chained
//! file header (inode), a fixed-capacity directory tree, a path resolver,
//! and the facade that ties them together over a [`block::BlockDevice`].
//!
//! Nothing here drives real hardware. Callers supply a `BlockDevice` ([`block::MemoryDisk`]
//! for tests, [`block::FileDisk`] for the demo binaries) and drive the file
//! system through [`fs::FileSystem`]'s `format`/`mount`/`create`/`open`/
//! `read`/`write`/`close`/`remove`/`list`/`print` operations.

pub mod bitmap;
pub mod block;
pub mod config;
pub mod directory;
pub mod error;
pub mod fs;
pub mod inode;
pub mod open_file;
pub mod path;

pub use block::{BlockDevice, FileDisk, MemoryDisk};
pub use config::{Geometry, MAX_FILE_SIZE, SECTOR_SIZE};
pub use directory::DirEntry;
pub use error::{FsError, FsResult};
pub use fs::FileSystem;
pub use open_file::OpenFile;
