//! Synchronous block device abstraction.
//!
//! The core never drives real hardware; it only ever talks to whatever
//! implements [`BlockDevice`]. [`MemoryDisk`] backs the unit and integration
//! tests, [`FileDisk`] backs the `mkdisk`/`diskshell` demo binaries.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::config::SECTOR_SIZE;
use crate::error::{FsError, FsResult};

/// A raw sector buffer, always exactly [`SECTOR_SIZE`] bytes.
pub type Sector = [u8; SECTOR_SIZE];

/// Sector-granular synchronous I/O. Every method transfers exactly one
/// [`SECTOR_SIZE`]-byte sector; there is no partial transfer and no queuing.
pub trait BlockDevice {
    /// Total number of addressable sectors, numbered `0..num_sectors()`.
    fn num_sectors(&self) -> u32;

    /// Reads sector `sector` into `buf`. Fails with [`FsError::InvalidSector`]
    /// if `sector >= self.num_sectors()`.
    fn read_sector(&mut self, sector: u32, buf: &mut Sector) -> FsResult<()>;

    /// Writes `buf` to sector `sector`. Fails with [`FsError::InvalidSector`]
    /// if `sector >= self.num_sectors()`.
    fn write_sector(&mut self, sector: u32, buf: &Sector) -> FsResult<()>;

    /// Convenience: reads a sector into a freshly zeroed buffer.
    fn read_sector_owned(&mut self, sector: u32) -> FsResult<Sector> {
        let mut buf = [0u8; SECTOR_SIZE];
        self.read_sector(sector, &mut buf)?;
        Ok(buf)
    }

    /// Convenience: writes an all-zero sector, used when zeroing freshly
    /// allocated data sectors.
    fn zero_sector(&mut self, sector: u32) -> FsResult<()> {
        self.write_sector(sector, &[0u8; SECTOR_SIZE])
    }
}

fn check_bounds(sector: u32, num_sectors: u32) -> FsResult<()> {
    if sector >= num_sectors {
        return Err(FsError::InvalidSector(sector));
    }
    Ok(())
}

/// An in-memory disk, used by tests and as a scratch disk for demos.
pub struct MemoryDisk {
    sectors: Vec<Sector>,
}

impl MemoryDisk {
    /// Creates a zero-filled disk with `num_sectors` sectors.
    pub fn new(num_sectors: u32) -> Self {
        Self {
            sectors: vec![[0u8; SECTOR_SIZE]; num_sectors as usize],
        }
    }
}

impl BlockDevice for MemoryDisk {
    fn num_sectors(&self) -> u32 {
        self.sectors.len() as u32
    }

    fn read_sector(&mut self, sector: u32, buf: &mut Sector) -> FsResult<()> {
        check_bounds(sector, self.num_sectors())?;
        buf.copy_from_slice(&self.sectors[sector as usize]);
        log::trace!("memdisk: read sector {sector}");
        Ok(())
    }

    fn write_sector(&mut self, sector: u32, buf: &Sector) -> FsResult<()> {
        check_bounds(sector, self.num_sectors())?;
        self.sectors[sector as usize].copy_from_slice(buf);
        log::trace!("memdisk: wrote sector {sector}");
        Ok(())
    }
}

/// A disk image backed by a host file. Positional access is implemented with
/// `seek` + `read_exact`/`write_all`: the file system core is single-threaded
/// by design, so there is no benefit to the `pread`/`pwrite` style
/// positional I/O a multi-threaded device would want.
pub struct FileDisk {
    file: File,
    num_sectors: u32,
}

impl FileDisk {
    /// Creates (truncating any existing contents) a disk image of
    /// `num_sectors` zeroed sectors at `path`.
    pub fn create(path: impl AsRef<Path>, num_sectors: u32) -> FsResult<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        let zeros = [0u8; SECTOR_SIZE];
        for _ in 0..num_sectors {
            file.write_all(&zeros)?;
        }
        file.flush()?;
        Ok(Self { file, num_sectors })
    }

    /// Opens an existing disk image, trusting the caller's `num_sectors`
    /// (there is no on-disk magic number check at this layer; the facade's
    /// `mount` reads the root inodes and will fail loudly if they are bogus).
    pub fn open(path: impl AsRef<Path>, num_sectors: u32) -> FsResult<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self { file, num_sectors })
    }

    fn seek_to(&mut self, sector: u32) -> FsResult<()> {
        self.file
            .seek(SeekFrom::Start(sector as u64 * SECTOR_SIZE as u64))?;
        Ok(())
    }
}

impl BlockDevice for FileDisk {
    fn num_sectors(&self) -> u32 {
        self.num_sectors
    }

    fn read_sector(&mut self, sector: u32, buf: &mut Sector) -> FsResult<()> {
        check_bounds(sector, self.num_sectors)?;
        self.seek_to(sector)?;
        self.file.read_exact(buf)?;
        log::trace!("filedisk: read sector {sector}");
        Ok(())
    }

    fn write_sector(&mut self, sector: u32, buf: &Sector) -> FsResult<()> {
        check_bounds(sector, self.num_sectors)?;
        self.seek_to(sector)?;
        self.file.write_all(buf)?;
        log::trace!("filedisk: wrote sector {sector}");
        Ok(())
    }
}
