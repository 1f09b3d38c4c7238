//! Open file handles and the descriptor table.

use crate::block::BlockDevice;
use crate::config::SECTOR_SIZE;
use crate::error::{FsError, FsResult};
use crate::inode::Inode;

/// A file open for reading and writing, with its own seek position. Mirrors
/// the inode's current length; growth goes through [`crate::fs::FileSystem`],
/// which owns the bitmap needed to allocate new sectors.
#[derive(Debug, Clone)]
pub struct OpenFile {
    pub(crate) inode: Inode,
    position: usize,
}

impl OpenFile {
    pub(crate) fn new(inode: Inode) -> Self {
        Self { inode, position: 0 }
    }

    /// Current length of the underlying file, in bytes.
    pub fn length(&self) -> usize {
        self.inode.file_length() as usize
    }

    /// Current seek position.
    pub fn tell(&self) -> usize {
        self.position
    }

    /// Moves the seek position to `offset`, which may be past the current
    /// end of file (a subsequent write there is Nachos-style sparse-free:
    /// it extends the file, it does not punch a hole).
    pub fn seek(&mut self, offset: usize) {
        self.position = offset;
    }

    /// Reads up to `buf.len()` bytes starting at the current position,
    /// advancing it by the number of bytes actually read. Returns the count
    /// read, which is less than `buf.len()` at end of file.
    pub fn read(&mut self, device: &mut dyn BlockDevice, buf: &mut [u8]) -> FsResult<usize> {
        let len = self.length();
        if self.position >= len {
            return Ok(0);
        }
        let to_read = buf.len().min(len - self.position);
        let mut done = 0;
        while done < to_read {
            let offset = self.position + done;
            let sector = self
                .inode
                .byte_to_sector(offset)
                .ok_or(FsError::InvalidSector(0))?;
            let sector_buf = device.read_sector_owned(sector)?;
            let within = offset % SECTOR_SIZE;
            let chunk = (to_read - done).min(SECTOR_SIZE - within);
            buf[done..done + chunk].copy_from_slice(&sector_buf[within..within + chunk]);
            done += chunk;
        }
        self.position += done;
        Ok(done)
    }

    /// Writes `buf` at the current position, growing the file's allocated
    /// capacity first if necessary. Growth/allocation itself is the caller's
    /// job (`FileSystem::write`): this method assumes `self.inode` already
    /// spans `self.position + buf.len()` bytes.
    pub(crate) fn write_within_capacity(
        &mut self,
        device: &mut dyn BlockDevice,
        buf: &[u8],
    ) -> FsResult<usize> {
        let mut done = 0;
        while done < buf.len() {
            let offset = self.position + done;
            let sector = self
                .inode
                .byte_to_sector(offset)
                .ok_or(FsError::InvalidSector(0))?;
            let mut sector_buf = device.read_sector_owned(sector)?;
            let within = offset % SECTOR_SIZE;
            let chunk = (buf.len() - done).min(SECTOR_SIZE - within);
            sector_buf[within..within + chunk].copy_from_slice(&buf[done..done + chunk]);
            device.write_sector(sector, &sector_buf)?;
            done += chunk;
        }
        self.position += done;
        Ok(done)
    }

    /// Reads the file's entire contents from offset 0, leaving the seek
    /// position unchanged. Used by the facade to load the bitmap and
    /// directory files, which are always read whole.
    pub fn read_all(&self, device: &mut dyn BlockDevice) -> FsResult<Vec<u8>> {
        let mut tmp = Self {
            inode: self.inode.clone(),
            position: 0,
        };
        let mut out = vec![0u8; tmp.length()];
        let n = tmp.read(device, &mut out)?;
        out.truncate(n);
        Ok(out)
    }

    /// Overwrites the file's entire contents with `bytes`, growing or
    /// shrinking the logical length to match. Used for the bitmap and
    /// directory files, which are always written whole.
    pub(crate) fn write_all_within_capacity(
        &mut self,
        device: &mut dyn BlockDevice,
        bytes: &[u8],
    ) -> FsResult<()> {
        let saved = self.position;
        self.position = 0;
        self.write_within_capacity(device, bytes)?;
        self.position = saved;
        Ok(())
    }
}

/// Reserved slot 0 means "no file open here", matching the convention that
/// descriptor 0 is never handed out.
const RESERVED_SLOT: usize = 0;

/// Fixed-capacity table of currently open files, indexed by small integer
/// descriptors the way a Unix process's fd table works.
#[derive(Debug)]
pub struct DescriptorTable {
    slots: Vec<Option<OpenFile>>,
}

impl DescriptorTable {
    pub fn new(max_open_files: usize) -> Self {
        let mut slots = Vec::with_capacity(max_open_files + 1);
        slots.resize_with(max_open_files + 1, || None);
        Self { slots }
    }

    /// Installs `file`, returning its descriptor. Fails with
    /// [`FsError::DescriptorTableFull`] if every slot beyond the reserved
    /// one is occupied.
    pub fn install(&mut self, file: OpenFile) -> FsResult<u32> {
        let slot = self
            .slots
            .iter()
            .enumerate()
            .skip(RESERVED_SLOT + 1)
            .find(|(_, s)| s.is_none())
            .map(|(i, _)| i)
            .ok_or(FsError::DescriptorTableFull)?;
        self.slots[slot] = Some(file);
        Ok(slot as u32)
    }

    pub fn get(&self, fd: u32) -> FsResult<&OpenFile> {
        self.slots
            .get(fd as usize)
            .and_then(Option::as_ref)
            .ok_or(FsError::NotFound)
    }

    pub fn get_mut(&mut self, fd: u32) -> FsResult<&mut OpenFile> {
        self.slots
            .get_mut(fd as usize)
            .and_then(Option::as_mut)
            .ok_or(FsError::NotFound)
    }

    /// Closes `fd`, returning the file that was there.
    pub fn close(&mut self, fd: u32) -> FsResult<OpenFile> {
        self.slots
            .get_mut(fd as usize)
            .and_then(Option::take)
            .ok_or(FsError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitmap::Bitmap;
    use crate::block::MemoryDisk;

    #[test]
    fn read_write_round_trip_within_one_sector() {
        let mut disk = MemoryDisk::new(32);
        let mut bitmap = Bitmap::new(32);
        bitmap.mark(0).unwrap();
        let inode = Inode::allocate(&mut disk, &mut bitmap, 50).unwrap();
        let mut file = OpenFile::new(inode);

        let data = b"hello open file";
        file.write_within_capacity(&mut disk, data).unwrap();
        file.seek(0);
        let mut buf = vec![0u8; data.len()];
        let n = file.read(&mut disk, &mut buf).unwrap();
        assert_eq!(n, data.len());
        assert_eq!(&buf, data);
    }

    #[test]
    fn read_write_round_trip_across_sectors() {
        let mut disk = MemoryDisk::new(32);
        let mut bitmap = Bitmap::new(32);
        bitmap.mark(0).unwrap();
        let inode = Inode::allocate(&mut disk, &mut bitmap, 300).unwrap();
        let mut file = OpenFile::new(inode);

        let data: Vec<u8> = (0..300u32).map(|i| (i % 251) as u8).collect();
        file.write_within_capacity(&mut disk, &data).unwrap();
        file.seek(0);
        let mut buf = vec![0u8; data.len()];
        file.read(&mut disk, &mut buf).unwrap();
        assert_eq!(buf, data);
    }

    #[test]
    fn descriptor_table_reserves_slot_zero() {
        let mut disk = MemoryDisk::new(8);
        let mut bitmap = Bitmap::new(8);
        bitmap.mark(0).unwrap();
        let inode = Inode::allocate(&mut disk, &mut bitmap, 10).unwrap();

        let mut table = DescriptorTable::new(2);
        let fd = table.install(OpenFile::new(inode)).unwrap();
        assert_ne!(fd, 0);
        assert!(table.get(fd).is_ok());
        table.close(fd).unwrap();
        assert!(matches!(table.get(fd), Err(FsError::NotFound)));
    }
}
