//! File headers: chained, sector-addressed inode records.

use bytemuck::{Pod, Zeroable};

use crate::block::BlockDevice;
use crate::bitmap::Bitmap;
use crate::config::{ceil_div, Geometry, NUM_DIRECT, SECTOR_SIZE};
use crate::error::FsResult;

/// On-disk shape of one header segment. Exactly [`SECTOR_SIZE`] bytes, so a
/// segment always occupies a single sector and never needs a length prefix
/// separate from `num_bytes`.
///
/// `num_sectors` is deliberately not stored: it is always recomputable as
/// `ceil_div(num_bytes, SECTOR_SIZE)`, and persisting it would have pushed
/// the segment past one sector for the chosen `NUM_DIRECT`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct RawHeader {
    num_bytes: i32,
    next_header_sector: i32,
    data_sectors: [i32; NUM_DIRECT],
}

const _: () = assert!(std::mem::size_of::<RawHeader>() == SECTOR_SIZE);

/// Sentinel stored in `next_header_sector` when a segment is the last link
/// in its file's chain.
const NO_NEXT: i32 = -1;

/// One header segment, resident in memory, together with the sector it lives
/// at (needed to write it back and to link a predecessor to it).
#[derive(Debug, Clone)]
struct Segment {
    header_sector: u32,
    num_bytes: u32,
    data_sectors: Vec<u32>,
}

impl Segment {
    fn capacity_bytes(&self) -> usize {
        self.data_sectors.len() * SECTOR_SIZE
    }

    fn to_raw(&self, next_header_sector: Option<u32>) -> RawHeader {
        let mut data_sectors = [0i32; NUM_DIRECT];
        for (slot, &s) in data_sectors.iter_mut().zip(self.data_sectors.iter()) {
            *slot = s as i32;
        }
        RawHeader {
            num_bytes: self.num_bytes as i32,
            next_header_sector: next_header_sector.map_or(NO_NEXT, |s| s as i32),
            data_sectors,
        }
    }
}

/// A file's complete header chain, flattened into a `Vec` rather than a
/// recursive owning pointer: the head sector is the only externally visible
/// handle, but every segment is resident at once so growth and truncation
/// don't need recursive I/O.
#[derive(Debug, Clone)]
pub struct Inode {
    segments: Vec<Segment>,
}

impl Inode {
    /// Total file length in bytes: the sum of every segment's own byte
    /// count. Every non-terminal segment's `num_bytes` equals
    /// [`crate::config::MAX_FILE_SIZE`] (its segment is full); only the
    /// terminal segment's `num_bytes` may be smaller.
    pub fn file_length(&self) -> u32 {
        self.segments.iter().map(|s| s.num_bytes).sum()
    }

    fn total_capacity_bytes(&self) -> usize {
        self.segments.iter().map(Segment::capacity_bytes).sum()
    }

    /// Maps a byte offset to the sector holding it. Returns `None` if
    /// `offset` falls at or past the file's allocated capacity.
    pub(crate) fn byte_to_sector(&self, offset: usize) -> Option<u32> {
        let mut remaining = offset;
        for seg in &self.segments {
            let cap = seg.capacity_bytes();
            if remaining < cap {
                return Some(seg.data_sectors[remaining / SECTOR_SIZE]);
            }
            remaining -= cap;
        }
        None
    }

    /// Reads the header chain starting at `header_sector`. Each segment's
    /// own `num_bytes` field (not the file's total length) tells us how
    /// many of its `data_sectors` entries are in use.
    pub fn fetch_from(device: &mut dyn BlockDevice, header_sector: u32) -> FsResult<Self> {
        let mut segments = Vec::new();
        let mut sector = header_sector;
        loop {
            let raw_bytes = device.read_sector_owned(sector)?;
            let raw: RawHeader = bytemuck::cast(raw_bytes);
            let num_data_sectors = ceil_div(raw.num_bytes as usize, SECTOR_SIZE).min(NUM_DIRECT);
            let data_sectors = raw.data_sectors[..num_data_sectors]
                .iter()
                .map(|&s| s as u32)
                .collect::<Vec<_>>();
            segments.push(Segment {
                header_sector: sector,
                num_bytes: raw.num_bytes as u32,
                data_sectors,
            });
            if raw.next_header_sector == NO_NEXT {
                break;
            }
            sector = raw.next_header_sector as u32;
        }
        Ok(Self { segments })
    }

    /// Writes every segment's header back to its sector, linking each to the
    /// next. Does not touch data sectors.
    pub fn write_back(&self, device: &mut dyn BlockDevice) -> FsResult<()> {
        for (i, seg) in self.segments.iter().enumerate() {
            let next = self.segments.get(i + 1).map(|s| s.header_sector);
            let raw = seg.to_raw(next);
            let bytes: [u8; SECTOR_SIZE] = bytemuck::cast(raw);
            device.write_sector(seg.header_sector, &bytes)?;
        }
        Ok(())
    }

    /// Allocates a brand-new, empty inode chain of one segment at a freshly
    /// allocated header sector, sized to hold `initial_bytes` logical bytes.
    /// Every data sector needed up front is allocated and zeroed; chaining
    /// additional segments happens lazily as the file grows past
    /// [`crate::config::MAX_FILE_SIZE`] per segment.
    pub fn allocate(
        device: &mut dyn BlockDevice,
        bitmap: &mut Bitmap,
        initial_bytes: u32,
    ) -> FsResult<Self> {
        let header_sector = bitmap.find_and_set()?;
        Self::allocate_at(device, bitmap, header_sector, initial_bytes)
    }

    /// Like [`Inode::allocate`], but the head header sector is given rather
    /// than drawn from the bitmap. Used for the free-map and root-directory
    /// inodes, whose sectors are well-known and already marked in-use by the
    /// caller before this is called.
    pub fn allocate_at(
        device: &mut dyn BlockDevice,
        bitmap: &mut Bitmap,
        header_sector: u32,
        initial_bytes: u32,
    ) -> FsResult<Self> {
        let mut inode = Self {
            segments: vec![Segment {
                header_sector,
                num_bytes: 0,
                data_sectors: Vec::new(),
            }],
        };
        inode.grow_to(device, bitmap, initial_bytes as usize)?;
        inode.write_back(device)?;
        Ok(inode)
    }

    /// Releases every header and data sector of this inode back to `bitmap`.
    /// Does not persist `bitmap`; the caller commits it after every other
    /// mutation succeeds.
    pub fn deallocate(&self, bitmap: &mut Bitmap) -> FsResult<()> {
        for seg in &self.segments {
            for &s in &seg.data_sectors {
                bitmap.clear(s)?;
            }
            bitmap.clear(seg.header_sector)?;
        }
        Ok(())
    }

    /// Head segment's own sector, the externally visible handle for this
    /// inode chain.
    pub fn head_sector(&self) -> u32 {
        self.segments[0].header_sector
    }

    /// Grows the file to at least `new_len` bytes, allocating new data
    /// sectors (zeroed) and, once the current last segment is full,
    /// chaining a brand-new header segment.
    pub fn grow_to(
        &mut self,
        device: &mut dyn BlockDevice,
        bitmap: &mut Bitmap,
        new_len: usize,
    ) -> FsResult<()> {
        if new_len <= self.total_capacity_bytes() {
            self.set_len(new_len);
            return Ok(());
        }
        while self.total_capacity_bytes() < new_len {
            let last = self.segments.last_mut().expect("always at least one segment");
            if last.data_sectors.len() < NUM_DIRECT {
                let sector = match bitmap.find_and_set() {
                    Ok(s) => s,
                    Err(e) => {
                        self.set_len(self.total_capacity_bytes().min(new_len));
                        return Err(e);
                    }
                };
                device.zero_sector(sector)?;
                last.data_sectors.push(sector);
            } else {
                let header_sector = match bitmap.find_and_set() {
                    Ok(s) => s,
                    Err(e) => {
                        self.set_len(self.total_capacity_bytes().min(new_len));
                        return Err(e);
                    }
                };
                self.segments.push(Segment {
                    header_sector,
                    num_bytes: 0,
                    data_sectors: Vec::new(),
                });
            }
        }
        self.set_len(new_len);
        Ok(())
    }

    /// Distributes `len` bytes across the chain in order: each segment
    /// takes as many bytes as its allocated capacity holds before the next
    /// segment takes the remainder, so every non-terminal segment's
    /// `num_bytes` comes out equal to its (full) capacity and only the
    /// terminal segment's may fall short of it.
    fn set_len(&mut self, len: usize) {
        let mut remaining = len;
        for seg in &mut self.segments {
            let cap = seg.capacity_bytes();
            let assigned = remaining.min(cap);
            seg.num_bytes = assigned as u32;
            remaining -= assigned;
        }
    }

    /// The sectors this inode currently spans, head first, used by
    /// `FileSystem::print` and tests.
    pub fn sectors(&self) -> Vec<u32> {
        let mut out = Vec::new();
        for seg in &self.segments {
            out.push(seg.header_sector);
            out.extend(seg.data_sectors.iter().copied());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::MemoryDisk;

    #[test]
    fn allocate_and_fetch_round_trip() {
        let mut disk = MemoryDisk::new(64);
        let mut bitmap = Bitmap::new(64);
        bitmap.mark(0).unwrap();
        bitmap.mark(1).unwrap();

        let inode = Inode::allocate(&mut disk, &mut bitmap, 200).unwrap();
        assert_eq!(inode.file_length(), 200);
        assert!(inode.sectors().len() >= 1 + ceil_div(200, SECTOR_SIZE));

        let fetched = Inode::fetch_from(&mut disk, inode.head_sector()).unwrap();
        assert_eq!(fetched.file_length(), 200);
        assert_eq!(fetched.sectors(), inode.sectors());
    }

    #[test]
    fn grow_chains_a_new_segment_past_one_sector_of_pointers() {
        let mut disk = MemoryDisk::new(256);
        let mut bitmap = Bitmap::new(256);
        bitmap.mark(0).unwrap();
        bitmap.mark(1).unwrap();

        let mut inode = Inode::allocate(&mut disk, &mut bitmap, 0).unwrap();
        let big = crate::config::MAX_FILE_SIZE + SECTOR_SIZE * 3;
        inode.grow_to(&mut disk, &mut bitmap, big).unwrap();
        inode.write_back(&mut disk).unwrap();
        assert_eq!(inode.file_length(), big as u32);
        assert_eq!(inode.segments.len(), 2);

        let fetched = Inode::fetch_from(&mut disk, inode.head_sector()).unwrap();
        assert_eq!(fetched.file_length(), big as u32);
        assert_eq!(fetched.segments.len(), 2);
    }

    #[test]
    fn byte_to_sector_maps_across_segment_boundary() {
        let mut disk = MemoryDisk::new(256);
        let mut bitmap = Bitmap::new(256);
        bitmap.mark(0).unwrap();
        bitmap.mark(1).unwrap();

        let mut inode = Inode::allocate(&mut disk, &mut bitmap, 0).unwrap();
        let big = crate::config::MAX_FILE_SIZE + SECTOR_SIZE;
        inode.grow_to(&mut disk, &mut bitmap, big).unwrap();
        let last_sector = inode.byte_to_sector(big - 1).unwrap();
        assert_eq!(last_sector, *inode.segments.last().unwrap().data_sectors.last().unwrap());
    }

    #[test]
    fn non_terminal_segment_num_bytes_is_its_own_length_not_the_total() {
        let mut disk = MemoryDisk::new(64);
        let mut bitmap = Bitmap::new(64);
        bitmap.mark(0).unwrap();
        bitmap.mark(1).unwrap();

        let inode = Inode::allocate(&mut disk, &mut bitmap, 5000).unwrap();
        assert_eq!(inode.segments.len(), 2);

        let head_bytes = disk.read_sector_owned(inode.segments[0].header_sector).unwrap();
        let head_raw: RawHeader = bytemuck::cast(head_bytes);
        assert_eq!(head_raw.num_bytes, crate::config::MAX_FILE_SIZE as i32);

        let tail_bytes = disk.read_sector_owned(inode.segments[1].header_sector).unwrap();
        let tail_raw: RawHeader = bytemuck::cast(tail_bytes);
        assert_eq!(tail_raw.num_bytes, 5000 - crate::config::MAX_FILE_SIZE as i32);
    }

    #[test]
    fn deallocate_clears_every_sector() {
        let mut disk = MemoryDisk::new(64);
        let mut bitmap = Bitmap::new(64);
        bitmap.mark(0).unwrap();
        bitmap.mark(1).unwrap();

        let inode = Inode::allocate(&mut disk, &mut bitmap, 300).unwrap();
        let sectors = inode.sectors();
        inode.deallocate(&mut bitmap).unwrap();
        for s in sectors {
            assert!(!bitmap.test(s).unwrap());
        }
    }
}
