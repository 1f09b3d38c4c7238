//! Root directory contents: a flat, fixed-capacity table of name/inode
//! pairs.

use bytemuck::{Pod, Zeroable};

use crate::config::NAME_MAX;
use crate::error::{FsError, FsResult};

/// On-disk shape of one directory slot. `in_use` doubles as a tombstone: a
/// removed entry is zeroed rather than compacted, so indices stay stable.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct RawDirEntry {
    in_use: u8,
    is_dir: u8,
    _pad: [u8; 2],
    sector: i32,
    name: [u8; NAME_MAX],
}

/// Size in bytes of one serialized directory slot: `1 + 1 + 2 + 4 + NAME_MAX`.
pub const RAW_ENTRY_SIZE: usize = std::mem::size_of::<RawDirEntry>();

const _: () = assert!(RAW_ENTRY_SIZE == 4 + 4 + NAME_MAX);

/// One resolved directory slot, with the name already checked UTF-8 and
/// trimmed of its trailing NUL padding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub sector: u32,
    pub is_dir: bool,
}

fn encode_name(name: &str) -> FsResult<[u8; NAME_MAX]> {
    let bytes = name.as_bytes();
    if bytes.is_empty() || bytes.len() > NAME_MAX || bytes.contains(&b'/') || bytes.contains(&0) {
        return Err(FsError::InvalidPath);
    }
    let mut buf = [0u8; NAME_MAX];
    buf[..bytes.len()].copy_from_slice(bytes);
    Ok(buf)
}

fn decode_name(raw: &[u8; NAME_MAX]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

/// In-memory view of a directory's contents. Pure serialization: this type
/// knows nothing about sectors or the block device. The facade in
/// [`crate::fs`] is the only thing that reads or writes a directory's bytes.
#[derive(Debug, Clone)]
pub struct Directory {
    entries: Vec<Option<DirEntry>>,
}

impl Directory {
    /// An empty directory with room for `capacity` entries.
    pub fn empty(capacity: usize) -> Self {
        Self {
            entries: vec![None; capacity],
        }
    }

    /// Decodes a directory file's raw bytes. `bytes.len()` must be an exact
    /// multiple of [`RAW_ENTRY_SIZE`].
    pub fn decode(bytes: &[u8]) -> FsResult<Self> {
        if bytes.len() % RAW_ENTRY_SIZE != 0 {
            return Err(FsError::InvalidGeometry(
                "directory file length is not a multiple of the entry size",
            ));
        }
        let raws: &[RawDirEntry] = bytemuck::cast_slice(bytes);
        let entries = raws
            .iter()
            .map(|raw| {
                if raw.in_use == 0 {
                    None
                } else {
                    Some(DirEntry {
                        name: decode_name(&raw.name),
                        sector: raw.sector as u32,
                        is_dir: raw.is_dir != 0,
                    })
                }
            })
            .collect();
        Ok(Self { entries })
    }

    /// Serializes this directory back to raw bytes, suitable for writing
    /// through [`crate::open_file::OpenFile::write_all`].
    pub fn encode(&self) -> Vec<u8> {
        let raws: Vec<RawDirEntry> = self
            .entries
            .iter()
            .map(|slot| match slot {
                None => RawDirEntry::zeroed(),
                Some(e) => RawDirEntry {
                    in_use: 1,
                    is_dir: e.is_dir as u8,
                    _pad: [0; 2],
                    sector: e.sector as i32,
                    name: encode_name(&e.name).expect("name was validated on insertion"),
                },
            })
            .collect();
        bytemuck::cast_slice(&raws).to_vec()
    }

    /// Looks up `name` among the in-use entries.
    pub fn find(&self, name: &str) -> Option<&DirEntry> {
        self.entries.iter().flatten().find(|e| e.name == name)
    }

    /// Inserts a new entry. Fails with [`FsError::AlreadyExists`] if `name`
    /// is already present, or [`FsError::DirectoryFull`] if every slot is
    /// occupied.
    pub fn add(&mut self, name: &str, sector: u32, is_dir: bool) -> FsResult<()> {
        encode_name(name)?;
        if self.find(name).is_some() {
            return Err(FsError::AlreadyExists);
        }
        let slot = self
            .entries
            .iter_mut()
            .find(|slot| slot.is_none())
            .ok_or(FsError::DirectoryFull)?;
        *slot = Some(DirEntry {
            name: name.to_string(),
            sector,
            is_dir,
        });
        Ok(())
    }

    /// Removes the entry named `name`. Fails with [`FsError::NotFound`] if
    /// absent.
    pub fn remove(&mut self, name: &str) -> FsResult<DirEntry> {
        let slot = self
            .entries
            .iter_mut()
            .find(|slot| slot.as_ref().is_some_and(|e| e.name == name))
            .ok_or(FsError::NotFound)?;
        Ok(slot.take().expect("checked Some above"))
    }

    /// True if no in-use entries remain.
    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(Option::is_none)
    }

    /// Lists in-use entries in slot order, the listing order used by
    /// `FileSystem::list`.
    pub fn list(&self) -> Vec<&DirEntry> {
        self.entries.iter().flatten().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_find_remove_round_trip() {
        let mut dir = Directory::empty(4);
        dir.add("foo.txt", 7, false).unwrap();
        dir.add("sub", 9, true).unwrap();
        assert_eq!(dir.find("foo.txt").unwrap().sector, 7);
        assert!(dir.find("sub").unwrap().is_dir);
        assert!(dir.find("missing").is_none());

        let removed = dir.remove("foo.txt").unwrap();
        assert_eq!(removed.sector, 7);
        assert!(dir.find("foo.txt").is_none());
        assert!(!dir.is_empty());

        dir.remove("sub").unwrap();
        assert!(dir.is_empty());
    }

    #[test]
    fn rejects_duplicate_and_overflow() {
        let mut dir = Directory::empty(1);
        dir.add("a", 1, false).unwrap();
        assert!(matches!(dir.add("a", 2, false), Err(FsError::AlreadyExists)));
        assert!(matches!(dir.add("b", 2, false), Err(FsError::DirectoryFull)));
    }

    #[test]
    fn encode_decode_round_trip() {
        let mut dir = Directory::empty(3);
        dir.add("one", 2, false).unwrap();
        dir.add("two", 3, true).unwrap();
        let bytes = dir.encode();
        assert_eq!(bytes.len(), 3 * RAW_ENTRY_SIZE);
        let decoded = Directory::decode(&bytes).unwrap();
        assert_eq!(decoded.list().len(), 2);
        assert_eq!(decoded.find("one").unwrap().sector, 2);
        assert!(decoded.find("two").unwrap().is_dir);
    }

    #[test]
    fn rejects_invalid_names() {
        let mut dir = Directory::empty(2);
        assert!(matches!(dir.add("", 1, false), Err(FsError::InvalidPath)));
        assert!(matches!(dir.add("a/b", 1, false), Err(FsError::InvalidPath)));
    }
}
