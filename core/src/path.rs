//! Absolute path resolution across directory files.

use crate::block::BlockDevice;
use crate::directory::Directory;
use crate::error::{FsError, FsResult};
use crate::inode::Inode;
use crate::open_file::OpenFile;

/// Splits `path` into its non-final components and final name, rejecting
/// anything that isn't a well-formed absolute path (no empty components,
/// i.e. no `//`, no trailing `/`, no bare `/`).
fn split(path: &str) -> FsResult<(Vec<&str>, &str)> {
    let rest = path.strip_prefix('/').ok_or(FsError::InvalidPath)?;
    if rest.is_empty() {
        return Err(FsError::InvalidPath);
    }
    let mut components: Vec<&str> = rest.split('/').collect();
    if components.iter().any(|c| c.is_empty()) {
        return Err(FsError::InvalidPath);
    }
    let name = components.pop().expect("checked non-empty above");
    Ok((components, name))
}

/// Walks `path` from the root directory, opening every intermediate
/// sub-directory in turn, and returns the containing directory's open file
/// handle together with the final path component. The final component is
/// never looked up here; callers `Find`/`Add`/`Remove` it themselves.
///
/// The root case (a one-component path) returns a fresh `OpenFile` built
/// from a clone of `root_inode` rather than the facade's own long-lived
/// handle; since both describe the identical sector chain this is
/// observably the same directory, and the value is simply dropped by the
/// caller when done, which is all "release the root handle without closing
/// it" means once a handle is an owned value instead of a shared pointer.
pub fn resolve(
    device: &mut dyn BlockDevice,
    root_inode: &Inode,
    path: &str,
) -> FsResult<(OpenFile, String)> {
    let (components, name) = split(path)?;
    let mut current = OpenFile::new(root_inode.clone());
    for comp in components {
        let bytes = current.read_all(device)?;
        let dir = Directory::decode(&bytes)?;
        let entry = dir.find(comp).ok_or(FsError::NotFound)?;
        if !entry.is_dir {
            return Err(FsError::NotFound);
        }
        let inode = Inode::fetch_from(device, entry.sector)?;
        current = OpenFile::new(inode);
    }
    Ok((current, name.to_string()))
}
