// SPDX-License-Identifier: MIT

use alloc::string::String;
use alloc::vec::Vec;

use crate::core::attr::{AttrFlags, FileAttributes};
use crate::core::entry::DirEntry;
use crate::core::errors::*;
use crate::core::resolver;

/// Space accounting of a mounted volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeUsage {
    pub unit_size: usize,
    pub total_units: u64,
    pub free_units: u64,
}

impl VolumeUsage {
    #[inline]
    pub fn total_bytes(&self) -> u64 {
        self.total_units * self.unit_size as u64
    }

    #[inline]
    pub fn free_bytes(&self) -> u64 {
        self.free_units * self.unit_size as u64
    }
}

/// Common operations of a mounted volume.
///
/// Entries handed out are snapshots. After a structural change to a
/// directory (create, delete, growth) re-resolve the entries taken from it.
pub trait FsVolume {
    /// Short format name (`"ext2"`, `"fat32"`, `"exfat"`).
    fn identifier(&self) -> &'static str;

    /// Synthetic root entry.
    fn root(&self) -> DirEntry;

    fn label(&self) -> Option<String>;

    fn usage(&self) -> VolumeUsage;

    fn is_read_only(&self) -> bool;

    /// Children of `dir`, without `.` / `..` and label records.
    ///
    /// With `exclude == false` entries whose attributes intersect `mask` are
    /// skipped; with `exclude == true` only those entries are returned.
    fn list_dir(&mut self, dir: &DirEntry, mask: AttrFlags, exclude: bool)
    -> FsResult<Vec<DirEntry>>;

    /// Child of `dir` named `name`.
    fn lookup(&mut self, dir: &DirEntry, name: &str) -> FsResult<Option<DirEntry>>;

    /// Resolves `~/a/b` style paths.
    fn open(&mut self, path: &str) -> FsResult<DirEntry> {
        resolver::resolve_path(self, path)
    }

    /// Creates `name` under the directory at `parent_path` with `initial_size`
    /// zero bytes of data (ignored for directories).
    fn create(
        &mut self,
        parent_path: &str,
        name: &str,
        attr: &FileAttributes,
        initial_size: u64,
    ) -> FsResult<DirEntry>;

    /// Releases the storage of `entry` and removes its record. Directories
    /// are expected to be empty; see [`FsVolume::delete`].
    fn remove(&mut self, entry: &DirEntry) -> FsResult;

    /// Deletes `entry`, recursing into directories.
    fn delete(&mut self, entry: &DirEntry) -> FsResult {
        crate::ensure!(!self.is_read_only(), FsError::ReadOnly);
        crate::ensure!(
            !entry.is_root(),
            FsError::InvalidInput("the root directory cannot be deleted")
        );
        if entry.is_dir() {
            for child in self.list_dir(entry, AttrFlags::empty(), false)? {
                self.delete(&child)?;
            }
        }
        self.remove(entry)
    }

    /// Reads up to `buf.len()` bytes at `offset`, clamped to the entry size.
    fn read(&mut self, entry: &DirEntry, offset: u64, buf: &mut [u8]) -> FsResult<usize>;

    /// Writes `data` at `offset`, growing the file first when needed. The
    /// updated entry is persisted in its parent directory.
    fn write(&mut self, entry: &mut DirEntry, offset: u64, data: &[u8]) -> FsResult<usize>;

    /// Sets the file size; new bytes read as zero.
    fn resize(&mut self, entry: &mut DirEntry, new_size: u64) -> FsResult;

    /// Writes cached metadata (allocation tables, bitmaps, counters).
    fn flush(&mut self) -> FsResult;

    /// Flushes and releases the volume.
    fn unmount(self: alloc::boxed::Box<Self>) -> FsResult;
}
