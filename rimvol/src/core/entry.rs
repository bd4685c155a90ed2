// SPDX-License-Identifier: MIT

use alloc::string::String;

use crate::core::attr::{AttrFlags, FileAttributes};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    /// Symlinks, devices and other special ext2 inodes.
    Other,
}

/// Storage descriptor of a file or directory.
///
/// `first_unit` is the first cluster for FAT32/exFAT and the inode number for
/// ext2. `contiguous` mirrors the exFAT NoFatChain flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DataRef {
    pub first_unit: u32,
    pub size: u64,
    pub contiguous: bool,
}

/// Back-pointer from an entry to its on-disk record(s).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryLocation {
    /// Directory that holds the records.
    pub parent: DataRef,
    /// Byte offset of the first record inside the parent's data.
    pub offset: u64,
    /// Number of consecutive records forming the entry.
    pub records: u32,
}

/// Format-neutral directory entry.
///
/// A snapshot: any structural change to the parent directory may make the
/// location stale, re-resolve after such changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
    pub attr: FileAttributes,
    pub size: u64,
    pub first_unit: u32,
    pub contiguous: bool,
    /// `None` for the root directory.
    pub location: Option<EntryLocation>,
}

impl DirEntry {
    /// Synthetic root entry: zero size, directory attributes, no parent.
    pub fn root(root_unit: u32) -> Self {
        Self {
            name: String::from("~"),
            kind: EntryKind::Directory,
            attr: FileAttributes::new_dir(),
            size: 0,
            first_unit: root_unit,
            contiguous: false,
            location: None,
        }
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    #[inline]
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.location.is_none()
    }

    /// Storage descriptor of this entry's own data.
    #[inline]
    pub fn data(&self) -> DataRef {
        DataRef {
            first_unit: self.first_unit,
            size: self.size,
            contiguous: self.contiguous,
        }
    }

    #[inline]
    pub fn flags(&self) -> AttrFlags {
        self.attr.flags()
    }

    /// Listing filter: with `exclude == false` entries intersecting `mask` are
    /// dropped, with `exclude == true` only those entries are kept.
    #[inline]
    pub fn passes(&self, mask: AttrFlags, exclude: bool) -> bool {
        self.flags().intersects(mask) == exclude
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, attr: FileAttributes) -> DirEntry {
        DirEntry {
            name: name.into(),
            kind: EntryKind::File,
            attr,
            size: 0,
            first_unit: 0,
            contiguous: false,
            location: None,
        }
    }

    #[test]
    fn test_root_entry() {
        let root = DirEntry::root(2);
        assert!(root.is_dir());
        assert!(root.is_root());
        assert_eq!(root.size, 0);
        assert_eq!(root.data().first_unit, 2);
    }

    #[test]
    fn test_filter_semantics() {
        let hidden = file("h", FileAttributes::new_file().set_hidden(true));
        let plain = file("p", FileAttributes::new_file());

        // exclude == false: drop entries matching the mask
        assert!(!hidden.passes(AttrFlags::HIDDEN, false));
        assert!(plain.passes(AttrFlags::HIDDEN, false));

        // exclude == true: keep only matching entries
        assert!(hidden.passes(AttrFlags::HIDDEN, true));
        assert!(!plain.passes(AttrFlags::HIDDEN, true));

        // empty mask keeps everything
        assert!(hidden.passes(AttrFlags::empty(), false));
    }
}
