// SPDX-License-Identifier: MIT

use time::OffsetDateTime;

bitflags::bitflags! {
    /// Format-neutral attribute mask used to filter directory listings.
    ///
    /// Bit values follow the DOS attribute byte shared by FAT32 and exFAT;
    /// ext2 entries are mapped onto it from their mode bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct AttrFlags: u16 {
        const READ_ONLY = 0x0001;
        const HIDDEN    = 0x0002;
        const SYSTEM    = 0x0004;
        const VOLUME_ID = 0x0008;
        const DIRECTORY = 0x0010;
        const ARCHIVE   = 0x0020;
    }
}

/// Standard file metadata used across the three formats.
///
/// Fields:
/// - `read_only`: true if the file is marked as read-only (no write bits on ext2).
/// - `hidden`: true if the file is hidden (`.` prefix on ext2).
/// - `system`: true if the file is used by the OS (FAT32 / exFAT only).
/// - `archive`: true if marked for backup/archive.
/// - `dir`: true if this entry is a directory.
/// - `created`, `modified`, `accessed`: timestamps when the format records them.
/// - `mode`: Unix permission bits (ext2 only).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileAttributes {
    pub read_only: bool,
    pub hidden: bool,
    pub system: bool,
    pub archive: bool,
    pub dir: bool,
    pub created: Option<OffsetDateTime>,
    pub modified: Option<OffsetDateTime>,
    pub accessed: Option<OffsetDateTime>,
    pub mode: Option<u32>,
}

impl FileAttributes {
    /// Creates default directory attributes (`dir = true`).
    pub fn new_dir() -> Self {
        Self {
            dir: true,
            ..Default::default()
        }
    }

    /// Creates default file attributes (`archive = true`).
    pub fn new_file() -> Self {
        Self {
            archive: true,
            ..Default::default()
        }
    }

    pub fn set_read_only(mut self, value: bool) -> Self {
        self.read_only = value;
        self
    }

    pub fn set_hidden(mut self, value: bool) -> Self {
        self.hidden = value;
        self
    }

    pub fn set_system(mut self, value: bool) -> Self {
        self.system = value;
        self
    }

    pub fn set_mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode & 0o7777);
        self
    }

    pub fn set_modified(mut self, ts: OffsetDateTime) -> Self {
        self.modified = Some(ts);
        self
    }

    /// Projects the boolean attributes onto the listing mask.
    pub fn flags(&self) -> AttrFlags {
        let mut flags = AttrFlags::empty();
        flags.set(AttrFlags::READ_ONLY, self.read_only);
        flags.set(AttrFlags::HIDDEN, self.hidden);
        flags.set(AttrFlags::SYSTEM, self.system);
        flags.set(AttrFlags::DIRECTORY, self.dir);
        flags.set(AttrFlags::ARCHIVE, self.archive);
        flags
    }

    /// Compares structure only (ignores timestamps and mode).
    pub fn structural_eq(&self, other: &Self) -> bool {
        self.flags() == other.flags()
    }
}
