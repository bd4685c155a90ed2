// SPDX-License-Identifier: MIT

use alloc::string::String;

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::fs::exfat::constant::*;

/// Allocation bitmap record; bit 0 of `bitmap_flags` selects the FAT it pairs with.
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug)]
#[repr(C, packed)]
pub struct ExFatBitmapEntry {
    pub entry_type: u8,
    pub bitmap_flags: u8,
    pub reserved: [u8; 18],
    pub first_cluster: u32,
    pub data_length: u64,
}

impl ExFatBitmapEntry {
    pub fn new(index: u8, first_cluster: u32, data_length: u64) -> Self {
        Self {
            entry_type: EXFAT_ENTRY_BITMAP,
            bitmap_flags: index & 1,
            reserved: [0u8; 18],
            first_cluster,
            data_length,
        }
    }

    #[inline]
    pub fn index(&self) -> u8 {
        self.bitmap_flags & 1
    }
}

#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug)]
#[repr(C, packed)]
pub struct ExFatUpcaseEntry {
    pub entry_type: u8,
    pub reserved1: [u8; 3],
    pub table_checksum: u32,
    pub reserved2: [u8; 12],
    pub first_cluster: u32,
    pub data_length: u64,
}

impl ExFatUpcaseEntry {
    pub fn new(first_cluster: u32, data_length: u64, table_checksum: u32) -> Self {
        Self {
            entry_type: EXFAT_ENTRY_UPCASE,
            reserved1: [0u8; 3],
            table_checksum,
            reserved2: [0u8; 12],
            first_cluster,
            data_length,
        }
    }
}

#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug)]
#[repr(C, packed)]
pub struct ExFatVolumeLabelEntry {
    pub entry_type: u8,
    pub character_count: u8,
    pub volume_label: [u16; EXFAT_LABEL_MAX_CHARS],
    pub reserved: u64,
}

impl ExFatVolumeLabelEntry {
    /// Label record; longer labels are cut to 11 UTF-16 units.
    pub fn new(label: &str) -> Self {
        let mut volume_label = [0u16; EXFAT_LABEL_MAX_CHARS];
        let mut count = 0;
        for (slot, unit) in volume_label.iter_mut().zip(label.encode_utf16()) {
            *slot = unit;
            count += 1;
        }
        Self {
            entry_type: EXFAT_ENTRY_LABEL,
            character_count: count as u8,
            volume_label,
            reserved: 0,
        }
    }

    pub fn label(&self) -> String {
        let units = self.volume_label;
        let count = (self.character_count as usize).min(EXFAT_LABEL_MAX_CHARS);
        String::from_utf16_lossy(&units[..count])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizes() {
        assert_eq!(core::mem::size_of::<ExFatBitmapEntry>(), 32);
        assert_eq!(core::mem::size_of::<ExFatUpcaseEntry>(), 32);
        assert_eq!(core::mem::size_of::<ExFatVolumeLabelEntry>(), 32);
    }

    #[test]
    fn test_label_roundtrip() {
        let e = ExFatVolumeLabelEntry::new("Backup Disk 2024");
        assert_eq!(e.character_count, 11);
        assert_eq!(e.label(), "Backup Disk");
        assert_eq!(e.as_bytes()[0], 0x83);
    }
}
