// SPDX-License-Identifier: MIT

use alloc::vec::Vec;

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::core::utils::time;
use crate::fs::fat32::{attr::Fat32Attributes, constant::*};

/// Short-name (8.3) directory record.
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug, PartialEq, Eq)]
#[repr(C, packed)]
pub struct Fat32Entry {
    pub name: [u8; 11],
    pub attr: u8,
    pub nt_reserved: u8,
    pub creation_time_tenth: u8,
    pub creation_time: u16,
    pub creation_date: u16,
    pub access_date: u16,
    pub first_cluster_high: u16,
    pub write_time: u16,
    pub write_date: u16,
    pub first_cluster_low: u16,
    pub file_size: u32,
}

impl Fat32Entry {
    pub fn new(name: [u8; 11], attr: u8, cluster: u32, size: u32, ts: (u16, u16, u8)) -> Self {
        let (date, time, fine) = ts;
        let mut entry = Self {
            name,
            attr,
            nt_reserved: 0,
            creation_time_tenth: fine,
            creation_time: time,
            creation_date: date,
            access_date: date,
            first_cluster_high: 0,
            write_time: time,
            write_date: date,
            first_cluster_low: 0,
            file_size: size,
        };
        entry.set_first_cluster(cluster);
        entry
    }

    /// `.` / `..` record of a fresh directory.
    pub fn dot(name: &[u8; 11], cluster: u32, ts: (u16, u16, u8)) -> Self {
        Self::new(*name, Fat32Attributes::DIRECTORY.bits(), cluster, 0, ts)
    }

    pub fn volume_label(label: [u8; 11], ts: (u16, u16, u8)) -> Self {
        Self::new(label, Fat32Attributes::VOLUME_ID.bits(), 0, 0, ts)
    }

    #[inline]
    pub fn first_cluster(&self) -> u32 {
        ((self.first_cluster_high as u32) << 16) | (self.first_cluster_low as u32)
    }

    #[inline]
    pub fn set_first_cluster(&mut self, cluster: u32) {
        self.first_cluster_high = (cluster >> 16) as u16;
        self.first_cluster_low = cluster as u16;
    }

    pub fn set_modified(&mut self, ts: (u16, u16, u8)) {
        self.write_date = ts.0;
        self.write_time = ts.1;
        self.access_date = ts.0;
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.attr & Fat32Attributes::DIRECTORY.bits() != 0
    }

    #[inline]
    pub fn is_volume_label(&self) -> bool {
        self.attr & Fat32Attributes::VOLUME_ID.bits() != 0
            && !Fat32Attributes::is_lfn(self.attr)
    }

    #[inline]
    pub fn is_dot(&self) -> bool {
        self.name == *FAT_DOT_NAME || self.name == *FAT_DOTDOT_NAME
    }

    pub fn created(&self) -> Option<::time::OffsetDateTime> {
        time::from_fat(self.creation_date, self.creation_time, self.creation_time_tenth)
    }

    pub fn modified(&self) -> Option<::time::OffsetDateTime> {
        time::from_fat(self.write_date, self.write_time, 0)
    }

    pub fn accessed(&self) -> Option<::time::OffsetDateTime> {
        time::from_fat(self.access_date, 0, 0)
    }

    #[inline(always)]
    pub fn to_raw_buffer(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self.as_bytes());
    }
}

/// Long-name record: 13 UTF-16 units split over three fields.
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug, PartialEq, Eq)]
#[repr(C, packed)]
pub struct Fat32LFNEntry {
    pub order: u8,
    pub name1: [u16; 5],
    pub attr: u8,
    pub type_field: u8,
    pub checksum: u8,
    pub name2: [u16; 6],
    pub zero: u16,
    pub name3: [u16; 2],
}

impl Fat32LFNEntry {
    /// `name_chunk` holds at most 13 units, already padded by the caller.
    pub fn new(order: u8, is_last: bool, name_chunk: &[u16; FAT_LFN_CHARS_PER_ENTRY], checksum: u8) -> Self {
        let mut name1 = [0u16; 5];
        let mut name2 = [0u16; 6];
        let mut name3 = [0u16; 2];
        name1.copy_from_slice(&name_chunk[0..5]);
        name2.copy_from_slice(&name_chunk[5..11]);
        name3.copy_from_slice(&name_chunk[11..13]);

        Self {
            order: if is_last { order | FAT_LFN_LAST_FLAG } else { order },
            name1,
            attr: Fat32Attributes::LFN.bits(),
            type_field: 0,
            checksum,
            name2,
            zero: 0,
            name3,
        }
    }

    #[inline]
    pub fn sequence(&self) -> u8 {
        self.order & FAT_LFN_ORDER_MASK
    }

    #[inline]
    pub fn is_last(&self) -> bool {
        self.order & FAT_LFN_LAST_FLAG != 0
    }

    pub fn extract_utf16(&self) -> [u16; FAT_LFN_CHARS_PER_ENTRY] {
        let mut out = [0xFFFFu16; FAT_LFN_CHARS_PER_ENTRY];
        let (name1, name2, name3) = (self.name1, self.name2, self.name3);
        out[0..5].copy_from_slice(&name1);
        out[5..11].copy_from_slice(&name2);
        out[11..13].copy_from_slice(&name3);
        out
    }

    #[inline(always)]
    pub fn to_raw_buffer(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self.as_bytes());
    }
}

/// A complete on-disk entry: long-name run in storage order, then the short record.
#[derive(Debug, Clone)]
pub struct Fat32Entries {
    pub lfn: Vec<Fat32LFNEntry>,
    pub entry: Fat32Entry,
}

impl Fat32Entries {
    #[inline]
    pub fn record_count(&self) -> usize {
        self.lfn.len() + 1
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.record_count() * FAT_DIR_ENTRY_SIZE);
        for lfn in &self.lfn {
            lfn.to_raw_buffer(&mut buf);
        }
        self.entry.to_raw_buffer(&mut buf);
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizes() {
        assert_eq!(core::mem::size_of::<Fat32Entry>(), 32);
        assert_eq!(core::mem::size_of::<Fat32LFNEntry>(), 32);
    }

    #[test]
    fn test_lfn_layout() {
        let mut chunk = [0xFFFFu16; 13];
        for (i, c) in "hello_world".encode_utf16().enumerate() {
            chunk[i] = c;
        }
        chunk[11] = 0;
        let lfn = Fat32LFNEntry::new(1, true, &chunk, 0xAB);
        let raw = lfn.as_bytes();

        assert_eq!(raw[0], 0x41);
        assert_eq!(raw[1], b'h');
        assert_eq!(raw[11], 0x0F);
        assert_eq!(raw[13], 0xAB);
        assert_eq!(raw[14], b'_');
        assert_eq!(&raw[26..28], &[0, 0]);
        assert_eq!(lfn.extract_utf16(), chunk);
        assert_eq!(lfn.sequence(), 1);
        assert!(lfn.is_last());
    }

    #[test]
    fn test_first_cluster_split() {
        let e = Fat32Entry::new(*b"A          ", 0x20, 0x0012_3456, 7, (0, 0, 0));
        assert_eq!(e.first_cluster(), 0x0012_3456);
        let raw = e.as_bytes();
        assert_eq!(u16::from_le_bytes([raw[20], raw[21]]), 0x0012);
        assert_eq!(u16::from_le_bytes([raw[26], raw[27]]), 0x3456);
        assert_eq!(u32::from_le_bytes(raw[28..32].try_into().unwrap()), 7);
    }
}
