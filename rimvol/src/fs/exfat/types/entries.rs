// SPDX-License-Identifier: MIT

use alloc::string::String;
use alloc::vec::Vec;

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::core::utils::checksum::accumulate_with_escape;
use crate::core::utils::time;
use crate::fs::exfat::{constant::*, utils};

/// File directory record (primary of an entry set).
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug)]
#[repr(C, packed)]
pub struct ExFatFileEntry {
    pub entry_type: u8,
    pub secondary_count: u8,
    pub set_checksum: u16,
    pub file_attributes: u16,
    pub reserved1: u16,
    pub create_timestamp: u32,
    pub modify_timestamp: u32,
    pub access_timestamp: u32,
    pub create_10ms_increment: u8,
    pub modify_10ms_increment: u8,
    pub create_utc_offset: u8,
    pub modify_utc_offset: u8,
    pub access_utc_offset: u8,
    pub reserved2: [u8; 7],
}

impl ExFatFileEntry {
    pub fn new(attributes: u16, secondary_count: u8, ts: (u32, u8, u8)) -> Self {
        let (stamp, fine, offset) = ts;
        Self {
            entry_type: EXFAT_ENTRY_FILE,
            secondary_count,
            set_checksum: 0,
            file_attributes: attributes,
            reserved1: 0,
            create_timestamp: stamp,
            modify_timestamp: stamp,
            access_timestamp: stamp,
            create_10ms_increment: fine,
            modify_10ms_increment: fine,
            create_utc_offset: offset,
            modify_utc_offset: offset,
            access_utc_offset: offset,
            reserved2: [0u8; 7],
        }
    }

    pub fn set_modified(&mut self, ts: (u32, u8, u8)) {
        self.modify_timestamp = ts.0;
        self.modify_10ms_increment = ts.1;
        self.modify_utc_offset = ts.2;
        self.access_timestamp = ts.0;
        self.access_utc_offset = ts.2;
    }

    pub fn created(&self) -> Option<::time::OffsetDateTime> {
        time::from_exfat(self.create_timestamp, self.create_10ms_increment, self.create_utc_offset)
    }

    pub fn modified(&self) -> Option<::time::OffsetDateTime> {
        time::from_exfat(self.modify_timestamp, self.modify_10ms_increment, self.modify_utc_offset)
    }

    pub fn accessed(&self) -> Option<::time::OffsetDateTime> {
        time::from_exfat(self.access_timestamp, 0, self.access_utc_offset)
    }
}

/// Stream extension record: size, first cluster and allocation flags.
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug)]
#[repr(C, packed)]
pub struct ExFatStreamEntry {
    pub entry_type: u8,
    pub general_secondary_flags: u8,
    pub reserved1: u8,
    pub name_length: u8,
    pub name_hash: u16,
    pub reserved2: u16,
    pub valid_data_length: u64,
    pub reserved3: u32,
    pub first_cluster: u32,
    pub data_length: u64,
}

impl ExFatStreamEntry {
    pub fn new(first_cluster: u32, data_length: u64, name_length: u8, name_hash: u16) -> Self {
        let mut stream = Self {
            entry_type: EXFAT_ENTRY_STREAM,
            general_secondary_flags: 0,
            reserved1: 0,
            name_length,
            name_hash,
            reserved2: 0,
            valid_data_length: 0,
            reserved3: 0,
            first_cluster: 0,
            data_length: 0,
        };
        stream.set_data(first_cluster, data_length, false);
        stream
    }

    /// Updates the allocation; `AllocationPossible` follows the first cluster.
    pub fn set_data(&mut self, first_cluster: u32, data_length: u64, contiguous: bool) {
        self.first_cluster = first_cluster;
        self.data_length = data_length;
        self.valid_data_length = data_length;
        let mut flags = 0;
        if first_cluster != 0 {
            flags |= EXFAT_STREAM_ALLOC_POSSIBLE;
            if contiguous {
                flags |= EXFAT_STREAM_NO_FAT_CHAIN;
            }
        }
        self.general_secondary_flags = flags;
    }

    #[inline]
    pub fn is_contiguous(&self) -> bool {
        self.general_secondary_flags & EXFAT_STREAM_NO_FAT_CHAIN != 0
    }
}

/// File name record: 15 UTF-16 units.
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug)]
#[repr(C, packed)]
pub struct ExFatNameEntry {
    pub entry_type: u8,
    pub general_secondary_flags: u8,
    pub name_chars: [u16; EXFAT_NAME_ENTRY_CHARS],
}

impl ExFatNameEntry {
    pub fn new(name_chars: [u16; EXFAT_NAME_ENTRY_CHARS]) -> Self {
        Self {
            entry_type: EXFAT_ENTRY_NAME,
            general_secondary_flags: 0,
            name_chars,
        }
    }
}

/// Complete entry set: File, Stream and Name records.
#[derive(Debug, Clone)]
pub struct ExFatEntries {
    pub file: ExFatFileEntry,
    pub stream: ExFatStreamEntry,
    pub names: Vec<ExFatNameEntry>,
}

impl ExFatEntries {
    /// Builds a fresh set for `name`. The caller checks the name length.
    pub fn new(
        name: &str,
        attributes: u16,
        first_cluster: u32,
        data_length: u64,
        ts: (u32, u8, u8),
    ) -> Self {
        let names = utils::name_entries(name);
        let name_length = name.encode_utf16().count() as u8;
        let stream = ExFatStreamEntry::new(
            first_cluster,
            data_length,
            name_length,
            utils::name_hash(name),
        );
        let file = ExFatFileEntry::new(attributes, 1 + names.len() as u8, ts);
        let mut set = Self { file, stream, names };
        set.update_checksum();
        set
    }

    /// Decodes a set from its raw records. `None` when the record types do
    /// not form a File + Stream + Name sequence.
    pub fn from_bytes(raw: &[u8]) -> Option<Self> {
        let mut records = raw.chunks_exact(EXFAT_ENTRY_SIZE_BYTES);
        let file = ExFatFileEntry::read_from_bytes(records.next()?).ok()?;
        let stream = ExFatStreamEntry::read_from_bytes(records.next()?).ok()?;
        if file.entry_type != EXFAT_ENTRY_FILE || stream.entry_type != EXFAT_ENTRY_STREAM {
            return None;
        }

        let wanted = (stream.name_length as usize).div_ceil(EXFAT_NAME_ENTRY_CHARS);
        let names: Vec<ExFatNameEntry> = records
            .take((file.secondary_count as usize).saturating_sub(1))
            .filter(|r| r[0] == EXFAT_ENTRY_NAME)
            .take(wanted)
            .filter_map(|r| ExFatNameEntry::read_from_bytes(r).ok())
            .collect();
        if names.len() != wanted {
            return None;
        }
        Some(Self { file, stream, names })
    }

    #[inline]
    pub fn record_count(&self) -> usize {
        2 + self.names.len()
    }

    pub fn name(&self) -> String {
        utils::decode_name(&self.names, self.stream.name_length as usize)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.record_count() * EXFAT_ENTRY_SIZE_BYTES);
        buf.extend_from_slice(self.file.as_bytes());
        buf.extend_from_slice(self.stream.as_bytes());
        for name in &self.names {
            buf.extend_from_slice(name.as_bytes());
        }
        buf
    }

    /// 16-bit rolling checksum over the set, skipping the checksum field.
    pub fn compute_checksum(raw: &[u8]) -> u16 {
        let mut sum = 0u16;
        accumulate_with_escape(&mut sum, raw, |i| i == 2 || i == 3);
        sum
    }

    pub fn update_checksum(&mut self) {
        self.file.secondary_count = 1 + self.names.len() as u8;
        self.file.set_checksum = Self::compute_checksum(&self.to_bytes());
    }
}
