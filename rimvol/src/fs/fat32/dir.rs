// SPDX-License-Identifier: MIT

//! Directory record decoding and free-run search over an in-memory copy of
//! a directory's data.

use alloc::string::String;
use alloc::vec::Vec;

use zerocopy::FromBytes;

use crate::fs::fat32::{attr::Fat32Attributes, constant::*, types::*, utils::*};

/// One logical entry: its short record plus the name rebuilt from the
/// long-name run when a valid run precedes it.
#[derive(Debug, Clone)]
pub struct DecodedRecord {
    pub name: String,
    pub entry: Fat32Entry,
    /// Byte offset of the first record (long-name run included).
    pub offset: u64,
    pub records: u32,
}

impl DecodedRecord {
    #[inline]
    pub fn short(&self) -> [u8; 11] {
        self.entry.name
    }

    /// Offset of the short record.
    #[inline]
    pub fn short_offset(&self) -> u64 {
        self.offset + (self.records as u64 - 1) * FAT_DIR_ENTRY_SIZE as u64
    }
}

/// Lazy record cursor over directory bytes.
///
/// Stops at the first end-of-directory marker. Deleted records and orphaned
/// or inconsistent long-name runs are skipped.
pub struct DirRecords<'a> {
    data: &'a [u8],
    pos: usize,
    run: Vec<Fat32LFNEntry>,
    run_start: usize,
}

impl<'a> DirRecords<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            run: Vec::new(),
            run_start: 0,
        }
    }

    fn push_lfn(&mut self, lfn: Fat32LFNEntry, at: usize) {
        if lfn.is_last() {
            self.run.clear();
            self.run_start = at;
            self.run.push(lfn);
            return;
        }
        let continues = self.run.last().is_some_and(|prev| {
            prev.sequence() == lfn.sequence() + 1 && prev.checksum == lfn.checksum
        });
        if continues {
            self.run.push(lfn);
        } else {
            self.run.clear();
        }
    }

    fn finish(&mut self, entry: Fat32Entry, at: usize) -> DecodedRecord {
        let run_ok = self
            .run
            .last()
            .is_some_and(|l| l.sequence() == 1 && l.checksum == lfn_checksum(&entry.name));

        let long = if run_ok { decode_lfn(&self.run) } else { None };
        let (name, offset, records) = match long {
            Some(name) => (name, self.run_start, self.run.len() as u32 + 1),
            None => {
                if !self.run.is_empty() {
                    log::trace!("orphaned long-name run at {} ignored", self.run_start);
                }
                (decode_sfn(&entry.name, entry.nt_reserved), at, 1)
            }
        };
        self.run.clear();

        DecodedRecord {
            name,
            entry,
            offset: offset as u64,
            records,
        }
    }
}

impl Iterator for DirRecords<'_> {
    type Item = DecodedRecord;

    fn next(&mut self) -> Option<Self::Item> {
        while self.pos + FAT_DIR_ENTRY_SIZE <= self.data.len() {
            let at = self.pos;
            let raw = &self.data[at..at + FAT_DIR_ENTRY_SIZE];
            self.pos += FAT_DIR_ENTRY_SIZE;

            match raw[0] {
                FAT_ENTRY_END_OF_DIR => {
                    self.pos = self.data.len();
                    return None;
                }
                FAT_ENTRY_DELETED => {
                    self.run.clear();
                    continue;
                }
                _ => {}
            }

            if Fat32Attributes::is_lfn(raw[11]) {
                if let Ok(lfn) = Fat32LFNEntry::read_from_bytes(raw) {
                    self.push_lfn(lfn, at);
                }
                continue;
            }

            let Ok(entry) = Fat32Entry::read_from_bytes(raw) else {
                continue;
            };
            return Some(self.finish(entry, at));
        }
        None
    }
}

/// Offset of the end-of-directory marker, or `data.len()` when the data is
/// full of records.
pub fn end_offset(data: &[u8]) -> usize {
    data.chunks_exact(FAT_DIR_ENTRY_SIZE)
        .position(|r| r[0] == FAT_ENTRY_END_OF_DIR)
        .map_or(data.len(), |i| i * FAT_DIR_ENTRY_SIZE)
}

/// First run of `count` reusable record slots (deleted or past the end marker).
pub fn find_free_run(data: &[u8], count: usize) -> Option<usize> {
    let end = end_offset(data);
    let mut start = 0usize;
    let mut len = 0usize;
    for (i, rec) in data.chunks_exact(FAT_DIR_ENTRY_SIZE).enumerate() {
        let at = i * FAT_DIR_ENTRY_SIZE;
        if at >= end || rec[0] == FAT_ENTRY_DELETED {
            if len == 0 {
                start = at;
            }
            len += 1;
            if len == count {
                return Some(start);
            }
        } else {
            len = 0;
        }
    }
    None
}

/// Every short name in the directory, live records only.
pub fn short_names(data: &[u8]) -> Vec<[u8; 11]> {
    DirRecords::new(data).map(|r| r.short()).collect()
}
