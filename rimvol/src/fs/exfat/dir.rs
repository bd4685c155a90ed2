// SPDX-License-Identifier: MIT

//! Entry-set decoding and free-slot search over a directory's data.

use alloc::string::String;
use alloc::vec::Vec;

use zerocopy::FromBytes;

use crate::fs::exfat::{constant::*, types::*};

/// One complete File + Stream + Name set.
#[derive(Debug, Clone)]
pub struct DecodedSet {
    pub set: ExFatEntries,
    /// Byte offset of the file record.
    pub offset: u64,
    pub records: u32,
}

impl DecodedSet {
    #[inline]
    pub fn name(&self) -> String {
        self.set.name()
    }
}

/// Lazy entry-set cursor over directory bytes.
///
/// Stops at the end-of-directory record. A set is only yielded once all of
/// its records are present and its checksum matches; anything else is
/// skipped record by record.
pub struct EntrySets<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> EntrySets<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn decode_at(&self, at: usize) -> Option<DecodedSet> {
        let secondary = self.data[at + 1];
        if !(2..=EXFAT_MAX_SECONDARY).contains(&secondary) {
            log::warn!("entry set at {at}: invalid secondary count {secondary}");
            return None;
        }
        let len = (secondary as usize + 1) * EXFAT_ENTRY_SIZE_BYTES;
        let raw = self.data.get(at..at + len)?;

        let stored = u16::from_le_bytes([raw[2], raw[3]]);
        if ExFatEntries::compute_checksum(raw) != stored {
            log::warn!("entry set at {at}: checksum mismatch, skipped");
            return None;
        }
        let set = ExFatEntries::from_bytes(raw)?;
        Some(DecodedSet {
            set,
            offset: at as u64,
            records: secondary as u32 + 1,
        })
    }
}

impl Iterator for EntrySets<'_> {
    type Item = DecodedSet;

    fn next(&mut self) -> Option<Self::Item> {
        while self.pos + EXFAT_ENTRY_SIZE_BYTES <= self.data.len() {
            let at = self.pos;
            self.pos += EXFAT_ENTRY_SIZE_BYTES;

            match self.data[at] {
                EXFAT_EOD => {
                    self.pos = self.data.len();
                    return None;
                }
                EXFAT_ENTRY_FILE => {
                    if let Some(found) = self.decode_at(at) {
                        self.pos = at + found.records as usize * EXFAT_ENTRY_SIZE_BYTES;
                        return Some(found);
                    }
                }
                _ => {}
            }
        }
        None
    }
}

/// In-use records of type `entry_type` before the end marker, with their offsets.
pub fn records_of_type(data: &[u8], entry_type: u8) -> Vec<(usize, &[u8])> {
    data.chunks_exact(EXFAT_ENTRY_SIZE_BYTES)
        .take_while(|r| r[0] != EXFAT_EOD)
        .enumerate()
        .filter(|(_, r)| r[0] == entry_type)
        .map(|(i, r)| (i * EXFAT_ENTRY_SIZE_BYTES, r))
        .collect()
}

/// Allocation bitmap records of the root directory.
pub fn bitmap_records(data: &[u8]) -> Vec<ExFatBitmapEntry> {
    records_of_type(data, EXFAT_ENTRY_BITMAP)
        .into_iter()
        .filter_map(|(_, r)| ExFatBitmapEntry::read_from_bytes(r).ok())
        .collect()
}

/// Volume label record of the root directory, if any.
pub fn label_record(data: &[u8]) -> Option<ExFatVolumeLabelEntry> {
    records_of_type(data, EXFAT_ENTRY_LABEL)
        .first()
        .and_then(|(_, r)| ExFatVolumeLabelEntry::read_from_bytes(*r).ok())
}

/// Offset of the end-of-directory record, or `data.len()`.
pub fn end_offset(data: &[u8]) -> usize {
    data.chunks_exact(EXFAT_ENTRY_SIZE_BYTES)
        .position(|r| r[0] == EXFAT_EOD)
        .map_or(data.len(), |i| i * EXFAT_ENTRY_SIZE_BYTES)
}

/// First run of `count` record slots that are not in use.
pub fn find_free_run(data: &[u8], count: usize) -> Option<usize> {
    let end = end_offset(data);
    let mut start = 0usize;
    let mut len = 0usize;
    for (i, rec) in data.chunks_exact(EXFAT_ENTRY_SIZE_BYTES).enumerate() {
        let at = i * EXFAT_ENTRY_SIZE_BYTES;
        if at >= end || rec[0] & EXFAT_ENTRY_IN_USE == 0 {
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

/// Clears the in-use bit of every record in `raw`.
pub fn mark_unused(raw: &mut [u8]) {
    for rec in raw.chunks_exact_mut(EXFAT_ENTRY_SIZE_BYTES) {
        rec[0] &= !EXFAT_ENTRY_IN_USE;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zerocopy::IntoBytes;

    fn dir_with(parts: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        for p in parts {
            out.extend_from_slice(p);
        }
        out.resize(4096, 0);
        out
    }

    fn set(name: &str) -> Vec<u8> {
        ExFatEntries::new(name, 0x20, 0, 0, (0, 0, 0x80)).to_bytes()
    }

    #[test]
    fn test_sets_and_critical_records() {
        let bitmap = ExFatBitmapEntry::new(0, 2, 512);
        let label = ExFatVolumeLabelEntry::new("DISK");
        let a = set("alpha.txt");
        let b = set("a name that spans three name records.bin");
        let data = dir_with(&[bitmap.as_bytes(), label.as_bytes(), &a, &b]);

        let sets: Vec<_> = EntrySets::new(&data).collect();
        assert_eq!(sets.len(), 2);
        assert_eq!(sets[0].name(), "alpha.txt");
        assert_eq!(sets[0].offset, 64);
        assert_eq!(sets[0].records, 3);
        assert_eq!(sets[1].name(), "a name that spans three name records.bin");
        assert_eq!(sets[1].records, 5);

        let bitmaps = bitmap_records(&data);
        assert_eq!(bitmaps.len(), 1);
        assert_eq!(bitmaps[0].index(), 0);
        assert_eq!(label_record(&data).unwrap().label(), "DISK");
    }

    #[test]
    fn test_corrupt_set_is_skipped() {
        let mut a = set("broken");
        a[40] ^= 0xFF;
        let b = set("fine");
        let data = dir_with(&[&a, &b]);
        let names: Vec<_> = EntrySets::new(&data).map(|s| s.name()).collect();
        assert_eq!(names, ["fine"]);
    }

    #[test]
    fn test_truncated_set_not_yielded() {
        let a = set("cut short");
        let data = a[..64].to_vec();
        assert_eq!(EntrySets::new(&data).count(), 0);
    }

    #[test]
    fn test_deleted_slots_are_reused() {
        let mut a = set("gone");
        mark_unused(&mut a);
        let b = set("kept");
        let data = dir_with(&[&a, &b]);

        assert_eq!(EntrySets::new(&data).count(), 1);
        assert_eq!(find_free_run(&data, 3), Some(0));
        assert_eq!(find_free_run(&data, 4), Some(192));
        assert_eq!(end_offset(&data), 192);
    }
}
