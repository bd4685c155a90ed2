// SPDX-License-Identifier: MIT

//! Name handling: up-casing, hashing and the split into name records.
//!
//! Up-casing only folds ASCII letters, matching the up-case table the
//! formatter writes.

use alloc::string::String;
use alloc::vec::Vec;

use crate::core::utils::checksum::{accumulate, checksum};
use crate::fs::exfat::{constant::*, types::ExFatNameEntry};

#[inline]
pub fn upcase_unit(unit: u16) -> u16 {
    match unit {
        0x61..=0x7A => unit - 0x20,
        _ => unit,
    }
}

/// 16-bit name hash stored in the stream record.
pub fn name_hash(name: &str) -> u16 {
    let mut sum = 0u16;
    for unit in name.encode_utf16() {
        accumulate(&mut sum, &upcase_unit(unit).to_le_bytes());
    }
    sum
}

/// Case-insensitive comparison through the up-case mapping.
pub fn names_equal(a: &str, b: &str) -> bool {
    a.encode_utf16()
        .map(upcase_unit)
        .eq(b.encode_utf16().map(upcase_unit))
}

/// Name records holding `name`, zero padded.
pub fn name_entries(name: &str) -> Vec<ExFatNameEntry> {
    let units: Vec<u16> = name.encode_utf16().collect();
    units
        .chunks(EXFAT_NAME_ENTRY_CHARS)
        .map(|chunk| {
            let mut chars = [0u16; EXFAT_NAME_ENTRY_CHARS];
            chars[..chunk.len()].copy_from_slice(chunk);
            ExFatNameEntry::new(chars)
        })
        .collect()
}

/// Rebuilds a name of `len` UTF-16 units from its records.
pub fn decode_name(names: &[ExFatNameEntry], len: usize) -> String {
    let units: Vec<u16> = names
        .iter()
        .flat_map(|n| n.name_chars)
        .take(len)
        .collect();
    String::from_utf16_lossy(&units)
}

#[inline]
pub fn name_len_ok(name: &str) -> bool {
    name.encode_utf16().count() <= EXFAT_MAX_NAME_CHARS
}

/// Uncompressed up-case table covering the first 128 code points.
pub fn upcase_table() -> Vec<u8> {
    (0..EXFAT_UPCASE_ENTRIES as u16)
        .flat_map(|u| upcase_unit(u).to_le_bytes())
        .collect()
}

#[inline]
pub fn upcase_checksum(table: &[u8]) -> u32 {
    checksum::<u32>(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_case_insensitive() {
        assert_eq!(name_hash("Readme.TXT"), name_hash("README.txt"));
        assert_ne!(name_hash("a"), name_hash("b"));
        assert!(names_equal("Über.txt", "Über.TXT"));
        assert!(!names_equal("über", "ÜBER"));
    }

    #[test]
    fn test_name_entries_split() {
        let name = "exactly fifteen";
        assert_eq!(name.len(), 15);
        assert_eq!(name_entries(name).len(), 1);

        let long = "sixteen chars!!!";
        let entries = name_entries(long);
        assert_eq!(entries.len(), 2);
        assert_eq!(decode_name(&entries, 16), long);
        let second = entries[1].name_chars;
        assert_eq!(second[1], 0);
    }

    #[test]
    fn test_upcase_table() {
        let table = upcase_table();
        assert_eq!(table.len(), 256);
        assert_eq!(u16::from_le_bytes([table[0x61 * 2], table[0x61 * 2 + 1]]), 0x41);
        assert_eq!(u16::from_le_bytes([table[0x30 * 2], table[0x30 * 2 + 1]]), 0x30);
        assert_ne!(upcase_checksum(&table), 0);
    }
}
