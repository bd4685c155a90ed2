// SPDX-License-Identifier: MIT

//! Short (8.3) and long name handling.

use alloc::string::String;
use alloc::vec::Vec;

use crate::core::utils::checksum::checksum;
use crate::fs::fat32::{constant::*, types::Fat32LFNEntry};

/// Characters allowed in a short name besides `A-Z` and `0-9`.
#[inline(always)]
fn is_valid_sfn_char(b: u8) -> bool {
    matches!(b,
        b'A'..=b'Z' | b'0'..=b'9' |
        b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'(' | b')' |
        b'-' | b'@' | b'^' | b'_' | b'`' | b'{' | b'}' | b'~'
    ) || b >= 0x80
}

/// Long-name checksum of an 11-byte short name.
#[inline]
pub fn lfn_checksum(short: &[u8; 11]) -> u8 {
    checksum::<u8>(short)
}

/// Case of an ASCII component: `Some(true)` all lower, `Some(false)` no lower,
/// `None` mixed.
fn component_case(part: &str) -> Option<bool> {
    let lower = part.bytes().any(|b| b.is_ascii_lowercase());
    let upper = part.bytes().any(|b| b.is_ascii_uppercase());
    match (lower, upper) {
        (true, true) => None,
        (true, false) => Some(true),
        _ => Some(false),
    }
}

/// Returns the short record and NT case bits when `name` is representable as
/// a plain 8.3 name, so no long-name run is needed.
pub fn exact_short_name(name: &str) -> Option<([u8; 11], u8)> {
    if !name.is_ascii() || name.starts_with('.') {
        return None;
    }
    let (base, ext) = match name.split_once('.') {
        Some((b, e)) => (b, e),
        None => (name, ""),
    };
    if base.is_empty() || base.len() > 8 || ext.len() > 3 || ext.contains('.') {
        return None;
    }
    if name.ends_with('.') {
        return None;
    }

    let mut raw = [b' '; 11];
    for (i, b) in base.bytes().enumerate() {
        let up = b.to_ascii_uppercase();
        if !is_valid_sfn_char(up) {
            return None;
        }
        raw[i] = up;
    }
    for (i, b) in ext.bytes().enumerate() {
        let up = b.to_ascii_uppercase();
        if !is_valid_sfn_char(up) {
            return None;
        }
        raw[8 + i] = up;
    }

    let mut nt = 0u8;
    if component_case(base)? {
        nt |= FAT_NT_LOWER_BASE;
    }
    if component_case(ext)? {
        nt |= FAT_NT_LOWER_EXT;
    }
    if raw[0] == FAT_ENTRY_DELETED {
        raw[0] = FAT_ENTRY_E5_ESCAPE;
    }
    Some((raw, nt))
}

/// Basis name (before the numeric tail) derived from a long name.
fn basis_name(name: &str) -> ([u8; 8], usize, [u8; 3]) {
    let trimmed = name.trim_start_matches(['.', ' ']);
    let (base, ext) = match trimmed.rsplit_once('.') {
        Some((b, e)) if !b.is_empty() => (b, e),
        _ => (trimmed, ""),
    };

    let map = |c: char| -> Option<u8> {
        if c == ' ' || c == '.' {
            return None;
        }
        let b = if c.is_ascii() { c.to_ascii_uppercase() as u8 } else { b'_' };
        Some(if is_valid_sfn_char(b) && b < 0x80 { b } else { b'_' })
    };

    let mut base_out = [b' '; 8];
    let mut base_len = 0;
    for b in base.chars().filter_map(map).take(8) {
        base_out[base_len] = b;
        base_len += 1;
    }
    if base_len == 0 {
        base_out[0] = b'_';
        base_len = 1;
    }

    let mut ext_out = [b' '; 3];
    for (i, b) in ext.chars().filter_map(map).take(3).enumerate() {
        ext_out[i] = b;
    }
    (base_out, base_len, ext_out)
}

/// Short name `BASE~N.EXT` for the `n`-th collision.
pub fn tailed_short_name(name: &str, n: u32) -> [u8; 11] {
    let (base, base_len, ext) = basis_name(name);
    let mut digits = [0u8; 10];
    let mut len = 0;
    let mut v = n;
    loop {
        digits[len] = b'0' + (v % 10) as u8;
        len += 1;
        v /= 10;
        if v == 0 {
            break;
        }
    }

    let tail_len = len + 1;
    let keep = base_len.min(8 - tail_len);
    let mut raw = [b' '; 11];
    raw[..keep].copy_from_slice(&base[..keep]);
    raw[keep] = b'~';
    for i in 0..len {
        raw[keep + 1 + i] = digits[len - 1 - i];
    }
    raw[8..].copy_from_slice(&ext);
    raw
}

/// First `~N` short name not present in `existing`.
pub fn unique_short_name(name: &str, existing: &[[u8; 11]]) -> Option<[u8; 11]> {
    (1..=999_999u32)
        .map(|n| tailed_short_name(name, n))
        .find(|candidate| !existing.contains(candidate))
}

/// Display form of a short record, honouring the NT case bits.
pub fn decode_sfn(sfn: &[u8; 11], nt: u8) -> String {
    let mut raw = *sfn;
    if raw[0] == FAT_ENTRY_E5_ESCAPE {
        raw[0] = FAT_ENTRY_DELETED;
    }
    let (base, ext) = raw.split_at(8);

    let part = |bytes: &[u8], lower: bool| -> String {
        let end = bytes.iter().rposition(|&b| b != b' ').map_or(0, |p| p + 1);
        bytes[..end]
            .iter()
            .map(|&b| {
                let c = b as char;
                if lower { c.to_ascii_lowercase() } else { c }
            })
            .collect()
    };

    let mut out = part(base, nt & FAT_NT_LOWER_BASE != 0);
    let ext = part(ext, nt & FAT_NT_LOWER_EXT != 0);
    if !ext.is_empty() {
        out.push('.');
        out.push_str(&ext);
    }
    out
}

/// Joins a long-name run given in storage order (last chunk first).
pub fn decode_lfn(lfns: &[Fat32LFNEntry]) -> Option<String> {
    let mut units: Vec<u16> = Vec::with_capacity(lfns.len() * FAT_LFN_CHARS_PER_ENTRY);
    for entry in lfns.iter().rev() {
        for c in entry.extract_utf16() {
            if c == 0x0000 {
                break;
            }
            units.push(c);
        }
    }
    // Padding only follows the terminator
    while units.last() == Some(&0xFFFF) {
        units.pop();
    }
    if units.is_empty() || units.len() > FAT_MAX_LFN_CHARS {
        return None;
    }
    String::from_utf16(&units).ok()
}

/// Long-name run for `name`, in storage order (the `0x40 | N` record first).
pub fn lfn_entries(name: &str, short: &[u8; 11]) -> Vec<Fat32LFNEntry> {
    let units: Vec<u16> = name.encode_utf16().collect();
    let count = units.len().div_ceil(FAT_LFN_CHARS_PER_ENTRY).max(1);
    let sum = lfn_checksum(short);

    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        let start = i * FAT_LFN_CHARS_PER_ENTRY;
        let end = (start + FAT_LFN_CHARS_PER_ENTRY).min(units.len());
        let chunk = &units[start..end];

        let mut chars = [0xFFFFu16; FAT_LFN_CHARS_PER_ENTRY];
        chars[..chunk.len()].copy_from_slice(chunk);
        if chunk.len() < FAT_LFN_CHARS_PER_ENTRY {
            chars[chunk.len()] = 0x0000;
        }
        out.push(Fat32LFNEntry::new((i + 1) as u8, i + 1 == count, &chars, sum));
    }
    out.reverse();
    out
}

/// Number of UTF-16 units of `name`, checked against the long-name limit.
pub fn lfn_len_ok(name: &str) -> bool {
    name.encode_utf16().count() <= FAT_MAX_LFN_CHARS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_short_names() {
        assert_eq!(exact_short_name("README.TXT"), Some((*b"README  TXT", 0)));
        assert_eq!(
            exact_short_name("readme.txt"),
            Some((*b"README  TXT", FAT_NT_LOWER_BASE | FAT_NT_LOWER_EXT))
        );
        assert_eq!(
            exact_short_name("KERNEL.img"),
            Some((*b"KERNEL  IMG", FAT_NT_LOWER_EXT))
        );
        assert_eq!(exact_short_name("Makefile"), None);
        assert_eq!(exact_short_name("a_very_long_name.txt"), None);
        assert_eq!(exact_short_name("two.dots.txt"), None);
        assert_eq!(exact_short_name("sp ace.txt"), None);
        assert_eq!(exact_short_name(".hidden"), None);
        assert_eq!(exact_short_name("café.txt"), None);
    }

    #[test]
    fn test_decode_sfn_roundtrip() {
        for name in ["README.TXT", "readme.txt", "KERNEL.img", "NOEXT", "x"] {
            let (raw, nt) = exact_short_name(name).unwrap();
            assert_eq!(decode_sfn(&raw, nt), name);
        }
    }

    #[test]
    fn test_tailed_short_names() {
        assert_eq!(&tailed_short_name("Long File Name.text", 1), b"LONGFI~1TEX");
        assert_eq!(&tailed_short_name("Makefile", 12), b"MAKEFI~12  ");
        assert_eq!(&tailed_short_name(".bashrc", 1), b"BASHRC~1   ");
        assert_eq!(&tailed_short_name("café", 1), b"CAF_~1     ");
    }

    #[test]
    fn test_unique_short_name_skips_existing() {
        let taken = [*b"MAKEFI~1   ", *b"MAKEFI~2   "];
        assert_eq!(unique_short_name("Makefile", &taken), Some(*b"MAKEFI~3   "));
    }

    #[test]
    fn test_lfn_roundtrip() {
        let name = "A rather long file name with ünïcödé.txt";
        let short = tailed_short_name(name, 1);
        let run = lfn_entries(name, &short);
        assert_eq!(run.len(), name.encode_utf16().count().div_ceil(13));
        assert!(run[0].is_last());
        assert_eq!(run.last().unwrap().sequence(), 1);
        assert!(run.iter().all(|e| e.checksum == lfn_checksum(&short)));
        assert_eq!(decode_lfn(&run).as_deref(), Some(name));
    }

    #[test]
    fn test_lfn_exact_multiple_of_13() {
        let name = "abcdefghijklm"; // 13 units, no terminator
        let run = lfn_entries(name, b"ABCDEF~1   ");
        assert_eq!(run.len(), 1);
        assert_eq!(decode_lfn(&run).as_deref(), Some(name));
    }
}
