// SPDX-License-Identifier: MIT

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::fs::ext2::constant::*;

/// Fixed head of a directory record; the name follows inline.
///
/// Without the `filetype` feature `name_len` is 16 bits wide and
/// `file_type` is its high byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C, packed)]
pub struct Ext2DirEntryHeader {
    /// Target inode, 0 for an unused slot
    pub inode: u32,
    pub rec_len: u16,
    pub name_len: u8,
    pub file_type: u8,
}

impl Ext2DirEntryHeader {
    pub fn new(inode: u32, rec_len: usize, name_len: usize, file_type: u8, filetype: bool) -> Self {
        let (lo, hi) = if filetype {
            (name_len as u8, file_type)
        } else {
            (name_len as u8, (name_len >> 8) as u8)
        };
        Self {
            inode,
            rec_len: rec_len_to_disk(rec_len),
            name_len: lo,
            file_type: hi,
        }
    }

    pub fn name_len(&self, filetype: bool) -> usize {
        if filetype {
            self.name_len as usize
        } else {
            u16::from_le_bytes([self.name_len, self.file_type]) as usize
        }
    }

    pub fn file_type(&self, filetype: bool) -> u8 {
        if filetype { self.file_type } else { EXT2_FT_UNKNOWN }
    }

    pub fn rec_len(&self) -> usize {
        rec_len_from_disk(self.rec_len)
    }
}

/// Space a record with a `name_len`-byte name needs.
#[inline]
pub const fn record_size(name_len: usize) -> usize {
    (EXT2_DIR_HEADER_SIZE + name_len + EXT2_DIR_ROUND - 1) & !(EXT2_DIR_ROUND - 1)
}

/// 64 KiB records are stored as `0xFFFF` (or `0`).
#[inline]
pub fn rec_len_from_disk(raw: u16) -> usize {
    match raw {
        0 | EXT2_MAX_REC_LEN => EXT2_MAX_BLOCK_SIZE as usize,
        n => n as usize,
    }
}

#[inline]
pub fn rec_len_to_disk(len: usize) -> u16 {
    if len >= EXT2_MAX_BLOCK_SIZE as usize {
        EXT2_MAX_REC_LEN
    } else {
        len as u16
    }
}
