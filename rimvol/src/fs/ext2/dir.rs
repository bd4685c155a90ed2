// SPDX-License-Identifier: MIT

//! Directory record codec over an in-memory copy of a directory's blocks.
//!
//! Records never cross a block boundary; the last record of a block spans
//! to its end. A record whose inode field is 0 is an unused slot.

use alloc::string::String;
use alloc::vec::Vec;

use zerocopy::{FromBytes, IntoBytes};

use crate::fs::ext2::{constant::*, types::*};

/// One live record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirRecord {
    pub inode: u32,
    pub name: String,
    /// `EXT2_FT_UNKNOWN` without the `filetype` feature.
    pub file_type: u8,
    /// Byte offset inside the directory data.
    pub offset: usize,
    pub rec_len: usize,
}

impl DirRecord {
    #[inline]
    pub fn is_dot(&self) -> bool {
        self.name == "." || self.name == ".."
    }
}

/// Raw header at `at` with its decoded length, or `None` when it does not
/// form a sane record inside its block.
fn header_at(data: &[u8], at: usize, block_size: usize, filetype: bool) -> Option<(Ext2DirEntryHeader, usize)> {
    let block_end = (at / block_size + 1) * block_size;
    if at + EXT2_DIR_HEADER_SIZE > block_end.min(data.len()) {
        return None;
    }
    let header = Ext2DirEntryHeader::read_from_bytes(&data[at..at + EXT2_DIR_HEADER_SIZE]).ok()?;
    let rec_len = header.rec_len();
    let name_len = header.name_len(filetype);
    let sane = rec_len >= EXT2_DIR_HEADER_SIZE
        && rec_len % EXT2_DIR_ROUND == 0
        && at + rec_len <= block_end
        && (header.inode == 0 || EXT2_DIR_HEADER_SIZE + name_len <= rec_len);
    sane.then_some((header, rec_len))
}

/// Lazy cursor over the live records of directory data.
///
/// A malformed record ends its block: the cursor resumes at the next one.
pub struct DirRecords<'a> {
    data: &'a [u8],
    block_size: usize,
    filetype: bool,
    pos: usize,
}

impl<'a> DirRecords<'a> {
    pub fn new(data: &'a [u8], block_size: usize, filetype: bool) -> Self {
        Self {
            data,
            block_size,
            filetype,
            pos: 0,
        }
    }
}

impl Iterator for DirRecords<'_> {
    type Item = DirRecord;

    fn next(&mut self) -> Option<Self::Item> {
        while self.pos < self.data.len() {
            let at = self.pos;
            let Some((header, rec_len)) = header_at(self.data, at, self.block_size, self.filetype)
            else {
                log::warn!("malformed directory record at {at}, skipping the rest of its block");
                self.pos = (at / self.block_size + 1) * self.block_size;
                continue;
            };
            self.pos += rec_len;
            if header.inode == 0 {
                continue;
            }
            let name_len = header.name_len(self.filetype);
            let name = &self.data[at + EXT2_DIR_HEADER_SIZE..at + EXT2_DIR_HEADER_SIZE + name_len];
            return Some(DirRecord {
                inode: header.inode,
                name: String::from_utf8_lossy(name).into_owned(),
                file_type: header.file_type(self.filetype),
                offset: at,
                rec_len,
            });
        }
        None
    }
}

fn write_record(
    data: &mut [u8],
    at: usize,
    inode: u32,
    rec_len: usize,
    name: &[u8],
    file_type: u8,
    filetype: bool,
) {
    let header = Ext2DirEntryHeader::new(inode, rec_len, name.len(), file_type, filetype);
    data[at..at + EXT2_DIR_HEADER_SIZE].copy_from_slice(header.as_bytes());
    data[at + EXT2_DIR_HEADER_SIZE..at + EXT2_DIR_HEADER_SIZE + name.len()].copy_from_slice(name);
}

fn set_rec_len(data: &mut [u8], at: usize, rec_len: usize) {
    data[at + 4..at + 6].copy_from_slice(&rec_len_to_disk(rec_len).to_le_bytes());
}

/// Places a record for `inode`/`name`, reusing an unused slot or splitting
/// the slack of a live record. Returns its offset, or `None` when no block
/// has room.
pub fn insert_record(
    data: &mut [u8],
    block_size: usize,
    filetype: bool,
    inode: u32,
    name: &str,
    file_type: u8,
) -> Option<usize> {
    let need = record_size(name.len());
    let mut pos = 0usize;
    while pos < data.len() {
        let Some((header, rec_len)) = header_at(data, pos, block_size, filetype) else {
            pos = (pos / block_size + 1) * block_size;
            continue;
        };
        if header.inode == 0 {
            if rec_len >= need {
                write_record(data, pos, inode, rec_len, name.as_bytes(), file_type, filetype);
                return Some(pos);
            }
        } else {
            let used = record_size(header.name_len(filetype));
            if rec_len >= used + need {
                set_rec_len(data, pos, used);
                let at = pos + used;
                write_record(data, at, inode, rec_len - used, name.as_bytes(), file_type, filetype);
                return Some(at);
            }
        }
        pos += rec_len;
    }
    None
}

/// Drops the record at `offset`: merged into its predecessor in the same
/// block, or turned into an unused slot when it opens the block. Returns
/// the offset of the block that changed.
pub fn remove_record(data: &mut [u8], block_size: usize, filetype: bool, offset: usize) -> Option<usize> {
    let block = offset / block_size * block_size;
    let (_, rec_len) = header_at(data, offset, block_size, filetype)?;

    if offset == block {
        data[offset..offset + 4].copy_from_slice(&0u32.to_le_bytes());
        return Some(block);
    }
    let mut pos = block;
    while pos < offset {
        let (_, len) = header_at(data, pos, block_size, filetype)?;
        if pos + len == offset {
            set_rec_len(data, pos, len + rec_len);
            return Some(block);
        }
        pos += len;
    }
    None
}

/// First block of a new directory: `.` and `..`, the latter spanning the
/// rest of the block.
pub fn new_dir_block(block_size: usize, filetype: bool, inode: u32, parent: u32) -> Vec<u8> {
    let mut data = vec![0u8; block_size];
    let dot = record_size(1);
    write_record(&mut data, 0, inode, dot, b".", EXT2_FT_DIR, filetype);
    write_record(&mut data, dot, parent, block_size - dot, b"..", EXT2_FT_DIR, filetype);
    data
}

/// Block appended to a growing directory: one unused slot.
pub fn empty_dir_block(block_size: usize) -> Vec<u8> {
    let mut data = vec![0u8; block_size];
    set_rec_len(&mut data, 0, block_size);
    data
}
