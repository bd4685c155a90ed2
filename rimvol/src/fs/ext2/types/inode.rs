// SPDX-License-Identifier: MIT
//! ext2 inode

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::core::entry::EntryKind;
use crate::fs::ext2::constant::*;

/// On-disk inode, the 128-byte base shared by every revision. Larger inode
/// sizes keep their extra bytes untouched.
#[derive(Debug, Clone, Copy, Default, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C, packed)]
pub struct Ext2Inode {
    /// Type and permission bits
    pub i_mode: u16,
    pub i_uid: u16,
    /// Size in bytes (lower 32 bits)
    pub i_size: u32,
    pub i_atime: u32,
    pub i_ctime: u32,
    pub i_mtime: u32,
    /// Deletion time, non-zero once freed
    pub i_dtime: u32,
    pub i_gid: u16,
    pub i_links_count: u16,
    /// Allocated space in 512-byte sectors, indirect blocks included
    pub i_blocks: u32,
    pub i_flags: u32,
    pub i_osd1: u32,
    /// 12 direct pointers, then single, double and triple indirect
    pub i_block: [u32; EXT2_N_BLOCKS],
    pub i_generation: u32,
    pub i_file_acl: u32,
    /// Upper 32 bits of the size for regular files (`large_file`)
    pub i_size_high: u32,
    pub i_faddr: u32,
    pub i_osd2: [u8; 12],
}

impl Ext2Inode {
    pub fn new(mode: u16, links: u16, now: u32) -> Self {
        Self {
            i_mode: mode,
            i_links_count: links,
            i_atime: now,
            i_ctime: now,
            i_mtime: now,
            ..Default::default()
        }
    }

    #[inline]
    pub fn file_format(&self) -> u16 {
        self.i_mode & EXT2_S_IFMT
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.file_format() == EXT2_S_IFDIR
    }

    #[inline]
    pub fn is_reg(&self) -> bool {
        self.file_format() == EXT2_S_IFREG
    }

    pub fn kind(&self) -> EntryKind {
        match self.file_format() {
            EXT2_S_IFDIR => EntryKind::Directory,
            EXT2_S_IFREG => EntryKind::File,
            _ => EntryKind::Other,
        }
    }

    /// Directory record type matching the mode.
    pub fn dirent_type(&self) -> u8 {
        match self.file_format() {
            EXT2_S_IFREG => EXT2_FT_REG_FILE,
            EXT2_S_IFDIR => EXT2_FT_DIR,
            EXT2_S_IFCHR => EXT2_FT_CHRDEV,
            EXT2_S_IFBLK => EXT2_FT_BLKDEV,
            EXT2_S_IFIFO => EXT2_FT_FIFO,
            EXT2_S_IFSOCK => EXT2_FT_SOCK,
            EXT2_S_IFLNK => EXT2_FT_SYMLINK,
            _ => EXT2_FT_UNKNOWN,
        }
    }

    /// Byte size; the high half only counts for regular files on
    /// `large_file` volumes.
    pub fn size(&self, large_file: bool) -> u64 {
        let lo = self.i_size as u64;
        if large_file && self.is_reg() {
            lo | ((self.i_size_high as u64) << 32)
        } else {
            lo
        }
    }

    pub fn set_size(&mut self, size: u64, large_file: bool) {
        self.i_size = size as u32;
        if large_file && self.is_reg() {
            self.i_size_high = (size >> 32) as u32;
        }
    }

    #[inline]
    pub fn blocks(&self) -> [u32; EXT2_N_BLOCKS] {
        self.i_block
    }

    #[inline]
    pub fn set_blocks(&mut self, blocks: [u32; EXT2_N_BLOCKS]) {
        self.i_block = blocks;
    }

    /// Adds (or with a negative count removes) `count` blocks to `i_blocks`.
    pub fn add_blocks(&mut self, count: i64, block_size: u32) {
        let sectors = count * (block_size / EXT2_SECTOR_SIZE) as i64;
        self.i_blocks = (self.i_blocks as i64 + sectors).max(0) as u32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inode_layout_and_size() {
        assert_eq!(core::mem::size_of::<Ext2Inode>(), EXT2_GOOD_OLD_INODE_SIZE as usize);

        let mut file = Ext2Inode::new(EXT2_S_IFREG | 0o644, 1, 0);
        file.set_size(0x1_0000_0010, true);
        let (lo, hi) = (file.i_size, file.i_size_high);
        assert_eq!((lo, hi), (0x10, 1));
        assert_eq!(file.size(true), 0x1_0000_0010);
        assert_eq!(file.size(false), 0x10);
        assert_eq!(file.kind(), EntryKind::File);

        // i_size_high is i_dir_acl on directories
        let mut dir = Ext2Inode::new(EXT2_S_IFDIR | 0o755, 2, 0);
        dir.i_size_high = 77;
        dir.set_size(1024, true);
        assert_eq!(dir.size(true), 1024);
        assert_eq!(dir.dirent_type(), EXT2_FT_DIR);
    }

    #[test]
    fn test_block_accounting() {
        let mut ino = Ext2Inode::new(EXT2_S_IFREG, 1, 0);
        ino.add_blocks(3, 4096);
        let n = ino.i_blocks;
        assert_eq!(n, 24);
        ino.add_blocks(-1, 4096);
        let n = ino.i_blocks;
        assert_eq!(n, 16);
    }
}
