// SPDX-License-Identifier: MIT
//! ext2 superblock

use alloc::string::{String, ToString};

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::fs::ext2::{constant::*, meta::Ext2Meta};

/// On-disk superblock (1024 bytes, at byte 1024 of the volume).
///
/// Fields past `s_first_meta_bg` belong to later revisions and are kept as
/// opaque padding.
#[derive(Debug, Clone, Copy, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(C, packed)]
pub struct Ext2Superblock {
    // 0x00
    pub s_inodes_count: u32,
    pub s_blocks_count: u32,
    /// Blocks reserved for the super-user
    pub s_r_blocks_count: u32,
    pub s_free_blocks_count: u32,
    // 0x10
    pub s_free_inodes_count: u32,
    pub s_first_data_block: u32,
    /// Block size = 1024 << s_log_block_size
    pub s_log_block_size: u32,
    pub s_log_frag_size: u32,
    // 0x20
    pub s_blocks_per_group: u32,
    pub s_frags_per_group: u32,
    pub s_inodes_per_group: u32,
    /// Last mount time
    pub s_mtime: u32,
    // 0x30
    /// Last write time
    pub s_wtime: u32,
    pub s_mnt_count: u16,
    pub s_max_mnt_count: u16,
    pub s_magic: u16,
    pub s_state: u16,
    /// Behaviour when errors are detected
    pub s_errors: u16,
    pub s_minor_rev_level: u16,
    // 0x40
    pub s_lastcheck: u32,
    pub s_checkinterval: u32,
    pub s_creator_os: u32,
    pub s_rev_level: u32,
    // 0x50
    pub s_def_resuid: u16,
    pub s_def_resgid: u16,
    // Revision 1 only from here
    pub s_first_ino: u32,
    pub s_inode_size: u16,
    /// Group holding this copy
    pub s_block_group_nr: u16,
    pub s_feature_compat: u32,
    // 0x60
    pub s_feature_incompat: u32,
    pub s_feature_ro_compat: u32,
    pub s_uuid: [u8; 16],
    // 0x78
    pub s_volume_name: [u8; 16],
    // 0x88
    pub s_last_mounted: [u8; 64],
    // 0xC8
    pub s_algo_bitmap: u32,
    pub s_prealloc_blocks: u8,
    pub s_prealloc_dir_blocks: u8,
    pub s_padding1: u16,
    // 0xD0
    pub s_journal_uuid: [u8; 16],
    pub s_journal_inum: u32,
    pub s_journal_dev: u32,
    pub s_last_orphan: u32,
    pub s_hash_seed: [u8; 16],
    pub s_def_hash_version: u8,
    pub s_reserved_char_pad: u8,
    pub s_reserved_word_pad: u16,
    // 0x100
    pub s_default_mount_opts: u32,
    pub s_first_meta_bg: u32,
    // 0x108
    pub s_reserved: [u8; 760],
}

impl Ext2Superblock {
    /// Superblock of a freshly formatted volume.
    pub fn from_meta(meta: &Ext2Meta, free_blocks: u32, free_inodes: u32, now: u32) -> Self {
        let log = meta.block_size.trailing_zeros() - EXT2_MIN_BLOCK_SIZE.trailing_zeros();
        let dynamic = meta.revision >= EXT2_DYNAMIC_REV;
        Self {
            s_inodes_count: meta.inode_count,
            s_blocks_count: meta.block_count,
            s_r_blocks_count: 0,
            s_free_blocks_count: free_blocks,
            s_free_inodes_count: free_inodes,
            s_first_data_block: meta.first_data_block,
            s_log_block_size: log,
            s_log_frag_size: log,
            s_blocks_per_group: meta.blocks_per_group,
            s_frags_per_group: meta.blocks_per_group,
            s_inodes_per_group: meta.inodes_per_group,
            s_mtime: 0,
            s_wtime: now,
            s_mnt_count: 0,
            s_max_mnt_count: EXT2_NO_MAX_MOUNT_COUNT,
            s_magic: EXT2_SUPER_MAGIC,
            s_state: EXT2_VALID_FS,
            s_errors: EXT2_ERRORS_CONTINUE,
            s_minor_rev_level: 0,
            s_lastcheck: now,
            s_checkinterval: 0,
            s_creator_os: EXT2_OS_LINUX,
            s_rev_level: meta.revision,
            s_def_resuid: 0,
            s_def_resgid: 0,
            s_first_ino: if dynamic { meta.first_inode } else { 0 },
            s_inode_size: if dynamic { meta.inode_size } else { 0 },
            s_block_group_nr: 0,
            s_feature_compat: meta.feature_compat,
            s_feature_incompat: meta.feature_incompat,
            s_feature_ro_compat: meta.feature_ro_compat,
            s_uuid: meta.volume_id,
            s_volume_name: meta.volume_label,
            s_last_mounted: [0; 64],
            s_algo_bitmap: 0,
            s_prealloc_blocks: 0,
            s_prealloc_dir_blocks: 0,
            s_padding1: 0,
            s_journal_uuid: [0; 16],
            s_journal_inum: 0,
            s_journal_dev: 0,
            s_last_orphan: 0,
            s_hash_seed: [0; 16],
            s_def_hash_version: 0,
            s_reserved_char_pad: 0,
            s_reserved_word_pad: 0,
            s_default_mount_opts: 0,
            s_first_meta_bg: 0,
            s_reserved: [0; 760],
        }
    }

    #[inline]
    pub fn is_clean(&self) -> bool {
        let state = self.s_state;
        state & EXT2_VALID_FS != 0 && state & EXT2_ERROR_FS == 0
    }

    /// Volume name up to the first NUL.
    pub fn label(&self) -> String {
        let name = self.s_volume_name;
        let end = name.iter().position(|&c| c == 0).unwrap_or(name.len());
        String::from_utf8_lossy(&name[..end]).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_superblock_layout() {
        assert_eq!(core::mem::size_of::<Ext2Superblock>(), EXT2_SUPERBLOCK_SIZE);

        let meta = Ext2Meta::new(8 * 1024 * 1024, Some("disk")).unwrap();
        let sb = Ext2Superblock::from_meta(&meta, 100, 50, 7);
        let raw = sb.as_bytes();
        assert_eq!(u16::from_le_bytes([raw[0x38], raw[0x39]]), EXT2_SUPER_MAGIC);
        assert_eq!(u32::from_le_bytes([raw[0x0C], raw[0x0D], raw[0x0E], raw[0x0F]]), 100);
        assert_eq!(&raw[0x78..0x7C], b"disk");
        assert_eq!(sb.label(), "disk");
        assert!(sb.is_clean());
    }
}
