// SPDX-License-Identifier: MIT

use alloc::string::{String, ToString};

use crate::core::errors::*;
use crate::core::meta::FsMeta;
use crate::core::utils::volume::generate_volume_id_128;
use crate::fs::ext2::{constant::*, types::Ext2Superblock};

/// Decoded ext2 geometry and feature set.
///
/// Built either from a superblock at mount or from format parameters
/// ([`Ext2Meta::new`], [`Ext2Meta::new_custom`]).
#[derive(Debug, Clone)]
pub struct Ext2Meta {
    pub volume_id: [u8; 16],
    pub volume_label: [u8; 16],

    pub block_size: u32,
    pub block_count: u32,
    pub first_data_block: u32,
    pub blocks_per_group: u32,
    pub group_count: u32,

    pub inode_count: u32,
    pub inodes_per_group: u32,
    pub inode_size: u16,
    pub first_inode: u32,

    pub revision: u32,
    pub feature_compat: u32,
    pub feature_incompat: u32,
    pub feature_ro_compat: u32,
}

impl Ext2Meta {
    /// Revision 1 layout with `filetype`, `sparse_super` and `large_file`;
    /// 1 KiB blocks below 512 MiB, 4 KiB above.
    pub fn new(size_bytes: u64, volume_label: Option<&str>) -> FsFormatterResult<Self> {
        let block_size = if size_bytes < EXT2_SMALL_VOLUME_BYTES {
            EXT2_SMALL_BLOCK_SIZE
        } else {
            EXT2_DEFAULT_BLOCK_SIZE
        };
        let blocks_per_group = block_size * 8;
        let group_bytes = size_bytes.min(blocks_per_group as u64 * block_size as u64);
        let inodes_per_group = Self::default_inodes_per_group(group_bytes, block_size);
        Self::new_custom(
            size_bytes,
            volume_label,
            None,
            block_size,
            blocks_per_group,
            inodes_per_group,
            EXT2_DYNAMIC_REV,
        )
    }

    /// One inode per 4 KiB of group, rounded up to fill whole inode table
    /// blocks and capped by the inode bitmap.
    pub fn default_inodes_per_group(group_bytes: u64, block_size: u32) -> u32 {
        let per_block = block_size / EXT2_GOOD_OLD_INODE_SIZE as u32;
        let raw = (group_bytes / EXT2_DEFAULT_INODE_RATIO).max(16) as u32;
        raw.div_ceil(per_block)
            .saturating_mul(per_block)
            .min(block_size * 8)
    }

    pub fn new_custom(
        size_bytes: u64,
        volume_label: Option<&str>,
        volume_id: Option<[u8; 16]>,
        block_size: u32,
        blocks_per_group: u32,
        inodes_per_group: u32,
        revision: u32,
    ) -> FsFormatterResult<Self> {
        crate::ensure!(
            block_size.is_power_of_two()
                && (EXT2_MIN_BLOCK_SIZE..=EXT2_MAX_BLOCK_SIZE).contains(&block_size),
            FsFormatterError::Invalid("block size must be a power of two in 1024..=65536")
        );
        crate::ensure!(
            blocks_per_group >= 8 && blocks_per_group % 8 == 0 && blocks_per_group <= block_size * 8,
            FsFormatterError::Invalid("blocks per group must be a multiple of 8 within one bitmap block")
        );
        crate::ensure!(
            inodes_per_group >= 8
                && inodes_per_group % 8 == 0
                && inodes_per_group <= block_size * 8,
            FsFormatterError::Invalid("inodes per group must be a multiple of 8 within one bitmap block")
        );
        crate::ensure!(
            revision == EXT2_GOOD_OLD_REV || revision == EXT2_DYNAMIC_REV,
            FsFormatterError::Invalid("unknown ext2 revision")
        );

        let mut label = [0u8; 16];
        if let Some(text) = volume_label {
            let bytes = text.as_bytes();
            crate::ensure!(bytes.len() <= 16, FsFormatterError::Invalid("volume label longer than 16 bytes"));
            label[..bytes.len()].copy_from_slice(bytes);
        }

        let blocks = size_bytes / block_size as u64;
        crate::ensure!(blocks <= u32::MAX as u64, FsFormatterError::Invalid("volume too large"));

        let (feature_incompat, feature_ro_compat) = if revision == EXT2_DYNAMIC_REV {
            (
                EXT2_FEATURE_INCOMPAT_FILETYPE,
                EXT2_FEATURE_RO_COMPAT_SPARSE_SUPER | EXT2_FEATURE_RO_COMPAT_LARGE_FILE,
            )
        } else {
            (0, 0)
        };

        let mut meta = Self {
            volume_id: volume_id.unwrap_or_else(|| generate_volume_id_128().to_le_bytes()),
            volume_label: label,
            block_size,
            block_count: blocks as u32,
            first_data_block: if block_size == EXT2_MIN_BLOCK_SIZE { 1 } else { 0 },
            blocks_per_group,
            group_count: 0,
            inode_count: 0,
            inodes_per_group,
            inode_size: EXT2_GOOD_OLD_INODE_SIZE,
            first_inode: EXT2_GOOD_OLD_FIRST_INO,
            revision,
            feature_compat: 0,
            feature_incompat,
            feature_ro_compat,
        };
        crate::ensure!(
            meta.block_count > meta.first_data_block,
            FsFormatterError::Invalid("volume too small")
        );

        meta.group_count = meta.count_groups();
        // A trailing group too short for its own metadata is dropped
        let last = meta.group_count - 1;
        if meta.blocks_in_group(last) <= meta.group_overhead(last) + 1 && last > 0 {
            meta.block_count = meta.group_start(last);
            meta.group_count = meta.count_groups();
        }
        // Group 0 holds the root and lost+found blocks
        crate::ensure!(
            meta.blocks_in_group(0) > meta.group_overhead(0) + 2,
            FsFormatterError::Invalid("volume too small")
        );

        meta.inode_count = meta
            .group_count
            .checked_mul(inodes_per_group)
            .ok_or(FsFormatterError::Invalid("too many inodes"))?;
        crate::ensure!(
            meta.inode_count > meta.first_inode,
            FsFormatterError::Invalid("not enough inodes")
        );
        Ok(meta)
    }

    pub fn from_superblock(sb: &Ext2Superblock) -> FsParsingResult<Self> {
        let magic = sb.s_magic;
        crate::ensure!(magic == EXT2_SUPER_MAGIC, FsParsingError::BadSignature("ext2 superblock"));

        let log = sb.s_log_block_size;
        crate::ensure!(
            log <= EXT2_MAX_LOG_BLOCK_SIZE,
            FsParsingError::Invalid("block size out of range")
        );
        let block_size = EXT2_MIN_BLOCK_SIZE << log;

        let revision = sb.s_rev_level;
        let (inode_size, first_inode) = match revision {
            EXT2_GOOD_OLD_REV => (EXT2_GOOD_OLD_INODE_SIZE, EXT2_GOOD_OLD_FIRST_INO),
            EXT2_DYNAMIC_REV => (sb.s_inode_size, sb.s_first_ino),
            _ => return Err(FsParsingError::Unsupported("ext2 revision")),
        };
        crate::ensure!(
            inode_size.is_power_of_two()
                && inode_size >= EXT2_GOOD_OLD_INODE_SIZE
                && inode_size as u32 <= block_size,
            FsParsingError::Invalid("inode size")
        );

        let feature_incompat = if revision == EXT2_DYNAMIC_REV { sb.s_feature_incompat } else { 0 };
        crate::ensure!(
            feature_incompat & !EXT2_SUPPORTED_INCOMPAT == 0,
            FsParsingError::Unsupported("ext2 incompatible features")
        );

        let meta = Self {
            volume_id: sb.s_uuid,
            volume_label: sb.s_volume_name,
            block_size,
            block_count: sb.s_blocks_count,
            first_data_block: sb.s_first_data_block,
            blocks_per_group: sb.s_blocks_per_group,
            group_count: 0,
            inode_count: sb.s_inodes_count,
            inodes_per_group: sb.s_inodes_per_group,
            inode_size,
            first_inode,
            revision,
            feature_compat: if revision == EXT2_DYNAMIC_REV { sb.s_feature_compat } else { 0 },
            feature_incompat,
            feature_ro_compat: if revision == EXT2_DYNAMIC_REV { sb.s_feature_ro_compat } else { 0 },
        };

        let expected_first = if block_size == EXT2_MIN_BLOCK_SIZE { 1 } else { 0 };
        crate::ensure!(
            meta.first_data_block == expected_first,
            FsParsingError::Invalid("first data block")
        );
        crate::ensure!(
            meta.blocks_per_group > 0 && meta.blocks_per_group <= block_size * 8,
            FsParsingError::Invalid("blocks per group")
        );
        crate::ensure!(
            meta.inodes_per_group > 0 && meta.inodes_per_group <= block_size * 8,
            FsParsingError::Invalid("inodes per group")
        );
        crate::ensure!(
            meta.block_count > meta.first_data_block,
            FsParsingError::Invalid("block count")
        );
        crate::ensure!(
            meta.first_inode > EXT2_ROOT_INO,
            FsParsingError::Invalid("first inode")
        );

        let group_count = meta.count_groups();
        crate::ensure!(
            meta.inode_count as u64 <= group_count as u64 * meta.inodes_per_group as u64
                && meta.inode_count > EXT2_ROOT_INO,
            FsParsingError::Corrupted("inode count does not match the group layout")
        );
        Ok(Self { group_count, ..meta })
    }

    fn count_groups(&self) -> u32 {
        (self.block_count - self.first_data_block).div_ceil(self.blocks_per_group)
    }

    #[inline]
    pub fn has_filetype(&self) -> bool {
        self.feature_incompat & EXT2_FEATURE_INCOMPAT_FILETYPE != 0
    }

    #[inline]
    pub fn is_large_file(&self) -> bool {
        self.feature_ro_compat & EXT2_FEATURE_RO_COMPAT_LARGE_FILE != 0
    }

    #[inline]
    pub fn has_sparse_super(&self) -> bool {
        self.feature_ro_compat & EXT2_FEATURE_RO_COMPAT_SPARSE_SUPER != 0
    }

    /// Read-only compatible features this driver cannot maintain.
    #[inline]
    pub fn unknown_ro_compat(&self) -> u32 {
        self.feature_ro_compat & !EXT2_SUPPORTED_RO_COMPAT
    }

    /// Whether group `group` carries a superblock and descriptor table copy.
    pub fn has_super(&self, group: u32) -> bool {
        if !self.has_sparse_super() || group <= 1 {
            return true;
        }
        [3u32, 5, 7].iter().any(|&base| {
            let mut n = base;
            while n < group {
                n = n.saturating_mul(base);
            }
            n == group
        })
    }

    /// Block holding the primary group descriptor table.
    #[inline]
    pub fn gdt_block(&self) -> u32 {
        self.first_data_block + 1
    }

    #[inline]
    pub fn gdt_blocks(&self) -> u32 {
        (self.group_count * EXT2_GROUP_DESC_SIZE as u32).div_ceil(self.block_size)
    }

    #[inline]
    pub fn inode_table_blocks(&self) -> u32 {
        (self.inodes_per_group * self.inode_size as u32).div_ceil(self.block_size)
    }

    /// Blocks taken by metadata at the head of `group`.
    pub fn group_overhead(&self, group: u32) -> u32 {
        let sb = if self.has_super(group) { 1 + self.gdt_blocks() } else { 0 };
        sb + 2 + self.inode_table_blocks()
    }

    #[inline]
    pub fn group_start(&self, group: u32) -> u32 {
        self.first_data_block + group * self.blocks_per_group
    }

    /// Number of blocks in `group`; the last one may be short.
    pub fn blocks_in_group(&self, group: u32) -> u32 {
        let start = self.group_start(group);
        self.blocks_per_group.min(self.block_count.saturating_sub(start))
    }

    /// `(group, bit)` of a block number.
    #[inline]
    pub fn block_position(&self, block: u32) -> (u32, usize) {
        let rel = block - self.first_data_block;
        (rel / self.blocks_per_group, (rel % self.blocks_per_group) as usize)
    }

    /// `(group, slot)` of an inode number (1-based).
    #[inline]
    pub fn inode_position(&self, inode: u32) -> (u32, usize) {
        let rel = inode - 1;
        (rel / self.inodes_per_group, (rel % self.inodes_per_group) as usize)
    }

    #[inline]
    pub fn is_valid_inode(&self, inode: u32) -> bool {
        inode >= 1 && inode <= self.inode_count
    }

    /// Block pointers per indirect block.
    #[inline]
    pub fn pointers_per_block(&self) -> u64 {
        self.block_size as u64 / 4
    }

    /// Largest regular-file size the block tree and size field can express.
    pub fn max_file_size(&self) -> u64 {
        let p = self.pointers_per_block();
        let blocks = EXT2_NDIR_BLOCKS as u64 + p + p * p + p * p * p;
        let limit = if self.is_large_file() { u64::MAX } else { i32::MAX as u64 };
        (blocks * self.block_size as u64).min(limit)
    }
}

impl FsMeta<u32> for Ext2Meta {
    fn unit_size(&self) -> usize {
        self.block_size as usize
    }

    fn unit_offset(&self, unit: u32) -> u64 {
        unit as u64 * self.block_size as u64
    }

    fn root_unit(&self) -> u32 {
        EXT2_ROOT_INO
    }

    fn first_data_unit(&self) -> u32 {
        self.first_data_block
    }

    fn last_data_unit(&self) -> u32 {
        self.block_count - 1
    }

    fn total_units(&self) -> usize {
        self.block_count as usize
    }

    fn size_bytes(&self) -> u64 {
        self.block_count as u64 * self.block_size as u64
    }
}

impl Ext2Meta {
    pub fn label(&self) -> String {
        let end = self
            .volume_label
            .iter()
            .position(|&c| c == 0)
            .unwrap_or(self.volume_label.len());
        String::from_utf8_lossy(&self.volume_label[..end]).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_small_volume() {
        let meta = Ext2Meta::new(8 * 1024 * 1024, Some("TESTEXT2")).unwrap();
        assert_eq!(meta.block_size, 1024);
        assert_eq!(meta.first_data_block, 1);
        assert_eq!(meta.block_count, 8192);
        assert_eq!(meta.blocks_per_group, 8192);
        // 8191 blocks after the boot block
        assert_eq!(meta.group_count, 1);
        assert_eq!(meta.gdt_block(), 2);
        assert_eq!(meta.label(), "TESTEXT2");
        assert!(meta.has_filetype());
        assert!(meta.is_large_file());
        assert_eq!(meta.inode_count, meta.inodes_per_group);
        assert_eq!(meta.inodes_per_group % 8, 0);
    }

    #[test]
    fn test_large_volume_uses_4k_blocks() {
        let meta = Ext2Meta::new(1024 * 1024 * 1024, None).unwrap();
        assert_eq!(meta.block_size, 4096);
        assert_eq!(meta.first_data_block, 0);
        assert_eq!(meta.gdt_block(), 1);
        assert_eq!(meta.group_count, 8);
    }

    #[test]
    fn test_short_tail_group_dropped() {
        // 3 groups of 1024 blocks plus a 5-block tail
        let meta =
            Ext2Meta::new_custom(3 * 1024 * 1024 + 6 * 1024, None, None, 1024, 1024, 64, 1).unwrap();
        assert_eq!(meta.group_count, 3);
        assert_eq!(meta.block_count, 1 + 3 * 1024);
        assert_eq!(meta.blocks_in_group(2), 1024);
    }

    #[test]
    fn test_sparse_super_groups() {
        let meta = Ext2Meta::new_custom(64 * 1024 * 1024, None, None, 1024, 1024, 64, 1).unwrap();
        let with: alloc::vec::Vec<u32> = (0..meta.group_count).filter(|&g| meta.has_super(g)).collect();
        assert_eq!(with, [0, 1, 3, 5, 7, 9, 25, 27, 49]);

        // Revision 0 has no sparse_super: every group holds a copy
        let old = Ext2Meta::new_custom(8 * 1024 * 1024, None, None, 1024, 1024, 64, 0).unwrap();
        assert!((0..old.group_count).all(|g| old.has_super(g)));
        assert!(!old.has_filetype());
    }

    #[test]
    fn test_positions() {
        let meta = Ext2Meta::new_custom(8 * 1024 * 1024, None, None, 1024, 1024, 64, 1).unwrap();
        assert_eq!(meta.inode_position(1), (0, 0));
        assert_eq!(meta.inode_position(64), (0, 63));
        assert_eq!(meta.inode_position(65), (1, 0));
        assert_eq!(meta.block_position(1), (0, 0));
        assert_eq!(meta.block_position(1025), (1, 0));
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(Ext2Meta::new_custom(8 << 20, None, None, 3000, 1024, 64, 1).is_err());
        assert!(Ext2Meta::new_custom(8 << 20, None, None, 1024, 9000, 64, 1).is_err());
        assert!(Ext2Meta::new_custom(8 << 20, None, None, 1024, 1024, 12, 1).is_err());
        assert!(Ext2Meta::new_custom(8 << 20, None, None, 1024, 1024, 64, 2).is_err());
        assert!(Ext2Meta::new_custom(8 << 20, Some("a label too long!"), None, 1024, 1024, 64, 1).is_err());
        assert!(Ext2Meta::new_custom(8 * 1024, None, None, 1024, 1024, 64, 1).is_err());
    }

    #[test]
    fn test_roundtrip_through_superblock() {
        let meta = Ext2Meta::new_custom(8 << 20, Some("rt"), None, 2048, 4096, 128, 1).unwrap();
        let sb = Ext2Superblock::from_meta(&meta, 0, 0, 0);
        let back = Ext2Meta::from_superblock(&sb).unwrap();
        assert_eq!(back.block_size, 2048);
        assert_eq!(back.group_count, meta.group_count);
        assert_eq!(back.inode_count, meta.inode_count);
        assert_eq!(back.label(), "rt");

        let mut bad = sb;
        bad.s_magic = 0x1234;
        assert_eq!(
            Ext2Meta::from_superblock(&bad).err(),
            Some(FsParsingError::BadSignature("ext2 superblock"))
        );
        let mut future = sb;
        future.s_feature_incompat |= 0x0040;
        assert!(matches!(
            Ext2Meta::from_superblock(&future),
            Err(FsParsingError::Unsupported(_))
        ));
    }
}
