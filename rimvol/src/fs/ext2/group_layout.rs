// SPDX-License-Identifier: MIT

use crate::fs::ext2::meta::Ext2Meta;

/// Placement of the metadata blocks of one block group, as laid out by the
/// formatter: optional superblock and descriptor table copies, the two
/// bitmaps, then the inode table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupLayout {
    pub group_id: u32,
    pub group_start: u32,
    /// Blocks in this group (the last group may be short)
    pub blocks: u32,
    pub has_super: bool,
    pub block_bitmap_block: u32,
    pub inode_bitmap_block: u32,
    pub inode_table_block: u32,
    pub inode_table_blocks: u32,
    /// First block free for data
    pub first_data_block: u32,
}

impl GroupLayout {
    pub fn compute(meta: &Ext2Meta, group_id: u32) -> Self {
        let group_start = meta.group_start(group_id);
        let has_super = meta.has_super(group_id);
        let reserved = if has_super { 1 + meta.gdt_blocks() } else { 0 };

        let block_bitmap_block = group_start + reserved;
        let inode_bitmap_block = block_bitmap_block + 1;
        let inode_table_block = inode_bitmap_block + 1;
        let inode_table_blocks = meta.inode_table_blocks();

        Self {
            group_id,
            group_start,
            blocks: meta.blocks_in_group(group_id),
            has_super,
            block_bitmap_block,
            inode_bitmap_block,
            inode_table_block,
            inode_table_blocks,
            first_data_block: inode_table_block + inode_table_blocks,
        }
    }

    /// Metadata blocks at the head of the group.
    #[inline]
    pub fn overhead(&self) -> u32 {
        self.first_data_block - self.group_start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_layout_ordering() {
        let meta = Ext2Meta::new_custom(16 * 1024 * 1024, None, None, 1024, 2048, 128, 1).unwrap();

        for group_id in 0..meta.group_count {
            let layout = GroupLayout::compute(&meta, group_id);
            assert_eq!(layout.group_start, 1 + group_id * 2048);
            assert!(layout.block_bitmap_block >= layout.group_start);
            assert!(layout.inode_bitmap_block > layout.block_bitmap_block);
            assert!(layout.inode_table_block > layout.inode_bitmap_block);
            assert_eq!(layout.first_data_block, layout.inode_table_block + 16);
            assert!(layout.overhead() < layout.blocks);
        }

        // Group 0: superblock + one descriptor block, then the bitmaps
        let first = GroupLayout::compute(&meta, 0);
        assert_eq!(first.block_bitmap_block, 3);
        // Group 2 carries no backup with sparse_super
        let third = GroupLayout::compute(&meta, 2);
        assert!(!third.has_super);
        assert_eq!(third.block_bitmap_block, third.group_start);
    }
}
