// SPDX-License-Identifier: MIT

use alloc::vec::Vec;

use rimio::prelude::*;
use zerocopy::IntoBytes;

pub use crate::core::formatter::*;

use crate::core::errors::{FsError, FsResult};
use crate::core::meta::FsMeta;
use crate::core::utils::bitmap::BitmapOps;
use crate::core::utils::time::{now_utc, to_unix};
use crate::fs::ext2::{
    allocator::Ext2Allocator, constant::*, dir, group_layout::GroupLayout, meta::*, types::*,
};

/// Writes an empty ext2 volume described by an [`Ext2Meta`].
///
/// Every group gets its bitmaps and a zeroed inode table; groups selected
/// by `sparse_super` also carry a superblock and descriptor table copy. The
/// root directory (inode 2) holds `lost+found` (inode 11).
pub struct Ext2Formatter<'a, IO: RimIO + ?Sized> {
    io: &'a mut IO,
    meta: &'a Ext2Meta,
}

impl<'a, IO: RimIO + ?Sized> Ext2Formatter<'a, IO> {
    pub fn new(io: &'a mut IO, meta: &'a Ext2Meta) -> Self {
        Self { io, meta }
    }

    fn layouts(&self) -> Vec<GroupLayout> {
        (0..self.meta.group_count)
            .map(|g| GroupLayout::compute(self.meta, g))
            .collect()
    }

    /// Descriptors and bitmaps of the freshly laid out groups. Bits past
    /// the end of a short group or past the inodes of a group stay set.
    fn build_allocator(&self, layouts: &[GroupLayout]) -> Ext2Allocator {
        let bs = self.meta.unit_size();
        let bits = bs * 8;
        let ipg = self.meta.inodes_per_group as usize;

        let mut descs = Vec::with_capacity(layouts.len());
        let mut block_bitmaps = Vec::with_capacity(layouts.len());
        let mut inode_bitmaps = Vec::with_capacity(layouts.len());
        for layout in layouts {
            let mut blocks = vec![0u8; bs];
            for bit in (0..layout.overhead() as usize).chain(layout.blocks as usize..bits) {
                blocks.set_bit(bit, true);
            }

            let mut inodes = vec![0u8; bs];
            let first = layout.group_id * self.meta.inodes_per_group + 1;
            let mut reserved = 0u32;
            for inode in first..self.meta.first_inode.min(first + ipg as u32) {
                inodes.set_bit((inode - first) as usize, true);
                reserved += 1;
            }
            for bit in ipg..bits {
                inodes.set_bit(bit, true);
            }

            let free_blocks = layout.blocks - layout.overhead();
            let free_inodes = self.meta.inodes_per_group - reserved;
            // The root directory is a reserved inode of group 0
            let used_dirs = u16::from(layout.group_id == 0);
            descs.push(Ext2GroupDesc::new(
                layout.block_bitmap_block,
                layout.inode_bitmap_block,
                layout.inode_table_block,
                free_blocks as u16,
                free_inodes as u16,
                used_dirs,
            ));
            block_bitmaps.push(blocks);
            inode_bitmaps.push(inodes);
        }
        Ext2Allocator::new(descs, block_bitmaps, inode_bitmaps)
    }

    fn write_groups(&mut self, layouts: &[GroupLayout], alloc: &mut Ext2Allocator) -> FsResult {
        let bs = self.meta.unit_size();
        for (group, (layout, desc)) in layouts.iter().zip(alloc.descriptors()).enumerate() {
            let (bb, ib) = (desc.bg_block_bitmap, desc.bg_inode_bitmap);
            self.io.zero_fill(self.meta.unit_offset(bb), bs)?;
            self.io.zero_fill(self.meta.unit_offset(ib), bs)?;
            self.io.zero_fill(
                self.meta.unit_offset(layout.inode_table_block),
                layout.inode_table_blocks as usize * bs,
            )?;
            log::trace!("group {group}: metadata cleared");
        }
        // Every bitmap goes out with the first store
        for group in 0..layouts.len() {
            alloc.mark_dirty(group);
        }
        Ok(())
    }

    fn write_inode(&mut self, alloc: &Ext2Allocator, number: u32, inode: &Ext2Inode) -> FsResult {
        let offset = alloc.inode_offset(self.meta, number)?;
        self.io.write_struct(offset, inode)?;
        Ok(())
    }

    /// Root and `lost+found`, one block each.
    fn write_root(&mut self, alloc: &mut Ext2Allocator, now: u32) -> FsResult {
        let bs = self.meta.block_size;
        let filetype = self.meta.has_filetype();

        let lost_found = alloc.alloc_inode(self.meta, 0, true)?;
        let root_block = alloc.alloc_block(self.meta, self.meta.first_data_block)?;
        let lf_block = alloc.alloc_block(self.meta, root_block)?;

        let mut root_data = dir::new_dir_block(bs as usize, filetype, EXT2_ROOT_INO, EXT2_ROOT_INO);
        dir::insert_record(
            &mut root_data,
            bs as usize,
            filetype,
            lost_found,
            EXT2_LOST_FOUND_NAME,
            EXT2_FT_DIR,
        )
        .ok_or(FsFormatterError::Other("root block too small"))?;
        let lf_data = dir::new_dir_block(bs as usize, filetype, lost_found, EXT2_ROOT_INO);
        self.io.write_at(self.meta.unit_offset(root_block), &root_data)?;
        self.io.write_at(self.meta.unit_offset(lf_block), &lf_data)?;

        for (number, perm, links, block) in [
            (EXT2_ROOT_INO, EXT2_DEFAULT_DIR_PERM, 3, root_block),
            (lost_found, EXT2_LOST_FOUND_PERM, 2, lf_block),
        ] {
            let mut inode = Ext2Inode::new(EXT2_S_IFDIR | perm, links, now);
            let mut blocks = [0u32; EXT2_N_BLOCKS];
            blocks[0] = block;
            inode.set_blocks(blocks);
            inode.set_size(bs as u64, false);
            inode.add_blocks(1, bs);
            self.write_inode(alloc, number, &inode)?;
        }
        Ok(())
    }

    /// Primary superblock at byte 1024, backups at the start of every
    /// group that carries one, each followed by a descriptor table copy.
    fn write_superblocks(&mut self, alloc: &Ext2Allocator, now: u32) -> FsResult {
        let mut sb = Ext2Superblock::from_meta(self.meta, alloc.free_blocks(), alloc.free_inodes(), now);
        self.io.write_struct(EXT2_SUPERBLOCK_OFFSET, &sb)?;

        let table = alloc.descriptors().as_bytes();
        for group in 1..self.meta.group_count {
            if !self.meta.has_super(group) {
                continue;
            }
            let start = self.meta.group_start(group);
            sb.s_block_group_nr = group as u16;
            self.io.write_struct(self.meta.unit_offset(start), &sb)?;
            self.io.write_at(self.meta.unit_offset(start + 1), table)?;
        }
        Ok(())
    }

    fn zero_data(&mut self, layouts: &[GroupLayout]) -> FsResult {
        let bs = self.meta.unit_size();
        for layout in layouts {
            let count = (layout.blocks - layout.overhead()) as usize;
            self.io
                .zero_fill(self.meta.unit_offset(layout.first_data_block), count * bs)?;
        }
        Ok(())
    }

    fn run(&mut self, full_format: bool) -> FsResult {
        let now = to_unix(now_utc());
        let layouts = self.layouts();
        if full_format {
            self.zero_data(&layouts)?;
        }
        let mut alloc = self.build_allocator(&layouts);
        self.write_groups(&layouts, &mut alloc)?;
        self.write_root(&mut alloc, now)?;
        alloc.store(&mut *self.io, self.meta)?;
        self.write_superblocks(&alloc, now)?;
        self.io.flush()?;
        log::info!(
            "formatted ext2 rev {}: {} blocks of {} bytes, {} group(s), {} inodes",
            self.meta.revision,
            self.meta.block_count,
            self.meta.block_size,
            self.meta.group_count,
            self.meta.inode_count
        );
        Ok(())
    }
}

impl<IO: RimIO + ?Sized> FsFormatter for Ext2Formatter<'_, IO> {
    fn format(&mut self, full_format: bool) -> FsFormatterResult {
        self.run(full_format).map_err(|e| {
            log::error!("ext2 format failed: {e}");
            match e {
                FsError::IO(io) => FsFormatterError::IO(io),
                FsError::Formatter(f) => f,
                FsError::Allocator(_) => {
                    FsFormatterError::Invalid("volume too small for the root directory")
                }
                other => FsFormatterError::Other(other.msg()),
            }
        })
    }
}
