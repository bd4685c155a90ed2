// SPDX-License-Identifier: MIT

use alloc::vec::Vec;

use rimio::prelude::*;
use zerocopy::{FromBytes, IntoBytes};

use crate::core::errors::*;
use crate::core::meta::FsMeta;
use crate::core::utils::bitmap::BitmapOps;
use crate::fs::ext2::{constant::*, meta::Ext2Meta, types::Ext2GroupDesc};

/// Block and inode allocation over the per-group bitmaps.
///
/// Holds the group descriptor table and every bitmap in memory. Counters in
/// the descriptors and the volume totals move with each claim and release;
/// [`Ext2Allocator::store`] writes back the groups touched since the last
/// store.
#[derive(Debug, Clone)]
pub struct Ext2Allocator {
    descs: Vec<Ext2GroupDesc>,
    block_bitmaps: Vec<Vec<u8>>,
    inode_bitmaps: Vec<Vec<u8>>,
    dirty: Vec<bool>,
    free_blocks: u32,
    free_inodes: u32,
}

impl Ext2Allocator {
    /// Builds an allocator from descriptors and bitmaps already in memory.
    pub fn new(
        descs: Vec<Ext2GroupDesc>,
        block_bitmaps: Vec<Vec<u8>>,
        inode_bitmaps: Vec<Vec<u8>>,
    ) -> Self {
        let free_blocks = descs.iter().map(|d| d.bg_free_blocks_count as u32).sum();
        let free_inodes = descs.iter().map(|d| d.bg_free_inodes_count as u32).sum();
        let dirty = vec![false; descs.len()];
        Self {
            descs,
            block_bitmaps,
            inode_bitmaps,
            dirty,
            free_blocks,
            free_inodes,
        }
    }

    /// Reads the descriptor table and both bitmaps of every group.
    pub fn load<IO: RimIO + ?Sized>(io: &mut IO, meta: &Ext2Meta) -> FsResult<Self> {
        let count = meta.group_count as usize;
        let mut raw = vec![0u8; count * EXT2_GROUP_DESC_SIZE];
        io.read_at(meta.unit_offset(meta.gdt_block()), &mut raw)?;

        let mut descs = Vec::with_capacity(count);
        let mut block_bitmaps = Vec::with_capacity(count);
        let mut inode_bitmaps = Vec::with_capacity(count);
        for (group, chunk) in raw.chunks_exact(EXT2_GROUP_DESC_SIZE).enumerate() {
            let desc = Ext2GroupDesc::read_from_bytes(chunk)
                .map_err(|_| FsParsingError::Corrupted("group descriptor"))?;
            let (bb, ib, it) = (desc.bg_block_bitmap, desc.bg_inode_bitmap, desc.bg_inode_table);
            let table_end = it as u64 + meta.inode_table_blocks() as u64;
            crate::ensure!(
                meta.is_valid_unit(bb)
                    && meta.is_valid_unit(ib)
                    && meta.is_valid_unit(it)
                    && table_end <= meta.block_count as u64,
                FsParsingError::Corrupted("group descriptor points outside the volume")
            );

            let mut bitmap = vec![0u8; meta.unit_size()];
            io.read_at(meta.unit_offset(bb), &mut bitmap)?;
            block_bitmaps.push(bitmap);
            let mut bitmap = vec![0u8; meta.unit_size()];
            io.read_at(meta.unit_offset(ib), &mut bitmap)?;
            inode_bitmaps.push(bitmap);

            log::trace!("group {group}: bitmaps {bb}/{ib}, inode table {it}");
            descs.push(desc);
        }
        Ok(Self::new(descs, block_bitmaps, inode_bitmaps))
    }

    /// Writes the descriptor table and the bitmaps of the groups changed
    /// since the last store.
    pub fn store<IO: RimIO + ?Sized>(&mut self, io: &mut IO, meta: &Ext2Meta) -> FsResult {
        if !self.dirty.iter().any(|&d| d) {
            return Ok(());
        }
        for (group, desc) in self.descs.iter().enumerate() {
            if !self.dirty[group] {
                continue;
            }
            io.write_at(meta.unit_offset(desc.bg_block_bitmap), &self.block_bitmaps[group])?;
            io.write_at(meta.unit_offset(desc.bg_inode_bitmap), &self.inode_bitmaps[group])?;
        }
        io.write_at(meta.unit_offset(meta.gdt_block()), self.descs.as_bytes())?;
        self.dirty.iter_mut().for_each(|d| *d = false);
        Ok(())
    }

    /// Schedules the bitmaps of `group` for the next store.
    #[inline]
    pub fn mark_dirty(&mut self, group: usize) {
        self.dirty[group] = true;
    }

    #[inline]
    pub fn free_blocks(&self) -> u32 {
        self.free_blocks
    }

    #[inline]
    pub fn free_inodes(&self) -> u32 {
        self.free_inodes
    }

    #[inline]
    pub fn descriptors(&self) -> &[Ext2GroupDesc] {
        &self.descs
    }

    /// First block of the inode table of `group`.
    pub fn inode_table(&self, group: u32) -> FsResult<u32> {
        self.descs
            .get(group as usize)
            .map(|d| d.bg_inode_table)
            .ok_or(FsError::Other("inode group out of range"))
    }

    /// Byte offset of the on-disk record of `inode`.
    pub fn inode_offset(&self, meta: &Ext2Meta, inode: u32) -> FsResult<u64> {
        crate::ensure!(meta.is_valid_inode(inode), FsError::InvalidInput("inode out of range"));
        let (group, slot) = meta.inode_position(inode);
        let table = self.inode_table(group)?;
        Ok(meta.unit_offset(table) + slot as u64 * meta.inode_size as u64)
    }

    pub fn is_block_used(&self, meta: &Ext2Meta, block: u32) -> bool {
        if !meta.is_valid_unit(block) {
            return true;
        }
        let (group, bit) = meta.block_position(block);
        self.block_bitmaps[group as usize].get_bit(bit)
    }

    pub fn is_inode_used(&self, meta: &Ext2Meta, inode: u32) -> bool {
        if !meta.is_valid_inode(inode) {
            return true;
        }
        let (group, bit) = meta.inode_position(inode);
        self.inode_bitmaps[group as usize].get_bit(bit)
    }

    /// Claims a free block, searching from `goal`'s group onwards and
    /// wrapping once.
    pub fn alloc_block(&mut self, meta: &Ext2Meta, goal: u32) -> FsAllocatorResult<u32> {
        if self.free_blocks == 0 {
            return Err(FsAllocatorError::OutOfSpace);
        }
        let goal = if meta.is_valid_unit(goal) { goal } else { meta.first_data_block };
        let (start_group, start_bit) = meta.block_position(goal);
        let groups = meta.group_count;

        for step in 0..=groups {
            let group = (start_group + step) % groups;
            let desc = &self.descs[group as usize];
            if desc.bg_free_blocks_count == 0 {
                continue;
            }
            let from = if step == 0 { start_bit } else { 0 };
            let limit = meta.blocks_in_group(group) as usize;
            let Some(bit) = self.block_bitmaps[group as usize].find_first_zero(from, limit) else {
                continue;
            };

            self.block_bitmaps[group as usize].set_bit(bit, true);
            self.descs[group as usize].bg_free_blocks_count -= 1;
            self.dirty[group as usize] = true;
            self.free_blocks -= 1;
            let block = meta.group_start(group) + bit as u32;
            log::trace!("block {block} allocated in group {group}");
            return Ok(block);
        }
        Err(FsAllocatorError::OutOfSpace)
    }

    pub fn free_block(&mut self, meta: &Ext2Meta, block: u32) -> FsResult {
        crate::ensure!(meta.is_valid_unit(block), FsCursorError::InvalidCluster(block));
        let (group, bit) = meta.block_position(block);
        let g = group as usize;
        if !self.block_bitmaps[g].get_bit(bit) {
            log::warn!("block {block} freed twice");
            return Ok(());
        }
        self.block_bitmaps[g].set_bit(bit, false);
        self.descs[g].bg_free_blocks_count += 1;
        self.dirty[g] = true;
        self.free_blocks += 1;
        Ok(())
    }

    /// Claims a free inode, preferring `preferred_group`. Inodes below the
    /// first non-reserved one are never handed out.
    pub fn alloc_inode(
        &mut self,
        meta: &Ext2Meta,
        preferred_group: u32,
        is_dir: bool,
    ) -> FsAllocatorResult<u32> {
        if self.free_inodes == 0 {
            return Err(FsAllocatorError::OutOfSpace);
        }
        let groups = meta.group_count;
        let ipg = meta.inodes_per_group;

        for step in 0..groups {
            let group = (preferred_group + step) % groups;
            let g = group as usize;
            if self.descs[g].bg_free_inodes_count == 0 {
                continue;
            }
            // Bits of the reserved inodes are skipped even when clear
            let reserved = (meta.first_inode - 1).saturating_sub(group * ipg) as usize;
            let limit = ipg.min(meta.inode_count - group * ipg) as usize;
            let Some(bit) = self.inode_bitmaps[g].find_first_zero(reserved.min(limit), limit) else {
                continue;
            };

            self.inode_bitmaps[g].set_bit(bit, true);
            let desc = &mut self.descs[g];
            desc.bg_free_inodes_count -= 1;
            if is_dir {
                desc.bg_used_dirs_count += 1;
            }
            self.dirty[g] = true;
            self.free_inodes -= 1;
            let inode = group * ipg + bit as u32 + 1;
            log::trace!("inode {inode} allocated in group {group}");
            return Ok(inode);
        }
        Err(FsAllocatorError::OutOfSpace)
    }

    pub fn free_inode(&mut self, meta: &Ext2Meta, inode: u32, is_dir: bool) -> FsResult {
        crate::ensure!(
            meta.is_valid_inode(inode) && inode >= meta.first_inode,
            FsError::InvalidInput("reserved or out-of-range inode")
        );
        let (group, bit) = meta.inode_position(inode);
        let g = group as usize;
        if !self.inode_bitmaps[g].get_bit(bit) {
            log::warn!("inode {inode} freed twice");
            return Ok(());
        }
        self.inode_bitmaps[g].set_bit(bit, false);
        let desc = &mut self.descs[g];
        desc.bg_free_inodes_count += 1;
        if is_dir {
            desc.bg_used_dirs_count = desc.bg_used_dirs_count.saturating_sub(1);
        }
        self.dirty[g] = true;
        self.free_inodes += 1;
        Ok(())
    }
}
