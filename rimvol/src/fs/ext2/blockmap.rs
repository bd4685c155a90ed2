// SPDX-License-Identifier: MIT

//! Logical-to-physical block translation through the inode block tree.
//!
//! Slots 0..12 of `i_block` are direct pointers; slots 12, 13 and 14 root a
//! single, double and triple indirect tree of `block_size / 4` pointers per
//! block. A zero pointer at any level is an unallocated range (a hole).

use alloc::vec::Vec;

use rimio::prelude::*;

use crate::core::errors::*;
use crate::core::meta::FsMeta;
use crate::fs::ext2::{allocator::Ext2Allocator, constant::*, meta::Ext2Meta};

pub type BlockPointers = [u32; EXT2_N_BLOCKS];

/// `(depth, slots)`: `slots[0]` indexes `i_block`, `slots[1..=depth]` index
/// the successive indirect blocks. `None` past the triple-indirect range.
pub fn block_path(meta: &Ext2Meta, index: u64) -> Option<(usize, [usize; 4])> {
    let p = meta.pointers_per_block();
    let mut i = index;

    if i < EXT2_NDIR_BLOCKS as u64 {
        return Some((0, [i as usize, 0, 0, 0]));
    }
    i -= EXT2_NDIR_BLOCKS as u64;
    if i < p {
        return Some((1, [EXT2_IND_BLOCK, i as usize, 0, 0]));
    }
    i -= p;
    if i < p * p {
        return Some((2, [EXT2_DIND_BLOCK, (i / p) as usize, (i % p) as usize, 0]));
    }
    i -= p * p;
    if i < p * p * p {
        return Some((
            3,
            [
                EXT2_TIND_BLOCK,
                (i / (p * p)) as usize,
                ((i / p) % p) as usize,
                (i % p) as usize,
            ],
        ));
    }
    None
}

#[inline]
fn checked(meta: &Ext2Meta, ptr: u32) -> FsResult<u32> {
    crate::ensure!(
        ptr == 0 || meta.is_valid_unit(ptr),
        FsCursorError::InvalidCluster(ptr)
    );
    Ok(ptr)
}

#[inline]
fn slot_offset(meta: &Ext2Meta, block: u32, slot: usize) -> u64 {
    meta.unit_offset(block) + slot as u64 * 4
}

fn read_pointers<IO: RimIO + ?Sized>(io: &mut IO, meta: &Ext2Meta, block: u32) -> FsResult<Vec<u32>> {
    let mut raw = vec![0u8; meta.unit_size()];
    io.read_at(meta.unit_offset(block), &mut raw)?;
    Ok(raw
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

fn write_pointers<IO: RimIO + ?Sized>(
    io: &mut IO,
    meta: &Ext2Meta,
    block: u32,
    ptrs: &[u32],
) -> FsResult {
    let raw: Vec<u8> = ptrs.iter().flat_map(|p| p.to_le_bytes()).collect();
    io.write_at(meta.unit_offset(block), &raw)?;
    Ok(())
}

/// Physical block of logical block `index`, `0` for a hole or past the end
/// of the tree. One read per indirection level.
pub fn translate<IO: RimIO + ?Sized>(
    io: &mut IO,
    meta: &Ext2Meta,
    blocks: &BlockPointers,
    index: u64,
) -> FsResult<u32> {
    let Some((depth, path)) = block_path(meta, index) else {
        return Ok(0);
    };
    let mut ptr = checked(meta, blocks[path[0]])?;
    for &slot in &path[1..=depth] {
        if ptr == 0 {
            return Ok(0);
        }
        ptr = checked(meta, io.read_u32_at(slot_offset(meta, ptr, slot))?)?;
    }
    Ok(ptr)
}

/// Blocks referenced by the tree, indirect blocks included.
pub fn count_blocks<IO: RimIO + ?Sized>(
    io: &mut IO,
    meta: &Ext2Meta,
    blocks: &BlockPointers,
) -> FsResult<u32> {
    let mut total = 0;
    for (slot, &ptr) in blocks.iter().enumerate() {
        let level = slot.saturating_sub(EXT2_NDIR_BLOCKS - 1) as u32;
        total += count_tree(io, meta, ptr, level)?;
    }
    Ok(total)
}

fn count_tree<IO: RimIO + ?Sized>(io: &mut IO, meta: &Ext2Meta, ptr: u32, level: u32) -> FsResult<u32> {
    if checked(meta, ptr)? == 0 {
        return Ok(0);
    }
    let mut total = 1;
    if level > 0 {
        for child in read_pointers(io, meta, ptr)? {
            total += count_tree(io, meta, child, level - 1)?;
        }
    }
    Ok(total)
}

/// Physical blocks of logical blocks `0..count`, holes as `0`. Each
/// indirect block is read once.
pub fn collect<IO: RimIO + ?Sized>(
    io: &mut IO,
    meta: &Ext2Meta,
    blocks: &BlockPointers,
    count: usize,
) -> FsResult<Vec<u32>> {
    let mut out = Vec::with_capacity(count);
    for &ptr in blocks.iter().take(EXT2_NDIR_BLOCKS) {
        if out.len() >= count {
            return Ok(out);
        }
        out.push(checked(meta, ptr)?);
    }
    for level in 1..=3 {
        if out.len() >= count {
            break;
        }
        collect_tree(io, meta, blocks[EXT2_NDIR_BLOCKS + level - 1], level as u32, count, &mut out)?;
    }
    crate::ensure!(
        out.len() >= count,
        FsError::InvalidInput("file larger than the block tree can address")
    );
    Ok(out)
}

fn collect_tree<IO: RimIO + ?Sized>(
    io: &mut IO,
    meta: &Ext2Meta,
    ptr: u32,
    level: u32,
    count: usize,
    out: &mut Vec<u32>,
) -> FsResult {
    let ptr = checked(meta, ptr)?;
    if ptr == 0 {
        let span = meta.pointers_per_block().saturating_pow(level);
        let n = (count - out.len()).min(span.min(usize::MAX as u64) as usize);
        out.resize(out.len() + n, 0);
        return Ok(());
    }
    for child in read_pointers(io, meta, ptr)? {
        if out.len() >= count {
            break;
        }
        if level == 1 {
            out.push(checked(meta, child)?);
        } else {
            collect_tree(io, meta, child, level - 1, count, out)?;
        }
    }
    Ok(())
}

fn alloc_zeroed<IO: RimIO + ?Sized>(
    io: &mut IO,
    meta: &Ext2Meta,
    alloc: &mut Ext2Allocator,
    goal: u32,
) -> FsResult<u32> {
    let block = alloc.alloc_block(meta, goal)?;
    io.zero_fill(meta.unit_offset(block), meta.unit_size())?;
    Ok(block)
}

/// Allocates every hole among logical blocks `from..to`, indirect blocks
/// included. New blocks are zero-filled. Returns how many blocks were
/// allocated.
///
/// On failure the blocks placed so far stay linked into the tree.
pub fn map_range<IO: RimIO + ?Sized>(
    io: &mut IO,
    meta: &Ext2Meta,
    alloc: &mut Ext2Allocator,
    blocks: &mut BlockPointers,
    from: u64,
    to: u64,
    mut goal: u32,
) -> FsResult<u32> {
    let mut added = 0u32;
    for index in from..to {
        let (depth, path) =
            block_path(meta, index).ok_or(FsError::InvalidInput("file larger than the block tree can address"))?;

        let mut ptr = checked(meta, blocks[path[0]])?;
        if ptr == 0 {
            ptr = alloc_zeroed(io, meta, alloc, goal)?;
            blocks[path[0]] = ptr;
            added += 1;
        }
        for &slot in &path[1..=depth] {
            let at = slot_offset(meta, ptr, slot);
            let mut child = checked(meta, io.read_u32_at(at)?)?;
            if child == 0 {
                child = alloc_zeroed(io, meta, alloc, ptr + 1)?;
                io.write_u32_at(at, child)?;
                added += 1;
            }
            ptr = child;
        }
        goal = ptr + 1;
    }
    if added > 0 {
        log::trace!("mapped logical blocks {from}..{to}: {added} block(s) allocated");
    }
    Ok(added)
}

/// Releases every block mapping logical index `keep` and beyond, and the
/// indirect blocks left without children. Returns the number of blocks
/// released.
pub fn truncate<IO: RimIO + ?Sized>(
    io: &mut IO,
    meta: &Ext2Meta,
    alloc: &mut Ext2Allocator,
    blocks: &mut BlockPointers,
    keep: u64,
) -> FsResult<u32> {
    let mut freed = 0u32;
    for (i, ptr) in blocks.iter_mut().enumerate().take(EXT2_NDIR_BLOCKS) {
        if (i as u64) >= keep && *ptr != 0 {
            alloc.free_block(meta, *ptr)?;
            *ptr = 0;
            freed += 1;
        }
    }

    let p = meta.pointers_per_block();
    let mut base = EXT2_NDIR_BLOCKS as u64;
    for level in 1..=3u32 {
        let span = p.saturating_pow(level);
        let slot = EXT2_NDIR_BLOCKS + level as usize - 1;
        let root = blocks[slot];
        if root != 0 {
            if keep <= base {
                freed += free_tree(io, meta, alloc, root, level)?;
                blocks[slot] = 0;
            } else if keep < base.saturating_add(span) {
                freed += trim_tree(io, meta, alloc, root, level, keep - base)?;
            }
        }
        base = base.saturating_add(span);
    }
    Ok(freed)
}

fn free_tree<IO: RimIO + ?Sized>(
    io: &mut IO,
    meta: &Ext2Meta,
    alloc: &mut Ext2Allocator,
    ptr: u32,
    level: u32,
) -> FsResult<u32> {
    let ptr = checked(meta, ptr)?;
    if ptr == 0 {
        return Ok(0);
    }
    let mut freed = 0;
    if level > 0 {
        for child in read_pointers(io, meta, ptr)? {
            freed += free_tree(io, meta, alloc, child, level - 1)?;
        }
    }
    alloc.free_block(meta, ptr)?;
    Ok(freed + 1)
}

/// Frees the part of the subtree at `ptr` from relative index `keep` on.
/// `keep` is non-zero, so `ptr` itself stays.
fn trim_tree<IO: RimIO + ?Sized>(
    io: &mut IO,
    meta: &Ext2Meta,
    alloc: &mut Ext2Allocator,
    ptr: u32,
    level: u32,
    keep: u64,
) -> FsResult<u32> {
    let ptr = checked(meta, ptr)?;
    let child_span = meta.pointers_per_block().saturating_pow(level - 1);
    let mut children = read_pointers(io, meta, ptr)?;
    let mut freed = 0;
    let mut changed = false;

    for (j, child) in children.iter_mut().enumerate() {
        let child_base = j as u64 * child_span;
        if *child == 0 {
            continue;
        }
        if keep <= child_base {
            freed += free_tree(io, meta, alloc, *child, level - 1)?;
            *child = 0;
            changed = true;
        } else if level > 1 && keep < child_base + child_span {
            freed += trim_tree(io, meta, alloc, *child, level - 1, keep - child_base)?;
        }
    }
    if changed {
        write_pointers(io, meta, ptr, &children)?;
    }
    Ok(freed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::utils::bitmap::BitmapOps;
    use crate::fs::ext2::group_layout::GroupLayout;
    use crate::fs::ext2::types::Ext2GroupDesc;

    /// 1 KiB blocks (256 pointers per block), one 8191-block group.
    fn setup() -> (Ext2Meta, Ext2Allocator, Vec<u8>) {
        let meta = Ext2Meta::new_custom(8 * 1024 * 1024, None, None, 1024, 8192, 64, 1).unwrap();
        let l = GroupLayout::compute(&meta, 0);
        let mut bb = vec![0u8; 1024];
        for bit in 0..l.overhead() as usize {
            bb.set_bit(bit, true);
        }
        let desc = Ext2GroupDesc::new(
            l.block_bitmap_block,
            l.inode_bitmap_block,
            l.inode_table_block,
            (l.blocks - l.overhead()) as u16,
            54,
            0,
        );
        let alloc = Ext2Allocator::new(vec![desc], vec![bb], vec![vec![0xFFu8; 1024]]);
        let disk = vec![0u8; meta.size_bytes() as usize];
        (meta, alloc, disk)
    }

    #[test]
    fn test_block_path_boundaries() {
        let (meta, _, _) = setup();
        assert_eq!(block_path(&meta, 0), Some((0, [0, 0, 0, 0])));
        assert_eq!(block_path(&meta, 11), Some((0, [11, 0, 0, 0])));
        assert_eq!(block_path(&meta, 12), Some((1, [12, 0, 0, 0])));
        assert_eq!(block_path(&meta, 12 + 255), Some((1, [12, 255, 0, 0])));
        assert_eq!(block_path(&meta, 12 + 256), Some((2, [13, 0, 0, 0])));
        assert_eq!(block_path(&meta, 12 + 256 + 257), Some((2, [13, 1, 1, 0])));
        let tind = 12 + 256 + 256 * 256;
        assert_eq!(block_path(&meta, tind), Some((3, [14, 0, 0, 0])));
        assert_eq!(block_path(&meta, tind + 256 * 256 + 3), Some((3, [14, 1, 0, 3])));
        assert_eq!(block_path(&meta, tind + 256 * 256 * 256), None);
    }

    #[test]
    fn test_map_translate_collect() {
        let (meta, mut alloc, mut disk) = setup();
        let mut io = MemRimIO::new(&mut disk);
        let mut blocks = [0u32; EXT2_N_BLOCKS];
        let free = alloc.free_blocks();

        // 300 data blocks: 12 direct, 256 single, 32 through the double tree
        let added = map_range(&mut io, &meta, &mut alloc, &mut blocks, 0, 300, 0).unwrap();
        // plus one single, one double and one second-level block
        assert_eq!(added, 303);
        assert_eq!(alloc.free_blocks(), free - 303);
        assert_eq!(count_blocks(&mut io, &meta, &blocks).unwrap(), 303);

        let all = collect(&mut io, &meta, &blocks, 300).unwrap();
        assert_eq!(all.len(), 300);
        assert!(all.iter().all(|&b| b != 0));
        for idx in [0u64, 11, 12, 200, 267, 268, 299] {
            assert_eq!(translate(&mut io, &meta, &blocks, idx).unwrap(), all[idx as usize]);
        }
        assert_eq!(translate(&mut io, &meta, &blocks, 300).unwrap(), 0);

        let mut sorted = all.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), 300);
    }

    #[test]
    fn test_holes_collect_as_zero() {
        let (meta, mut alloc, mut disk) = setup();
        let mut io = MemRimIO::new(&mut disk);
        let mut blocks = [0u32; EXT2_N_BLOCKS];
        map_range(&mut io, &meta, &mut alloc, &mut blocks, 2, 3, 0).unwrap();
        map_range(&mut io, &meta, &mut alloc, &mut blocks, 20, 21, 0).unwrap();

        let all = collect(&mut io, &meta, &blocks, 24).unwrap();
        let mapped: Vec<usize> = (0..24).filter(|&i| all[i] != 0).collect();
        assert_eq!(mapped, [2, 20]);
        // Zero pointer stops translation before any indirect read
        assert_eq!(translate(&mut io, &meta, &blocks, 5000).unwrap(), 0);
    }

    #[test]
    fn test_truncate_frees_indirect_blocks() {
        let (meta, mut alloc, mut disk) = setup();
        let mut io = MemRimIO::new(&mut disk);
        let mut blocks = [0u32; EXT2_N_BLOCKS];
        let free = alloc.free_blocks();
        map_range(&mut io, &meta, &mut alloc, &mut blocks, 0, 300, 0).unwrap();

        // Keep 100: the double tree goes, the single stays
        let freed = truncate(&mut io, &meta, &mut alloc, &mut blocks, 100).unwrap();
        assert_eq!(freed, 200 + 2);
        assert_eq!(blocks[EXT2_DIND_BLOCK], 0);
        assert_ne!(blocks[EXT2_IND_BLOCK], 0);
        assert_eq!(translate(&mut io, &meta, &blocks, 100).unwrap(), 0);
        assert_ne!(translate(&mut io, &meta, &blocks, 99).unwrap(), 0);
        assert_eq!(count_blocks(&mut io, &meta, &blocks).unwrap(), 101);

        let freed = truncate(&mut io, &meta, &mut alloc, &mut blocks, 0).unwrap();
        assert_eq!(freed, 101);
        assert_eq!(blocks, [0u32; EXT2_N_BLOCKS]);
        assert_eq!(alloc.free_blocks(), free);
    }

    #[test]
    fn test_out_of_range_pointer_rejected() {
        let (meta, _, mut disk) = setup();
        let mut io = MemRimIO::new(&mut disk);
        let mut blocks = [0u32; EXT2_N_BLOCKS];
        blocks[0] = 999_999;
        assert_eq!(
            collect(&mut io, &meta, &blocks, 1).unwrap_err(),
            FsError::Cursor(FsCursorError::InvalidCluster(999_999))
        );
    }
}
