// SPDX-License-Identifier: MIT

use alloc::vec::Vec;

use rimio::prelude::*;

use crate::core::cursor::{ClusterCursor, ClusterMeta};
use crate::core::errors::FsCursorResult;

/// In-memory copy of one allocation table.
///
/// Loaded once at mount from the active FAT, written back to every FAT copy
/// on [`FatTable::store`]. Only the entries in the dirty range are rewritten.
#[derive(Debug, Clone)]
pub struct FatTable {
    raw: Vec<u8>,
    mask: u32,
    dirty: Option<(usize, usize)>,
}

impl FatTable {
    /// Zeroed table of `entries` entries (formatter and tests).
    pub fn empty<M: ClusterMeta>(entries: usize) -> Self {
        Self {
            raw: vec![0u8; entries * M::ENTRY_SIZE],
            mask: M::ENTRY_MASK,
            dirty: None,
        }
    }

    /// Loads entries `0..=last_data_unit` of FAT copy `fat_index`.
    pub fn load<M, IO>(io: &mut IO, meta: &M, fat_index: u8) -> RimIOResult<Self>
    where
        M: ClusterMeta,
        IO: RimIO + ?Sized,
    {
        let entries = meta.last_data_unit() as usize + 1;
        let mut raw = vec![0u8; entries * M::ENTRY_SIZE];
        io.read_at(meta.fat_entry_offset(0, fat_index), &mut raw)?;
        log::trace!("loaded FAT #{fat_index}: {entries} entries");
        Ok(Self {
            raw,
            mask: M::ENTRY_MASK,
            dirty: None,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.raw.len() / 4
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    #[inline]
    fn raw_at(&self, cluster: u32) -> Option<u32> {
        let i = cluster as usize * 4;
        let bytes = self.raw.get(i..i + 4)?;
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Masked entry value. Out-of-range clusters read as end-of-chain.
    #[inline]
    pub fn get(&self, cluster: u32) -> u32 {
        self.raw_at(cluster).map_or(self.mask, |v| v & self.mask)
    }

    /// Sets an entry, preserving the bits outside the mask (FAT32 top nibble).
    pub fn set(&mut self, cluster: u32, value: u32) {
        let Some(old) = self.raw_at(cluster) else {
            return;
        };
        let new = (old & !self.mask) | (value & self.mask);
        let i = cluster as usize;
        self.raw[i * 4..i * 4 + 4].copy_from_slice(&new.to_le_bytes());
        self.dirty = Some(match self.dirty {
            Some((lo, hi)) => (lo.min(i), hi.max(i)),
            None => (i, i),
        });
    }

    /// Number of free entries in the data range.
    pub fn free_count<M: ClusterMeta>(&self, meta: &M) -> usize {
        (meta.first_data_unit()..=meta.last_data_unit())
            .filter(|&c| self.get(c) == M::FREE)
            .count()
    }

    /// First free cluster in `[from, last_data_unit]`.
    pub fn find_free<M: ClusterMeta>(&self, meta: &M, from: u32) -> Option<u32> {
        let from = from.max(meta.first_data_unit());
        (from..=meta.last_data_unit()).find(|&c| self.get(c) == M::FREE)
    }

    /// Chain starting at `start`, fully collected.
    pub fn chain<M: ClusterMeta>(&self, meta: &M, start: u32) -> FsCursorResult<Vec<u32>> {
        ClusterCursor::new(meta, self, start).collect_chain()
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty.is_some()
    }

    /// Writes the modified range to every FAT copy.
    pub fn store<M, IO>(&mut self, io: &mut IO, meta: &M) -> RimIOResult
    where
        M: ClusterMeta,
        IO: RimIO + ?Sized,
    {
        let Some((lo, hi)) = self.dirty else {
            return Ok(());
        };
        let bytes = &self.raw[lo * 4..(hi + 1) * 4];
        for fat in 0..meta.num_fats() {
            io.write_at(meta.fat_entry_offset(lo as u32, fat), bytes)?;
        }
        log::debug!(
            "stored FAT entries {lo}..={hi} to {} cop{}",
            meta.num_fats(),
            if meta.num_fats() == 1 { "y" } else { "ies" }
        );
        self.dirty = None;
        Ok(())
    }

    /// Writes the whole table to every FAT copy.
    pub fn store_all<M, IO>(&mut self, io: &mut IO, meta: &M) -> RimIOResult
    where
        M: ClusterMeta,
        IO: RimIO + ?Sized,
    {
        for fat in 0..meta.num_fats() {
            io.write_at(meta.fat_entry_offset(0, fat), &self.raw)?;
        }
        self.dirty = None;
        Ok(())
    }
}
