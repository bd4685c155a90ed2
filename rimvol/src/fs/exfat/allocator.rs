// SPDX-License-Identifier: MIT

use alloc::vec::Vec;

pub use crate::core::allocator::*;

use crate::core::cursor::ClusterMeta;
use crate::core::errors::FsCursorResult;
use crate::core::meta::FsMeta;
use crate::core::table::FatTable;
use crate::core::utils::bitmap::BitmapOps;
use crate::fs::exfat::meta::ExFatMeta;

/// Cluster allocator driven by the allocation bitmap.
///
/// Free clusters are found in the bitmap from a next-free hint, wrapping
/// around once. Every claim or release updates the bitmap bit and the FAT
/// entry together.
#[derive(Debug)]
pub struct ExFatAllocator<'a> {
    meta: &'a ExFatMeta,
    table: &'a mut FatTable,
    bitmap: &'a mut [u8],
    hint: &'a mut u32,
}

impl<'a> ExFatAllocator<'a> {
    pub fn new(
        meta: &'a ExFatMeta,
        table: &'a mut FatTable,
        bitmap: &'a mut [u8],
        hint: &'a mut u32,
    ) -> Self {
        Self {
            meta,
            table,
            bitmap,
            hint,
        }
    }

    #[inline]
    fn bit(&self, cluster: u32) -> usize {
        (cluster - ExFatMeta::FIRST_CLUSTER) as usize
    }

    /// Whether the bitmap marks `cluster` as in use.
    pub fn is_allocated(&self, cluster: u32) -> bool {
        self.meta.is_valid_unit(cluster) && self.bitmap.get_bit(self.bit(cluster))
    }

    /// Writes FAT links for a contiguous run so it can be walked as a chain.
    pub fn link_run(&mut self, first: u32, count: usize) {
        for i in 0..count as u32 {
            let next = if i + 1 == count as u32 {
                ExFatMeta::EOC
            } else {
                first + i + 1
            };
            self.table.set(first + i, next);
        }
    }

    /// Releases a contiguous run without walking the FAT.
    pub fn release_run(&mut self, first: u32, count: usize) {
        for c in first..first + count as u32 {
            self.release(c);
        }
        log::debug!("freed contiguous run {first}: {count} units");
    }
}

impl FsAllocator for ExFatAllocator<'_> {
    fn end_marker(&self) -> u32 {
        ExFatMeta::EOC
    }

    fn scan_start(&self) -> u32 {
        (*self.hint).clamp(self.meta.first_data_unit(), self.meta.last_data_unit())
    }

    fn find_free(&self, from: u32) -> Option<u32> {
        let first = self.meta.first_data_unit();
        let count = self.meta.cluster_count as usize;
        let from = (from.max(first) - first) as usize;
        self.bitmap
            .find_first_zero(from, count)
            .or_else(|| self.bitmap.find_first_zero(0, from.min(count)))
            .map(|bit| bit as u32 + first)
    }

    fn claim(&mut self, unit: u32, next: u32) {
        let bit = self.bit(unit);
        self.bitmap.set_bit(bit, true);
        self.table.set(unit, next);
        *self.hint = unit + 1;
    }

    fn link(&mut self, unit: u32, next: u32) {
        self.table.set(unit, next);
    }

    fn release(&mut self, unit: u32) {
        if !self.meta.is_valid_unit(unit) {
            return;
        }
        let bit = self.bit(unit);
        self.bitmap.set_bit(bit, false);
        self.table.set(unit, ExFatMeta::FREE);
        *self.hint = (*self.hint).min(unit);
    }

    fn chain(&self, start: u32) -> FsCursorResult<Vec<u32>> {
        self.table.chain(self.meta, start)
    }

    fn free_units(&self) -> usize {
        let count = self.meta.cluster_count as usize;
        count - self.bitmap.count_ones_in_range(0, count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        meta: ExFatMeta,
        table: FatTable,
        bitmap: Vec<u8>,
        hint: u32,
    }

    impl Fixture {
        fn new() -> Self {
            let meta = ExFatMeta::new_custom(2 * 1024 * 1024, None, 1, 1, 512, 4096).unwrap();
            let table = FatTable::empty::<ExFatMeta>(meta.last_data_unit() as usize + 1);
            let bitmap = vec![0u8; meta.cluster_count.div_ceil(8) as usize];
            Self {
                meta,
                table,
                bitmap,
                hint: 2,
            }
        }

        fn alloc(&mut self) -> ExFatAllocator<'_> {
            ExFatAllocator::new(&self.meta, &mut self.table, &mut self.bitmap, &mut self.hint)
        }
    }

    #[test]
    fn test_allocate_sets_bitmap_and_fat() {
        let mut fx = Fixture::new();
        let total = fx.meta.cluster_count as usize;
        let mut a = fx.alloc();
        let chain = a.allocate(3).unwrap();
        assert_eq!(chain, [2, 3, 4]);
        assert!(chain.iter().all(|&c| a.is_allocated(c)));
        assert_eq!(a.chain(2).unwrap(), chain);
        assert_eq!(a.free_units(), total - 3);
        drop(a);
        assert_eq!(fx.table.get(4), ExFatMeta::EOC);
        assert_eq!(fx.hint, 5);
    }

    #[test]
    fn test_free_clears_bits_and_lowers_hint() {
        let mut fx = Fixture::new();
        let mut a = fx.alloc();
        let x = a.allocate(2).unwrap();
        let y = a.allocate(2).unwrap();
        a.free(x[0]).unwrap();
        assert!(!a.is_allocated(x[0]));
        let z = a.allocate(3).unwrap();
        assert_eq!(z, [2, 3, 6]);
        assert!(z.iter().all(|c| !y.contains(c)));
    }

    #[test]
    fn test_wraps_around_from_hint() {
        let mut fx = Fixture::new();
        fx.hint = fx.meta.last_data_unit();
        let last = fx.meta.last_data_unit();
        let mut a = fx.alloc();
        let chain = a.allocate(2).unwrap();
        assert_eq!(chain, [last, 2]);
    }

    #[test]
    fn test_contiguous_run_helpers() {
        let mut fx = Fixture::new();
        let total = fx.meta.cluster_count as usize;
        let mut a = fx.alloc();
        for c in 10..14 {
            a.claim(c, ExFatMeta::FREE);
        }
        a.link_run(10, 4);
        assert_eq!(a.chain(10).unwrap(), [10, 11, 12, 13]);
        a.release_run(10, 4);
        assert_eq!(a.free_units(), total);
    }
}
