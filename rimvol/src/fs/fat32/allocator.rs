// SPDX-License-Identifier: MIT

use alloc::vec::Vec;

pub use crate::core::allocator::*;

use crate::core::cursor::ClusterMeta;
use crate::core::errors::FsCursorResult;
use crate::core::meta::FsMeta;
use crate::core::table::FatTable;
use crate::fs::fat32::meta::Fat32Meta;

/// Cluster allocator over the cached FAT.
///
/// Scans linearly from the first data cluster on every allocation; there is
/// no persisted next-free cursor.
#[derive(Debug)]
pub struct Fat32Allocator<'a> {
    meta: &'a Fat32Meta,
    table: &'a mut FatTable,
}

impl<'a> Fat32Allocator<'a> {
    pub fn new(meta: &'a Fat32Meta, table: &'a mut FatTable) -> Self {
        Self { meta, table }
    }
}

impl FsAllocator for Fat32Allocator<'_> {
    fn end_marker(&self) -> u32 {
        Fat32Meta::EOC
    }

    fn scan_start(&self) -> u32 {
        self.meta.first_data_unit()
    }

    fn find_free(&self, from: u32) -> Option<u32> {
        self.table.find_free(self.meta, from)
    }

    fn claim(&mut self, unit: u32, next: u32) {
        self.table.set(unit, next);
    }

    fn link(&mut self, unit: u32, next: u32) {
        self.table.set(unit, next);
    }

    fn release(&mut self, unit: u32) {
        self.table.set(unit, Fat32Meta::FREE);
    }

    fn chain(&self, start: u32) -> FsCursorResult<Vec<u32>> {
        self.table.chain(self.meta, start)
    }

    fn free_units(&self) -> usize {
        self.table.free_count(self.meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Fat32Meta, FatTable) {
        let meta = Fat32Meta::new_custom(4 * 1024 * 1024, None, 1, 2, 512, 4096, 32).unwrap();
        let mut table = FatTable::empty::<Fat32Meta>(meta.last_data_unit() as usize + 1);
        table.set(0, 0x0FFF_FFF8);
        table.set(1, Fat32Meta::EOC);
        table.set(2, Fat32Meta::EOC);
        (meta, table)
    }

    #[test]
    fn test_allocate_skips_used_and_links_ascending() {
        let (meta, mut table) = setup();
        let mut alloc = Fat32Allocator::new(&meta, &mut table);
        let before = alloc.free_units();

        let chain = alloc.allocate(3).unwrap();
        assert_eq!(chain, [3, 4, 5]);
        assert_eq!(alloc.chain(3).unwrap(), chain);
        assert_eq!(alloc.free_units(), before - 3);
    }

    #[test]
    fn test_disjoint_after_free() {
        let (meta, mut table) = setup();
        let mut alloc = Fat32Allocator::new(&meta, &mut table);

        let a = alloc.allocate(2).unwrap();
        let b = alloc.allocate(2).unwrap();
        alloc.free(a[0]).unwrap();
        let c = alloc.allocate(3).unwrap();

        assert_eq!(c, [3, 4, 7]);
        assert!(c.iter().all(|u| !b.contains(u)));
    }

    #[test]
    fn test_resize_same_length_is_noop() {
        let (meta, mut table) = setup();
        let start = {
            let mut alloc = Fat32Allocator::new(&meta, &mut table);
            alloc.allocate(4).unwrap()[0]
        };
        let snapshot = table.clone();
        let mut alloc = Fat32Allocator::new(&meta, &mut table);
        assert_eq!(alloc.resize(start, 4).unwrap(), start);
        drop(alloc);
        for c in 0..16 {
            assert_eq!(table.get(c), snapshot.get(c));
        }
    }
}
