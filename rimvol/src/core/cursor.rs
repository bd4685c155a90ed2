// SPDX-License-Identifier: MIT

use alloc::vec::Vec;

use crate::core::errors::{FsCursorError, FsCursorResult};
use crate::core::meta::FsMeta;
use crate::core::table::FatTable;

/// Geometry and sentinels of a cluster-chained format (FAT32, exFAT).
pub trait ClusterMeta: FsMeta<u32> {
    /// Value written to terminate a chain.
    const EOC: u32;
    /// Smallest value read back as end-of-chain.
    const EOC_MIN: u32;
    /// Bad-cluster sentinel.
    const BAD: u32;
    const FREE: u32 = 0;
    const FIRST_CLUSTER: u32 = 2;
    const ENTRY_SIZE: usize = 4;
    /// Mask isolating the meaningful bits of an entry.
    const ENTRY_MASK: u32;

    /// Byte offset of the FAT entry for `cluster` in FAT copy `fat_index`.
    fn fat_entry_offset(&self, cluster: u32, fat_index: u8) -> u64;

    fn num_fats(&self) -> u8;

    #[inline]
    fn is_eoc(&self, value: u32) -> bool {
        value >= Self::EOC_MIN
    }
}

/// Walks a cluster chain through the cached allocation table.
///
/// Finite by construction: the walk fails with `LoopDetected` once it has
/// yielded more clusters than the volume holds.
#[derive(Debug)]
pub struct ClusterCursor<'a, M: ClusterMeta> {
    meta: &'a M,
    table: &'a FatTable,
    start: u32,
    current: Option<u32>,
    seen: usize,
}

impl<'a, M: ClusterMeta> ClusterCursor<'a, M> {
    /// Cursor over the chain starting at `start`. A zero start yields nothing.
    pub fn new(meta: &'a M, table: &'a FatTable, start: u32) -> Self {
        Self {
            meta,
            table,
            start,
            current: (start != M::FREE).then_some(start),
            seen: 0,
        }
    }

    fn step(&mut self, c: u32) -> FsCursorResult<u32> {
        self.seen += 1;
        if self.seen > self.meta.total_units() {
            return Err(FsCursorError::LoopDetected);
        }
        if !self.meta.is_valid_unit(c) {
            return Err(FsCursorError::InvalidCluster(c));
        }

        let next = self.table.get(c);
        if next == M::BAD {
            return Err(FsCursorError::BadCluster(c));
        }
        if self.meta.is_eoc(next) {
            self.current = None;
        } else if next == M::FREE {
            log::warn!(
                "chain starting at {} ends on free cluster {c}; treating as end of chain",
                self.start
            );
            self.current = None;
        } else {
            self.current = Some(next);
        }
        Ok(c)
    }

    /// Collects the whole chain.
    pub fn collect_chain(self) -> FsCursorResult<Vec<u32>> {
        self.collect()
    }
}

impl<M: ClusterMeta> Iterator for ClusterCursor<'_, M> {
    type Item = FsCursorResult<u32>;

    fn next(&mut self) -> Option<Self::Item> {
        let c = self.current.take()?;
        let res = self.step(c);
        if res.is_err() {
            self.current = None;
        }
        Some(res)
    }
}

/// Cursor over a contiguous run `[start, start + clusters)`.
/// Does not consult the allocation table (exFAT NoFatChain streams).
#[derive(Clone, Copy, Debug)]
pub struct LinearCursor<'a, M: ClusterMeta> {
    meta: &'a M,
    next: u32,
    end_excl: u32,
}

impl<'a, M: ClusterMeta> LinearCursor<'a, M> {
    #[inline]
    pub fn from_clusters(meta: &'a M, start: u32, clusters: u32) -> Self {
        Self {
            meta,
            next: start,
            end_excl: start.saturating_add(clusters),
        }
    }

    /// Cursor covering `len_bytes` of data.
    #[inline]
    pub fn from_len_bytes(meta: &'a M, start: u32, len_bytes: u64) -> Self {
        let clusters = meta.units_for(len_bytes) as u32;
        Self::from_clusters(meta, start, clusters)
    }
}

impl<M: ClusterMeta> Iterator for LinearCursor<'_, M> {
    type Item = FsCursorResult<u32>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.end_excl {
            return None;
        }
        let c = self.next;
        self.next += 1;
        if !self.meta.is_valid_unit(c) {
            self.next = self.end_excl;
            return Some(Err(FsCursorError::InvalidCluster(c)));
        }
        Some(Ok(c))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Minimal geometry: clusters 2..=last, 512-byte units.
    #[derive(Debug)]
    pub(crate) struct TestMeta {
        pub last: u32,
    }

    impl FsMeta<u32> for TestMeta {
        fn unit_size(&self) -> usize {
            512
        }
        fn unit_offset(&self, unit: u32) -> u64 {
            (unit as u64) * 512
        }
        fn root_unit(&self) -> u32 {
            2
        }
        fn first_data_unit(&self) -> u32 {
            2
        }
        fn last_data_unit(&self) -> u32 {
            self.last
        }
        fn total_units(&self) -> usize {
            (self.last - 1) as usize
        }
        fn size_bytes(&self) -> u64 {
            (self.last as u64 + 1) * 512
        }
    }

    impl ClusterMeta for TestMeta {
        const EOC: u32 = 0x0FFF_FFFF;
        const EOC_MIN: u32 = 0x0FFF_FFF8;
        const BAD: u32 = 0x0FFF_FFF7;
        const ENTRY_MASK: u32 = 0x0FFF_FFFF;

        fn fat_entry_offset(&self, cluster: u32, _fat_index: u8) -> u64 {
            cluster as u64 * 4
        }
        fn num_fats(&self) -> u8 {
            1
        }
    }

    pub(crate) fn table(meta: &TestMeta) -> FatTable {
        FatTable::empty::<TestMeta>(meta.last as usize + 1)
    }

    #[test]
    fn test_walks_chain() {
        let meta = TestMeta { last: 20 };
        let mut t = table(&meta);
        t.set(3, 7);
        t.set(7, 4);
        t.set(4, TestMeta::EOC);

        let chain = ClusterCursor::new(&meta, &t, 3).collect_chain().unwrap();
        assert_eq!(chain, [3, 7, 4]);
    }

    #[test]
    fn test_zero_start_is_empty() {
        let meta = TestMeta { last: 20 };
        let t = table(&meta);
        assert!(ClusterCursor::new(&meta, &t, 0).collect_chain().unwrap().is_empty());
    }

    #[test]
    fn test_loop_detected() {
        let meta = TestMeta { last: 10 };
        let mut t = table(&meta);
        t.set(3, 4);
        t.set(4, 3);
        let err = ClusterCursor::new(&meta, &t, 3).collect_chain().unwrap_err();
        assert_eq!(err, FsCursorError::LoopDetected);
    }

    #[test]
    fn test_bad_and_invalid_clusters() {
        let meta = TestMeta { last: 10 };
        let mut t = table(&meta);
        t.set(3, 5);
        t.set(5, TestMeta::BAD);
        assert_eq!(
            ClusterCursor::new(&meta, &t, 3).collect_chain().unwrap_err(),
            FsCursorError::BadCluster(5)
        );

        t.set(5, 99);
        assert_eq!(
            ClusterCursor::new(&meta, &t, 3).collect_chain().unwrap_err(),
            FsCursorError::InvalidCluster(99)
        );
    }

    #[test]
    fn test_free_link_ends_chain() {
        let meta = TestMeta { last: 10 };
        let mut t = table(&meta);
        t.set(3, 4);
        let chain = ClusterCursor::new(&meta, &t, 3).collect_chain().unwrap();
        assert_eq!(chain, [3, 4]);
    }

    #[test]
    fn test_linear_cursor() {
        let meta = TestMeta { last: 10 };
        let run: Vec<u32> = LinearCursor::from_len_bytes(&meta, 4, 1025)
            .collect::<FsCursorResult<_>>()
            .unwrap();
        assert_eq!(run, [4, 5, 6]);

        let mut past_end = LinearCursor::from_clusters(&meta, 9, 3);
        assert_eq!(past_end.next(), Some(Ok(9)));
        assert_eq!(past_end.next(), Some(Ok(10)));
        assert_eq!(past_end.next(), Some(Err(FsCursorError::InvalidCluster(11))));
        assert_eq!(past_end.next(), None);
    }
}
