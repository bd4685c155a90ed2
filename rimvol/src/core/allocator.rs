// SPDX-License-Identifier: MIT

use alloc::vec::Vec;

use crate::core::errors::{FsAllocatorError, FsCursorResult, FsResult};

/// Chain allocator for the cluster formats.
///
/// Implementors provide the per-unit primitives over their allocation state
/// (table only for FAT32, table plus bitmap for exFAT). The chain-level
/// operations are shared.
pub trait FsAllocator {
    /// Value that terminates a chain.
    fn end_marker(&self) -> u32;

    /// Where a fresh allocation starts scanning.
    fn scan_start(&self) -> u32;

    /// First free unit at or after `from`; implementations may wrap around.
    fn find_free(&self, from: u32) -> Option<u32>;

    /// Marks a free unit as used and points it to `next`.
    fn claim(&mut self, unit: u32, next: u32);

    /// Rewrites the link of an already used unit.
    fn link(&mut self, unit: u32, next: u32);

    /// Returns a unit to the free pool.
    fn release(&mut self, unit: u32);

    /// Full chain starting at `start` (empty for `0`).
    fn chain(&self, start: u32) -> FsCursorResult<Vec<u32>>;

    fn free_units(&self) -> usize;

    /// Allocates `count` units linked in discovery order.
    ///
    /// Either all `count` units are claimed or none is: on shortage the units
    /// claimed so far are released and `OutOfSpace` is returned.
    fn allocate(&mut self, count: usize) -> FsResult<Vec<u32>> {
        let end = self.end_marker();
        let mut out: Vec<u32> = Vec::with_capacity(count);
        let mut from = self.scan_start();

        while out.len() < count {
            let Some(unit) = self.find_free(from) else {
                for &u in &out {
                    self.release(u);
                }
                log::debug!("allocation of {count} units failed after {}", out.len());
                return Err(FsAllocatorError::OutOfSpace.into());
            };
            self.claim(unit, end);
            if let Some(&prev) = out.last() {
                self.link(prev, unit);
            }
            out.push(unit);
            from = unit + 1;
        }

        log::debug!("allocated {count} units starting at {:?}", out.first());
        Ok(out)
    }

    /// Appends `count` fresh units after `last` (tail of a chain).
    fn extend(&mut self, last: u32, count: usize) -> FsResult<Vec<u32>> {
        let added = self.allocate(count)?;
        if let Some(&first) = added.first() {
            self.link(last, first);
        }
        Ok(added)
    }

    /// Resizes the chain at `start` to `new_len` units and returns its
    /// (possibly new) first unit, `0` once empty.
    ///
    /// Unchanged length is a no-op.
    fn resize(&mut self, start: u32, new_len: usize) -> FsResult<u32> {
        if new_len == 0 {
            if start != 0 {
                self.free(start)?;
            }
            return Ok(0);
        }
        if start == 0 {
            let chain = self.allocate(new_len)?;
            return Ok(chain[0]);
        }

        let chain = self.chain(start)?;
        let old_len = chain.len();
        if new_len < old_len {
            self.link(chain[new_len - 1], self.end_marker());
            for &u in &chain[new_len..] {
                self.release(u);
            }
            log::debug!("chain {start}: shrunk {old_len} -> {new_len} units");
        } else if new_len > old_len {
            self.extend(chain[old_len - 1], new_len - old_len)?;
            log::debug!("chain {start}: grown {old_len} -> {new_len} units");
        }
        Ok(start)
    }

    /// Frees the chain at `start`. Returns the number of released units.
    fn free(&mut self, start: u32) -> FsResult<usize> {
        let chain = self.chain(start)?;
        for &u in &chain {
            self.release(u);
        }
        log::debug!("freed chain {start}: {} units", chain.len());
        Ok(chain.len())
    }
}
