// SPDX-License-Identifier: MIT

//! Bit manipulation over byte slices used as allocation bitmaps.
//!
//! Little-endian bit ordering: bit 0 is the LSB of byte 0, bit 8 the LSB of
//! byte 1. Both the exFAT allocation bitmap and the ext2 block / inode
//! bitmaps use this layout.

/// Extension trait for bitmap operations on byte slices.
pub trait BitmapOps {
    /// Sets or clears a bit. Out-of-range bits are ignored.
    fn set_bit(&mut self, bit: usize, value: bool);

    /// Returns `false` for out-of-range bits.
    fn get_bit(&self, bit: usize) -> bool;

    /// Counts set bits in `[start, end)`.
    fn count_ones_in_range(&self, start: usize, end: usize) -> usize;

    /// First zero bit in `[start, limit)`.
    fn find_first_zero(&self, start: usize, limit: usize) -> Option<usize>;

    /// Counts set bits in the whole slice.
    fn count_ones(&self) -> usize;
}

impl BitmapOps for [u8] {
    #[inline]
    fn set_bit(&mut self, bit: usize, value: bool) {
        if let Some(byte) = self.get_mut(bit / 8) {
            let mask = 1u8 << (bit % 8);
            if value {
                *byte |= mask;
            } else {
                *byte &= !mask;
            }
        }
    }

    #[inline]
    fn get_bit(&self, bit: usize) -> bool {
        self.get(bit / 8)
            .is_some_and(|b| (b & (1 << (bit % 8))) != 0)
    }

    fn count_ones_in_range(&self, start: usize, end: usize) -> usize {
        (start..end).filter(|&i| self.get_bit(i)).count()
    }

    fn find_first_zero(&self, start: usize, limit: usize) -> Option<usize> {
        let limit = limit.min(self.len() * 8);
        let mut bit = start;
        while bit < limit {
            let byte = self[bit / 8];
            // Skip full bytes when aligned
            if bit % 8 == 0 && byte == 0xFF {
                bit += 8;
                continue;
            }
            if byte & (1 << (bit % 8)) == 0 {
                return Some(bit);
            }
            bit += 1;
        }
        None
    }

    fn count_ones(&self) -> usize {
        self.iter().map(|b| b.count_ones() as usize).sum()
    }
}
