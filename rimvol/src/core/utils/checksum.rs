// SPDX-License-Identifier: MIT

//! Rotate-right-then-add checksums.
//!
//! FAT32 long names use the 8-bit variant over the short name, exFAT uses the
//! 16-bit variant for directory entry sets and the 32-bit variant for the boot
//! region and the up-case table.

/// Word type the rolling checksum runs on.
pub trait RollingWord: Copy + Default {
    fn ror1(self) -> Self;
    fn add_byte(self, b: u8) -> Self;
}

macro_rules! rolling_word {
    ($($t:ty),+) => {
        $(
            impl RollingWord for $t {
                #[inline(always)]
                fn ror1(self) -> Self {
                    self.rotate_right(1)
                }
                #[inline(always)]
                fn add_byte(self, b: u8) -> Self {
                    self.wrapping_add(b as $t)
                }
            }
        )+
    };
}

rolling_word!(u8, u16, u32);

/// Accumulates `data` into `sum`, skipping bytes for which `escape(index)` is true.
/// `index` is relative to `data`.
#[inline(always)]
pub fn accumulate_with_escape<T, F>(sum: &mut T, data: &[u8], mut escape: F)
where
    T: RollingWord,
    F: FnMut(usize) -> bool,
{
    for (i, &b) in data.iter().enumerate() {
        if escape(i) {
            continue;
        }
        *sum = sum.ror1().add_byte(b);
    }
}

#[inline(always)]
pub fn accumulate<T: RollingWord>(sum: &mut T, data: &[u8]) {
    accumulate_with_escape(sum, data, |_| false);
}

/// One-shot checksum starting from zero.
#[inline(always)]
pub fn checksum<T: RollingWord>(data: &[u8]) -> T {
    let mut s = T::default();
    accumulate(&mut s, data);
    s
}
