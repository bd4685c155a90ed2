// SPDX-License-Identifier: MIT

/// Generates little-endian `read_<ty>_at` / `write_<ty>_at` helpers on `RimIOExt`.
#[macro_export]
macro_rules! rimio_impl_primitive_rw {
    ($($ty:ty),+ $(,)?) => {
        $(
            paste::paste! {
                #[inline(always)]
                fn [<write_ $ty _at>](&mut self, offset: u64, value: $ty) -> RimIOResult {
                    self.write_at(offset, &value.to_le_bytes())
                }

                #[inline(always)]
                fn [<read_ $ty _at>](&mut self, offset: u64) -> RimIOResult<$ty> {
                    let mut buf = [0u8; core::mem::size_of::<$ty>()];
                    self.read_at(offset, &mut buf)?;
                    Ok(<$ty>::from_le_bytes(buf))
                }
            }
        )+
    };
}
