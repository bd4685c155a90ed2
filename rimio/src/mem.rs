// SPDX-License-Identifier: MIT

use crate::{RimIO, RimIOError, RimIOResult};

/// In-memory implementation of `RimIO` over a borrowed byte slice.
///
/// Useful for tests and for volumes built entirely in RAM.
#[derive(Debug)]
pub struct MemRimIO<'a> {
    buffer: &'a mut [u8],
}

impl<'a> MemRimIO<'a> {
    #[inline]
    pub fn new(buffer: &'a mut [u8]) -> Self {
        Self { buffer }
    }

    #[inline]
    fn range(&self, offset: u64, len: usize) -> RimIOResult<core::ops::Range<usize>> {
        let start = usize::try_from(offset).map_err(|_| RimIOError::OutOfBounds)?;
        let end = start.checked_add(len).ok_or(RimIOError::OutOfBounds)?;
        if end > self.buffer.len() {
            return Err(RimIOError::OutOfBounds);
        }
        Ok(start..end)
    }
}

impl<'a> RimIO for MemRimIO<'a> {
    #[inline(always)]
    fn write_at(&mut self, offset: u64, data: &[u8]) -> RimIOResult {
        let range = self.range(offset, data.len())?;
        self.buffer[range].copy_from_slice(data);
        Ok(())
    }

    #[inline(always)]
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> RimIOResult {
        let range = self.range(offset, buf.len())?;
        buf.copy_from_slice(&self.buffer[range]);
        Ok(())
    }

    #[inline]
    fn flush(&mut self) -> RimIOResult {
        Ok(())
    }

    #[inline]
    fn size_bytes(&mut self) -> RimIOResult<u64> {
        Ok(self.buffer.len() as u64)
    }
}

#[cfg(all(test, feature = "std"))]
mod test {
    use super::*;
    use crate::prelude::*;

    #[test]
    fn test_rw() {
        let mut buf = [0u8; 256];
        let mut io = MemRimIO::new(&mut buf);
        io.write_at(10, &[1, 2, 3, 4]).unwrap();

        let mut output = [0u8; 4];
        io.read_at(10, &mut output).unwrap();
        assert_eq!(output, [1, 2, 3, 4]);
    }

    #[test]
    fn test_out_of_bounds() {
        let mut buf = [0u8; 16];
        let mut io = MemRimIO::new(&mut buf);
        assert_eq!(io.write_at(12, &[0; 8]), Err(RimIOError::OutOfBounds));
        let mut out = [0u8; 4];
        assert_eq!(io.read_at(u64::MAX, &mut out), Err(RimIOError::OutOfBounds));
    }

    #[test]
    fn test_multi_rw_with_gaps() {
        let mut buf = [0u8; 64];
        let mut io = MemRimIO::new(&mut buf);

        let offsets = [0u64, 8, 32, 40];
        let input: Vec<u8> = (0..32).collect();
        io.write_multi_at(&offsets, 8, &input).unwrap();

        let mut output = [0u8; 32];
        io.read_multi_at(&offsets, 8, &mut output).unwrap();
        assert_eq!(&input[..], &output[..]);

        let mut gap = [0xAAu8; 8];
        io.read_at(16, &mut gap).unwrap();
        assert_eq!(gap, [0u8; 8]);
    }

    #[test]
    fn test_multi_rw_length_mismatch() {
        let mut buf = [0u8; 64];
        let mut io = MemRimIO::new(&mut buf);
        let mut out = [0u8; 10];
        assert!(io.read_multi_at(&[0, 8], 8, &mut out).is_err());
    }

    #[test]
    fn test_primitives() {
        let mut buf = [0u8; 32];
        let mut io = MemRimIO::new(&mut buf);
        io.write_u32_at(4, 0xDEADBEEF).unwrap();
        io.write_u16_at(8, 0xEF53).unwrap();
        assert_eq!(io.read_u32_at(4).unwrap(), 0xDEADBEEF);
        assert_eq!(io.read_u16_at(8).unwrap(), 0xEF53);
        assert_eq!(io.read_u8_at(8).unwrap(), 0x53);
    }

    #[test]
    fn test_zero_fill() {
        let mut buf = [0xFF; 64];
        let mut io = MemRimIO::new(&mut buf);

        io.zero_fill(10, 8).unwrap();

        let mut output = [0xAA; 8];
        io.read_at(10, &mut output).unwrap();
        assert_eq!(output, [0u8; 8]);
        assert_eq!(io.read_u8_at(18).unwrap(), 0xFF);
    }
}
