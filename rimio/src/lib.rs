// SPDX-License-Identifier: MIT
#![cfg_attr(not(feature = "std"), no_std)]

//! Positioned block IO over raw volume images.
//!
//! Every filesystem driver in the workspace talks to its backing image through
//! [`RimIO`]: absolute-offset reads and writes plus an explicit flush. The
//! extension traits add the helpers the drivers share (zero fill, coalesced
//! multi-unit transfers, little-endian primitives and zerocopy structs).

#[cfg(feature = "alloc")]
extern crate alloc;

pub mod errors;
mod macros;

#[cfg(feature = "mem")]
mod mem;

#[cfg(feature = "std")]
mod std;

pub mod prelude {
    pub use super::RimIO;
    pub use super::RimIOExt;
    pub use super::RimIOStructExt;
    pub use super::errors::*;

    #[cfg(feature = "mem")]
    pub use super::mem::MemRimIO;

    #[cfg(feature = "std")]
    pub use super::std::{FileRimIO, StdRimIO};
}

use errors::*;

/// Size of the scratch buffer used by chunked helpers.
/// 4 KiB matches the largest sector size the drivers accept.
pub const BLOCK_BUF_SIZE: usize = 4096;

/// Block IO abstraction.
///
/// Offsets are absolute byte positions inside the image.
pub trait RimIO {
    /// Writes `data` at `offset`.
    fn write_at(&mut self, offset: u64, data: &[u8]) -> RimIOResult;

    /// Fills `buf` from `offset`. Short reads are errors.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> RimIOResult;

    /// Flushes buffered data (may be a no-op).
    fn flush(&mut self) -> RimIOResult;

    /// Addressable size of the image in bytes.
    fn size_bytes(&mut self) -> RimIOResult<u64>;
}

impl<T: RimIO + ?Sized> RimIO for &mut T {
    #[inline]
    fn write_at(&mut self, offset: u64, data: &[u8]) -> RimIOResult {
        (**self).write_at(offset, data)
    }

    #[inline]
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> RimIOResult {
        (**self).read_at(offset, buf)
    }

    #[inline]
    fn flush(&mut self) -> RimIOResult {
        (**self).flush()
    }

    #[inline]
    fn size_bytes(&mut self) -> RimIOResult<u64> {
        (**self).size_bytes()
    }
}

#[cfg(feature = "alloc")]
impl<T: RimIO + ?Sized> RimIO for alloc::boxed::Box<T> {
    #[inline]
    fn write_at(&mut self, offset: u64, data: &[u8]) -> RimIOResult {
        (**self).write_at(offset, data)
    }

    #[inline]
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> RimIOResult {
        (**self).read_at(offset, buf)
    }

    #[inline]
    fn flush(&mut self) -> RimIOResult {
        (**self).flush()
    }

    #[inline]
    fn size_bytes(&mut self) -> RimIOResult<u64> {
        (**self).size_bytes()
    }
}

/// Helpers shared by every backend.
pub trait RimIOExt: RimIO {
    /// Reads `buf.len()` bytes from `offset` in pieces of at most `chunk_size`.
    #[inline]
    fn read_in_chunks(&mut self, offset: u64, buf: &mut [u8], chunk_size: usize) -> RimIOResult {
        if chunk_size == 0 {
            return Err(RimIOError::Invalid("read_in_chunks: zero chunk size"));
        }
        let mut off = offset;
        for piece in buf.chunks_mut(chunk_size) {
            self.read_at(off, piece)?;
            off += piece.len() as u64;
        }
        Ok(())
    }

    /// Writes `buf` at `offset` in pieces of at most `chunk_size`.
    #[inline]
    fn write_in_chunks(&mut self, offset: u64, buf: &[u8], chunk_size: usize) -> RimIOResult {
        if chunk_size == 0 {
            return Err(RimIOError::Invalid("write_in_chunks: zero chunk size"));
        }
        let mut off = offset;
        for piece in buf.chunks(chunk_size) {
            self.write_at(off, piece)?;
            off += piece.len() as u64;
        }
        Ok(())
    }

    /// Reads one `unit_size` unit per offset into `buf`, merging physically
    /// adjacent units into a single transfer.
    ///
    /// # Errors
    /// `RimIOError::Invalid` if `buf.len() != offsets.len() * unit_size`.
    fn read_multi_at(&mut self, offsets: &[u64], unit_size: usize, buf: &mut [u8]) -> RimIOResult {
        if buf.len() != offsets.len() * unit_size {
            return Err(RimIOError::Invalid("read_multi_at: buffer length mismatch"));
        }
        for (first, run) in coalesce(offsets, unit_size) {
            let start = first * unit_size;
            let end = start + run * unit_size;
            self.read_at(offsets[first], &mut buf[start..end])?;
        }
        Ok(())
    }

    /// Write counterpart of [`RimIOExt::read_multi_at`].
    fn write_multi_at(&mut self, offsets: &[u64], unit_size: usize, buf: &[u8]) -> RimIOResult {
        if buf.len() != offsets.len() * unit_size {
            return Err(RimIOError::Invalid("write_multi_at: buffer length mismatch"));
        }
        for (first, run) in coalesce(offsets, unit_size) {
            let start = first * unit_size;
            let end = start + run * unit_size;
            self.write_at(offsets[first], &buf[start..end])?;
        }
        Ok(())
    }

    /// Writes `len` zero bytes at `offset`.
    #[inline]
    fn zero_fill(&mut self, offset: u64, len: usize) -> RimIOResult {
        const ZERO_BUF: [u8; BLOCK_BUF_SIZE] = [0u8; BLOCK_BUF_SIZE];
        let mut remaining = len;
        let mut off = offset;
        while remaining > 0 {
            let chunk = remaining.min(ZERO_BUF.len());
            self.write_at(off, &ZERO_BUF[..chunk])?;
            off += chunk as u64;
            remaining -= chunk;
        }
        Ok(())
    }

    rimio_impl_primitive_rw!(u8, u16, u32, u64);
}

impl<T: RimIO + ?Sized> RimIOExt for T {}

/// Splits `offsets` into runs of physically contiguous units.
/// Yields `(index of first unit, run length)`.
fn coalesce(offsets: &[u64], unit_size: usize) -> impl Iterator<Item = (usize, usize)> + '_ {
    let mut start = 0usize;
    core::iter::from_fn(move || {
        if start >= offsets.len() {
            return None;
        }
        let first = start;
        let mut run = 1;
        while first + run < offsets.len()
            && offsets[first + run] == offsets[first + run - 1] + unit_size as u64
        {
            run += 1;
        }
        start = first + run;
        Some((first, run))
    })
}

/// zerocopy-backed struct access.
pub trait RimIOStructExt: RimIO {
    /// Reads a `T` stored at `offset`.
    fn read_struct<T: zerocopy::FromBytes + zerocopy::KnownLayout + zerocopy::Immutable>(
        &mut self,
        offset: u64,
    ) -> RimIOResult<T> {
        let size = core::mem::size_of::<T>();
        if size > BLOCK_BUF_SIZE {
            return Err(RimIOError::Invalid("read_struct: type too large"));
        }
        let mut buf = [0u8; BLOCK_BUF_SIZE];
        self.read_at(offset, &mut buf[..size])?;
        T::read_from_bytes(&buf[..size]).map_err(|_| RimIOError::Other("read_struct failed"))
    }

    /// Writes `val` at `offset`.
    fn write_struct<T: zerocopy::IntoBytes + zerocopy::Immutable>(
        &mut self,
        offset: u64,
        val: &T,
    ) -> RimIOResult {
        self.write_at(offset, val.as_bytes())
    }
}

impl<T: RimIO + ?Sized> RimIOStructExt for T {}
