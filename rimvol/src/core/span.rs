// SPDX-License-Identifier: MIT

//! Byte-range transfers over a list of physical units.
//!
//! `units[i]` is the physical unit holding logical unit `i` of a file; `0`
//! marks a hole (ext2 sparse block) that reads as zeros. Physically adjacent
//! units are merged into a single transfer.

use rimio::prelude::*;

use crate::core::meta::FsMeta;

/// Splits `[offset, offset + len)` into `(unit index, offset in unit, run units, bytes)`
/// pieces, one per physically contiguous run.
fn for_each_piece<F>(
    units: &[u32],
    unit_size: usize,
    offset: u64,
    len: usize,
    mut f: F,
) -> RimIOResult
where
    F: FnMut(usize, usize, usize, usize) -> RimIOResult,
{
    let us = unit_size as u64;
    let mut done = 0usize;
    while done < len {
        let pos = offset + done as u64;
        let idx = (pos / us) as usize;
        let within = (pos % us) as usize;
        let first = *units.get(idx).ok_or(RimIOError::OutOfBounds)?;

        let mut run = 1usize;
        let mut avail = unit_size - within;
        while avail < len - done
            && first != 0
            && units.get(idx + run) == Some(&(first + run as u32))
        {
            run += 1;
            avail += unit_size;
        }

        let n = avail.min(len - done);
        f(idx, within, run, n)?;
        done += n;
    }
    Ok(())
}

/// Reads `buf.len()` bytes at logical `offset`.
pub fn read_span<IO, M>(
    io: &mut IO,
    meta: &M,
    units: &[u32],
    offset: u64,
    buf: &mut [u8],
) -> RimIOResult
where
    IO: RimIO + ?Sized,
    M: FsMeta<u32>,
{
    let mut done = 0usize;
    for_each_piece(units, meta.unit_size(), offset, buf.len(), |idx, within, _, n| {
        let dst = &mut buf[done..done + n];
        match units[idx] {
            0 => dst.fill(0),
            unit => io.read_at(meta.unit_offset(unit) + within as u64, dst)?,
        }
        done += n;
        Ok(())
    })
}

/// Writes `data` at logical `offset`. Every touched unit must be allocated.
pub fn write_span<IO, M>(
    io: &mut IO,
    meta: &M,
    units: &[u32],
    offset: u64,
    data: &[u8],
) -> RimIOResult
where
    IO: RimIO + ?Sized,
    M: FsMeta<u32>,
{
    let mut done = 0usize;
    for_each_piece(units, meta.unit_size(), offset, data.len(), |idx, within, _, n| {
        let unit = units[idx];
        if unit == 0 {
            return Err(RimIOError::Invalid("write_span: unallocated unit"));
        }
        io.write_at(meta.unit_offset(unit) + within as u64, &data[done..done + n])?;
        done += n;
        Ok(())
    })
}

/// Zero-fills `len` bytes at logical `offset`; holes are skipped.
pub fn zero_span<IO, M>(io: &mut IO, meta: &M, units: &[u32], offset: u64, len: usize) -> RimIOResult
where
    IO: RimIO + ?Sized,
    M: FsMeta<u32>,
{
    for_each_piece(units, meta.unit_size(), offset, len, |idx, within, _, n| {
        match units[idx] {
            0 => Ok(()),
            unit => io.zero_fill(meta.unit_offset(unit) + within as u64, n),
        }
    })
}

/// Zero-fills whole units.
pub fn zero_units<IO, M>(io: &mut IO, meta: &M, units: &[u32]) -> RimIOResult
where
    IO: RimIO + ?Sized,
    M: FsMeta<u32>,
{
    let len = units.len() * meta.unit_size();
    zero_span(io, meta, units, 0, len)
}
