// SPDX-License-Identifier: MIT

//! Timestamp encodings.
//!
//! - FAT32: packed date / time words with 2-second resolution plus a
//!   10 ms fine field.
//! - exFAT: the same date / time packed into one `u32`, a 10 ms increment and
//!   a UTC offset byte.
//! - ext2: seconds since the Unix epoch in a `u32`.
//!
//! In `no_std` builds `now_utc()` returns the Unix epoch.

use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time};

/// Returns the current UTC time (`UNIX_EPOCH` without `std`).
pub fn now_utc() -> OffsetDateTime {
    #[cfg(feature = "std")]
    {
        OffsetDateTime::now_utc()
    }

    #[cfg(not(feature = "std"))]
    {
        OffsetDateTime::UNIX_EPOCH
    }
}

/// Encodes `ts` as FAT `(date, time, tenths)`. Years clamp to 1980..=2107.
pub fn to_fat(ts: OffsetDateTime) -> (u16, u16, u8) {
    let ts = ts.to_offset(time::UtcOffset::UTC);
    let year = ts.year().clamp(1980, 2107);
    let date = (((year - 1980) as u16) << 9) | ((ts.month() as u16) << 5) | ts.day() as u16;
    let time =
        ((ts.hour() as u16) << 11) | ((ts.minute() as u16) << 5) | (ts.second() as u16 / 2);
    // Fine field counts 10 ms units inside the 2 s window.
    let fine = ((ts.second() % 2) as u16 * 100 + ts.millisecond() / 10) as u8;
    (date, time, fine)
}

/// Decodes a FAT `(date, time, tenths)` triple. `None` for a zero or invalid date.
pub fn from_fat(date: u16, time: u16, fine: u8) -> Option<OffsetDateTime> {
    if date == 0 {
        return None;
    }
    let year = 1980 + (date >> 9) as i32;
    let month = Month::try_from(((date >> 5) & 0x0F) as u8).ok()?;
    let day = (date & 0x1F) as u8;
    let d = Date::from_calendar_date(year, month, day).ok()?;

    let fine = fine.min(199);
    let second = ((time & 0x1F) * 2) as u8 + fine / 100;
    let t = Time::from_hms_milli(
        (time >> 11) as u8,
        ((time >> 5) & 0x3F) as u8,
        second.min(59),
        (fine % 100) as u16 * 10,
    )
    .ok()?;
    Some(PrimitiveDateTime::new(d, t).assume_utc())
}

/// UTC offset byte marking "offset valid, +00:00".
pub const EXFAT_UTC_OFFSET: u8 = 0x80;

/// Encodes `ts` as exFAT `(timestamp, 10ms increment, utc offset)`.
pub fn to_exfat(ts: OffsetDateTime) -> (u32, u8, u8) {
    let (date, time, fine) = to_fat(ts);
    (((date as u32) << 16) | time as u32, fine, EXFAT_UTC_OFFSET)
}

/// Decodes an exFAT timestamp triple, applying the offset when it is valid.
pub fn from_exfat(stamp: u32, fine: u8, utc_offset: u8) -> Option<OffsetDateTime> {
    let local = from_fat((stamp >> 16) as u16, stamp as u16, fine)?;
    if utc_offset & 0x80 == 0 {
        return Some(local);
    }
    // 7-bit two's complement count of 15 minute steps
    let steps = ((utc_offset << 1) as i8 >> 1) as i64;
    Some(local - time::Duration::minutes(steps * 15))
}

/// Seconds since the epoch, clamped to the `u32` range ext2 stores.
pub fn to_unix(ts: OffsetDateTime) -> u32 {
    ts.unix_timestamp().clamp(0, u32::MAX as i64) as u32
}

pub fn from_unix(secs: u32) -> Option<OffsetDateTime> {
    if secs == 0 {
        return None;
    }
    OffsetDateTime::from_unix_timestamp(secs as i64).ok()
}
