// SPDX-License-Identifier: MIT

//! Volume identifiers and FAT layout sizing used by the formatters.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::core::utils::time::now_utc;

static COUNTER: AtomicU32 = AtomicU32::new(0);

/// 32-bit volume serial (FAT32 / exFAT) derived from the clock.
pub fn generate_volume_id_32() -> u32 {
    let now = now_utc();
    let seconds = now.unix_timestamp() as u32;
    let millis = now.millisecond() as u32;
    let counter = COUNTER.fetch_add(1, Ordering::Relaxed);

    let id = (seconds & 0xFFFF) | ((millis & 0xFF) << 16) | ((millis >> 8) << 24);
    id ^ (counter.wrapping_mul(0x9E37_79B9))
}

/// 128-bit volume UUID (ext2).
pub fn generate_volume_id_128() -> u128 {
    let now = now_utc();
    let seconds = now.unix_timestamp() as u128;
    let nanos = now.nanosecond() as u128;
    let counter = COUNTER.fetch_add(1, Ordering::Relaxed) as u128;

    let mut id = (seconds << 64) | (nanos << 32) | counter;
    // RFC 4122 version 4 / variant bits
    id = (id & !(0xF << 76)) | (0x4 << 76);
    id = (id & !(0x3 << 62)) | (0x2 << 62);
    id
}

/// Grows the FAT size from its lower estimate until it covers every cluster
/// left in the data area.
///
/// Returns `(fat_size_in_sectors, cluster_count)`.
pub fn converge_fat_layout(
    sector_size: u32,
    total_sectors: u32,
    reserved_sectors: u32,
    entry_size: u32,
    num_fats: u8,
    sectors_per_cluster: u32,
) -> (u32, u32) {
    let avail = total_sectors.saturating_sub(reserved_sectors) as u64;
    let per_cluster = (sectors_per_cluster * sector_size) as u64;
    let estimate = (avail * entry_size as u64)
        .div_ceil(per_cluster + num_fats as u64 * entry_size as u64) as u32;

    let mut fat_size = estimate.max(1);
    loop {
        let data_sectors =
            total_sectors.saturating_sub(reserved_sectors + fat_size * num_fats as u32);
        let cluster_count = data_sectors / sectors_per_cluster;
        let needed = ((cluster_count + 2) * entry_size).div_ceil(sector_size);
        if needed <= fat_size {
            return (fat_size, cluster_count);
        }
        fat_size = needed;
    }
}
