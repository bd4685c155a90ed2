// SPDX-License-Identifier: MIT

use alloc::vec::Vec;

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::core::meta::FsMeta;
use crate::core::utils::checksum::accumulate_with_escape;
use crate::fs::exfat::{constant::*, meta::ExFatMeta};

/// Main boot sector, 512 bytes.
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug)]
#[repr(C, packed)]
pub struct ExFatBootSector {
    pub jump_boot: [u8; 3],
    pub fs_name: [u8; 8],
    pub must_be_zero: [u8; 53],
    pub partition_offset: u64,
    pub volume_length: u64,
    pub fat_offset: u32,
    pub fat_length: u32,
    pub cluster_heap_offset: u32,
    pub cluster_count: u32,
    pub root_dir_cluster: u32,
    pub volume_serial: u32,
    pub fs_revision: u16,
    pub volume_flags: u16,
    pub bytes_per_sector_shift: u8,
    pub sectors_per_cluster_shift: u8,
    pub number_of_fats: u8,
    pub drive_select: u8,
    pub percent_in_use: u8,
    pub reserved: [u8; 7],
    pub boot_code: [u8; EXFAT_BOOT_CODE_SIZE],
    pub signature: [u8; 2],
}

impl ExFatBootSector {
    pub fn from_meta(meta: &ExFatMeta) -> Self {
        let bps = meta.bytes_per_sector as u64;
        Self {
            jump_boot: EXFAT_JUMP_BOOT,
            fs_name: *EXFAT_FS_NAME,
            must_be_zero: [0u8; 53],
            partition_offset: 0,
            volume_length: meta.volume_size_sectors,
            fat_offset: (meta.fat_offset_bytes / bps) as u32,
            fat_length: meta.fat_size_sectors,
            cluster_heap_offset: (meta.cluster_heap_offset / bps) as u32,
            cluster_count: meta.cluster_count,
            root_dir_cluster: meta.root_unit(),
            volume_serial: meta.volume_id,
            fs_revision: EXFAT_FS_REVISION,
            volume_flags: meta.volume_flags,
            bytes_per_sector_shift: meta.bytes_per_sector.trailing_zeros() as u8,
            sectors_per_cluster_shift: meta.sectors_per_cluster.trailing_zeros() as u8,
            number_of_fats: meta.num_fats,
            drive_select: EXFAT_DRIVE_SELECT,
            percent_in_use: 0xFF,
            reserved: [0u8; 7],
            boot_code: [0xF4u8; EXFAT_BOOT_CODE_SIZE],
            signature: EXFAT_SIGNATURE,
        }
    }

    pub fn with_percent_in_use(mut self, percent: u8) -> Self {
        self.percent_in_use = percent;
        self
    }
}

/// Extended boot sector: zeros closed by the boot signature at the end of the
/// sector.
pub fn extended_boot_sector(sector_size: usize) -> Vec<u8> {
    let mut out = vec![0u8; sector_size];
    out[sector_size - 2..].copy_from_slice(&EXFAT_SIGNATURE);
    out
}

/// Boot checksum over the first 11 sectors of `region`.
///
/// The volume flags and percent-in-use bytes of sector 0 are skipped so they
/// can change without rewriting the checksum sector.
pub fn boot_checksum(region: &[u8], sector_size: usize) -> u32 {
    let mut sum = 0u32;
    let len = (EXFAT_CHECKSUM_SECTOR_INDEX as usize * sector_size).min(region.len());
    accumulate_with_escape(&mut sum, &region[..len], |i| {
        i == EXFAT_VOLUME_FLAGS_OFFSET as usize
            || i == EXFAT_VOLUME_FLAGS_OFFSET as usize + 1
            || i == EXFAT_PERCENT_IN_USE_OFFSET as usize
    });
    sum
}

/// Full 12-sector boot region: main sector, 8 extended sectors, OEM and
/// reserved sectors, checksum sector.
pub fn boot_region(boot: &ExFatBootSector, sector_size: usize) -> Vec<u8> {
    let mut buf = Vec::with_capacity(EXFAT_BOOT_REGION_SECTORS as usize * sector_size);
    buf.extend_from_slice(boot.as_bytes());
    buf.resize(sector_size, 0);
    if sector_size > 512 {
        buf[sector_size - 2..].copy_from_slice(&EXFAT_SIGNATURE);
    }
    for _ in 1..=8 {
        buf.extend_from_slice(&extended_boot_sector(sector_size));
    }
    buf.resize(EXFAT_CHECKSUM_SECTOR_INDEX as usize * sector_size, 0);

    let sum = boot_checksum(&buf, sector_size).to_le_bytes();
    for _ in 0..sector_size / 4 {
        buf.extend_from_slice(&sum);
    }
    buf
}
