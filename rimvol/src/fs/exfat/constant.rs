// SPDX-License-Identifier: MIT

// === Disk Layout Parameters ===

pub const EXFAT_SECTOR_SIZE: u16 = 512;
pub const EXFAT_CLUSTER_SIZE: u32 = 4096;
/// First sector of the FAT; sectors 0..24 hold the boot region and its backup.
pub const EXFAT_FAT_OFFSET_SECTORS: u32 = 24;
pub const EXFAT_NUM_FATS: u8 = 1;
pub const EXFAT_BOOT_REGION_SECTORS: u64 = 12;
/// Largest cluster the format allows (32 MiB).
pub const EXFAT_MAX_CLUSTER_SHIFT: u8 = 25;

// === FAT Parameters ===

pub const EXFAT_ENTRY_SIZE: usize = 4;
pub const EXFAT_ENTRY_MASK: u32 = 0xFFFF_FFFF;
pub const EXFAT_MEDIA_DESCRIPTOR: u8 = 0xF8;
pub const EXFAT_EOC: u32 = 0xFFFF_FFFF;
pub const EXFAT_EOC_MIN: u32 = 0xFFFF_FFF8;
pub const EXFAT_BAD: u32 = 0xFFFF_FFF7;
pub const EXFAT_FIRST_CLUSTER: u32 = 2;

// === Boot Sector ===

pub const EXFAT_VBR_SECTOR: u64 = 0;
pub const EXFAT_VBR_BACKUP_SECTOR: u64 = 12;
pub const EXFAT_CHECKSUM_SECTOR_INDEX: u64 = 11;
pub const EXFAT_JUMP_BOOT: [u8; 3] = [0xEB, 0x76, 0x90];
pub const EXFAT_FS_NAME: &[u8; 8] = b"EXFAT   ";
pub const EXFAT_SIGNATURE: [u8; 2] = [0x55, 0xAA];
pub const EXFAT_BOOT_CODE_SIZE: usize = 390;
pub const EXFAT_FS_REVISION: u16 = 0x0100;
pub const EXFAT_DRIVE_SELECT: u8 = 0x80;

/// Byte offsets inside sector 0 left out of the boot checksum.
pub const EXFAT_VOLUME_FLAGS_OFFSET: u64 = 106;
pub const EXFAT_PERCENT_IN_USE_OFFSET: u64 = 112;

// === Volume Flags ===

pub const EXFAT_FLAG_ACTIVE_FAT: u16 = 0x0001;
pub const EXFAT_FLAG_VOLUME_DIRTY: u16 = 0x0002;
pub const EXFAT_FLAG_MEDIA_FAILURE: u16 = 0x0004;

// === Directory Entry Types ===

pub const EXFAT_ENTRY_SIZE_BYTES: usize = 32;
/// Bit 7 of the type byte: record in use.
pub const EXFAT_ENTRY_IN_USE: u8 = 0x80;
pub const EXFAT_EOD: u8 = 0x00;
pub const EXFAT_ENTRY_BITMAP: u8 = 0x81;
pub const EXFAT_ENTRY_UPCASE: u8 = 0x82;
pub const EXFAT_ENTRY_LABEL: u8 = 0x83;
pub const EXFAT_ENTRY_FILE: u8 = 0x85;
pub const EXFAT_ENTRY_STREAM: u8 = 0xC0;
pub const EXFAT_ENTRY_NAME: u8 = 0xC1;

// === Stream Flags ===

pub const EXFAT_STREAM_ALLOC_POSSIBLE: u8 = 0x01;
pub const EXFAT_STREAM_NO_FAT_CHAIN: u8 = 0x02;

// === Names ===

pub const EXFAT_NAME_ENTRY_CHARS: usize = 15;
pub const EXFAT_MAX_NAME_CHARS: usize = 255;
pub const EXFAT_LABEL_MAX_CHARS: usize = 11;
/// Secondary records of a set: one stream plus at most 17 name records.
pub const EXFAT_MAX_SECONDARY: u8 = 18;

// === Up-case Table ===

/// Entries of the ASCII up-case table written by the formatter.
pub const EXFAT_UPCASE_ENTRIES: usize = 128;

/// Directories may not grow past 256 MiB.
pub const EXFAT_MAX_DIR_BYTES: u64 = 256 * 1024 * 1024;
