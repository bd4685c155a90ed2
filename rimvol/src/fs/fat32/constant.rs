// SPDX-License-Identifier: MIT

// === Disk Layout Parameters ===

pub const FAT_SECTOR_SIZE: u16 = 512; // BPB_BytsPerSec
pub const FAT_CLUSTER_SIZE: u32 = 512;
pub const DEFAULT_FAT_RESERVED_SECTORS: u16 = 32; // BPB_RsvdSecCnt
pub const FAT_NUM_FATS: u8 = 2; // BPB_NumFATs
pub const FAT_HEADS: u16 = 255; // BPB_NumHeads (CHS hint)
pub const FAT_SECTORS_PER_TRACK: u16 = 63; // BPB_SecPerTrk (CHS hint)

/// Below this cluster count a volume would be FAT16 by the cluster-count rule.
pub const FAT32_MIN_CLUSTERS: u32 = 65525;

// === FAT Region Parameters ===

pub const FAT_ENTRY_SIZE: usize = 4;
pub const FAT_ENTRY_MASK: u32 = 0x0FFF_FFFF;
pub const FAT_MEDIA_DESCRIPTOR: u8 = 0xF8; // BPB_Media
pub const FAT_EOC: u32 = 0x0FFF_FFFF;
pub const FAT_EOC_MIN: u32 = 0x0FFF_FFF8;
pub const FAT_BAD: u32 = 0x0FFF_FFF7;
pub const FAT_FIRST_CLUSTER: u32 = 2;
pub const FAT_ROOT_CLUSTER: u32 = 2; // BPB_RootClus

/// BPB_ExtFlags bit 7: only the FAT selected by bits 0-3 is active.
pub const FAT_EXT_FLAGS_NO_MIRROR: u16 = 0x0080;
pub const FAT_EXT_FLAGS_ACTIVE_MASK: u16 = 0x000F;

// === Special Sector Numbers ===

pub const FAT_VBR_SECTOR: u64 = 0;
pub const FAT_VBR_BACKUP_SECTOR: u64 = 6;
pub const FAT_FSINFO_SECTOR: u64 = 1;

// === Standard FAT32 BPB / Extended BPB Constants ===

pub const FAT_JUMP_BOOT: [u8; 3] = [0xEB, 0x58, 0x90]; // BS_jmpBoot
pub const FAT_OEM_NAME: &[u8; 8] = b"MSWIN4.1"; // BS_OEMName
pub const FAT_DRIVE_NUMBER: u8 = 0x80; // BS_DrvNum
pub const FAT_BOOT_SIGNATURE: u8 = 0x29; // BS_BootSig
pub const FAT_FS_TYPE: &[u8; 8] = b"FAT32   "; // BS_FilSysType
pub const FAT_SIGNATURE: [u8; 2] = [0x55, 0xAA]; // VBR signature
pub const FAT_VOLUME_LABEL_EMPTY: &[u8; 11] = b"NO NAME    ";
pub const FAT_BOOT_CODE_SIZE: usize = 420;

// === FSINFO Constants ===

pub const FAT_FSINFO_LEAD_SIGNATURE: [u8; 4] = *b"RRaA";
pub const FAT_FSINFO_STRUCT_SIGNATURE: [u8; 4] = *b"rrAa";
pub const FAT_FSINFO_UNKNOWN: u32 = 0xFFFF_FFFF;
pub const FAT_FSINFO_TRAIL_SIGNATURE: [u8; 4] = [0x00, 0x00, 0x55, 0xAA];

// === Directory Records ===

pub const FAT_DIR_ENTRY_SIZE: usize = 32;
pub const FAT_ENTRY_END_OF_DIR: u8 = 0x00;
pub const FAT_ENTRY_DELETED: u8 = 0xE5;
/// Stored in place of a leading 0xE5 name byte.
pub const FAT_ENTRY_E5_ESCAPE: u8 = 0x05;
pub const FAT_DOT_NAME: &[u8; 11] = b".          ";
pub const FAT_DOTDOT_NAME: &[u8; 11] = b"..         ";
/// A directory may not hold more than 65536 records.
pub const FAT_MAX_DIR_ENTRIES: usize = 65536;

pub const FAT_LFN_CHARS_PER_ENTRY: usize = 13;
pub const FAT_LFN_LAST_FLAG: u8 = 0x40;
pub const FAT_LFN_ORDER_MASK: u8 = 0x3F;
pub const FAT_MAX_LFN_CHARS: usize = 255;

/// NT reserved byte: base / extension stored lower case.
pub const FAT_NT_LOWER_BASE: u8 = 0x08;
pub const FAT_NT_LOWER_EXT: u8 = 0x10;
