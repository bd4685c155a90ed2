// SPDX-License-Identifier: MIT

// === Superblock ===

pub const EXT2_SUPER_MAGIC: u16 = 0xEF53;

// Always 1024 bytes into the volume, whatever the block size
pub const EXT2_SUPERBLOCK_OFFSET: u64 = 1024;
pub const EXT2_SUPERBLOCK_SIZE: usize = 1024;

// === Revisions ===

pub const EXT2_GOOD_OLD_REV: u32 = 0;
pub const EXT2_DYNAMIC_REV: u32 = 1;

// Fixed values of revision 0
pub const EXT2_GOOD_OLD_INODE_SIZE: u16 = 128;
pub const EXT2_GOOD_OLD_FIRST_INO: u32 = 11;

// === Block size ===

pub const EXT2_MIN_BLOCK_SIZE: u32 = 1024;
pub const EXT2_MAX_BLOCK_SIZE: u32 = 65536;
pub const EXT2_MAX_LOG_BLOCK_SIZE: u32 = 6;

// Volumes below this size get 1 KiB blocks by default
pub const EXT2_SMALL_VOLUME_BYTES: u64 = 512 * 1024 * 1024;
pub const EXT2_SMALL_BLOCK_SIZE: u32 = 1024;
pub const EXT2_DEFAULT_BLOCK_SIZE: u32 = 4096;

// One inode per this many bytes of data area
pub const EXT2_DEFAULT_INODE_RATIO: u64 = 4096;

// === Inodes ===

pub const EXT2_BAD_INO: u32 = 1;
pub const EXT2_ROOT_INO: u32 = 2;
pub const EXT2_LOST_FOUND_NAME: &str = "lost+found";

// === Block pointers ===

pub const EXT2_NDIR_BLOCKS: usize = 12;
pub const EXT2_IND_BLOCK: usize = EXT2_NDIR_BLOCKS;
pub const EXT2_DIND_BLOCK: usize = EXT2_IND_BLOCK + 1;
pub const EXT2_TIND_BLOCK: usize = EXT2_DIND_BLOCK + 1;
pub const EXT2_N_BLOCKS: usize = EXT2_TIND_BLOCK + 1;

// `i_blocks` unit
pub const EXT2_SECTOR_SIZE: u32 = 512;

// === Group descriptors ===

pub const EXT2_GROUP_DESC_SIZE: usize = 32;

// === State / error policy (s_state, s_errors) ===

pub const EXT2_VALID_FS: u16 = 0x0001;
pub const EXT2_ERROR_FS: u16 = 0x0002;

pub const EXT2_ERRORS_CONTINUE: u16 = 1;
pub const EXT2_ERRORS_RO: u16 = 2;
pub const EXT2_ERRORS_PANIC: u16 = 3;

// -1 as i16: no forced check
pub const EXT2_NO_MAX_MOUNT_COUNT: u16 = 0xFFFF;

pub const EXT2_OS_LINUX: u32 = 0;

// === Features ===

pub const EXT2_FEATURE_INCOMPAT_FILETYPE: u32 = 0x0002;
pub const EXT2_FEATURE_RO_COMPAT_SPARSE_SUPER: u32 = 0x0001;
pub const EXT2_FEATURE_RO_COMPAT_LARGE_FILE: u32 = 0x0002;

pub const EXT2_SUPPORTED_INCOMPAT: u32 = EXT2_FEATURE_INCOMPAT_FILETYPE;
pub const EXT2_SUPPORTED_RO_COMPAT: u32 =
    EXT2_FEATURE_RO_COMPAT_SPARSE_SUPER | EXT2_FEATURE_RO_COMPAT_LARGE_FILE;

// === Mode bits (i_mode) ===

pub const EXT2_S_IFMT: u16 = 0xF000;
pub const EXT2_S_IFSOCK: u16 = 0xC000;
pub const EXT2_S_IFLNK: u16 = 0xA000;
pub const EXT2_S_IFREG: u16 = 0x8000;
pub const EXT2_S_IFBLK: u16 = 0x6000;
pub const EXT2_S_IFDIR: u16 = 0x4000;
pub const EXT2_S_IFCHR: u16 = 0x2000;
pub const EXT2_S_IFIFO: u16 = 0x1000;

pub const EXT2_PERM_MASK: u16 = 0o7777;
pub const EXT2_WRITE_BITS: u16 = 0o222;
pub const EXT2_DEFAULT_FILE_PERM: u16 = 0o644;
pub const EXT2_DEFAULT_DIR_PERM: u16 = 0o755;
pub const EXT2_LOST_FOUND_PERM: u16 = 0o700;

// === Directory records ===

pub const EXT2_FT_UNKNOWN: u8 = 0;
pub const EXT2_FT_REG_FILE: u8 = 1;
pub const EXT2_FT_DIR: u8 = 2;
pub const EXT2_FT_CHRDEV: u8 = 3;
pub const EXT2_FT_BLKDEV: u8 = 4;
pub const EXT2_FT_FIFO: u8 = 5;
pub const EXT2_FT_SOCK: u8 = 6;
pub const EXT2_FT_SYMLINK: u8 = 7;

pub const EXT2_DIR_HEADER_SIZE: usize = 8;
pub const EXT2_DIR_ROUND: usize = 4;
pub const EXT2_NAME_LEN: usize = 255;

// On-disk rec_len value standing for a 64 KiB record
pub const EXT2_MAX_REC_LEN: u16 = 0xFFFF;
