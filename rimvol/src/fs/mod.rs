// SPDX-License-Identifier: MIT

#[cfg(feature = "exfat")]
pub mod exfat;
#[cfg(feature = "ext2")]
pub mod ext2;
#[cfg(feature = "fat32")]
pub mod fat32;
