// SPDX-License-Identifier: MIT
#![cfg_attr(not(feature = "std"), no_std)]

//! User-space drivers for ext2, FAT32 and exFAT volume images.
//!
//! Every format is exposed through the same [`FsVolume`] trait: directory
//! listing, path resolution, create/delete and byte-range file I/O on top of
//! any [`rimio::RimIO`] backend.

#[macro_use]
extern crate alloc;

// Core Modules
pub mod core;
pub mod fs;

// Reusable types and traits
pub use core::traits::*;
pub use core::{
    AttrFlags, DataRef, DirEntry, EntryKind, EntryLocation, ErrorPolicy, FileAttributes,
    FileHandle, MountOptions, SeekFrom, VolumeUsage, errors::*,
};

#[cfg(feature = "std")]
pub use core::detect::mount_image;
pub use core::detect::{FsKind, detect};

// Filesystem APIs
#[cfg(feature = "fat32")]
/// FAT32 volume driver.
///
/// See [`fat32::Fat32Volume`] and [`fat32::Fat32Formatter`].
pub mod fat32 {
    pub use super::fs::fat32::prelude::*;
}

#[cfg(feature = "exfat")]
/// exFAT volume driver.
///
/// See [`exfat::ExFatVolume`] and [`exfat::ExFatFormatter`].
pub mod exfat {
    pub use super::fs::exfat::prelude::*;
}

#[cfg(feature = "ext2")]
/// ext2 volume driver.
///
/// See [`ext2::Ext2Volume`] and [`ext2::Ext2Formatter`].
pub mod ext2 {
    pub use super::fs::ext2::prelude::*;
}
