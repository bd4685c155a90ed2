// SPDX-License-Identifier: MIT

pub mod dirent;
pub mod group_desc;
pub mod inode;
pub mod superblock;

pub use dirent::*;
pub use group_desc::*;
pub use inode::*;
pub use superblock::*;
