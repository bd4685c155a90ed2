// SPDX-License-Identifier: MIT

pub mod allocator;
pub mod attr;
pub mod blockmap;
pub mod constant;
pub mod dir;
pub mod formatter;
pub mod group_layout;
pub mod meta;
pub mod types;
pub mod volume;

pub use formatter::Ext2Formatter;
pub use meta::Ext2Meta;
pub use volume::Ext2Volume;

// === Public Interface ===
pub mod traits {
    pub use super::allocator::Ext2Allocator;
    pub use super::formatter::Ext2Formatter;
    pub use super::meta::Ext2Meta;
    pub use super::volume::Ext2Volume;
}

pub mod prelude {
    pub use super::traits::*;
    pub use crate::core::errors::*;
    pub use crate::core::traits::*;
    pub use crate::core::{AttrFlags, DirEntry, FileAttributes, FileHandle, MountOptions};
    pub use rimio::prelude::*;
}
