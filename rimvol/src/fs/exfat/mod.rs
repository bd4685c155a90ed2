// SPDX-License-Identifier: MIT

pub mod allocator;
pub mod attr;
pub mod constant;
pub mod dir;
pub mod formatter;
pub mod meta;
pub mod types;
pub mod utils;
pub mod volume;

pub use formatter::ExFatFormatter;
pub use meta::ExFatMeta;
pub use volume::ExFatVolume;

// === Public Interface ===
pub mod traits {
    pub use super::allocator::ExFatAllocator;
    pub use super::formatter::ExFatFormatter;
    pub use super::meta::ExFatMeta;
    pub use super::volume::ExFatVolume;
}

pub mod prelude {
    pub use super::traits::*;
    pub use crate::core::errors::*;
    pub use crate::core::traits::*;
    pub use crate::core::{AttrFlags, DirEntry, FileAttributes, FileHandle, MountOptions};
    pub use rimio::prelude::*;
}
