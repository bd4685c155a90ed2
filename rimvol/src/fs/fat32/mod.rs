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

pub use formatter::Fat32Formatter;
pub use meta::Fat32Meta;
pub use volume::Fat32Volume;

// === Public Interface ===
pub mod traits {
    pub use super::allocator::Fat32Allocator;
    pub use super::formatter::Fat32Formatter;
    pub use super::meta::Fat32Meta;
    pub use super::volume::Fat32Volume;
}

pub mod prelude {
    pub use super::traits::*;
    pub use crate::core::errors::*;
    pub use crate::core::traits::*;
    pub use crate::core::{AttrFlags, DirEntry, FileAttributes, FileHandle, MountOptions};
    pub use rimio::prelude::*;
}
