// SPDX-License-Identifier: MIT

// === Sub-modules ===
pub mod allocator;
pub mod attr;
pub mod cursor;
pub mod detect;
pub mod entry;
pub mod errors;
pub mod formatter;
pub mod handle;
pub mod macros;
pub mod meta;
pub mod options;
pub mod resolver;
pub mod span;
pub mod table;
pub mod utils;
pub mod volume;

// === Core Traits ===
pub mod traits {
    pub use super::allocator::FsAllocator;
    pub use super::cursor::ClusterMeta;
    pub use super::formatter::FsFormatter;
    pub use super::meta::FsMeta;
    pub use super::volume::FsVolume;
}

// === Shared types ===
pub use attr::{AttrFlags, FileAttributes};
pub use entry::{DataRef, DirEntry, EntryKind, EntryLocation};
pub use handle::{FileHandle, SeekFrom};
pub use options::{ErrorPolicy, MountOptions};
pub use volume::VolumeUsage;

// === Error types ===
pub use errors::*;
