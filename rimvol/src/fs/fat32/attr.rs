// SPDX-License-Identifier: MIT

use crate::core::attr::FileAttributes;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Fat32Attributes: u8 {
        const READ_ONLY = 0x01;
        const HIDDEN    = 0x02;
        const SYSTEM    = 0x04;
        const VOLUME_ID = 0x08;
        const DIRECTORY = 0x10;
        const ARCHIVE   = 0x20;
        const LFN       = 0x0F;
    }
}

impl Fat32Attributes {
    /// Long-name records carry exactly the four low attribute bits.
    #[inline]
    pub fn is_lfn(raw: u8) -> bool {
        raw & 0x3F == Self::LFN.bits()
    }
}

pub fn to_fat_attr(attr: &FileAttributes) -> u8 {
    let mut out = Fat32Attributes::empty();
    out.set(Fat32Attributes::READ_ONLY, attr.read_only);
    out.set(Fat32Attributes::HIDDEN, attr.hidden);
    out.set(Fat32Attributes::SYSTEM, attr.system);
    out.set(Fat32Attributes::DIRECTORY, attr.dir);
    out.set(Fat32Attributes::ARCHIVE, attr.archive);
    out.bits()
}

pub fn from_fat_attr(raw: u8) -> FileAttributes {
    let fat = Fat32Attributes::from_bits_truncate(raw);
    FileAttributes {
        read_only: fat.contains(Fat32Attributes::READ_ONLY),
        hidden: fat.contains(Fat32Attributes::HIDDEN),
        system: fat.contains(Fat32Attributes::SYSTEM),
        dir: fat.contains(Fat32Attributes::DIRECTORY),
        archive: fat.contains(Fat32Attributes::ARCHIVE),
        ..Default::default()
    }
}
