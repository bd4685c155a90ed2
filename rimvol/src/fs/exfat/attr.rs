// SPDX-License-Identifier: MIT

use crate::core::attr::FileAttributes;

bitflags::bitflags! {
    /// `FileAttributes` field of the file record.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ExFatAttributes: u16 {
        const READ_ONLY = 0x0001;
        const HIDDEN    = 0x0002;
        const SYSTEM    = 0x0004;
        const DIRECTORY = 0x0010;
        const ARCHIVE   = 0x0020;
    }
}

pub fn to_exfat_attr(attr: &FileAttributes) -> u16 {
    let mut out = ExFatAttributes::empty();
    out.set(ExFatAttributes::READ_ONLY, attr.read_only);
    out.set(ExFatAttributes::HIDDEN, attr.hidden);
    out.set(ExFatAttributes::SYSTEM, attr.system);
    out.set(ExFatAttributes::DIRECTORY, attr.dir);
    out.set(ExFatAttributes::ARCHIVE, attr.archive);
    out.bits()
}

pub fn from_exfat_attr(raw: u16) -> FileAttributes {
    let ex = ExFatAttributes::from_bits_truncate(raw);
    FileAttributes {
        read_only: ex.contains(ExFatAttributes::READ_ONLY),
        hidden: ex.contains(ExFatAttributes::HIDDEN),
        system: ex.contains(ExFatAttributes::SYSTEM),
        dir: ex.contains(ExFatAttributes::DIRECTORY),
        archive: ex.contains(ExFatAttributes::ARCHIVE),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attr_mapping() {
        let attr = FileAttributes::new_dir().set_system(true);
        assert_eq!(to_exfat_attr(&attr), 0x14);
        assert!(from_exfat_attr(0x14).structural_eq(&attr));
        // Reserved bits are dropped
        assert!(from_exfat_attr(0x8021).structural_eq(&FileAttributes::new_file().set_read_only(true)));
    }
}
