// SPDX-License-Identifier: MIT

use crate::core::attr::FileAttributes;
use crate::core::utils::time::from_unix;
use crate::fs::ext2::{constant::*, types::Ext2Inode};

/// `i_mode` for a new entry: file format plus permission bits. Without an
/// explicit mode the defaults apply; `read_only` strips the write bits.
pub fn to_mode(attr: &FileAttributes) -> u16 {
    let (format, default) = if attr.dir {
        (EXT2_S_IFDIR, EXT2_DEFAULT_DIR_PERM)
    } else {
        (EXT2_S_IFREG, EXT2_DEFAULT_FILE_PERM)
    };
    let mut perm = attr
        .mode
        .map(|m| m as u16 & EXT2_PERM_MASK)
        .unwrap_or(default);
    if attr.read_only {
        perm &= !EXT2_WRITE_BITS;
    }
    format | perm
}

/// Attributes of `inode` as listed under `name`. Dot-files are hidden.
pub fn from_inode(inode: &Ext2Inode, name: &str) -> FileAttributes {
    let perm = inode.i_mode & EXT2_PERM_MASK;
    FileAttributes {
        read_only: perm & EXT2_WRITE_BITS == 0,
        hidden: name.starts_with('.'),
        dir: inode.is_dir(),
        archive: false,
        system: false,
        created: None,
        modified: from_unix(inode.i_mtime),
        accessed: from_unix(inode.i_atime),
        mode: Some(perm as u32),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_defaults_and_read_only() {
        assert_eq!(to_mode(&FileAttributes::new_file()), EXT2_S_IFREG | 0o644);
        assert_eq!(to_mode(&FileAttributes::new_dir()), EXT2_S_IFDIR | 0o755);
        let ro = FileAttributes::new_file().set_mode(0o4755).set_read_only(true);
        assert_eq!(to_mode(&ro), EXT2_S_IFREG | 0o4555);
    }

    #[test]
    fn test_attributes_from_inode() {
        let inode = Ext2Inode::new(EXT2_S_IFREG | 0o444, 1, 1_700_000_000);
        let attr = from_inode(&inode, ".profile");
        assert!(attr.read_only && attr.hidden && !attr.dir);
        assert_eq!(attr.mode, Some(0o444));
        assert_eq!(attr.modified.map(|t| t.unix_timestamp()), Some(1_700_000_000));

        let dir = Ext2Inode::new(EXT2_S_IFDIR | 0o755, 2, 0);
        let attr = from_inode(&dir, "etc");
        assert!(attr.dir && !attr.read_only && !attr.hidden);
        assert_eq!(attr.modified, None);
    }
}
