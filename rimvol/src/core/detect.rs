// SPDX-License-Identifier: MIT

use rimio::prelude::*;

use crate::core::errors::*;

/// Volume format recognised by [`detect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsKind {
    Ext2,
    Fat32,
    ExFat,
}

const EXT2_MAGIC_OFFSET: u64 = 1024 + 56;
const EXT2_MAGIC: u16 = 0xEF53;

/// Identifies the format from its boot sector / superblock signature.
pub fn detect<IO: RimIO + ?Sized>(io: &mut IO) -> FsResult<FsKind> {
    let mut sector = [0u8; 512];
    io.read_at(0, &mut sector)?;

    if &sector[3..11] == b"EXFAT   " {
        return Ok(FsKind::ExFat);
    }
    if sector[510..512] == [0x55, 0xAA] && &sector[82..90] == b"FAT32   " {
        return Ok(FsKind::Fat32);
    }
    if io.size_bytes()? >= EXT2_MAGIC_OFFSET + 2 && io.read_u16_at(EXT2_MAGIC_OFFSET)? == EXT2_MAGIC
    {
        return Ok(FsKind::Ext2);
    }
    Err(FsParsingError::BadSignature("volume").into())
}

/// Opens the image at `path`, detects its format and mounts it.
#[cfg(feature = "std")]
pub fn mount_image<P: AsRef<std::path::Path>>(
    path: P,
    options: crate::core::options::MountOptions,
) -> FsResult<alloc::boxed::Box<dyn crate::core::volume::FsVolume>> {
    use alloc::boxed::Box;

    let mut io = if options.read_only {
        FileRimIO::open_read_only(path)?
    } else {
        FileRimIO::open(path)?
    };

    let kind = detect(&mut io)?;
    log::info!("detected {kind:?} volume");
    match kind {
        #[cfg(feature = "ext2")]
        FsKind::Ext2 => Ok(Box::new(crate::fs::ext2::Ext2Volume::mount(io, options)?)),
        #[cfg(feature = "fat32")]
        FsKind::Fat32 => Ok(Box::new(crate::fs::fat32::Fat32Volume::mount(
            io, options,
        )?)),
        #[cfg(feature = "exfat")]
        FsKind::ExFat => Ok(Box::new(crate::fs::exfat::ExFatVolume::mount(
            io, options,
        )?)),
        #[allow(unreachable_patterns)]
        _ => Err(FsParsingError::Unsupported("format support not compiled in").into()),
    }
}
