// SPDX-License-Identifier: MIT

use rimio::prelude::*;
use zerocopy::IntoBytes;

pub use crate::core::formatter::*;

use crate::core::cursor::ClusterMeta;
use crate::core::errors::FsFormatterResult;
use crate::core::meta::FsMeta;
use crate::core::utils::time::{now_utc, to_fat};
use crate::fs::fat32::{constant::*, meta::*, types::*};

/// Writes an empty FAT32 volume described by a [`Fat32Meta`].
///
/// - Boot sector and its backup, FSInfo.
/// - Every FAT copy with the two reserved entries and the root chain.
/// - A zeroed root cluster holding the volume-label record when a label is set.
///
/// A full format also zeroes the whole cluster heap.
pub struct Fat32Formatter<'a, IO: RimIO + ?Sized> {
    io: &'a mut IO,
    meta: &'a Fat32Meta,
}

impl<'a, IO: RimIO + ?Sized> Fat32Formatter<'a, IO> {
    pub fn new(io: &'a mut IO, meta: &'a Fat32Meta) -> Self {
        Self { io, meta }
    }

    fn write_vbr(&mut self) -> FsFormatterResult {
        let vbr = Fat32Vbr::from_meta(self.meta);
        self.io
            .write_at(self.meta.sector_offset(FAT_VBR_SECTOR), vbr.as_bytes())?;
        self.io
            .write_at(self.meta.sector_offset(FAT_VBR_BACKUP_SECTOR), vbr.as_bytes())?;
        Ok(())
    }

    fn write_fsinfo(&mut self) -> FsFormatterResult {
        // Root cluster is the only one in use
        let free = self.meta.cluster_count - 1;
        let fsinfo = Fat32FsInfo::new(free, self.meta.root_unit() + 1);
        self.io
            .write_at(self.meta.sector_offset(FAT_FSINFO_SECTOR), fsinfo.as_bytes())?;
        Ok(())
    }

    fn write_fat_region(&mut self) -> FsFormatterResult {
        let fat_bytes = self.meta.fat_size_sectors as usize * self.meta.bytes_per_sector as usize;

        let mut head = [0u8; 3 * FAT_ENTRY_SIZE];
        head[0..4].copy_from_slice(&(0x0FFF_FF00 | FAT_MEDIA_DESCRIPTOR as u32).to_le_bytes());
        head[4..8].copy_from_slice(&FAT_EOC.to_le_bytes());
        head[8..12].copy_from_slice(&FAT_EOC.to_le_bytes());

        for fat in 0..self.meta.num_fats {
            let offset = self.meta.fat_entry_offset(0, fat);
            self.io.zero_fill(offset, fat_bytes)?;
            self.io.write_at(offset, &head)?;
        }
        Ok(())
    }

    fn write_root_dir(&mut self) -> FsFormatterResult {
        let offset = self.meta.unit_offset(self.meta.root_unit());
        self.io.zero_fill(offset, self.meta.unit_size())?;

        if &self.meta.volume_label != FAT_VOLUME_LABEL_EMPTY {
            let label = Fat32Entry::volume_label(self.meta.volume_label, to_fat(now_utc()));
            self.io.write_at(offset, label.as_bytes())?;
        }
        Ok(())
    }

    fn zero_cluster_heap(&mut self) -> FsFormatterResult {
        let first = self.meta.root_unit() + 1;
        let start = self.meta.unit_offset(first);
        let end = self.meta.size_bytes();
        self.io.zero_fill(start, (end - start) as usize)?;
        Ok(())
    }
}

impl<IO: RimIO + ?Sized> FsFormatter for Fat32Formatter<'_, IO> {
    fn format(&mut self, full_format: bool) -> FsFormatterResult {
        self.write_vbr()?;
        self.write_fsinfo()?;
        self.write_fat_region()?;
        self.write_root_dir()?;
        if full_format {
            self.zero_cluster_heap()?;
        }
        self.io.flush()?;
        log::info!(
            "formatted FAT32: {} clusters of {} bytes, {} FAT(s) of {} sectors",
            self.meta.cluster_count,
            self.meta.bytes_per_cluster,
            self.meta.num_fats,
            self.meta.fat_size_sectors
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_layout() {
        let meta = Fat32Meta::new(40 * 1024 * 1024, Some("TEST")).unwrap();
        let mut disk = vec![0u8; meta.size_bytes() as usize];
        let mut io = MemRimIO::new(&mut disk);
        Fat32Formatter::new(&mut io, &meta).format(false).unwrap();

        let mut vbr = [0u8; 512];
        let mut backup = [0u8; 512];
        io.read_at(0, &mut vbr).unwrap();
        io.read_at(6 * 512, &mut backup).unwrap();
        assert_eq!(vbr, backup);
        assert_eq!(&vbr[510..], &[0x55, 0xAA]);

        for fat in 0..2 {
            let off = meta.fat_entry_offset(0, fat);
            assert_eq!(io.read_u32_at(off).unwrap(), 0x0FFF_FFF8);
            assert_eq!(io.read_u32_at(off + 8).unwrap(), FAT_EOC);
            assert_eq!(io.read_u32_at(off + 12).unwrap(), 0);
        }

        let root = meta.unit_offset(2);
        let mut label = [0u8; 12];
        io.read_at(root, &mut label).unwrap();
        assert_eq!(&label[..11], b"TEST       ");
        assert_eq!(label[11], 0x08);
    }
}
