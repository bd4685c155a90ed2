// SPDX-License-Identifier: MIT

use alloc::vec::Vec;

use rimio::prelude::*;
use zerocopy::IntoBytes;

pub use crate::core::formatter::*;

use crate::core::cursor::ClusterMeta;
use crate::core::errors::FsFormatterResult;
use crate::core::meta::FsMeta;
use crate::core::table::FatTable;
use crate::core::utils::bitmap::BitmapOps;
use crate::fs::exfat::{constant::*, meta::*, types::*, utils::*};

/// Writes an empty exFAT volume described by an [`ExFatMeta`].
///
/// Layout of the cluster heap: allocation bitmap(s), up-case table, root
/// directory. The root holds the bitmap, up-case and label records.
pub struct ExFatFormatter<'a, IO: RimIO + ?Sized> {
    io: &'a mut IO,
    meta: &'a ExFatMeta,
}

impl<'a, IO: RimIO + ?Sized> ExFatFormatter<'a, IO> {
    pub fn new(io: &'a mut IO, meta: &'a ExFatMeta) -> Self {
        Self { io, meta }
    }

    /// Clusters `2..=root` are taken by the metadata, each object contiguous.
    fn used_clusters(&self) -> u32 {
        self.meta.root_unit() - EXFAT_FIRST_CLUSTER + 1
    }

    fn write_boot_regions(&mut self) -> FsFormatterResult {
        let ss = self.meta.bytes_per_sector as usize;
        let percent = (self.used_clusters() as u64 * 100 / self.meta.cluster_count as u64) as u8;
        let boot = ExFatBootSector::from_meta(self.meta).with_percent_in_use(percent);
        let region = boot_region(&boot, ss);
        self.io
            .write_at(self.meta.sector_offset(EXFAT_VBR_SECTOR), &region)?;
        self.io
            .write_at(self.meta.sector_offset(EXFAT_VBR_BACKUP_SECTOR), &region)?;
        Ok(())
    }

    fn write_fat_region(&mut self) -> FsFormatterResult {
        let fat_bytes = self.meta.fat_size_sectors as usize * self.meta.bytes_per_sector as usize;
        for fat in 0..self.meta.num_fats {
            self.io.zero_fill(self.meta.fat_entry_offset(0, fat), fat_bytes)?;
        }

        let mut table = FatTable::empty::<ExFatMeta>(self.meta.last_data_unit() as usize + 1);
        table.set(0, 0xFFFF_FF00 | EXFAT_MEDIA_DESCRIPTOR as u32);
        table.set(1, ExFatMeta::EOC);

        let bitmaps = self.meta.bitmap_clusters();
        let upcase = self.meta.upcase_size_bytes.div_ceil(self.meta.bytes_per_cluster as u64);
        let mut runs: Vec<(u32, u32)> = (0..self.meta.num_fats)
            .map(|i| (self.meta.bitmap_first_cluster(i), bitmaps))
            .collect();
        runs.push((self.meta.upcase_cluster, upcase as u32));
        runs.push((self.meta.root_unit(), 1));

        for (first, count) in runs {
            for c in first..first + count {
                let next = if c + 1 == first + count { ExFatMeta::EOC } else { c + 1 };
                table.set(c, next);
            }
        }
        table.store_all(&mut *self.io, self.meta)?;
        Ok(())
    }

    fn write_bitmaps(&mut self) -> FsFormatterResult {
        let mut bitmap = vec![0u8; self.meta.bitmap_size_bytes as usize];
        for bit in 0..self.used_clusters() as usize {
            bitmap.set_bit(bit, true);
        }
        let span = self.meta.bitmap_clusters() as usize * self.meta.unit_size();
        for i in 0..self.meta.num_fats {
            let offset = self.meta.unit_offset(self.meta.bitmap_first_cluster(i));
            self.io.zero_fill(offset, span)?;
            self.io.write_at(offset, &bitmap)?;
        }
        Ok(())
    }

    fn write_upcase(&mut self) -> FsFormatterResult {
        let offset = self.meta.unit_offset(self.meta.upcase_cluster);
        self.io.zero_fill(offset, self.meta.unit_size())?;
        self.io.write_at(offset, &upcase_table())?;
        Ok(())
    }

    fn write_root_dir(&mut self) -> FsFormatterResult {
        let offset = self.meta.unit_offset(self.meta.root_unit());
        self.io.zero_fill(offset, self.meta.unit_size())?;

        let mut records = Vec::with_capacity(4 * EXFAT_ENTRY_SIZE_BYTES);
        if let Some(label) = &self.meta.volume_label {
            records.extend_from_slice(ExFatVolumeLabelEntry::new(label).as_bytes());
        }
        for i in 0..self.meta.num_fats {
            let entry = ExFatBitmapEntry::new(
                i,
                self.meta.bitmap_first_cluster(i),
                self.meta.bitmap_size_bytes,
            );
            records.extend_from_slice(entry.as_bytes());
        }
        let table = upcase_table();
        let upcase = ExFatUpcaseEntry::new(
            self.meta.upcase_cluster,
            table.len() as u64,
            upcase_checksum(&table),
        );
        records.extend_from_slice(upcase.as_bytes());

        self.io.write_at(offset, &records)?;
        Ok(())
    }

    fn zero_cluster_heap(&mut self) -> FsFormatterResult {
        let start = self.meta.unit_offset(self.meta.root_unit() + 1);
        let end = self.meta.unit_offset(self.meta.last_data_unit() + 1);
        self.io.zero_fill(start, (end - start) as usize)?;
        Ok(())
    }
}

impl<IO: RimIO + ?Sized> FsFormatter for ExFatFormatter<'_, IO> {
    fn format(&mut self, full_format: bool) -> FsFormatterResult {
        self.write_boot_regions()?;
        self.write_fat_region()?;
        self.write_bitmaps()?;
        self.write_upcase()?;
        self.write_root_dir()?;
        if full_format {
            self.zero_cluster_heap()?;
        }
        self.io.flush()?;
        log::info!(
            "formatted exFAT: {} clusters of {} bytes, {} FAT(s), root at cluster {}",
            self.meta.cluster_count,
            self.meta.bytes_per_cluster,
            self.meta.num_fats,
            self.meta.root_unit()
        );
        Ok(())
    }
}
