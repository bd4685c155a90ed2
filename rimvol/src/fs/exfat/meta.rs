// SPDX-License-Identifier: MIT

use alloc::string::String;

use crate::core::cursor::ClusterMeta;
use crate::core::errors::*;
use crate::core::meta::FsMeta;
use crate::core::utils::volume::{converge_fat_layout, generate_volume_id_32};
use crate::fs::exfat::{constant::*, types::ExFatBootSector, utils::upcase_table};

/// Decoded exFAT geometry.
///
/// The bitmap and up-case fields describe the layout a formatter lays out;
/// on a mounted volume they are located through the root directory instead
/// and stay zero here.
#[derive(Debug, Clone)]
pub struct ExFatMeta {
    pub volume_id: u32,
    pub volume_label: Option<String>,

    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u32,
    pub bytes_per_cluster: u32,

    pub volume_size_sectors: u64,

    pub num_fats: u8,
    pub fat_offset_bytes: u64,
    pub fat_size_sectors: u32,

    pub cluster_heap_offset: u64,
    pub cluster_count: u32,
    pub volume_flags: u16,

    pub bitmap_cluster: u32,
    pub bitmap_size_bytes: u64,
    pub upcase_cluster: u32,
    pub upcase_size_bytes: u64,

    root_cluster: u32,
}

impl ExFatMeta {
    /// Geometry for a new volume with 512-byte sectors and 4 KiB clusters.
    pub fn new(size_bytes: u64, volume_label: Option<&str>) -> FsFormatterResult<Self> {
        Self::new_custom(
            size_bytes,
            volume_label,
            generate_volume_id_32(),
            EXFAT_NUM_FATS,
            EXFAT_SECTOR_SIZE,
            EXFAT_CLUSTER_SIZE,
        )
    }

    pub fn new_custom(
        volume_size_bytes: u64,
        volume_label: Option<&str>,
        volume_id: u32,
        num_fats: u8,
        bytes_per_sector: u16,
        bytes_per_cluster: u32,
    ) -> FsFormatterResult<Self> {
        crate::ensure!(
            matches!(bytes_per_sector, 512 | 1024 | 2048 | 4096),
            FsFormatterError::Invalid("sector size must be 512, 1024, 2048 or 4096")
        );
        crate::ensure!(
            bytes_per_cluster.is_power_of_two()
                && bytes_per_cluster >= bytes_per_sector as u32
                && bytes_per_cluster.trailing_zeros() <= EXFAT_MAX_CLUSTER_SHIFT as u32,
            FsFormatterError::Invalid("cluster size must be a power of two up to 32 MiB")
        );
        crate::ensure!(
            (1..=2).contains(&num_fats),
            FsFormatterError::Invalid("FAT count must be 1 or 2")
        );
        if let Some(label) = volume_label {
            crate::ensure!(
                label.encode_utf16().count() <= EXFAT_LABEL_MAX_CHARS,
                FsFormatterError::Invalid("volume label longer than 11 characters")
            );
        }

        let ss = bytes_per_sector as u64;
        let sectors_per_cluster = bytes_per_cluster / bytes_per_sector as u32;
        let volume_size_sectors = volume_size_bytes / ss;
        crate::ensure!(
            volume_size_sectors <= u32::MAX as u64,
            FsFormatterError::Invalid("volume too large")
        );

        let (fat_size_sectors, cluster_count) = converge_fat_layout(
            bytes_per_sector as u32,
            volume_size_sectors as u32,
            EXFAT_FAT_OFFSET_SECTORS,
            EXFAT_ENTRY_SIZE as u32,
            num_fats,
            sectors_per_cluster,
        );

        let bitmap_size_bytes = (cluster_count as u64).div_ceil(8);
        let bitmap_clusters = bitmap_size_bytes.div_ceil(bytes_per_cluster as u64) as u32;
        let upcase_size_bytes = upcase_table().len() as u64;
        let upcase_clusters = upcase_size_bytes.div_ceil(bytes_per_cluster as u64) as u32;

        let bitmap_cluster = EXFAT_FIRST_CLUSTER;
        let upcase_cluster = bitmap_cluster + bitmap_clusters * num_fats as u32;
        let root_cluster = upcase_cluster + upcase_clusters;
        crate::ensure!(
            cluster_count >= root_cluster + 8,
            FsFormatterError::Invalid("volume too small for exFAT")
        );

        let fat_offset_bytes = EXFAT_FAT_OFFSET_SECTORS as u64 * ss;
        let cluster_heap_offset =
            fat_offset_bytes + fat_size_sectors as u64 * num_fats as u64 * ss;

        Ok(Self {
            volume_id,
            volume_label: volume_label.filter(|l| !l.is_empty()).map(String::from),
            bytes_per_sector,
            sectors_per_cluster,
            bytes_per_cluster,
            volume_size_sectors,
            num_fats,
            fat_offset_bytes,
            fat_size_sectors,
            cluster_heap_offset,
            cluster_count,
            volume_flags: 0,
            bitmap_cluster,
            bitmap_size_bytes,
            upcase_cluster,
            upcase_size_bytes,
            root_cluster,
        })
    }

    /// Validates the main boot sector and derives the geometry from it.
    pub fn from_boot(boot: &ExFatBootSector) -> FsParsingResult<Self> {
        let bps_shift = boot.bytes_per_sector_shift;
        let spc_shift = boot.sectors_per_cluster_shift;
        let num_fats = boot.number_of_fats;
        let volume_length = boot.volume_length;
        let fat_offset = boot.fat_offset;
        let fat_length = boot.fat_length;
        let heap_offset = boot.cluster_heap_offset;
        let cluster_count = boot.cluster_count;
        let root_cluster = boot.root_dir_cluster;

        crate::ensure!(
            &boot.fs_name == EXFAT_FS_NAME,
            FsParsingError::BadSignature("exFAT file system name")
        );
        crate::ensure!(
            boot.signature == EXFAT_SIGNATURE,
            FsParsingError::BadSignature("boot sector")
        );
        crate::ensure!(
            (9..=12).contains(&bps_shift),
            FsParsingError::Corrupted("invalid bytes per sector shift")
        );
        crate::ensure!(
            bps_shift as u32 + spc_shift as u32 <= EXFAT_MAX_CLUSTER_SHIFT as u32,
            FsParsingError::Corrupted("cluster size above 32 MiB")
        );
        crate::ensure!(
            (1..=2).contains(&num_fats),
            FsParsingError::Corrupted("invalid FAT count")
        );
        crate::ensure!(
            fat_offset >= EXFAT_FAT_OFFSET_SECTORS && fat_length > 0,
            FsParsingError::Corrupted("invalid FAT region")
        );
        crate::ensure!(
            heap_offset as u64 >= fat_offset as u64 + fat_length as u64 * num_fats as u64,
            FsParsingError::Corrupted("cluster heap overlaps the FAT region")
        );

        let sectors_per_cluster = 1u32 << spc_shift;
        crate::ensure!(
            heap_offset as u64 + cluster_count as u64 * sectors_per_cluster as u64
                <= volume_length,
            FsParsingError::Corrupted("cluster heap exceeds the volume")
        );

        let bytes_per_sector = 1u16 << bps_shift;
        let ss = bytes_per_sector as u64;
        crate::ensure!(
            (cluster_count as u64 + 2) * EXFAT_ENTRY_SIZE as u64 <= fat_length as u64 * ss,
            FsParsingError::Corrupted("FAT too small for the cluster count")
        );
        crate::ensure!(
            (EXFAT_FIRST_CLUSTER..=cluster_count + 1).contains(&root_cluster),
            FsParsingError::Corrupted("root cluster out of range")
        );

        Ok(Self {
            volume_id: boot.volume_serial,
            volume_label: None,
            bytes_per_sector,
            sectors_per_cluster,
            bytes_per_cluster: sectors_per_cluster * bytes_per_sector as u32,
            volume_size_sectors: volume_length,
            num_fats,
            fat_offset_bytes: fat_offset as u64 * ss,
            fat_size_sectors: fat_length,
            cluster_heap_offset: heap_offset as u64 * ss,
            cluster_count,
            volume_flags: boot.volume_flags,
            bitmap_cluster: 0,
            bitmap_size_bytes: 0,
            upcase_cluster: 0,
            upcase_size_bytes: 0,
            root_cluster,
        })
    }

    /// FAT and bitmap in use: the `ActiveFat` flag only counts with two FATs.
    pub fn active_fat(&self) -> u8 {
        if self.num_fats == 2 && self.volume_flags & EXFAT_FLAG_ACTIVE_FAT != 0 {
            1
        } else {
            0
        }
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.volume_flags & EXFAT_FLAG_VOLUME_DIRTY != 0
    }

    #[inline]
    pub fn sector_offset(&self, sector: u64) -> u64 {
        sector * self.bytes_per_sector as u64
    }

    /// Clusters taken by one allocation bitmap.
    #[inline]
    pub fn bitmap_clusters(&self) -> u32 {
        self.bitmap_size_bytes.div_ceil(self.bytes_per_cluster as u64) as u32
    }

    /// First cluster of the allocation bitmap paired with FAT `index`.
    #[inline]
    pub fn bitmap_first_cluster(&self, index: u8) -> u32 {
        self.bitmap_cluster + index as u32 * self.bitmap_clusters()
    }
}

impl FsMeta<u32> for ExFatMeta {
    fn unit_size(&self) -> usize {
        self.bytes_per_cluster as usize
    }

    fn unit_offset(&self, cluster: u32) -> u64 {
        self.cluster_heap_offset
            + (cluster.saturating_sub(EXFAT_FIRST_CLUSTER) as u64) * self.bytes_per_cluster as u64
    }

    fn root_unit(&self) -> u32 {
        self.root_cluster
    }

    fn first_data_unit(&self) -> u32 {
        EXFAT_FIRST_CLUSTER
    }

    fn last_data_unit(&self) -> u32 {
        self.cluster_count + EXFAT_FIRST_CLUSTER - 1
    }

    fn total_units(&self) -> usize {
        self.cluster_count as usize
    }

    fn size_bytes(&self) -> u64 {
        self.volume_size_sectors * self.bytes_per_sector as u64
    }
}

impl ClusterMeta for ExFatMeta {
    const EOC: u32 = EXFAT_EOC;
    const EOC_MIN: u32 = EXFAT_EOC_MIN;
    const BAD: u32 = EXFAT_BAD;
    const ENTRY_MASK: u32 = EXFAT_ENTRY_MASK;

    fn fat_entry_offset(&self, cluster: u32, fat_index: u8) -> u64 {
        self.fat_offset_bytes
            + fat_index as u64 * self.fat_size_sectors as u64 * self.bytes_per_sector as u64
            + cluster as u64 * EXFAT_ENTRY_SIZE as u64
    }

    fn num_fats(&self) -> u8 {
        self.num_fats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout() {
        let meta = ExFatMeta::new(32 * 1024 * 1024, Some("Photos")).unwrap();
        assert_eq!(meta.bytes_per_cluster, 4096);
        assert_eq!(meta.bitmap_cluster, 2);
        assert_eq!(meta.bitmap_clusters(), 1);
        assert_eq!(meta.upcase_cluster, 3);
        assert_eq!(meta.root_unit(), 4);
        assert!(meta.bitmap_size_bytes * 8 >= meta.cluster_count as u64);
        assert!(
            meta.cluster_heap_offset + meta.cluster_count as u64 * 4096 <= meta.size_bytes()
        );
    }

    #[test]
    fn test_two_fats_two_bitmaps() {
        let meta =
            ExFatMeta::new_custom(32 * 1024 * 1024, None, 7, 2, 512, 4096).unwrap();
        assert_eq!(meta.bitmap_first_cluster(0), 2);
        assert_eq!(meta.bitmap_first_cluster(1), 3);
        assert_eq!(meta.upcase_cluster, 4);
        assert_eq!(meta.root_unit(), 5);
        assert_eq!(
            meta.fat_entry_offset(0, 1),
            meta.fat_offset_bytes + meta.fat_size_sectors as u64 * 512
        );
    }

    #[test]
    fn test_from_boot_agrees() {
        let mut meta = ExFatMeta::new_custom(16 * 1024 * 1024, None, 7, 2, 512, 4096).unwrap();
        meta.volume_flags = EXFAT_FLAG_ACTIVE_FAT;
        let boot = ExFatBootSector::from_meta(&meta);
        let back = ExFatMeta::from_boot(&boot).unwrap();
        assert_eq!(back.cluster_count, meta.cluster_count);
        assert_eq!(back.cluster_heap_offset, meta.cluster_heap_offset);
        assert_eq!(back.root_unit(), meta.root_unit());
        assert_eq!(back.active_fat(), 1);
    }

    #[test]
    fn test_active_fat_ignored_with_one_fat() {
        let mut meta = ExFatMeta::new(16 * 1024 * 1024, None).unwrap();
        meta.volume_flags = EXFAT_FLAG_ACTIVE_FAT;
        assert_eq!(meta.active_fat(), 0);
    }

    #[test]
    fn test_bad_name_rejected() {
        let meta = ExFatMeta::new(16 * 1024 * 1024, None).unwrap();
        let mut boot = ExFatBootSector::from_meta(&meta);
        boot.fs_name = *b"NTFS    ";
        assert!(matches!(
            ExFatMeta::from_boot(&boot),
            Err(FsParsingError::BadSignature(_))
        ));
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(ExFatMeta::new_custom(16 * 1024 * 1024, None, 0, 3, 512, 4096).is_err());
        assert!(ExFatMeta::new_custom(16 * 1024 * 1024, None, 0, 1, 512, 3000).is_err());
        assert!(ExFatMeta::new_custom(32 * 1024, None, 0, 1, 512, 4096).is_err());
        assert!(ExFatMeta::new(16 * 1024 * 1024, Some("a label too long")).is_err());
    }
}
