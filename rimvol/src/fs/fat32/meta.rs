// SPDX-License-Identifier: MIT

use crate::core::cursor::ClusterMeta;
use crate::core::errors::*;
use crate::core::meta::FsMeta;
use crate::core::utils::volume::{converge_fat_layout, generate_volume_id_32};
use crate::fs::fat32::{constant::*, types::Fat32Vbr};

/// Decoded FAT32 geometry.
#[derive(Debug, Clone)]
pub struct Fat32Meta {
    pub volume_id: u32,
    pub volume_label: [u8; 11],

    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub bytes_per_cluster: u32,
    pub reserved_sectors: u16,

    pub volume_size_sectors: u64,

    pub num_fats: u8,
    pub fat_offset_bytes: u64,
    pub fat_size_sectors: u32,
    pub ext_flags: u16,

    pub cluster_heap_offset: u64,
    pub cluster_count: u32,

    pub fsinfo_sector: u16,
    pub backup_boot_sector: u16,

    root_cluster: u32,
}

impl Fat32Meta {
    /// Geometry for a new volume of `size_bytes` with default parameters.
    pub fn new(size_bytes: u64, volume_label: Option<&str>) -> FsFormatterResult<Self> {
        Self::new_custom(
            size_bytes,
            volume_label,
            generate_volume_id_32(),
            FAT_NUM_FATS,
            FAT_SECTOR_SIZE,
            FAT_CLUSTER_SIZE,
            DEFAULT_FAT_RESERVED_SECTORS,
        )
    }

    pub fn new_custom(
        volume_size_bytes: u64,
        volume_label: Option<&str>,
        volume_id: u32,
        num_fats: u8,
        bytes_per_sector: u16,
        bytes_per_cluster: u32,
        reserved_sectors: u16,
    ) -> FsFormatterResult<Self> {
        crate::ensure!(
            matches!(bytes_per_sector, 512 | 1024 | 2048 | 4096),
            FsFormatterError::Invalid("sector size must be 512, 1024, 2048 or 4096")
        );
        crate::ensure!(
            bytes_per_cluster >= bytes_per_sector as u32
                && bytes_per_cluster % bytes_per_sector as u32 == 0
                && (bytes_per_cluster / bytes_per_sector as u32).is_power_of_two()
                && bytes_per_cluster / bytes_per_sector as u32 <= 128,
            FsFormatterError::Invalid("cluster size must be a power-of-two multiple of the sector size")
        );
        crate::ensure!(
            (1..=2).contains(&num_fats),
            FsFormatterError::Invalid("FAT count must be 1 or 2")
        );
        crate::ensure!(
            reserved_sectors as u64 > FAT_VBR_BACKUP_SECTOR + 1,
            FsFormatterError::Invalid("reserved area too small for the backup boot sector")
        );
        let sectors_per_cluster = (bytes_per_cluster / bytes_per_sector as u32) as u8;

        let volume_size_sectors = volume_size_bytes / bytes_per_sector as u64;
        crate::ensure!(
            volume_size_sectors <= u32::MAX as u64,
            FsFormatterError::Invalid("volume too large for FAT32")
        );

        let (fat_size_sectors, cluster_count) = converge_fat_layout(
            bytes_per_sector as u32,
            volume_size_sectors as u32,
            reserved_sectors as u32,
            FAT_ENTRY_SIZE as u32,
            num_fats,
            sectors_per_cluster as u32,
        );
        crate::ensure!(
            cluster_count >= 16,
            FsFormatterError::Invalid("volume too small for FAT32")
        );
        if cluster_count < FAT32_MIN_CLUSTERS {
            log::warn!(
                "{cluster_count} clusters is below the FAT32 minimum of {FAT32_MIN_CLUSTERS}; other drivers may read it as FAT16"
            );
        }

        let fat_offset_bytes = reserved_sectors as u64 * bytes_per_sector as u64;
        let cluster_heap_offset =
            fat_offset_bytes + fat_size_sectors as u64 * num_fats as u64 * bytes_per_sector as u64;

        Ok(Self {
            volume_id,
            volume_label: label_bytes(volume_label),
            bytes_per_sector,
            sectors_per_cluster,
            bytes_per_cluster,
            reserved_sectors,
            volume_size_sectors,
            num_fats,
            fat_offset_bytes,
            fat_size_sectors,
            ext_flags: 0,
            cluster_heap_offset,
            cluster_count,
            fsinfo_sector: FAT_FSINFO_SECTOR as u16,
            backup_boot_sector: FAT_VBR_BACKUP_SECTOR as u16,
            root_cluster: FAT_ROOT_CLUSTER,
        })
    }

    /// Validates a boot sector and derives the geometry from it.
    pub fn from_vbr(vbr: &Fat32Vbr) -> FsParsingResult<Self> {
        let bytes_per_sector = vbr.bytes_per_sector;
        let sectors_per_cluster = vbr.sectors_per_cluster;
        let reserved_sectors = vbr.reserved_sectors;
        let num_fats = vbr.num_fats;
        let fat_size_16 = vbr.fat_size_16;
        let fat_size_32 = vbr.fat_size_32;
        let root_entry_count = vbr.root_entry_count;
        let root_cluster = vbr.root_cluster;

        crate::ensure!(
            vbr.signature == FAT_SIGNATURE,
            FsParsingError::BadSignature("boot sector")
        );
        crate::ensure!(
            matches!(bytes_per_sector, 512 | 1024 | 2048 | 4096),
            FsParsingError::Corrupted("invalid bytes per sector")
        );
        crate::ensure!(
            sectors_per_cluster.is_power_of_two(),
            FsParsingError::Corrupted("invalid sectors per cluster")
        );
        crate::ensure!(
            reserved_sectors > 0 && num_fats > 0,
            FsParsingError::Corrupted("invalid reserved area or FAT count")
        );
        crate::ensure!(
            fat_size_16 == 0 && root_entry_count == 0 && fat_size_32 != 0,
            FsParsingError::Unsupported("not a FAT32 volume")
        );

        let total_16 = vbr.total_sectors_16;
        let total_sectors = match total_16 {
            0 => vbr.total_sectors_32 as u64,
            n => n as u64,
        };
        let meta_sectors = reserved_sectors as u64 + num_fats as u64 * fat_size_32 as u64;
        crate::ensure!(
            total_sectors > meta_sectors,
            FsParsingError::Corrupted("FAT area exceeds the volume")
        );
        let cluster_count = ((total_sectors - meta_sectors) / sectors_per_cluster as u64) as u32;
        crate::ensure!(
            (cluster_count as u64 + 2) * FAT_ENTRY_SIZE as u64
                <= fat_size_32 as u64 * bytes_per_sector as u64,
            FsParsingError::Corrupted("FAT too small for the cluster count")
        );
        crate::ensure!(
            (FAT_FIRST_CLUSTER..=cluster_count + 1).contains(&root_cluster),
            FsParsingError::Corrupted("root cluster out of range")
        );

        let fat_offset_bytes = reserved_sectors as u64 * bytes_per_sector as u64;
        Ok(Self {
            volume_id: vbr.volume_id,
            volume_label: vbr.volume_label,
            bytes_per_sector,
            sectors_per_cluster,
            bytes_per_cluster: sectors_per_cluster as u32 * bytes_per_sector as u32,
            reserved_sectors,
            volume_size_sectors: total_sectors,
            num_fats,
            fat_offset_bytes,
            fat_size_sectors: fat_size_32,
            ext_flags: vbr.ext_flags,
            cluster_heap_offset: meta_sectors * bytes_per_sector as u64,
            cluster_count,
            fsinfo_sector: vbr.fsinfo_sector,
            backup_boot_sector: vbr.backup_boot_sector,
            root_cluster,
        })
    }

    /// FAT copy read at mount: the one selected by `ext_flags` when mirroring
    /// is disabled, FAT #0 otherwise.
    pub fn active_fat(&self) -> u8 {
        if self.ext_flags & FAT_EXT_FLAGS_NO_MIRROR == 0 {
            return 0;
        }
        let idx = (self.ext_flags & FAT_EXT_FLAGS_ACTIVE_MASK) as u8;
        if idx < self.num_fats { idx } else { 0 }
    }

    #[inline]
    pub fn sector_offset(&self, sector: u64) -> u64 {
        sector * self.bytes_per_sector as u64
    }
}

/// Upper-cased, space-padded 11-byte label.
pub fn label_bytes(label: Option<&str>) -> [u8; 11] {
    match label {
        Some(l) if !l.is_empty() => {
            let mut out = [b' '; 11];
            for (i, b) in l.bytes().take(11).enumerate() {
                out[i] = b.to_ascii_uppercase();
            }
            out
        }
        _ => *FAT_VOLUME_LABEL_EMPTY,
    }
}

impl FsMeta<u32> for Fat32Meta {
    fn unit_size(&self) -> usize {
        self.bytes_per_cluster as usize
    }

    fn unit_offset(&self, cluster: u32) -> u64 {
        self.cluster_heap_offset
            + (cluster.saturating_sub(FAT_FIRST_CLUSTER) as u64) * self.bytes_per_cluster as u64
    }

    fn root_unit(&self) -> u32 {
        self.root_cluster
    }

    fn first_data_unit(&self) -> u32 {
        FAT_FIRST_CLUSTER
    }

    fn last_data_unit(&self) -> u32 {
        self.cluster_count + FAT_FIRST_CLUSTER - 1
    }

    fn total_units(&self) -> usize {
        self.cluster_count as usize
    }

    fn size_bytes(&self) -> u64 {
        self.volume_size_sectors * self.bytes_per_sector as u64
    }
}

impl ClusterMeta for Fat32Meta {
    const EOC: u32 = FAT_EOC;
    const EOC_MIN: u32 = FAT_EOC_MIN;
    const BAD: u32 = FAT_BAD;
    const ENTRY_MASK: u32 = FAT_ENTRY_MASK;

    fn fat_entry_offset(&self, cluster: u32, fat_index: u8) -> u64 {
        self.fat_offset_bytes
            + fat_index as u64 * self.fat_size_sectors as u64 * self.bytes_per_sector as u64
            + cluster as u64 * FAT_ENTRY_SIZE as u64
    }

    fn num_fats(&self) -> u8 {
        self.num_fats
    }
}
