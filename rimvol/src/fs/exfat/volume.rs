// SPDX-License-Identifier: MIT

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;

use rimio::prelude::*;

use crate::core::allocator::FsAllocator;
use crate::core::attr::{AttrFlags, FileAttributes};
use crate::core::cursor::LinearCursor;
use crate::core::entry::{DataRef, DirEntry, EntryKind, EntryLocation};
use crate::core::errors::*;
use crate::core::meta::FsMeta;
use crate::core::options::MountOptions;
use crate::core::resolver::prepare_create;
use crate::core::span::{read_span, write_span, zero_span, zero_units};
use crate::core::table::FatTable;
use crate::core::utils::bitmap::BitmapOps;
use crate::core::utils::time::{now_utc, to_exfat};
use crate::core::volume::{FsVolume, VolumeUsage};
use crate::fs::exfat::{
    allocator::ExFatAllocator, attr::*, constant::*, dir::*, meta::ExFatMeta, types::*, utils::*,
};

/// Mounted exFAT volume.
///
/// The active FAT and its allocation bitmap are cached at mount. A writable
/// mount sets `VolumeDirty` in the main boot sector and clears it again at
/// [`ExFatVolume::close`] when it was the one setting it.
pub struct ExFatVolume<IO: RimIO> {
    io: IO,
    meta: ExFatMeta,
    fat: FatTable,
    bitmap: Vec<u8>,
    /// `(first cluster, length)` of every bitmap copy, rewritten on flush.
    bitmap_chains: Vec<(u32, u64)>,
    hint: u32,
    read_only: bool,
    set_dirty: bool,
    clear_dirty_on_close: bool,
    label: Option<String>,
}

impl<IO: RimIO> ExFatVolume<IO> {
    /// Verifies the boot region, loads the active FAT and its bitmap.
    pub fn mount(mut io: IO, options: MountOptions) -> FsResult<Self> {
        let boot: ExFatBootSector = io.read_struct(EXFAT_VBR_SECTOR)?;
        let meta = ExFatMeta::from_boot(&boot)?;

        let ss = meta.bytes_per_sector as usize;
        let mut region = vec![0u8; EXFAT_BOOT_REGION_SECTORS as usize * ss];
        io.read_at(meta.sector_offset(EXFAT_VBR_SECTOR), &mut region)?;
        let at = EXFAT_CHECKSUM_SECTOR_INDEX as usize * ss;
        let stored = u32::from_le_bytes([region[at], region[at + 1], region[at + 2], region[at + 3]]);
        crate::ensure!(
            boot_checksum(&region, ss) == stored,
            FsParsingError::Corrupted("boot region checksum mismatch")
        );

        let fat = FatTable::load(&mut io, &meta, meta.active_fat())?;
        let mut vol = Self {
            io,
            meta,
            fat,
            bitmap: Vec::new(),
            bitmap_chains: Vec::new(),
            hint: EXFAT_FIRST_CLUSTER,
            read_only: options.read_only,
            set_dirty: false,
            clear_dirty_on_close: options.clear_dirty_on_close,
            label: None,
        };
        vol.load_root_records()?;

        if vol.meta.is_dirty() {
            log::warn!("exFAT volume was not cleanly unmounted");
        } else if !vol.read_only {
            vol.write_volume_flags(vol.meta.volume_flags | EXFAT_FLAG_VOLUME_DIRTY)?;
            vol.set_dirty = true;
        }

        log::info!(
            "mounted exFAT: {} clusters of {} bytes, active FAT #{}, {}",
            vol.meta.cluster_count,
            vol.meta.bytes_per_cluster,
            vol.meta.active_fat(),
            if vol.read_only { "read-only" } else { "read-write" }
        );
        Ok(vol)
    }

    /// Flushes every cache, refreshes percent-in-use and the dirty flag,
    /// and returns the underlying I/O.
    pub fn close(mut self) -> FsResult<IO> {
        if !self.read_only {
            self.flush()?;
            let count = self.meta.cluster_count as usize;
            let used = self.bitmap.count_ones_in_range(0, count);
            let percent = (used * 100 / count.max(1)) as u8;
            self.io.write_u8_at(
                self.meta.sector_offset(EXFAT_VBR_SECTOR) + EXFAT_PERCENT_IN_USE_OFFSET,
                percent,
            )?;
            if self.set_dirty && self.clear_dirty_on_close {
                self.write_volume_flags(self.meta.volume_flags & !EXFAT_FLAG_VOLUME_DIRTY)?;
            }
            self.io.flush()?;
        }
        log::info!("closed exFAT volume");
        Ok(self.io)
    }

    #[inline]
    pub fn meta(&self) -> &ExFatMeta {
        &self.meta
    }

    fn write_volume_flags(&mut self, flags: u16) -> FsResult {
        self.io.write_u16_at(
            self.meta.sector_offset(EXFAT_VBR_SECTOR) + EXFAT_VOLUME_FLAGS_OFFSET,
            flags,
        )?;
        self.meta.volume_flags = flags;
        Ok(())
    }

    /// Finds the bitmap paired with the active FAT and the label record.
    fn load_root_records(&mut self) -> FsResult {
        let root = self.root().data();
        let (_, data) = self.load_dir(&root)?;

        let records = bitmap_records(&data);
        let active = self.meta.active_fat();
        let chosen = records
            .iter()
            .find(|b| b.index() == active)
            .or_else(|| records.first())
            .ok_or(FsParsingError::Corrupted("allocation bitmap record missing"))?;

        let (first, len) = (chosen.first_cluster, chosen.data_length);
        crate::ensure!(
            len * 8 >= self.meta.cluster_count as u64,
            FsParsingError::Corrupted("allocation bitmap too small")
        );
        let units = self.chain(first)?;
        let mut bitmap = vec![0u8; len as usize];
        read_span(&mut self.io, &self.meta, &units, 0, &mut bitmap)?;
        self.bitmap = bitmap;
        self.bitmap_chains = records
            .iter()
            .map(|b| (b.first_cluster, b.data_length))
            .collect();

        self.label = label_record(&data)
            .map(|l| l.label())
            .filter(|l| !l.is_empty());
        Ok(())
    }

    fn allocator(&mut self) -> ExFatAllocator<'_> {
        ExFatAllocator::new(&self.meta, &mut self.fat, &mut self.bitmap, &mut self.hint)
    }

    fn chain(&self, start: u32) -> FsResult<Vec<u32>> {
        Ok(self.fat.chain(&self.meta, start)?)
    }

    /// Clusters of a stream. Contiguous streams are checked against the bitmap.
    fn units_of(&self, data: &DataRef) -> FsResult<Vec<u32>> {
        if data.first_unit == 0 {
            return Ok(Vec::new());
        }
        if !data.contiguous {
            return self.chain(data.first_unit);
        }
        let units = LinearCursor::from_len_bytes(&self.meta, data.first_unit, data.size)
            .collect::<FsCursorResult<Vec<u32>>>()?;
        for &c in &units {
            let bit = (c - EXFAT_FIRST_CLUSTER) as usize;
            crate::ensure!(self.bitmap.get_bit(bit), FsCursorError::InvalidCluster(c));
        }
        Ok(units)
    }

    fn load_dir(&mut self, dir: &DataRef) -> FsResult<(Vec<u32>, Vec<u8>)> {
        let units = self.units_of(dir)?;
        let mut data = vec![0u8; units.len() * self.meta.unit_size()];
        read_span(&mut self.io, &self.meta, &units, 0, &mut data)?;
        Ok((units, data))
    }

    fn to_dir_entry(&self, found: DecodedSet, parent: DataRef) -> DirEntry {
        let file = &found.set.file;
        let stream = &found.set.stream;
        let mut attr = from_exfat_attr(file.file_attributes);
        attr.created = file.created();
        attr.modified = file.modified();
        attr.accessed = file.accessed();

        DirEntry {
            name: found.name(),
            kind: if attr.dir { EntryKind::Directory } else { EntryKind::File },
            attr,
            size: stream.data_length,
            first_unit: stream.first_cluster,
            contiguous: stream.is_contiguous(),
            location: Some(EntryLocation {
                parent,
                offset: found.offset,
                records: found.records,
            }),
        }
    }

    fn entries_of(&mut self, dir: &DirEntry) -> FsResult<Vec<DirEntry>> {
        crate::ensure!(dir.is_dir(), FsError::NotADirectory);
        let parent = dir.data();
        let (_, data) = self.load_dir(&parent)?;
        Ok(EntrySets::new(&data)
            .map(|s| self.to_dir_entry(s, parent))
            .collect())
    }

    /// Turns a contiguous stream into a FAT chain so it can be resized.
    fn materialise(&mut self, entry: &mut DirEntry) {
        if !entry.contiguous {
            return;
        }
        if entry.first_unit != 0 {
            let count = self.meta.units_for(entry.size);
            self.allocator().link_run(entry.first_unit, count);
            log::debug!("stream {}: {count} contiguous units linked in the FAT", entry.first_unit);
        }
        entry.contiguous = false;
    }

    /// Places a record set in `parent`, growing it by whole clusters when no
    /// free run is large enough. A grown parent is persisted.
    fn insert_set(&mut self, parent: &mut DirEntry, bytes: &[u8]) -> FsResult<u64> {
        let count = bytes.len() / EXFAT_ENTRY_SIZE_BYTES;
        let (mut units, mut data) = self.load_dir(&parent.data())?;

        let at = match find_free_run(&data, count) {
            Some(at) => at,
            None => {
                let cs = self.meta.unit_size();
                let tail_free = data.len() - end_offset(&data);
                let missing = (count * EXFAT_ENTRY_SIZE_BYTES).saturating_sub(tail_free);
                let new_units = missing.div_ceil(cs);
                crate::ensure!(
                    (data.len() + new_units * cs) as u64 <= EXFAT_MAX_DIR_BYTES,
                    FsAllocatorError::OutOfSpace
                );
                let last = *units.last().ok_or(FsError::Other("directory without clusters"))?;
                let old_units = units.len();
                self.materialise(parent);
                let added = self.allocator().extend(last, new_units)?;
                zero_units(&mut self.io, &self.meta, &added)?;
                log::debug!(
                    "directory {} grown by {new_units} cluster(s)",
                    parent.first_unit
                );

                units.extend_from_slice(&added);
                data.resize(units.len() * cs, 0);
                let Some(at) = find_free_run(&data, count) else {
                    self.allocator().resize(parent.first_unit, old_units)?;
                    return Err(FsError::Other("no free run after growth"));
                };
                if !parent.is_root() {
                    parent.size = data.len() as u64;
                    self.store_entry(parent)?;
                }
                at
            }
        };

        let end = end_offset(&data);
        write_span(&mut self.io, &self.meta, &units, at as u64, bytes)?;
        let next = at + bytes.len();
        if next > end && next < data.len() {
            write_span(&mut self.io, &self.meta, &units, next as u64, &[EXFAT_EOD])?;
        }
        Ok(at as u64)
    }

    /// Reads the record set behind `loc` along with the parent's clusters.
    fn load_set(&mut self, loc: &EntryLocation) -> FsResult<(Vec<u32>, Vec<u8>)> {
        let units = self.units_of(&loc.parent)?;
        let mut raw = vec![0u8; loc.records as usize * EXFAT_ENTRY_SIZE_BYTES];
        read_span(&mut self.io, &self.meta, &units, loc.offset, &mut raw)?;
        Ok((units, raw))
    }

    /// Fails with `NotFound` unless the set behind `entry` still carries its
    /// name and first cluster.
    fn check_location(&mut self, entry: &DirEntry) -> FsResult {
        let Some(loc) = entry.location else {
            return Ok(());
        };
        let (_, raw) = self.load_set(&loc)?;
        let live = EntrySets::new(&raw).next().is_some_and(|s| {
            s.offset == 0
                && s.records == loc.records
                && s.name() == entry.name
                && { s.set.stream.first_cluster } == entry.first_unit
        });
        if !live {
            log::warn!("stale entry {:?} at offset {}", entry.name, loc.offset);
            return Err(FsError::not_found(&entry.name));
        }
        Ok(())
    }

    /// Rewrites the whole set of `entry` with its current allocation.
    fn store_entry(&mut self, entry: &DirEntry) -> FsResult {
        let Some(loc) = entry.location else {
            return Ok(());
        };
        let (units, raw) = self.load_set(&loc)?;
        let mut set =
            ExFatEntries::from_bytes(&raw).ok_or(FsParsingError::Corrupted("entry set"))?;
        set.stream
            .set_data(entry.first_unit, entry.size, entry.contiguous);
        set.file.set_modified(to_exfat(now_utc()));
        set.update_checksum();
        write_span(&mut self.io, &self.meta, &units, loc.offset, &set.to_bytes())?;
        Ok(())
    }

    fn resize_stream(&mut self, entry: &mut DirEntry, new_size: u64) -> FsResult {
        let old_size = entry.size;
        self.materialise(entry);
        let units = self.meta.units_for(new_size);
        let first = self.allocator().resize(entry.first_unit, units)?;

        if new_size > old_size {
            let chain = self.chain(first)?;
            let end = (chain.len() * self.meta.unit_size()) as u64;
            zero_span(&mut self.io, &self.meta, &chain, old_size, (end - old_size) as usize)?;
        }
        entry.first_unit = first;
        entry.size = new_size;
        Ok(())
    }

    fn ensure_writable(&self) -> FsResult {
        crate::ensure!(!self.read_only, FsError::ReadOnly);
        Ok(())
    }
}

impl<IO: RimIO> FsVolume for ExFatVolume<IO> {
    fn identifier(&self) -> &'static str {
        "exfat"
    }

    fn root(&self) -> DirEntry {
        DirEntry::root(self.meta.root_unit())
    }

    fn label(&self) -> Option<String> {
        self.label.clone()
    }

    fn usage(&self) -> VolumeUsage {
        let count = self.meta.cluster_count as usize;
        VolumeUsage {
            unit_size: self.meta.unit_size(),
            total_units: count as u64,
            free_units: (count - self.bitmap.count_ones_in_range(0, count)) as u64,
        }
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn list_dir(
        &mut self,
        dir: &DirEntry,
        mask: AttrFlags,
        exclude: bool,
    ) -> FsResult<Vec<DirEntry>> {
        let mut out = self.entries_of(dir)?;
        out.retain(|e| e.passes(mask, exclude));
        Ok(out)
    }

    fn lookup(&mut self, dir: &DirEntry, name: &str) -> FsResult<Option<DirEntry>> {
        crate::ensure!(dir.is_dir(), FsError::NotADirectory);
        let parent = dir.data();
        let (_, data) = self.load_dir(&parent)?;
        let found = EntrySets::new(&data).find(|s| names_equal(&s.name(), name));
        Ok(found.map(|s| self.to_dir_entry(s, parent)))
    }

    fn create(
        &mut self,
        parent_path: &str,
        name: &str,
        attr: &FileAttributes,
        initial_size: u64,
    ) -> FsResult<DirEntry> {
        let mut parent = prepare_create(self, parent_path, name)?;
        crate::ensure!(name_len_ok(name), FsError::InvalidInput("name longer than 255 characters"));

        let is_dir = attr.dir;
        let size = if is_dir {
            self.meta.unit_size() as u64
        } else {
            initial_size
        };
        let clusters = self.meta.units_for(size);
        let chain = if clusters > 0 {
            self.allocator().allocate(clusters)?
        } else {
            Vec::new()
        };
        let first = chain.first().copied().unwrap_or(0);

        let mut raw_attr = to_exfat_attr(attr);
        if is_dir {
            raw_attr |= ExFatAttributes::DIRECTORY.bits();
        }
        let ts = to_exfat(attr.modified.unwrap_or_else(now_utc));
        let set = ExFatEntries::new(name, raw_attr, first, size, ts);

        let placed = zero_units(&mut self.io, &self.meta, &chain)
            .map_err(FsError::from)
            .and_then(|_| self.insert_set(&mut parent, &set.to_bytes()));
        let offset = match placed {
            Ok(offset) => offset,
            Err(e) => {
                if first != 0 {
                    self.allocator().free(first)?;
                }
                return Err(e);
            }
        };

        log::debug!(
            "created {} {name:?} ({} record(s), first cluster {first})",
            if is_dir { "directory" } else { "file" },
            set.record_count()
        );
        let found = DecodedSet {
            records: set.record_count() as u32,
            set,
            offset,
        };
        Ok(self.to_dir_entry(found, parent.data()))
    }

    fn remove(&mut self, entry: &DirEntry) -> FsResult {
        self.ensure_writable()?;
        let Some(loc) = entry.location else {
            return Err(FsError::InvalidInput("the root directory cannot be deleted"));
        };
        self.check_location(entry)?;
        if entry.is_dir() {
            crate::ensure!(
                self.entries_of(entry)?.is_empty(),
                FsError::InvalidInput("directory not empty")
            );
        }

        if entry.first_unit != 0 {
            if entry.contiguous {
                let count = self.meta.units_for(entry.size);
                self.allocator().release_run(entry.first_unit, count);
            } else {
                self.allocator().free(entry.first_unit)?;
            }
        }

        let (units, mut raw) = self.load_set(&loc)?;
        mark_unused(&mut raw);
        write_span(&mut self.io, &self.meta, &units, loc.offset, &raw)?;
        log::debug!("removed {:?} ({} record(s))", entry.name, loc.records);
        Ok(())
    }

    fn read(&mut self, entry: &DirEntry, offset: u64, buf: &mut [u8]) -> FsResult<usize> {
        crate::ensure!(!entry.is_dir(), FsError::NotAFile);
        if offset >= entry.size {
            return Ok(0);
        }
        let n = ((entry.size - offset) as usize).min(buf.len());
        let units = self.units_of(&entry.data())?;
        read_span(&mut self.io, &self.meta, &units, offset, &mut buf[..n])?;
        Ok(n)
    }

    fn write(&mut self, entry: &mut DirEntry, offset: u64, data: &[u8]) -> FsResult<usize> {
        self.ensure_writable()?;
        crate::ensure!(entry.is_file(), FsError::NotAFile);
        if data.is_empty() {
            return Ok(0);
        }
        let end = offset
            .checked_add(data.len() as u64)
            .ok_or(FsError::InvalidInput("write past the maximum file size"))?;
        self.check_location(entry)?;
        if end > entry.size {
            self.resize_stream(entry, end)?;
        }
        let units = self.units_of(&entry.data())?;
        write_span(&mut self.io, &self.meta, &units, offset, data)?;
        self.store_entry(entry)?;
        Ok(data.len())
    }

    fn resize(&mut self, entry: &mut DirEntry, new_size: u64) -> FsResult {
        self.ensure_writable()?;
        crate::ensure!(entry.is_file(), FsError::NotAFile);
        if new_size == entry.size {
            return Ok(());
        }
        self.check_location(entry)?;
        self.resize_stream(entry, new_size)?;
        self.store_entry(entry)
    }

    fn flush(&mut self) -> FsResult {
        if self.read_only {
            return Ok(());
        }
        self.fat.store(&mut self.io, &self.meta)?;
        for (first, len) in self.bitmap_chains.clone() {
            let units = self.chain(first)?;
            let len = (len as usize).min(self.bitmap.len());
            write_span(&mut self.io, &self.meta, &units, 0, &self.bitmap[..len])?;
        }
        self.io.flush()?;
        Ok(())
    }

    fn unmount(self: Box<Self>) -> FsResult {
        (*self).close().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::formatter::FsFormatter;
    use crate::fs::exfat::formatter::ExFatFormatter;

    fn image(meta: &ExFatMeta) -> Vec<u8> {
        let mut disk = vec![0u8; meta.size_bytes() as usize];
        let mut io = MemRimIO::new(&mut disk);
        ExFatFormatter::new(&mut io, meta).format(false).unwrap();
        disk
    }

    fn small() -> Vec<u8> {
        image(&ExFatMeta::new(16 * 1024 * 1024, Some("Store")).unwrap())
    }

    #[test]
    fn test_mount_reads_label_and_sets_dirty() {
        let mut disk = small();
        {
            let vol = ExFatVolume::mount(MemRimIO::new(&mut disk), MountOptions::new()).unwrap();
            assert_eq!(vol.label().as_deref(), Some("Store"));
            assert!(vol.meta().is_dirty());
            vol.close().unwrap();
        }
        assert_eq!(disk[106] & EXFAT_FLAG_VOLUME_DIRTY as u8, 0);

        // Checksum still valid after the flag round trip
        let vol = ExFatVolume::mount(MemRimIO::new(&mut disk), MountOptions::new().read_only(true));
        assert!(vol.is_ok());
    }

    #[test]
    fn test_dirty_flag_kept_when_requested() {
        let mut disk = small();
        let vol = ExFatVolume::mount(
            MemRimIO::new(&mut disk),
            MountOptions::new().clear_dirty_on_close(false),
        )
        .unwrap();
        vol.close().unwrap();
        assert_ne!(disk[106] & EXFAT_FLAG_VOLUME_DIRTY as u8, 0);
    }

    #[test]
    fn test_corrupt_boot_checksum_rejected() {
        let mut disk = small();
        disk[100] ^= 0x01;
        let err = ExFatVolume::mount(MemRimIO::new(&mut disk), MountOptions::new())
            .err()
            .unwrap();
        assert_eq!(err.kind(), FsErrorKind::CorruptVolume);
    }

    #[test]
    fn test_create_list_lookup() {
        let mut disk = small();
        let mut vol = ExFatVolume::mount(MemRimIO::new(&mut disk), MountOptions::new()).unwrap();
        vol.create("~", "Notes.txt", &FileAttributes::new_file(), 0).unwrap();
        let d = vol.create("~", "A directory with a long name", &FileAttributes::new_dir(), 0).unwrap();
        assert_eq!(d.size, 4096);
        assert_eq!(d.location.unwrap().records, 4);

        let root = vol.root();
        let names: Vec<_> = vol
            .list_dir(&root, AttrFlags::empty(), false)
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, ["Notes.txt", "A directory with a long name"]);
        assert!(vol.lookup(&root, "NOTES.TXT").unwrap().is_some());

        let dirs = vol.list_dir(&root, AttrFlags::DIRECTORY, true).unwrap();
        assert_eq!(dirs.len(), 1);
        assert!(vol.list_dir(&d, AttrFlags::empty(), false).unwrap().is_empty());
    }

    #[test]
    fn test_write_read_persisted() {
        let mut disk = small();
        let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        {
            let mut vol =
                ExFatVolume::mount(MemRimIO::new(&mut disk), MountOptions::new()).unwrap();
            vol.create("~", "sub", &FileAttributes::new_dir(), 0).unwrap();
            let mut f = vol.create("~/sub", "blob.bin", &FileAttributes::new_file(), 0).unwrap();
            assert_eq!(vol.write(&mut f, 0, &payload).unwrap(), payload.len());
            vol.close().unwrap();
        }
        let mut vol = ExFatVolume::mount(MemRimIO::new(&mut disk), MountOptions::new()).unwrap();
        let f = vol.open("~/sub/blob.bin").unwrap();
        assert_eq!(f.size, 10_000);
        let mut back = vec![0u8; 10_000];
        assert_eq!(vol.read(&f, 0, &mut back).unwrap(), 10_000);
        assert_eq!(back, payload);
    }

    #[test]
    fn test_directory_grows_and_parent_size_follows() {
        let mut disk = small();
        let mut vol = ExFatVolume::mount(MemRimIO::new(&mut disk), MountOptions::new()).unwrap();
        vol.create("~", "many", &FileAttributes::new_dir(), 0).unwrap();
        // 3 records per set, 128 records per cluster
        for i in 0..50 {
            vol.create("~/many", &format!("f{i:03}"), &FileAttributes::new_file(), 0).unwrap();
        }
        let many = vol.open("~/many").unwrap();
        assert_eq!(many.size, 8192);
        assert!(!many.contiguous);
        assert_eq!(vol.list_dir(&many, AttrFlags::empty(), false).unwrap().len(), 50);
    }

    #[test]
    fn test_long_name_grows_small_cluster_directory() {
        let meta = ExFatMeta::new_custom(16 * 1024 * 1024, None, 7, 1, 512, 512).unwrap();
        let mut disk = image(&meta);
        let long = "x".repeat(255);
        {
            let mut vol =
                ExFatVolume::mount(MemRimIO::new(&mut disk), MountOptions::new()).unwrap();
            let free = vol.usage().free_units;
            vol.create("~", "d", &FileAttributes::new_dir(), 0).unwrap();
            // 15 of the 16 slots of the first cluster
            for i in 0..5 {
                vol.create("~/d", &format!("f{i}"), &FileAttributes::new_file(), 0).unwrap();
            }
            // 19 records need two more clusters
            let f = vol.create("~/d", &long, &FileAttributes::new_file(), 0).unwrap();
            assert_eq!(f.location.unwrap().records, 19);
            assert_eq!(vol.usage().free_units, free - 3);
            vol.close().unwrap();
        }
        let mut vol = ExFatVolume::mount(MemRimIO::new(&mut disk), MountOptions::new()).unwrap();
        let d = vol.open("~/d").unwrap();
        assert_eq!(d.size, 1536);
        assert_eq!(vol.chain(d.first_unit).unwrap().len(), 3);
        assert_eq!(vol.list_dir(&d, AttrFlags::empty(), false).unwrap().len(), 6);
        assert!(vol.lookup(&d, &long).unwrap().is_some());
    }

    #[test]
    fn test_stale_entry_rejected() {
        let mut disk = small();
        let mut vol = ExFatVolume::mount(MemRimIO::new(&mut disk), MountOptions::new()).unwrap();
        let mut a = vol.create("~", "a.txt", &FileAttributes::new_file(), 100).unwrap();
        vol.remove(&a).unwrap();
        let b = vol.create("~", "b.txt", &FileAttributes::new_file(), 100).unwrap();
        assert_eq!(b.location.unwrap().offset, a.location.unwrap().offset);
        let free = vol.usage().free_units;

        assert_eq!(vol.remove(&a).unwrap_err().kind(), FsErrorKind::NotFound);
        assert_eq!(vol.write(&mut a, 0, b"x").unwrap_err().kind(), FsErrorKind::NotFound);
        assert_eq!(vol.resize(&mut a, 0).unwrap_err().kind(), FsErrorKind::NotFound);

        let root = vol.root();
        assert_eq!(vol.lookup(&root, "b.txt").unwrap().unwrap().size, 100);
        assert_eq!(vol.usage().free_units, free);
    }

    #[test]
    fn test_contiguous_stream_is_read_and_materialised() {
        let mut disk = small();
        let mut vol = ExFatVolume::mount(MemRimIO::new(&mut disk), MountOptions::new()).unwrap();
        let mut f = vol.create("~", "c.bin", &FileAttributes::new_file(), 0).unwrap();
        vol.write(&mut f, 0, &[7u8; 8192]).unwrap();

        // Rewrite the stream as NoFatChain and drop the FAT links
        let first = f.first_unit;
        f.contiguous = true;
        vol.store_entry(&f).unwrap();
        vol.fat.set(first, 0);
        vol.fat.set(first + 1, 0);

        let mut f = vol.open("~/c.bin").unwrap();
        assert!(f.contiguous);
        let mut back = vec![0u8; 8192];
        vol.read(&f, 0, &mut back).unwrap();
        assert!(back.iter().all(|&b| b == 7));

        vol.write(&mut f, 8192, &[9u8; 100]).unwrap();
        assert!(!f.contiguous);
        assert_eq!(vol.chain(first).unwrap().len(), 3);
        let f = vol.open("~/c.bin").unwrap();
        assert!(!f.contiguous);
        assert_eq!(f.size, 8292);
    }

    #[test]
    fn test_contiguous_with_clear_bitmap_bit_rejected() {
        let mut disk = small();
        let mut vol = ExFatVolume::mount(MemRimIO::new(&mut disk), MountOptions::new()).unwrap();
        let f = DirEntry {
            name: "x".into(),
            kind: EntryKind::File,
            attr: FileAttributes::new_file(),
            size: 4096,
            first_unit: 100,
            contiguous: true,
            location: None,
        };
        let mut buf = [0u8; 16];
        let err = vol.read(&f, 0, &mut buf).unwrap_err();
        assert_eq!(err, FsError::Cursor(FsCursorError::InvalidCluster(100)));
    }

    #[test]
    fn test_delete_frees_and_hides() {
        let mut disk = small();
        let mut vol = ExFatVolume::mount(MemRimIO::new(&mut disk), MountOptions::new()).unwrap();
        let free = vol.usage().free_units;
        let f = vol.create("~", "tmp.dat", &FileAttributes::new_file(), 10_000).unwrap();
        assert_eq!(vol.usage().free_units, free - 3);
        vol.delete(&f).unwrap();
        assert_eq!(vol.usage().free_units, free);
        let root = vol.root();
        assert!(vol.lookup(&root, "tmp.dat").unwrap().is_none());
    }

    #[test]
    fn test_two_fats_mirror_and_bitmaps() {
        let meta = ExFatMeta::new_custom(16 * 1024 * 1024, None, 3, 2, 512, 4096).unwrap();
        let mut disk = image(&meta);
        {
            let mut vol =
                ExFatVolume::mount(MemRimIO::new(&mut disk), MountOptions::new()).unwrap();
            vol.create("~", "a", &FileAttributes::new_file(), 5000).unwrap();
            vol.close().unwrap();
        }
        let mut io = MemRimIO::new(&mut disk);
        let f0 = FatTable::load(&mut io, &meta, 0).unwrap();
        let f1 = FatTable::load(&mut io, &meta, 1).unwrap();
        assert_eq!(f0.chain(&meta, 6).unwrap(), [6, 7]);
        assert_eq!(f1.chain(&meta, 6).unwrap(), [6, 7]);
        let b0 = io.read_u8_at(meta.unit_offset(2)).unwrap();
        let b1 = io.read_u8_at(meta.unit_offset(3)).unwrap();
        assert_eq!(b0, 0b1111_1111 >> 2);
        assert_eq!(b0, b1);
    }

    #[test]
    fn test_read_only_rejects_mutation() {
        let mut disk = small();
        let before = disk[106];
        let mut vol = ExFatVolume::mount(
            MemRimIO::new(&mut disk),
            MountOptions::new().read_only(true),
        )
        .unwrap();
        let err = vol.create("~", "x", &FileAttributes::new_file(), 0).unwrap_err();
        assert_eq!(err, FsError::ReadOnly);
        vol.close().unwrap();
        assert_eq!(disk[106], before);
    }
}
