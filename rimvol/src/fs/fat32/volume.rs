// SPDX-License-Identifier: MIT

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;

use rimio::prelude::*;
use zerocopy::{FromBytes, IntoBytes};

use crate::core::allocator::FsAllocator;
use crate::core::attr::{AttrFlags, FileAttributes};
use crate::core::entry::{DataRef, DirEntry, EntryKind, EntryLocation};
use crate::core::errors::*;
use crate::core::meta::FsMeta;
use crate::core::options::MountOptions;
use crate::core::resolver::prepare_create;
use crate::core::span::{read_span, write_span, zero_span, zero_units};
use crate::core::table::FatTable;
use crate::core::utils::time::{now_utc, to_fat};
use crate::core::volume::{FsVolume, VolumeUsage};
use crate::fs::fat32::{
    allocator::Fat32Allocator, attr::*, constant::*, dir::*, meta::Fat32Meta, types::*, utils::*,
};

const MAX_FILE_SIZE: u64 = u32::MAX as u64;

/// Mounted FAT32 volume.
///
/// The active FAT is cached at mount and written back to every copy on
/// [`FsVolume::flush`] and [`Fat32Volume::close`].
pub struct Fat32Volume<IO: RimIO> {
    io: IO,
    meta: Fat32Meta,
    vbr: Fat32Vbr,
    fat: FatTable,
    read_only: bool,
    label: Option<String>,
}

impl<IO: RimIO> Fat32Volume<IO> {
    /// Decodes the boot sector and loads the active FAT.
    pub fn mount(mut io: IO, options: MountOptions) -> FsResult<Self> {
        let vbr: Fat32Vbr = io.read_struct(FAT_VBR_SECTOR * FAT_SECTOR_SIZE as u64)?;
        let meta = Fat32Meta::from_vbr(&vbr)?;
        let fat = FatTable::load(&mut io, &meta, meta.active_fat())?;

        let fsinfo: Fat32FsInfo = io.read_struct(meta.sector_offset(meta.fsinfo_sector as u64))?;
        if !fsinfo.is_valid() {
            log::warn!("FSInfo sector has invalid signatures; free count will be recomputed");
        }

        let mut vol = Self {
            io,
            meta,
            vbr,
            fat,
            read_only: options.read_only,
            label: None,
        };
        vol.label = vol.read_label()?;

        log::info!(
            "mounted FAT32: {} clusters of {} bytes, active FAT #{}, {}",
            vol.meta.cluster_count,
            vol.meta.bytes_per_cluster,
            vol.meta.active_fat(),
            if vol.read_only { "read-only" } else { "read-write" }
        );
        Ok(vol)
    }

    /// Flushes every cache and returns the underlying I/O.
    pub fn close(mut self) -> FsResult<IO> {
        if !self.read_only {
            self.flush()?;
            let boot = self.vbr.as_bytes();
            self.io.write_at(self.meta.sector_offset(FAT_VBR_SECTOR), boot)?;
            self.io.write_at(
                self.meta.sector_offset(self.meta.backup_boot_sector as u64),
                boot,
            )?;
            self.io.flush()?;
        }
        log::info!("closed FAT32 volume");
        Ok(self.io)
    }

    #[inline]
    pub fn meta(&self) -> &Fat32Meta {
        &self.meta
    }

    fn allocator(&mut self) -> Fat32Allocator<'_> {
        Fat32Allocator::new(&self.meta, &mut self.fat)
    }

    fn chain(&self, start: u32) -> FsResult<Vec<u32>> {
        Ok(self.fat.chain(&self.meta, start)?)
    }

    /// Whole directory data plus the clusters it lives in.
    fn load_dir(&mut self, dir: &DataRef) -> FsResult<(Vec<u32>, Vec<u8>)> {
        let units = self.chain(dir.first_unit)?;
        let mut data = vec![0u8; units.len() * self.meta.unit_size()];
        read_span(&mut self.io, &self.meta, &units, 0, &mut data)?;
        Ok((units, data))
    }

    fn read_label(&mut self) -> FsResult<Option<String>> {
        let root = self.root().data();
        let (_, data) = self.load_dir(&root)?;
        let raw = DirRecords::new(&data)
            .find(|r| r.entry.is_volume_label())
            .map(|r| r.entry.name)
            .unwrap_or(self.meta.volume_label);

        if &raw == FAT_VOLUME_LABEL_EMPTY {
            return Ok(None);
        }
        let end = raw.iter().rposition(|&b| b != b' ').map_or(0, |p| p + 1);
        Ok(Some(raw[..end].iter().map(|&b| b as char).collect()))
    }

    fn to_dir_entry(&self, rec: DecodedRecord, parent: DataRef) -> DirEntry {
        let e = &rec.entry;
        let mut attr = from_fat_attr(e.attr);
        attr.created = e.created();
        attr.modified = e.modified();
        attr.accessed = e.accessed();

        let is_dir = e.is_dir();
        DirEntry {
            name: rec.name,
            kind: if is_dir { EntryKind::Directory } else { EntryKind::File },
            attr,
            size: if is_dir { 0 } else { e.file_size as u64 },
            first_unit: e.first_cluster(),
            contiguous: false,
            location: Some(EntryLocation {
                parent,
                offset: rec.offset,
                records: rec.records,
            }),
        }
    }

    /// Directory records that are visible entries (no dots, no label).
    fn entries_of(&mut self, dir: &DirEntry) -> FsResult<Vec<DirEntry>> {
        crate::ensure!(dir.is_dir(), FsError::NotADirectory);
        let parent = dir.data();
        let (_, data) = self.load_dir(&parent)?;
        Ok(DirRecords::new(&data)
            .filter(|r| !r.entry.is_dot() && !r.entry.is_volume_label())
            .map(|r| self.to_dir_entry(r, parent))
            .collect())
    }

    /// Stores `bytes` (whole records) in the first free run of `parent`,
    /// growing the directory by whole clusters when no run fits.
    fn insert_records(&mut self, parent: &DataRef, bytes: &[u8]) -> FsResult<u64> {
        let count = bytes.len() / FAT_DIR_ENTRY_SIZE;
        let (mut units, mut data) = self.load_dir(parent)?;

        let at = match find_free_run(&data, count) {
            Some(at) => at,
            None => {
                let cs = self.meta.unit_size();
                let tail_free = data.len() - end_offset(&data);
                let missing = (count * FAT_DIR_ENTRY_SIZE).saturating_sub(tail_free);
                let new_units = missing.div_ceil(cs);
                crate::ensure!(
                    (data.len() + new_units * cs) / FAT_DIR_ENTRY_SIZE <= FAT_MAX_DIR_ENTRIES,
                    FsAllocatorError::OutOfSpace
                );

                let last = *units.last().ok_or(FsError::Other("directory without clusters"))?;
                let added = self.allocator().extend(last, new_units)?;
                zero_units(&mut self.io, &self.meta, &added)?;
                log::debug!("directory {} grown by {new_units} cluster(s)", parent.first_unit);

                units.extend_from_slice(&added);
                data.resize(units.len() * cs, 0);
                find_free_run(&data, count).ok_or(FsError::Other("no free run after growth"))?
            }
        };

        let end = end_offset(&data);
        write_span(&mut self.io, &self.meta, &units, at as u64, bytes)?;

        // Keep an end marker after records written past the old one
        let next = at + bytes.len();
        if at + bytes.len() > end && next < data.len() {
            write_span(&mut self.io, &self.meta, &units, next as u64, &[FAT_ENTRY_END_OF_DIR])?;
        }
        Ok(at as u64)
    }

    /// Reads the short record behind `entry`.
    fn load_short(&mut self, loc: &EntryLocation) -> FsResult<(Vec<u32>, u64, Fat32Entry)> {
        let units = self.chain(loc.parent.first_unit)?;
        let at = loc.offset + (loc.records as u64 - 1) * FAT_DIR_ENTRY_SIZE as u64;
        let mut raw = [0u8; FAT_DIR_ENTRY_SIZE];
        read_span(&mut self.io, &self.meta, &units, at, &mut raw)?;
        let short = Fat32Entry::read_from_bytes(&raw[..])
            .map_err(|_| FsParsingError::Invalid("short directory record"))?;
        Ok((units, at, short))
    }

    /// Fails with `NotFound` unless the records behind `entry` still carry
    /// its name and first cluster.
    fn check_location(&mut self, entry: &DirEntry) -> FsResult {
        let Some(loc) = entry.location else {
            return Ok(());
        };
        let units = self.chain(loc.parent.first_unit)?;
        let mut raw = vec![0u8; loc.records as usize * FAT_DIR_ENTRY_SIZE];
        read_span(&mut self.io, &self.meta, &units, loc.offset, &mut raw)?;
        let live = DirRecords::new(&raw).next().is_some_and(|r| {
            r.offset == 0
                && r.records == loc.records
                && names_match(&r.name, &entry.name)
                && r.entry.first_cluster() == entry.first_unit
        });
        if !live {
            log::warn!("stale entry {:?} at offset {}", entry.name, loc.offset);
            return Err(FsError::not_found(&entry.name));
        }
        Ok(())
    }

    /// Persists size and first cluster of `entry` into its short record.
    fn store_entry(&mut self, entry: &DirEntry) -> FsResult {
        let Some(loc) = entry.location else {
            return Ok(());
        };
        let (units, at, mut short) = self.load_short(&loc)?;
        short.set_first_cluster(entry.first_unit);
        if !entry.is_dir() {
            short.file_size = entry.size as u32;
        }
        short.set_modified(to_fat(now_utc()));
        write_span(&mut self.io, &self.meta, &units, at, short.as_bytes())?;
        Ok(())
    }

    /// Resizes the chain to cover `new_size`; new bytes are zeroed.
    fn resize_chain(&mut self, entry: &mut DirEntry, new_size: u64) -> FsResult {
        crate::ensure!(
            new_size <= MAX_FILE_SIZE,
            FsError::InvalidInput("FAT32 files are limited to 4 GiB - 1")
        );
        let old_size = entry.size;
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

    /// Zeroes fresh clusters; a new directory also gets its `.` / `..` records.
    fn seed_units(&mut self, chain: &[u32], dotdot: Option<u32>, ts: (u16, u16, u8)) -> FsResult {
        zero_units(&mut self.io, &self.meta, chain)?;
        if let (Some(up), Some(&first)) = (dotdot, chain.first()) {
            let mut buf = Vec::with_capacity(2 * FAT_DIR_ENTRY_SIZE);
            Fat32Entry::dot(FAT_DOT_NAME, first, ts).to_raw_buffer(&mut buf);
            Fat32Entry::dot(FAT_DOTDOT_NAME, up, ts).to_raw_buffer(&mut buf);
            write_span(&mut self.io, &self.meta, chain, 0, &buf)?;
        }
        Ok(())
    }

    fn ensure_writable(&self) -> FsResult {
        crate::ensure!(!self.read_only, FsError::ReadOnly);
        Ok(())
    }
}

/// Case-insensitive name comparison used by lookups.
fn names_match(a: &str, b: &str) -> bool {
    a.chars()
        .flat_map(char::to_uppercase)
        .eq(b.chars().flat_map(char::to_uppercase))
}

impl<IO: RimIO> FsVolume for Fat32Volume<IO> {
    fn identifier(&self) -> &'static str {
        "fat32"
    }

    fn root(&self) -> DirEntry {
        DirEntry::root(self.meta.root_unit())
    }

    fn label(&self) -> Option<String> {
        self.label.clone()
    }

    fn usage(&self) -> VolumeUsage {
        VolumeUsage {
            unit_size: self.meta.unit_size(),
            total_units: self.meta.total_units() as u64,
            free_units: self.fat.free_count(&self.meta) as u64,
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
        let found = DirRecords::new(&data)
            .filter(|r| !r.entry.is_dot() && !r.entry.is_volume_label())
            .find(|r| names_match(&r.name, name) || names_match(&decode_sfn(&r.short(), 0), name));
        Ok(found.map(|r| self.to_dir_entry(r, parent)))
    }

    fn create(
        &mut self,
        parent_path: &str,
        name: &str,
        attr: &FileAttributes,
        initial_size: u64,
    ) -> FsResult<DirEntry> {
        let parent = prepare_create(self, parent_path, name)?;
        crate::ensure!(lfn_len_ok(name), FsError::InvalidInput("name longer than 255 characters"));
        let is_dir = attr.dir;
        let size = if is_dir { 0 } else { initial_size };
        crate::ensure!(
            size <= MAX_FILE_SIZE,
            FsError::InvalidInput("FAT32 files are limited to 4 GiB - 1")
        );

        let parent_ref = parent.data();
        let (_, data) = self.load_dir(&parent_ref)?;
        let taken = short_names(&data);

        let (short, nt, long) = match exact_short_name(name) {
            Some((short, nt)) if !taken.contains(&short) => (short, nt, false),
            _ => {
                let short = unique_short_name(name, &taken)
                    .ok_or(FsError::InvalidInput("no free short name"))?;
                (short, 0, true)
            }
        };

        let clusters = if is_dir { 1 } else { self.meta.units_for(size) };
        let chain = if clusters > 0 {
            self.allocator().allocate(clusters)?
        } else {
            Vec::new()
        };
        let first = chain.first().copied().unwrap_or(0);
        let ts = to_fat(attr.modified.unwrap_or_else(now_utc));

        let up = if parent.is_root() { 0 } else { parent.first_unit };
        let seeded = self.seed_units(&chain, is_dir.then_some(up), ts);

        let mut raw_attr = to_fat_attr(attr);
        if is_dir {
            raw_attr |= Fat32Attributes::DIRECTORY.bits();
        }
        let mut entry = Fat32Entry::new(short, raw_attr, first, size as u32, ts);
        entry.nt_reserved = nt;
        let records = Fat32Entries {
            lfn: if long { lfn_entries(name, &short) } else { Vec::new() },
            entry,
        };

        let placed = seeded.and_then(|_| self.insert_records(&parent_ref, &records.to_bytes()));
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
            records.record_count()
        );

        let rec = DecodedRecord {
            name: String::from(name),
            entry,
            offset,
            records: records.record_count() as u32,
        };
        Ok(self.to_dir_entry(rec, parent_ref))
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
            self.allocator().free(entry.first_unit)?;
        }

        let units = self.chain(loc.parent.first_unit)?;
        for i in 0..loc.records as u64 {
            let at = loc.offset + i * FAT_DIR_ENTRY_SIZE as u64;
            write_span(&mut self.io, &self.meta, &units, at, &[FAT_ENTRY_DELETED])?;
        }
        log::debug!("removed {:?} ({} record(s))", entry.name, loc.records);
        Ok(())
    }

    fn read(&mut self, entry: &DirEntry, offset: u64, buf: &mut [u8]) -> FsResult<usize> {
        crate::ensure!(!entry.is_dir(), FsError::NotAFile);
        if offset >= entry.size {
            return Ok(0);
        }
        let n = ((entry.size - offset) as usize).min(buf.len());
        let chain = self.chain(entry.first_unit)?;
        read_span(&mut self.io, &self.meta, &chain, offset, &mut buf[..n])?;
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
            self.resize_chain(entry, end)?;
        }
        let chain = self.chain(entry.first_unit)?;
        write_span(&mut self.io, &self.meta, &chain, offset, data)?;
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
        self.resize_chain(entry, new_size)?;
        self.store_entry(entry)
    }

    fn flush(&mut self) -> FsResult {
        if self.read_only {
            return Ok(());
        }
        self.fat.store(&mut self.io, &self.meta)?;
        let free = self.fat.free_count(&self.meta) as u32;
        let fsinfo = Fat32FsInfo::new(free, FAT_FSINFO_UNKNOWN);
        self.io.write_struct(
            self.meta.sector_offset(self.meta.fsinfo_sector as u64),
            &fsinfo,
        )?;
        self.io.flush()?;
        Ok(())
    }

    fn unmount(self: Box<Self>) -> FsResult {
        (*self).close().map(|_| ())
    }
}
