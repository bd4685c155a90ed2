// SPDX-License-Identifier: MIT

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;

use rimio::prelude::*;

use crate::core::attr::{AttrFlags, FileAttributes};
use crate::core::entry::{DataRef, DirEntry, EntryLocation};
use crate::core::errors::*;
use crate::core::meta::FsMeta;
use crate::core::options::{ErrorPolicy, MountOptions};
use crate::core::resolver::prepare_create;
use crate::core::span::{read_span, write_span};
use crate::core::utils::time::{now_utc, to_unix};
use crate::core::volume::{FsVolume, VolumeUsage};
use crate::fs::ext2::{
    allocator::Ext2Allocator,
    attr::{from_inode, to_mode},
    blockmap,
    constant::*,
    dir::{self, DirRecord, DirRecords},
    meta::Ext2Meta,
    types::*,
};

/// Mounted ext2 volume.
///
/// Group descriptors and bitmaps are cached at mount and written back on
/// [`FsVolume::flush`]. Inodes and directory blocks go straight to disk.
/// A writable mount clears `EXT2_VALID_FS` in the superblock and sets it
/// again at [`Ext2Volume::close`] when the volume was clean beforehand.
pub struct Ext2Volume<IO: RimIO> {
    io: IO,
    meta: Ext2Meta,
    sb: Ext2Superblock,
    alloc: Ext2Allocator,
    read_only: bool,
    /// This mount cleared the valid flag.
    marked: bool,
    clear_dirty_on_close: bool,
}

impl<IO: RimIO> Ext2Volume<IO> {
    /// Decodes the superblock, loads the group descriptors and bitmaps, and
    /// applies the error policy to a volume left in an unclean state.
    pub fn mount(mut io: IO, options: MountOptions) -> FsResult<Self> {
        let sb: Ext2Superblock = io.read_struct(EXT2_SUPERBLOCK_OFFSET)?;
        let meta = Ext2Meta::from_superblock(&sb)?;
        let alloc = Ext2Allocator::load(&mut io, &meta)?;

        let mut read_only = options.read_only;
        let unknown = meta.unknown_ro_compat();
        if unknown != 0 && !read_only {
            log::warn!("unsupported read-only features {unknown:#x}, mounting read-only");
            read_only = true;
        }

        let clean = sb.is_clean();
        if !clean {
            let policy = options
                .error_policy
                .unwrap_or_else(|| ErrorPolicy::from_raw(sb.s_errors));
            match policy {
                ErrorPolicy::Panic => {
                    log::error!("ext2 volume not cleanly unmounted, refusing to mount");
                    return Err(FsError::DirtyVolume);
                }
                ErrorPolicy::ReadOnly => {
                    log::warn!("ext2 volume not cleanly unmounted, mounting read-only");
                    read_only = true;
                }
                ErrorPolicy::Continue => {
                    log::warn!("ext2 volume not cleanly unmounted");
                }
            }
        }

        let mut vol = Self {
            io,
            meta,
            sb,
            alloc,
            read_only,
            marked: false,
            clear_dirty_on_close: options.clear_dirty_on_close,
        };

        if !vol.read_only {
            let (count, max) = (vol.sb.s_mnt_count, vol.sb.s_max_mnt_count);
            if max != EXT2_NO_MAX_MOUNT_COUNT && (max as i16) > 0 && count >= max {
                log::warn!("maximal mount count reached ({count}/{max}), a check is recommended");
            }
            vol.sb.s_mnt_count = count.wrapping_add(1);
            vol.sb.s_mtime = to_unix(now_utc());
            vol.sb.s_state = vol.sb.s_state & !EXT2_VALID_FS;
            vol.write_superblock()?;
            vol.marked = clean;
        }

        log::info!(
            "mounted ext2 rev {}: {} blocks of {} bytes, {} group(s), {}",
            vol.meta.revision,
            vol.meta.block_count,
            vol.meta.block_size,
            vol.meta.group_count,
            if vol.read_only { "read-only" } else { "read-write" }
        );
        Ok(vol)
    }

    /// Flushes the caches, marks the volume clean when this mount marked it
    /// in use, and returns the underlying I/O.
    pub fn close(mut self) -> FsResult<IO> {
        if !self.read_only {
            self.flush()?;
            if self.marked && self.clear_dirty_on_close {
                self.sb.s_state = self.sb.s_state | EXT2_VALID_FS;
                self.write_superblock()?;
            }
            self.io.flush()?;
        }
        log::info!("closed ext2 volume");
        Ok(self.io)
    }

    #[inline]
    pub fn meta(&self) -> &Ext2Meta {
        &self.meta
    }

    #[inline]
    pub fn superblock(&self) -> &Ext2Superblock {
        &self.sb
    }

    fn write_superblock(&mut self) -> FsResult {
        self.io.write_struct(EXT2_SUPERBLOCK_OFFSET, &self.sb)?;
        Ok(())
    }

    fn ensure_writable(&self) -> FsResult {
        crate::ensure!(!self.read_only, FsError::ReadOnly);
        Ok(())
    }

    #[inline]
    fn block_size(&self) -> usize {
        self.meta.unit_size()
    }

    pub fn read_inode(&mut self, number: u32) -> FsResult<Ext2Inode> {
        let offset = self.alloc.inode_offset(&self.meta, number)?;
        Ok(self.io.read_struct(offset)?)
    }

    fn write_inode(&mut self, number: u32, inode: &Ext2Inode) -> FsResult {
        let offset = self.alloc.inode_offset(&self.meta, number)?;
        self.io.write_struct(offset, inode)?;
        Ok(())
    }

    /// First block of the group holding `inode`, where its data should go.
    fn goal_for(&self, inode: u32) -> u32 {
        let (group, _) = self.meta.inode_position(inode);
        self.meta.group_start(group)
    }

    /// Physical blocks of the first `count` logical blocks of `inode`.
    fn units_of(&mut self, inode: &Ext2Inode, count: usize) -> FsResult<Vec<u32>> {
        blockmap::collect(&mut self.io, &self.meta, &inode.blocks(), count)
    }

    /// Inode, blocks and raw contents of directory `number`.
    fn load_dir(&mut self, number: u32) -> FsResult<(Ext2Inode, Vec<u32>, Vec<u8>)> {
        let inode = self.read_inode(number)?;
        crate::ensure!(inode.is_dir(), FsError::NotADirectory);
        let count = self.meta.units_for(inode.size(false));
        let units = self.units_of(&inode, count)?;
        let mut data = vec![0u8; count * self.block_size()];
        read_span(&mut self.io, &self.meta, &units, 0, &mut data)?;
        Ok((inode, units, data))
    }

    /// Writes back the directory block holding byte `at` of `data`.
    fn store_dir_block(&mut self, units: &[u32], data: &[u8], at: usize) -> FsResult {
        let bs = self.block_size();
        let start = at / bs * bs;
        write_span(&mut self.io, &self.meta, units, start as u64, &data[start..start + bs])?;
        Ok(())
    }

    fn to_dir_entry(&self, rec: &DirRecord, inode: &Ext2Inode, parent: DataRef) -> DirEntry {
        DirEntry {
            name: rec.name.clone(),
            kind: inode.kind(),
            attr: from_inode(inode, &rec.name),
            size: inode.size(self.meta.is_large_file()),
            first_unit: rec.inode,
            contiguous: false,
            location: Some(EntryLocation {
                parent,
                offset: rec.offset as u64,
                records: 1,
            }),
        }
    }

    /// Entry for `rec`, or `None` when it points outside the inode range.
    fn resolve_record(&mut self, rec: &DirRecord, parent: DataRef) -> FsResult<Option<DirEntry>> {
        if !self.meta.is_valid_inode(rec.inode) {
            log::warn!("record {:?} points at invalid inode {}", rec.name, rec.inode);
            return Ok(None);
        }
        let inode = self.read_inode(rec.inode)?;
        Ok(Some(self.to_dir_entry(rec, &inode, parent)))
    }

    fn records_of(&mut self, dir: &DirEntry) -> FsResult<(DataRef, Vec<DirRecord>)> {
        crate::ensure!(dir.is_dir(), FsError::NotADirectory);
        let (_, _, data) = self.load_dir(dir.first_unit)?;
        let parent = DataRef {
            first_unit: dir.first_unit,
            size: data.len() as u64,
            contiguous: false,
        };
        let records = DirRecords::new(&data, self.block_size(), self.meta.has_filetype())
            .filter(|r| !r.is_dot())
            .collect();
        Ok((parent, records))
    }

    fn entries_of(&mut self, dir: &DirEntry) -> FsResult<Vec<DirEntry>> {
        let (parent, records) = self.records_of(dir)?;
        let mut out = Vec::with_capacity(records.len());
        for rec in &records {
            out.extend(self.resolve_record(rec, parent)?);
        }
        Ok(out)
    }

    /// Adds a record for `inode` to directory `parent`, appending a block
    /// when every block is full. Returns the record offset and the
    /// directory size.
    fn link(&mut self, parent: u32, name: &str, inode: u32, file_type: u8) -> FsResult<(u64, u64)> {
        let bs = self.block_size();
        let filetype = self.meta.has_filetype();
        let (mut dir_inode, mut units, mut data) = self.load_dir(parent)?;

        let at = match dir::insert_record(&mut data, bs, filetype, inode, name, file_type) {
            Some(at) => at,
            None => {
                let index = units.len() as u64;
                let mut blocks = dir_inode.blocks();
                let goal = units.iter().rev().find(|&&u| u != 0).map_or(self.goal_for(parent), |u| u + 1);
                let added = blockmap::map_range(
                    &mut self.io,
                    &self.meta,
                    &mut self.alloc,
                    &mut blocks,
                    index,
                    index + 1,
                    goal,
                )?;
                units.push(blockmap::translate(&mut self.io, &self.meta, &blocks, index)?);
                data.extend_from_slice(&dir::empty_dir_block(bs));

                dir_inode.set_blocks(blocks);
                dir_inode.add_blocks(added as i64, self.meta.block_size);
                dir_inode.set_size(data.len() as u64, false);
                self.write_inode(parent, &dir_inode)?;
                log::debug!("directory {parent} grown to {} block(s)", units.len());

                dir::insert_record(&mut data, bs, filetype, inode, name, file_type)
                    .ok_or(FsError::Other("no room in a fresh directory block"))?
            }
        };
        self.store_dir_block(&units, &data, at)?;
        Ok((at as u64, data.len() as u64))
    }

    /// Drops the record of `entry` from its parent. The record must still
    /// point at the entry's inode.
    /// Fails with `NotFound` unless the record behind `entry` still names
    /// its inode under the same name.
    fn check_location(&mut self, entry: &DirEntry) -> FsResult {
        let Some(loc) = entry.location else {
            return Ok(());
        };
        let bs = self.block_size();
        let filetype = self.meta.has_filetype();
        let (_, _, data) = self.load_dir(loc.parent.first_unit)?;

        let offset = loc.offset as usize;
        let live = DirRecords::new(&data, bs, filetype)
            .find(|r| r.offset == offset)
            .is_some_and(|r| r.inode == entry.first_unit && r.name == entry.name);
        if !live {
            log::warn!("stale entry {:?} at offset {offset}", entry.name);
            return Err(FsError::not_found(&entry.name));
        }
        Ok(())
    }

    fn unlink(&mut self, loc: &EntryLocation) -> FsResult {
        let bs = self.block_size();
        let filetype = self.meta.has_filetype();
        let (_, units, mut data) = self.load_dir(loc.parent.first_unit)?;

        let offset = loc.offset as usize;
        dir::remove_record(&mut data, bs, filetype, offset)
            .ok_or(FsParsingError::Corrupted("directory record chain"))?;
        self.store_dir_block(&units, &data, offset)
    }

    /// Releases every block of `inode` from logical block `keep` on and
    /// keeps `i_blocks` in step.
    fn release_blocks(&mut self, inode: &mut Ext2Inode, keep: u64) -> FsResult {
        let mut blocks = inode.blocks();
        let freed = blockmap::truncate(&mut self.io, &self.meta, &mut self.alloc, &mut blocks, keep)?;
        inode.set_blocks(blocks);
        inode.add_blocks(-(freed as i64), self.meta.block_size);
        Ok(())
    }

    /// Maps logical blocks `from..to` of `inode`. On failure the blocks
    /// past `rollback_to` are released again and the inode is stored as it
    /// stands.
    fn map_blocks(
        &mut self,
        number: u32,
        inode: &mut Ext2Inode,
        from: u64,
        to: u64,
        rollback_to: u64,
    ) -> FsResult {
        let mut blocks = inode.blocks();
        let goal = self.goal_for(number);
        match blockmap::map_range(&mut self.io, &self.meta, &mut self.alloc, &mut blocks, from, to, goal) {
            Ok(added) => {
                inode.set_blocks(blocks);
                inode.add_blocks(added as i64, self.meta.block_size);
                Ok(())
            }
            Err(e) => {
                log::debug!("mapping blocks {from}..{to} of inode {number} failed: {e}");
                blockmap::truncate(&mut self.io, &self.meta, &mut self.alloc, &mut blocks, rollback_to)?;
                let count = blockmap::count_blocks(&mut self.io, &self.meta, &blocks)?;
                inode.set_blocks(blocks);
                inode.i_blocks = count * (self.meta.block_size / EXT2_SECTOR_SIZE);
                self.write_inode(number, inode)?;
                Err(e)
            }
        }
    }

    /// Zeroes the bytes past `size` in its last, partial block so that
    /// growing the file exposes zeros.
    fn zero_tail(&mut self, inode: &Ext2Inode, size: u64) -> FsResult {
        let bs = self.meta.block_size as u64;
        let within = size % bs;
        if within == 0 {
            return Ok(());
        }
        let block = blockmap::translate(&mut self.io, &self.meta, &inode.blocks(), size / bs)?;
        if block != 0 {
            self.io
                .zero_fill(self.meta.unit_offset(block) + within, (bs - within) as usize)?;
        }
        Ok(())
    }

    /// Grows or shrinks the data of inode `number` to `new_size` bytes.
    fn set_file_size(&mut self, number: u32, inode: &mut Ext2Inode, new_size: u64) -> FsResult {
        let large = self.meta.is_large_file();
        let old_size = inode.size(large);
        let new_units = self.meta.units_for(new_size) as u64;
        let old_units = self.meta.units_for(old_size) as u64;

        if new_size > old_size {
            self.zero_tail(inode, old_size)?;
            self.map_blocks(number, inode, old_units, new_units, old_units)?;
        } else if new_size < old_size {
            self.release_blocks(inode, new_units)?;
            self.zero_tail(inode, new_size)?;
        }
        inode.set_size(new_size, large);
        Ok(())
    }

    fn check_file_size(&self, size: u64) -> FsResult {
        crate::ensure!(
            size <= self.meta.max_file_size(),
            FsError::InvalidInput("file size beyond the volume's limit")
        );
        Ok(())
    }

    /// Builds the data of a new inode: one `.`/`..` block for a directory,
    /// `initial_size` zeroed bytes for a file.
    fn populate(
        &mut self,
        number: u32,
        inode: &mut Ext2Inode,
        parent: u32,
        initial_size: u64,
    ) -> FsResult {
        if inode.is_dir() {
            self.map_blocks(number, inode, 0, 1, 0)?;
            let block = inode.blocks()[0];
            let data = dir::new_dir_block(
                self.block_size(),
                self.meta.has_filetype(),
                number,
                parent,
            );
            self.io.write_at(self.meta.unit_offset(block), &data)?;
            inode.set_size(data.len() as u64, false);
        } else if initial_size > 0 {
            let units = self.meta.units_for(initial_size) as u64;
            self.map_blocks(number, inode, 0, units, 0)?;
            inode.set_size(initial_size, self.meta.is_large_file());
        }
        Ok(())
    }

    /// Frees a half-built inode after a failed create.
    fn discard(&mut self, number: u32, inode: &mut Ext2Inode) -> FsResult {
        self.release_blocks(inode, 0)?;
        inode.i_links_count = 0;
        inode.i_dtime = to_unix(now_utc());
        self.write_inode(number, inode)?;
        self.alloc.free_inode(&self.meta, number, inode.is_dir())
    }

    fn adjust_links(&mut self, number: u32, delta: i32) -> FsResult {
        let mut inode = self.read_inode(number)?;
        inode.i_links_count = (inode.i_links_count as i32 + delta).max(0) as u16;
        inode.i_ctime = to_unix(now_utc());
        self.write_inode(number, &inode)
    }
}

impl<IO: RimIO> FsVolume for Ext2Volume<IO> {
    fn identifier(&self) -> &'static str {
        "ext2"
    }

    fn root(&self) -> DirEntry {
        DirEntry::root(self.meta.root_unit())
    }

    fn label(&self) -> Option<String> {
        Some(self.meta.label()).filter(|l| !l.is_empty())
    }

    fn usage(&self) -> VolumeUsage {
        VolumeUsage {
            unit_size: self.meta.unit_size(),
            total_units: self.meta.block_count as u64,
            free_units: self.alloc.free_blocks() as u64,
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
        let (parent, records) = self.records_of(dir)?;
        match records.iter().find(|r| r.name == name) {
            Some(rec) => self.resolve_record(rec, parent),
            None => Ok(None),
        }
    }

    fn create(
        &mut self,
        parent_path: &str,
        name: &str,
        attr: &FileAttributes,
        initial_size: u64,
    ) -> FsResult<DirEntry> {
        let parent = prepare_create(self, parent_path, name)?;
        crate::ensure!(
            name.len() <= EXT2_NAME_LEN,
            FsError::InvalidInput("name longer than 255 bytes")
        );
        let is_dir = attr.dir;
        if !is_dir {
            self.check_file_size(initial_size)?;
        }

        let parent_ino = parent.first_unit;
        let (group, _) = self.meta.inode_position(parent_ino);
        let number = self.alloc.alloc_inode(&self.meta, group, is_dir)?;

        let now = to_unix(now_utc());
        let links = if is_dir { 2 } else { 1 };
        let mut inode = Ext2Inode::new(to_mode(attr), links, now);
        if let Some(ts) = attr.modified {
            inode.i_mtime = to_unix(ts);
        }

        let linked = self
            .populate(number, &mut inode, parent_ino, initial_size)
            .and_then(|_| self.write_inode(number, &inode))
            .and_then(|_| self.link(parent_ino, name, number, inode.dirent_type()));
        let (offset, parent_size) = match linked {
            Ok(placed) => placed,
            Err(e) => {
                self.discard(number, &mut inode)?;
                return Err(e);
            }
        };
        if is_dir {
            self.adjust_links(parent_ino, 1)?;
        }

        log::debug!(
            "created {} {name:?} as inode {number} in directory {parent_ino}",
            if is_dir { "directory" } else { "file" }
        );
        let rec = DirRecord {
            inode: number,
            name: name.into(),
            file_type: inode.dirent_type(),
            offset: offset as usize,
            rec_len: 0,
        };
        let parent_ref = DataRef {
            first_unit: parent_ino,
            size: parent_size,
            contiguous: false,
        };
        Ok(self.to_dir_entry(&rec, &inode, parent_ref))
    }

    fn remove(&mut self, entry: &DirEntry) -> FsResult {
        self.ensure_writable()?;
        let Some(loc) = entry.location else {
            return Err(FsError::InvalidInput("the root directory cannot be deleted"));
        };
        self.check_location(entry)?;
        let number = entry.first_unit;
        let mut inode = self.read_inode(number)?;
        let is_dir = inode.is_dir();
        if is_dir {
            crate::ensure!(
                self.records_of(entry)?.1.is_empty(),
                FsError::InvalidInput("directory not empty")
            );
        }

        self.unlink(&loc)?;
        if is_dir {
            // ".." of the removed directory pointed at the parent
            self.adjust_links(loc.parent.first_unit, -1)?;
            inode.i_links_count = 0;
        } else {
            inode.i_links_count = inode.i_links_count.saturating_sub(1);
        }

        let now = to_unix(now_utc());
        inode.i_ctime = now;
        if inode.i_links_count == 0 {
            self.release_blocks(&mut inode, 0)?;
            inode.i_dtime = now;
            self.write_inode(number, &inode)?;
            self.alloc.free_inode(&self.meta, number, is_dir)?;
        } else {
            self.write_inode(number, &inode)?;
        }
        log::debug!("removed {:?} (inode {number})", entry.name);
        Ok(())
    }

    fn read(&mut self, entry: &DirEntry, offset: u64, buf: &mut [u8]) -> FsResult<usize> {
        crate::ensure!(entry.is_file(), FsError::NotAFile);
        let inode = self.read_inode(entry.first_unit)?;
        let size = inode.size(self.meta.is_large_file());
        if offset >= size || buf.is_empty() {
            return Ok(0);
        }
        let n = ((size - offset) as usize).min(buf.len());
        let count = self.meta.units_for(offset + n as u64);
        let units = self.units_of(&inode, count)?;
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
        self.check_file_size(end)?;
        self.check_location(entry)?;

        let number = entry.first_unit;
        let large = self.meta.is_large_file();
        let mut inode = self.read_inode(number)?;
        let old_size = inode.size(large);
        let old_units = self.meta.units_for(old_size) as u64;
        let bs = self.meta.block_size as u64;

        if end > old_size {
            self.zero_tail(&inode, old_size)?;
        }
        let last = self.meta.units_for(end) as u64;
        self.map_blocks(number, &mut inode, offset / bs, last, old_units.max(offset / bs))?;

        let units = self.units_of(&inode, last as usize)?;
        write_span(&mut self.io, &self.meta, &units, offset, data)?;

        let now = to_unix(now_utc());
        if end > old_size {
            inode.set_size(end, large);
        }
        inode.i_mtime = now;
        inode.i_ctime = now;
        self.write_inode(number, &inode)?;
        entry.size = inode.size(large);
        Ok(data.len())
    }

    fn resize(&mut self, entry: &mut DirEntry, new_size: u64) -> FsResult {
        self.ensure_writable()?;
        crate::ensure!(entry.is_file(), FsError::NotAFile);
        self.check_file_size(new_size)?;
        self.check_location(entry)?;

        let number = entry.first_unit;
        let mut inode = self.read_inode(number)?;
        if inode.size(self.meta.is_large_file()) == new_size {
            entry.size = new_size;
            return Ok(());
        }
        self.set_file_size(number, &mut inode, new_size)?;
        let now = to_unix(now_utc());
        inode.i_mtime = now;
        inode.i_ctime = now;
        self.write_inode(number, &inode)?;
        entry.size = new_size;
        Ok(())
    }

    fn flush(&mut self) -> FsResult {
        if self.read_only {
            return Ok(());
        }
        self.alloc.store(&mut self.io, &self.meta)?;
        self.sb.s_free_blocks_count = self.alloc.free_blocks();
        self.sb.s_free_inodes_count = self.alloc.free_inodes();
        self.sb.s_wtime = to_unix(now_utc());
        self.write_superblock()?;
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
    use crate::fs::ext2::formatter::Ext2Formatter;

    fn image(meta: &Ext2Meta) -> Vec<u8> {
        let mut disk = vec![0u8; meta.size_bytes() as usize];
        let mut io = MemRimIO::new(&mut disk);
        Ext2Formatter::new(&mut io, meta).format(false).unwrap();
        disk
    }

    fn small() -> Vec<u8> {
        image(&Ext2Meta::new(8 * 1024 * 1024, Some("scratch")).unwrap())
    }

    fn state(disk: &[u8]) -> u16 {
        u16::from_le_bytes([disk[1024 + 58], disk[1024 + 59]])
    }

    fn set_state(disk: &mut [u8], value: u16) {
        disk[1024 + 58..1024 + 60].copy_from_slice(&value.to_le_bytes());
    }

    #[test]
    fn test_mount_marks_in_use_and_close_restores() {
        let mut disk = small();
        {
            let vol = Ext2Volume::mount(MemRimIO::new(&mut disk), MountOptions::new()).unwrap();
            assert_eq!(vol.label().as_deref(), Some("scratch"));
            let sb = vol.superblock();
            let (state, count) = (sb.s_state, sb.s_mnt_count);
            assert_eq!(state & EXT2_VALID_FS, 0);
            assert_eq!(count, 1);
            vol.close().unwrap();
        }
        assert_eq!(state(&disk), EXT2_VALID_FS);

        let vol = Ext2Volume::mount(
            MemRimIO::new(&mut disk),
            MountOptions::new().clear_dirty_on_close(false),
        )
        .unwrap();
        vol.close().unwrap();
        assert_eq!(state(&disk) & EXT2_VALID_FS, 0);
    }

    #[test]
    fn test_error_policies_on_unclean_volume() {
        let mut disk = small();
        set_state(&mut disk, 0);

        let err = Ext2Volume::mount(
            MemRimIO::new(&mut disk),
            MountOptions::new().error_policy(ErrorPolicy::Panic),
        )
        .err()
        .unwrap();
        assert_eq!(err, FsError::DirtyVolume);
        assert_eq!(err.kind(), FsErrorKind::DirtyVolume);

        let vol = Ext2Volume::mount(
            MemRimIO::new(&mut disk),
            MountOptions::new().error_policy(ErrorPolicy::ReadOnly),
        )
        .unwrap();
        assert!(vol.is_read_only());
        vol.close().unwrap();

        // Policy recorded on disk: panic
        disk[1024 + 60..1024 + 62].copy_from_slice(&EXT2_ERRORS_PANIC.to_le_bytes());
        assert!(Ext2Volume::mount(MemRimIO::new(&mut disk), MountOptions::new()).is_err());

        // Continue: writable, but not marked clean at close
        let vol = Ext2Volume::mount(
            MemRimIO::new(&mut disk),
            MountOptions::new().error_policy(ErrorPolicy::Continue),
        )
        .unwrap();
        assert!(!vol.is_read_only());
        vol.close().unwrap();
        assert_eq!(state(&disk) & EXT2_VALID_FS, 0);
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut disk = small();
        disk[1024 + 56] = 0;
        let err = Ext2Volume::mount(MemRimIO::new(&mut disk), MountOptions::new())
            .err()
            .unwrap();
        assert_eq!(err.kind(), FsErrorKind::CorruptVolume);
    }

    #[test]
    fn test_root_lists_lost_found() {
        let mut disk = small();
        let mut vol = Ext2Volume::mount(MemRimIO::new(&mut disk), MountOptions::new()).unwrap();
        let root = vol.root();
        assert_eq!(root.size, 0);
        assert!(root.is_dir());
        let entries = vol.list_dir(&root, AttrFlags::empty(), false).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, EXT2_LOST_FOUND_NAME);
        assert_eq!(entries[0].first_unit, 11);
        assert_eq!(entries[0].size, 1024);
        assert_eq!(entries[0].attr.mode, Some(0o700));
    }

    #[test]
    fn test_create_write_read_persisted() {
        let mut disk = small();
        let payload: Vec<u8> = (0..20_000u32).map(|i| (i * 7 % 253) as u8).collect();
        {
            let mut vol = Ext2Volume::mount(MemRimIO::new(&mut disk), MountOptions::new()).unwrap();
            let d = vol.create("~", "docs", &FileAttributes::new_dir(), 0).unwrap();
            assert_eq!(d.size, 1024);
            let mut f = vol.create("~/docs", "report.bin", &FileAttributes::new_file(), 0).unwrap();
            assert_eq!(vol.write(&mut f, 0, &payload).unwrap(), payload.len());
            assert_eq!(f.size, 20_000);
            vol.close().unwrap();
        }
        let mut vol = Ext2Volume::mount(MemRimIO::new(&mut disk), MountOptions::new()).unwrap();
        let f = vol.open("~/docs/report.bin").unwrap();
        assert_eq!(f.size, 20_000);
        let mut back = vec![0u8; 20_000];
        assert_eq!(vol.read(&f, 0, &mut back).unwrap(), 20_000);
        assert_eq!(back, payload);

        // Directory links: "." plus the record in the root, root gains ".."
        let docs = vol.open("~/docs").unwrap();
        let links = vol.read_inode(docs.first_unit).unwrap().i_links_count;
        assert_eq!(links, 2);
        let root_links = vol.read_inode(EXT2_ROOT_INO).unwrap().i_links_count;
        assert_eq!(root_links, 4);
    }

    #[test]
    fn test_write_past_end_leaves_zero_gap() {
        let mut disk = small();
        let mut vol = Ext2Volume::mount(MemRimIO::new(&mut disk), MountOptions::new()).unwrap();
        let mut f = vol.create("~", "gap", &FileAttributes::new_file(), 0).unwrap();
        vol.write(&mut f, 0, b"head").unwrap();
        vol.write(&mut f, 5000, b"tail").unwrap();
        assert_eq!(f.size, 5004);

        let mut back = vec![0xFFu8; 5004];
        vol.read(&f, 0, &mut back).unwrap();
        assert_eq!(&back[..4], b"head");
        assert!(back[4..5000].iter().all(|&b| b == 0));
        assert_eq!(&back[5000..], b"tail");

        // Blocks 1..4 were never mapped: read as a hole
        let inode = vol.read_inode(f.first_unit).unwrap();
        assert_eq!(inode.blocks()[1], 0);
        assert_ne!(inode.blocks()[4], 0);
        let sectors = inode.i_blocks;
        assert_eq!(sectors, 4);
    }

    #[test]
    fn test_resize_grow_shrink_and_idempotent() {
        let mut disk = small();
        let mut vol = Ext2Volume::mount(MemRimIO::new(&mut disk), MountOptions::new()).unwrap();
        let free = vol.usage().free_units;
        let mut f = vol.create("~", "sized", &FileAttributes::new_file(), 3000).unwrap();
        assert_eq!(f.size, 3000);
        assert_eq!(vol.usage().free_units, free - 3);

        vol.write(&mut f, 0, &[0xAB; 3000]).unwrap();
        vol.resize(&mut f, 1500).unwrap();
        assert_eq!(vol.usage().free_units, free - 2);
        vol.resize(&mut f, 4000).unwrap();
        assert_eq!(vol.usage().free_units, free - 4);
        let after = vol.usage().free_units;
        vol.resize(&mut f, 4000).unwrap();
        assert_eq!(vol.usage().free_units, after);

        let mut back = vec![0u8; 4000];
        vol.read(&f, 0, &mut back).unwrap();
        assert!(back[..1500].iter().all(|&b| b == 0xAB));
        assert!(back[1500..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_large_file_uses_indirect_blocks() {
        let mut disk = small();
        let mut vol = Ext2Volume::mount(MemRimIO::new(&mut disk), MountOptions::new()).unwrap();
        let free = vol.usage().free_units;
        // 300 KiB: 12 direct + 256 single + 32 double
        let payload: Vec<u8> = (0..300 * 1024u32).map(|i| (i % 241) as u8).collect();
        let mut f = vol.create("~", "big", &FileAttributes::new_file(), 0).unwrap();
        vol.write(&mut f, 0, &payload).unwrap();
        assert_eq!(vol.usage().free_units, free - 303);

        let mut back = vec![0u8; payload.len()];
        vol.read(&f, 0, &mut back).unwrap();
        assert_eq!(back, payload);

        vol.delete(&f).unwrap();
        assert_eq!(vol.usage().free_units, free);
    }

    #[test]
    fn test_directory_grows_by_a_block() {
        let mut disk = small();
        let mut vol = Ext2Volume::mount(MemRimIO::new(&mut disk), MountOptions::new()).unwrap();
        vol.create("~", "many", &FileAttributes::new_dir(), 0).unwrap();
        // 100-byte names: 108-byte records, nine per block
        for i in 0..20 {
            let name = format!("{i:03}{}", "x".repeat(97));
            vol.create("~/many", &name, &FileAttributes::new_file(), 0).unwrap();
        }
        let many = vol.open("~/many").unwrap();
        assert_eq!(many.size, 3 * 1024);
        assert_eq!(vol.list_dir(&many, AttrFlags::empty(), false).unwrap().len(), 20);
    }

    #[test]
    fn test_delete_recursive_releases_everything() {
        let mut disk = small();
        let mut vol = Ext2Volume::mount(MemRimIO::new(&mut disk), MountOptions::new()).unwrap();
        let (blocks, inodes) = (vol.alloc.free_blocks(), vol.alloc.free_inodes());

        vol.create("~", "tree", &FileAttributes::new_dir(), 0).unwrap();
        vol.create("~/tree", "leaf", &FileAttributes::new_dir(), 0).unwrap();
        vol.create("~/tree/leaf", "data", &FileAttributes::new_file(), 5000).unwrap();
        vol.create("~/tree", "note", &FileAttributes::new_file(), 10).unwrap();

        let tree = vol.open("~/tree").unwrap();
        let root = vol.root();
        assert_eq!(vol.remove(&tree), Err(FsError::InvalidInput("directory not empty")));
        vol.delete(&tree).unwrap();

        assert!(vol.lookup(&root, "tree").unwrap().is_none());
        assert_eq!(vol.alloc.free_blocks(), blocks);
        assert_eq!(vol.alloc.free_inodes(), inodes);
        let used_dirs = vol.alloc.descriptors()[0].bg_used_dirs_count;
        assert_eq!(used_dirs, 2);
        let root_links = vol.read_inode(EXT2_ROOT_INO).unwrap().i_links_count;
        assert_eq!(root_links, 3);

        // Counters reach the disk with the next flush
        vol.flush().unwrap();
        let free = vol.superblock().s_free_blocks_count;
        assert_eq!(free, blocks);
    }

    #[test]
    fn test_stale_entry_rejected() {
        let mut disk = small();
        let mut vol = Ext2Volume::mount(MemRimIO::new(&mut disk), MountOptions::new()).unwrap();
        let mut f = vol.create("~", "once", &FileAttributes::new_file(), 0).unwrap();
        vol.remove(&f).unwrap();
        let err = vol.remove(&f).unwrap_err();
        assert_eq!(err.kind(), FsErrorKind::NotFound);

        // Same inode and slot under another name
        let g = vol.create("~", "twice", &FileAttributes::new_file(), 0).unwrap();
        assert_eq!(g.first_unit, f.first_unit);
        assert_eq!(vol.remove(&f).unwrap_err().kind(), FsErrorKind::NotFound);
        assert_eq!(vol.write(&mut f, 0, b"x").unwrap_err().kind(), FsErrorKind::NotFound);
        assert_eq!(vol.resize(&mut f, 10).unwrap_err().kind(), FsErrorKind::NotFound);
        assert!(vol.open("~/twice").is_ok());
    }

    #[test]
    fn test_write_offset_overflow_rejected() {
        let mut disk = small();
        let mut vol = Ext2Volume::mount(MemRimIO::new(&mut disk), MountOptions::new()).unwrap();
        let mut f = vol.create("~", "f", &FileAttributes::new_file(), 0).unwrap();
        let err = vol.write(&mut f, u64::MAX, &[1]).unwrap_err();
        assert_eq!(err.kind(), FsErrorKind::InvalidInput);
    }

    #[test]
    fn test_path_errors() {
        let mut disk = small();
        let mut vol = Ext2Volume::mount(MemRimIO::new(&mut disk), MountOptions::new()).unwrap();
        vol.create("~", "a", &FileAttributes::new_file(), 0).unwrap();

        let err = vol.open("~/nonexistent").unwrap_err();
        assert_eq!(err, FsError::not_found("nonexistent"));
        let err = vol.open("~/a/b").unwrap_err();
        assert_eq!(err.kind(), FsErrorKind::NotADirectory);
        let err = vol.create("~", "a", &FileAttributes::new_file(), 0).unwrap_err();
        assert_eq!(err, FsError::AlreadyExists("a".into()));
        // Names are case sensitive
        assert!(vol.create("~", "A", &FileAttributes::new_file(), 0).is_ok());
    }

    #[test]
    fn test_out_of_space_rolls_back() {
        let mut disk = small();
        let mut vol = Ext2Volume::mount(MemRimIO::new(&mut disk), MountOptions::new()).unwrap();
        let (blocks, inodes) = (vol.alloc.free_blocks(), vol.alloc.free_inodes());
        let err = vol
            .create("~", "huge", &FileAttributes::new_file(), 64 * 1024 * 1024)
            .unwrap_err();
        assert_eq!(err.kind(), FsErrorKind::OutOfSpace);
        assert_eq!(vol.alloc.free_blocks(), blocks);
        assert_eq!(vol.alloc.free_inodes(), inodes);
        let root = vol.root();
        assert!(vol.lookup(&root, "huge").unwrap().is_none());
    }

    #[test]
    fn test_revision_zero_without_filetype() {
        let meta = Ext2Meta::new_custom(4 * 1024 * 1024, None, None, 1024, 8192, 256, 0).unwrap();
        let mut disk = image(&meta);
        {
            let mut vol = Ext2Volume::mount(MemRimIO::new(&mut disk), MountOptions::new()).unwrap();
            vol.create("~", "sub", &FileAttributes::new_dir(), 0).unwrap();
            let mut f = vol.create("~/sub", "f.txt", &FileAttributes::new_file(), 0).unwrap();
            vol.write(&mut f, 0, b"old revision").unwrap();
            vol.close().unwrap();
        }
        let mut vol = Ext2Volume::mount(MemRimIO::new(&mut disk), MountOptions::new()).unwrap();
        let sub = vol.open("~/sub").unwrap();
        assert!(sub.is_dir());
        let f = vol.open("~/sub/f.txt").unwrap();
        assert!(f.is_file());
        let mut back = [0u8; 12];
        vol.read(&f, 0, &mut back).unwrap();
        assert_eq!(&back, b"old revision");
    }

    #[test]
    fn test_read_only_rejects_mutation() {
        let mut disk = small();
        let before = disk[1024..2048].to_vec();
        let mut vol = Ext2Volume::mount(
            MemRimIO::new(&mut disk),
            MountOptions::new().read_only(true),
        )
        .unwrap();
        let err = vol.create("~", "x", &FileAttributes::new_file(), 0).unwrap_err();
        assert_eq!(err, FsError::ReadOnly);
        vol.close().unwrap();
        assert_eq!(disk[1024..2048], before[..]);
    }
}
