// SPDX-License-Identifier: MIT

use crate::core::entry::DirEntry;
use crate::core::errors::*;
use crate::core::volume::FsVolume;

/// Seek origin for [`FileHandle::seek`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekFrom {
    Start(u64),
    End(i64),
    Current(i64),
}

/// Open regular file: a resolved entry plus a byte position.
///
/// Borrows the volume mutably for its whole lifetime. Every write persists
/// the entry; [`FileHandle::close`] flushes the volume caches.
pub struct FileHandle<'v, V: FsVolume + ?Sized> {
    vol: &'v mut V,
    entry: DirEntry,
    pos: u64,
}

impl<'v, V: FsVolume + ?Sized> FileHandle<'v, V> {
    /// Opens the regular file at `path`.
    pub fn open(vol: &'v mut V, path: &str) -> FsResult<Self> {
        let entry = vol.open(path)?;
        Self::from_entry(vol, entry)
    }

    /// Creates `name` under `parent_path` and opens it.
    pub fn create(vol: &'v mut V, parent_path: &str, name: &str) -> FsResult<Self> {
        let entry = vol.create(
            parent_path,
            name,
            &crate::core::attr::FileAttributes::new_file(),
            0,
        )?;
        Self::from_entry(vol, entry)
    }

    pub fn from_entry(vol: &'v mut V, entry: DirEntry) -> FsResult<Self> {
        crate::ensure!(entry.is_file(), FsError::NotAFile);
        Ok(Self { vol, entry, pos: 0 })
    }

    #[inline]
    pub fn entry(&self) -> &DirEntry {
        &self.entry
    }

    #[inline]
    pub fn len(&self) -> u64 {
        self.entry.size
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entry.size == 0
    }

    #[inline]
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Reads at the current position and advances it.
    pub fn read(&mut self, buf: &mut [u8]) -> FsResult<usize> {
        let n = self.vol.read(&self.entry, self.pos, buf)?;
        self.pos += n as u64;
        Ok(n)
    }

    /// Fills `buf` completely or fails with `InvalidInput` at end of file.
    pub fn read_exact(&mut self, buf: &mut [u8]) -> FsResult {
        let n = self.read(buf)?;
        crate::ensure!(n == buf.len(), FsError::InvalidInput("unexpected end of file"));
        Ok(())
    }

    /// Writes at the current position and advances it.
    pub fn write(&mut self, data: &[u8]) -> FsResult<usize> {
        let n = self.vol.write(&mut self.entry, self.pos, data)?;
        self.pos += n as u64;
        Ok(n)
    }

    pub fn seek(&mut self, from: SeekFrom) -> FsResult<u64> {
        let target = match from {
            SeekFrom::Start(p) => Some(p),
            SeekFrom::End(d) => self.entry.size.checked_add_signed(d),
            SeekFrom::Current(d) => self.pos.checked_add_signed(d),
        };
        self.pos = target.ok_or(FsError::InvalidInput("seek before start of file"))?;
        Ok(self.pos)
    }

    /// Truncates or zero-extends the file. The position is left unchanged.
    pub fn set_len(&mut self, size: u64) -> FsResult {
        self.vol.resize(&mut self.entry, size)
    }

    /// Releases the handle and returns the final entry.
    pub fn close(self) -> FsResult<DirEntry> {
        self.vol.flush()?;
        Ok(self.entry)
    }
}
