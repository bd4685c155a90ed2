// SPDX-License-Identifier: MIT

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::{RimIO, RimIOResult};

/// `RimIO` over any borrowed `Read + Write + Seek` stream.
#[derive(Debug)]
pub struct StdRimIO<'a, T: Read + Write + Seek> {
    io: &'a mut T,
}

impl<'a, T: Read + Write + Seek> StdRimIO<'a, T> {
    #[inline]
    pub fn new(io: &'a mut T) -> Self {
        Self { io }
    }
}

impl<'a, T: Read + Write + Seek> RimIO for StdRimIO<'a, T> {
    fn write_at(&mut self, offset: u64, data: &[u8]) -> RimIOResult {
        self.io.seek(SeekFrom::Start(offset))?;
        self.io.write_all(data)?;
        Ok(())
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> RimIOResult {
        self.io.seek(SeekFrom::Start(offset))?;
        self.io.read_exact(buf)?;
        Ok(())
    }

    fn flush(&mut self) -> RimIOResult {
        self.io.flush()?;
        Ok(())
    }

    fn size_bytes(&mut self) -> RimIOResult<u64> {
        Ok(self.io.seek(SeekFrom::End(0))?)
    }
}

/// `RimIO` owning an image file.
///
/// Writes never extend the file: offsets past the end fail with
/// `OutOfBounds` so a driver bug cannot silently grow the image.
#[derive(Debug)]
pub struct FileRimIO {
    file: File,
    len: u64,
}

impl FileRimIO {
    /// Opens an existing image for reading and writing.
    pub fn open<P: AsRef<Path>>(path: P) -> RimIOResult<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Self::from_file(file)
    }

    /// Opens an existing image without write access.
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> RimIOResult<Self> {
        let file = OpenOptions::new().read(true).open(path)?;
        Self::from_file(file)
    }

    /// Creates (or truncates) an image of `len` zero bytes.
    pub fn create<P: AsRef<Path>>(path: P, len: u64) -> RimIOResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(len)?;
        Self::from_file(file)
    }

    /// Wraps an already opened file.
    pub fn from_file(file: File) -> RimIOResult<Self> {
        let len = file.metadata()?.len();
        Ok(Self { file, len })
    }

    pub fn into_inner(self) -> File {
        self.file
    }

    #[inline]
    fn check_bounds(&self, offset: u64, len: usize) -> RimIOResult {
        let end = offset
            .checked_add(len as u64)
            .ok_or(crate::RimIOError::OutOfBounds)?;
        if end > self.len {
            return Err(crate::RimIOError::OutOfBounds);
        }
        Ok(())
    }
}

impl RimIO for FileRimIO {
    fn write_at(&mut self, offset: u64, data: &[u8]) -> RimIOResult {
        self.check_bounds(offset, data.len())?;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        Ok(())
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> RimIOResult {
        self.check_bounds(offset, buf.len())?;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    fn flush(&mut self) -> RimIOResult {
        self.file.flush()?;
        self.file.sync_data()?;
        Ok(())
    }

    fn size_bytes(&mut self) -> RimIOResult<u64> {
        Ok(self.len)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::prelude::*;
    use tempfile::{NamedTempFile, tempfile};

    #[test]
    fn test_rw() {
        let mut file = tempfile().unwrap();
        let mut io = StdRimIO::new(&mut file);
        io.write_at(10, &[1, 2, 3, 4]).unwrap();

        let mut output = [0u8; 4];
        io.read_at(10, &mut output).unwrap();
        assert_eq!(output, [1, 2, 3, 4]);
        assert_eq!(io.size_bytes().unwrap(), 14);
    }

    #[test]
    fn test_short_read_is_out_of_bounds() {
        let mut file = tempfile().unwrap();
        let mut io = StdRimIO::new(&mut file);
        io.write_at(0, &[0u8; 8]).unwrap();
        let mut output = [0u8; 16];
        assert_eq!(io.read_at(0, &mut output), Err(RimIOError::OutOfBounds));
    }

    #[test]
    fn test_file_image_bounds() {
        let tmp = NamedTempFile::new().unwrap();
        let mut io = FileRimIO::create(tmp.path(), 4096).unwrap();
        assert_eq!(io.size_bytes().unwrap(), 4096);

        io.write_u32_at(4092, 0x1234_5678).unwrap();
        assert_eq!(io.read_u32_at(4092).unwrap(), 0x1234_5678);
        assert_eq!(io.write_at(4094, &[0u8; 4]), Err(RimIOError::OutOfBounds));
        io.flush().unwrap();

        let mut reopened = FileRimIO::open(tmp.path()).unwrap();
        assert_eq!(reopened.read_u32_at(4092).unwrap(), 0x1234_5678);
    }

    #[test]
    fn test_open_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = FileRimIO::open(dir.path().join("missing.img")).unwrap_err();
        assert_eq!(err, RimIOError::Io(std::io::ErrorKind::NotFound));
    }
}
