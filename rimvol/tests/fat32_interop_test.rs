// SPDX-License-Identifier: MIT

//! FAT32 images cross-checked against the `fatfs` crate in both directions.

use std::io::{Cursor, Read, Write};

use fatfs::{FatType, FileSystem, FormatVolumeOptions, FsOptions};
use fscommon::BufStream;
use rimvol::fat32::*;

const SIZE_BYTES: u64 = 40 * 1024 * 1024;

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8 ^ 0x5A).collect()
}

#[test]
fn fatfs_reads_our_image() {
    let _ = env_logger::builder().is_test(true).try_init();
    let meta = Fat32Meta::new(SIZE_BYTES, Some("INTEROP")).unwrap();
    let mut disk = vec![0u8; meta.size_bytes() as usize];
    let report = payload(50_000);
    {
        let mut io = MemRimIO::new(&mut disk);
        Fat32Formatter::new(&mut io, &meta).format(false).unwrap();
        let mut vol = Fat32Volume::mount(io, MountOptions::new()).unwrap();
        vol.create("~", "docs", &FileAttributes::new_dir(), 0).unwrap();
        let mut f = vol
            .create("~/docs", "Quarterly report 2024.txt", &FileAttributes::new_file(), 0)
            .unwrap();
        vol.write(&mut f, 0, &report).unwrap();
        let mut r = vol.create("~", "README.TXT", &FileAttributes::new_file(), 0).unwrap();
        vol.write(&mut r, 0, b"hello from rimvol").unwrap();
        vol.close().unwrap();
    }

    let fs = FileSystem::new(BufStream::new(Cursor::new(&mut disk)), FsOptions::new()).unwrap();
    assert_eq!(fs.fat_type(), FatType::Fat32);
    assert_eq!(fs.volume_label(), "INTEROP");
    {
        let root = fs.root_dir();
        let mut names: Vec<String> = root
            .iter()
            .map(|e| e.unwrap().file_name().to_ascii_lowercase())
            .collect();
        names.sort();
        assert_eq!(names, ["docs", "readme.txt"]);

        let mut back = Vec::new();
        root.open_file("docs/Quarterly report 2024.txt")
            .unwrap()
            .read_to_end(&mut back)
            .unwrap();
        assert_eq!(back, report);

        let mut text = String::new();
        root.open_file("README.TXT")
            .unwrap()
            .read_to_string(&mut text)
            .unwrap();
        assert_eq!(text, "hello from rimvol");
    }
    fs.unmount().unwrap();
}

#[test]
fn we_read_and_extend_a_fatfs_image() {
    let mut disk = vec![0u8; SIZE_BYTES as usize];
    let picture = payload(3000);
    {
        let mut cursor = Cursor::new(&mut disk);
        fatfs::format_volume(
            &mut cursor,
            FormatVolumeOptions::new()
                .fat_type(FatType::Fat32)
                .bytes_per_cluster(512),
        )
        .unwrap();
        let fs = FileSystem::new(BufStream::new(cursor), FsOptions::new()).unwrap();
        {
            let root = fs.root_dir();
            let photos = root.create_dir("photos").unwrap();
            photos
                .create_file("holiday picture.jpg")
                .unwrap()
                .write_all(&picture)
                .unwrap();
            root.create_file("notes.txt")
                .unwrap()
                .write_all(b"buy film")
                .unwrap();
        }
        fs.unmount().unwrap();
    }

    {
        let mut vol = Fat32Volume::mount(MemRimIO::new(&mut disk), MountOptions::new()).unwrap();
        let f = vol.open("~/photos/holiday picture.jpg").unwrap();
        assert_eq!(f.size, 3000);
        let mut back = vec![0u8; 3000];
        assert_eq!(vol.read(&f, 0, &mut back).unwrap(), 3000);
        assert_eq!(back, picture);

        let root = vol.root();
        let notes = vol.lookup(&root, "notes.txt").unwrap().unwrap();
        assert_eq!(notes.size, 8);

        // Append to the existing file and add a new one next to it
        let mut f = f;
        vol.write(&mut f, 3000, b"-- tail").unwrap();
        let mut extra = vol
            .create("~/photos", "Another rather long name.bin", &FileAttributes::new_file(), 0)
            .unwrap();
        vol.write(&mut extra, 0, &payload(1500)).unwrap();
        vol.close().unwrap();
    }

    let fs = FileSystem::new(Cursor::new(&mut disk), FsOptions::new()).unwrap();
    {
        let photos = fs.root_dir().open_dir("photos").unwrap();
        let mut back = Vec::new();
        photos
            .open_file("holiday picture.jpg")
            .unwrap()
            .read_to_end(&mut back)
            .unwrap();
        assert_eq!(back.len(), 3007);
        assert_eq!(&back[..3000], &picture[..]);
        assert_eq!(&back[3000..], b"-- tail");

        let mut back = Vec::new();
        photos
            .open_file("Another rather long name.bin")
            .unwrap()
            .read_to_end(&mut back)
            .unwrap();
        assert_eq!(back, payload(1500));
    }
    fs.unmount().unwrap();
}
