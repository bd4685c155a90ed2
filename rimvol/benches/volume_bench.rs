// SPDX-License-Identifier: MIT

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;

use rimvol::exfat::{ExFatFormatter, ExFatMeta, ExFatVolume};
use rimvol::ext2::{Ext2Formatter, Ext2Meta, Ext2Volume};
use rimvol::fat32::{Fat32Formatter, Fat32Meta, Fat32Volume};
use rimvol::{FileAttributes, FsFormatter, FsMeta, FsVolume, MountOptions};
use rimio::prelude::*;

criterion_group!(benches, format_bench, write_read_bench);
criterion_main!(benches);

const FILE_BYTES: usize = 1024 * 1024;

fn ext2_image() -> (Ext2Meta, Vec<u8>) {
    let meta = Ext2Meta::new(16 * 1024 * 1024, Some("BENCH")).expect("ext2 meta");
    let buf = vec![0u8; meta.size_bytes() as usize];
    (meta, buf)
}

fn fat32_image() -> (Fat32Meta, Vec<u8>) {
    let meta = Fat32Meta::new(40 * 1024 * 1024, Some("BENCH")).expect("fat32 meta");
    let buf = vec![0u8; meta.size_bytes() as usize];
    (meta, buf)
}

fn exfat_image() -> (ExFatMeta, Vec<u8>) {
    let meta = ExFatMeta::new(16 * 1024 * 1024, Some("BENCH")).expect("exfat meta");
    let buf = vec![0u8; meta.size_bytes() as usize];
    (meta, buf)
}

pub fn format_bench(c: &mut Criterion) {
    let (meta, mut buf) = ext2_image();
    c.bench_function("ext2_format", |b| {
        b.iter(|| {
            let mut io = MemRimIO::new(&mut buf);
            Ext2Formatter::new(&mut io, &meta).format(false).expect("format failed");
        });
    });

    let (meta, mut buf) = fat32_image();
    c.bench_function("fat32_format", |b| {
        b.iter(|| {
            let mut io = MemRimIO::new(&mut buf);
            Fat32Formatter::new(&mut io, &meta).format(false).expect("format failed");
        });
    });

    let (meta, mut buf) = exfat_image();
    c.bench_function("exfat_format", |b| {
        b.iter(|| {
            let mut io = MemRimIO::new(&mut buf);
            ExFatFormatter::new(&mut io, &meta).format(false).expect("format failed");
        });
    });
}

/// Creates a file, writes `data` sequentially, reads it back and deletes it.
fn write_read_cycle(vol: &mut dyn FsVolume, data: &[u8], scratch: &mut [u8]) {
    let mut entry = vol
        .create("~", "bench.bin", &FileAttributes::new_file(), 0)
        .expect("create failed");
    for (i, chunk) in data.chunks(64 * 1024).enumerate() {
        vol.write(&mut entry, (i * 64 * 1024) as u64, chunk)
            .expect("write failed");
    }
    let n = vol.read(&entry, 0, scratch).expect("read failed");
    black_box(&scratch[..n]);
    vol.delete(&entry).expect("delete failed");
}

pub fn write_read_bench(c: &mut Criterion) {
    let data: Vec<u8> = (0..FILE_BYTES).map(|i| (i % 253) as u8).collect();
    let mut scratch = vec![0u8; FILE_BYTES];

    let mut group = c.benchmark_group("write_read_1mib");
    group.throughput(Throughput::Bytes(FILE_BYTES as u64 * 2));

    let (meta, mut buf) = ext2_image();
    Ext2Formatter::new(&mut MemRimIO::new(&mut buf), &meta)
        .format(false)
        .expect("format failed");
    {
        let mut vol =
            Ext2Volume::mount(MemRimIO::new(&mut buf), MountOptions::new()).expect("mount failed");
        group.bench_function("ext2", |b| {
            b.iter(|| write_read_cycle(&mut vol, &data, &mut scratch));
        });
        vol.close().expect("close failed");
    }

    let (meta, mut buf) = fat32_image();
    Fat32Formatter::new(&mut MemRimIO::new(&mut buf), &meta)
        .format(false)
        .expect("format failed");
    {
        let mut vol =
            Fat32Volume::mount(MemRimIO::new(&mut buf), MountOptions::new()).expect("mount failed");
        group.bench_function("fat32", |b| {
            b.iter(|| write_read_cycle(&mut vol, &data, &mut scratch));
        });
        vol.close().expect("close failed");
    }

    let (meta, mut buf) = exfat_image();
    ExFatFormatter::new(&mut MemRimIO::new(&mut buf), &meta)
        .format(false)
        .expect("format failed");
    {
        let mut vol =
            ExFatVolume::mount(MemRimIO::new(&mut buf), MountOptions::new()).expect("mount failed");
        group.bench_function("exfat", |b| {
            b.iter(|| write_read_cycle(&mut vol, &data, &mut scratch));
        });
        vol.close().expect("close failed");
    }

    group.finish();
}
