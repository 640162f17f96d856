//! Byte-level checks of the produced container: every field at its
//! documented offset, big-endian, with the 30-byte TOC stride.

use psarc::cli::OutputFormat;
use psarc::codec::CodecParams;
use psarc::common::{ArchiveFlags, Codec};
use psarc::create::{self, CreateOptions};
use psarc::fileset::{FileSet, MatchFlags};
use psarc::wire;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

fn build_archive(contents: &[u8], codec: Codec, flags: ArchiveFlags) -> (PathBuf, tempfile::TempDir) {
    let src = tempdir().unwrap();
    File::create(src.path().join("ab.txt")).unwrap().write_all(contents).unwrap();

    let arch_dir = tempdir().unwrap();
    let arch = arch_dir.path().join("layout.psarc");
    let mut files = FileSet::new(Some(src.path().to_path_buf()));
    files.add_pattern("ab.txt", MatchFlags::default());

    let opts = CreateOptions {
        params: CodecParams::new(codec, None, false),
        block_size: 65536,
        flags,
        trim_paths: false,
        overwrite: false,
        threads: 0,
        verbose: false,
        format: OutputFormat::Standard,
    };
    create::create_archive(&arch, &files, &opts).unwrap();
    (arch, arch_dir)
}

fn be32(raw: &[u8], at: usize) -> u32 {
    u32::from_be_bytes(raw[at..at + 4].try_into().unwrap())
}

#[test]
fn header_fields_sit_at_their_offsets() {
    let flags = ArchiveFlags { ignore_case: true, absolute_paths: true };
    let (arch, _keep) = build_archive(b"abc", Codec::Store, flags);
    let raw = fs::read(&arch).unwrap();

    assert_eq!(&raw[0..4], b"PSAR");
    assert_eq!(&raw[4..8], &[0x00, 0x01, 0x00, 0x04]); // v1.4
    assert_eq!(&raw[8..12], b"zlib");
    assert_eq!(be32(&raw, 0x10), 30); // toc_entry_size
    assert_eq!(be32(&raw, 0x14), 2); // manifest + one file
    assert_eq!(be32(&raw, 0x18), 65536);
    assert_eq!(be32(&raw, 0x1C), 3); // icase | abspath

    // 32B header + 2 entries * 30B + 2 one-block slots * width 2.
    let toc_length = be32(&raw, 0x0C) as u64;
    assert_eq!(toc_length, 32 + 2 * 30 + 2 * 2);
}

#[test]
fn toc_entries_carry_digest_sizes_and_offsets() {
    let (arch, _keep) = build_archive(b"abc", Codec::Store, ArchiveFlags::default());
    let raw = fs::read(&arch).unwrap();
    let toc_length = be32(&raw, 0x0C) as u64;

    // Manifest entry: zero digest, block 0, the manifest bytes themselves.
    assert_eq!(&raw[32..48], &[0u8; 16]);
    assert_eq!(be32(&raw, 48), 0);
    assert_eq!(wire::be40(&raw[52..57]), 6); // "ab.txt"
    assert_eq!(wire::be40(&raw[57..62]), toc_length);

    // File entry: MD5 of the stored name, the block after the manifest's,
    // and data placed right after the manifest's.
    let entry = 32 + 30;
    assert_eq!(&raw[entry..entry + 16], &md5::compute(b"ab.txt").0);
    assert_eq!(be32(&raw, entry + 16), 1);
    assert_eq!(wire::be40(&raw[entry + 20..entry + 25]), 3);
    assert_eq!(wire::be40(&raw[entry + 25..entry + 30]), toc_length + 6);

    // Both stored blocks land verbatim after the table region.
    let data = toc_length as usize;
    assert_eq!(&raw[data..data + 6], b"ab.txt");
    assert_eq!(&raw[data + 6..data + 9], b"abc");
    assert_eq!(raw.len(), data + 9);
}

#[test]
fn lzma_archives_carry_the_lzma_tag_and_xz_blocks() {
    let contents = b"compressible compressible compressible ".repeat(200);
    let (arch, _keep) = build_archive(&contents, Codec::Lzma, ArchiveFlags::default());
    let raw = fs::read(&arch).unwrap();

    assert_eq!(&raw[8..12], b"lzma");

    // The file entry's first block begins with the XZ stream magic.
    let entry = 32 + 30;
    let offset = wire::be40(&raw[entry + 25..entry + 30]) as usize;
    assert_eq!(&raw[offset..offset + 6], &[0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00]);
}

fn build_with_block_size(dir: &Path, block_size: u64) -> Vec<u8> {
    let arch = dir.join(format!("w{block_size}.psarc"));
    let src = tempdir().unwrap();
    File::create(src.path().join("f")).unwrap().write_all(&[7u8; 300]).unwrap();
    let mut files = FileSet::new(Some(src.path().to_path_buf()));
    files.add_pattern("f", MatchFlags::default());
    let opts = CreateOptions {
        params: CodecParams::new(Codec::Store, None, false),
        block_size,
        flags: ArchiveFlags::default(),
        trim_paths: false,
        overwrite: false,
        threads: 0,
        verbose: false,
        format: OutputFormat::Standard,
    };
    create::create_archive(&arch, &files, &opts).unwrap();
    fs::read(&arch).unwrap()
}

#[test]
fn item_width_follows_the_block_size() {
    let dir = tempdir().unwrap();

    // 256-byte blocks: width 1. 300 bytes of data = 2 blocks, manifest = 1.
    let raw = build_with_block_size(dir.path(), 256);
    let toc_length = be32(&raw, 0x0C) as u64;
    assert_eq!(toc_length, 32 + 2 * 30 + 3);
    // First data block fills the block size exactly, so its slot is the
    // sentinel.
    assert_eq!(raw[32 + 60 + 1], 0);
    assert_eq!(raw[32 + 60 + 2], 44); // 300 - 256

    // 70000-byte blocks: width 3, single slots.
    let raw = build_with_block_size(dir.path(), 70_000);
    let toc_length = be32(&raw, 0x0C) as u64;
    assert_eq!(toc_length, 32 + 2 * 30 + 2 * 3);
}
