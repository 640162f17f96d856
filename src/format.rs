//! # Container Layout
//!
//! Serialization and parsing of the three fixed regions at the front of a
//! PSARC file: the 32-byte header, the table of contents (30 bytes per
//! entry), and the block-size table.
//!
//! ```text
//! 0x00  4B  magic "PSAR"
//! 0x04  4B  version, high u16 | low u16
//! 0x08  4B  codec tag, "zlib" or "lzma"
//! 0x0C  4B  toc_length (header + TOC + block-size table)
//! 0x10  4B  toc_entry_size, always 30
//! 0x14  4B  entry count, manifest included
//! 0x18  4B  block size
//! 0x1C  4B  archive flags
//! ```
//!
//! A block-size-table item of 0 is a sentinel meaning "this block's
//! compressed size is exactly the block size"; the parser resolves it, the
//! serializer produces it.

use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::common::{ArchiveDescriptor, ArchiveFlags, Codec, Entry};
use crate::error::PsarcError;
use crate::wire;

pub const MAGIC: &[u8; 4] = b"PSAR";
pub const HEADER_LEN: u64 = 32;
pub const TOC_ENTRY_LEN: u64 = 30;

pub(crate) fn read_exact_or(
    r: &mut impl Read,
    buf: &mut [u8],
    what: &'static str,
) -> Result<(), PsarcError> {
    r.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            PsarcError::Truncated(what)
        } else {
            e.into()
        }
    })
}

/// Total bytes occupied by the fixed regions for the given shape.
pub fn toc_length(entry_count: u32, total_blocks: u64, item_width: usize) -> u64 {
    HEADER_LEN + entry_count as u64 * TOC_ENTRY_LEN + total_blocks * item_width as u64
}

/// Number of block-size-table items implied by the descriptor, validating
/// that the TOC length is consistent with the entry count and item width.
pub fn blocktable_len(desc: &ArchiveDescriptor, item_width: usize) -> Result<u64, PsarcError> {
    let fixed = HEADER_LEN + desc.entry_count as u64 * TOC_ENTRY_LEN;
    if desc.toc_length < fixed {
        return Err(PsarcError::BadToc("TOC length shorter than header and entry table"));
    }
    let table_bytes = desc.toc_length - fixed;
    if table_bytes % item_width as u64 != 0 {
        return Err(PsarcError::BadToc("block-size table length is not a multiple of the item width"));
    }
    Ok(table_bytes / item_width as u64)
}

/// Writes the 32-byte header at the start of the stream.
pub fn write_header<W: Write + Seek>(w: &mut W, desc: &ArchiveDescriptor) -> io::Result<()> {
    w.seek(SeekFrom::Start(0))?;
    let mut buf = [0u8; HEADER_LEN as usize];
    buf[0..4].copy_from_slice(MAGIC);
    let version = ((desc.version.0 as u32) << 16) | desc.version.1 as u32;
    buf[4..8].copy_from_slice(&version.to_be_bytes());
    buf[8..12].copy_from_slice(desc.codec.header_tag());
    buf[12..16].copy_from_slice(&(desc.toc_length as u32).to_be_bytes());
    buf[16..20].copy_from_slice(&(TOC_ENTRY_LEN as u32).to_be_bytes());
    buf[20..24].copy_from_slice(&desc.entry_count.to_be_bytes());
    buf[24..28].copy_from_slice(&(desc.block_size as u32).to_be_bytes());
    buf[28..32].copy_from_slice(&desc.flags.to_bits().to_be_bytes());
    w.write_all(&buf)
}

/// Parses the header from the start of the stream.
pub fn read_header<R: Read + Seek>(r: &mut R) -> Result<ArchiveDescriptor, PsarcError> {
    r.seek(SeekFrom::Start(0)).map_err(PsarcError::from)?;
    let mut buf = [0u8; HEADER_LEN as usize];
    read_exact_or(r, &mut buf, "header")?;

    if &buf[0..4] != MAGIC {
        return Err(PsarcError::InvalidMagic);
    }
    let version = u32::from_be_bytes(buf[4..8].try_into().unwrap());
    let tag: [u8; 4] = buf[8..12].try_into().unwrap();
    let codec = Codec::from_header_tag(&tag).ok_or(PsarcError::UnsupportedCodec(tag))?;

    Ok(ArchiveDescriptor {
        version: ((version >> 16) as u16, version as u16),
        codec,
        block_size: u32::from_be_bytes(buf[24..28].try_into().unwrap()) as u64,
        toc_length: u32::from_be_bytes(buf[12..16].try_into().unwrap()) as u64,
        entry_count: u32::from_be_bytes(buf[20..24].try_into().unwrap()),
        flags: ArchiveFlags::from_bits(u32::from_be_bytes(buf[28..32].try_into().unwrap())),
    })
}

/// Writes the table of contents directly after the header.
///
/// Entries carry data-relative offsets while an archive is built; this is
/// where they are rebased onto the file by adding `toc_length`. The name
/// digest is the MD5 of the stored filename, or all zeroes for the manifest
/// at index 0.
pub fn write_toc<W: Write + Seek>(w: &mut W, entries: &[Entry], toc_length: u64) -> io::Result<()> {
    w.seek(SeekFrom::Start(HEADER_LEN))?;
    let mut buf = [0u8; TOC_ENTRY_LEN as usize];
    for (i, entry) in entries.iter().enumerate() {
        if i == 0 {
            buf[0..16].fill(0);
        } else {
            buf[0..16].copy_from_slice(&md5::compute(entry.filename.as_bytes()).0);
        }
        buf[16..20].copy_from_slice(&entry.first_block.to_be_bytes());
        wire::put_be40(&mut buf[20..25], entry.uncompressed_size);
        wire::put_be40(&mut buf[25..30], entry.file_offset + toc_length);
        w.write_all(&buf)?;
    }
    Ok(())
}

/// Parses `count` TOC entries from directly after the header.
pub fn read_toc<R: Read + Seek>(r: &mut R, count: u32) -> Result<Vec<Entry>, PsarcError> {
    r.seek(SeekFrom::Start(HEADER_LEN)).map_err(PsarcError::from)?;
    let mut entries = Vec::with_capacity(count as usize);
    let mut buf = [0u8; TOC_ENTRY_LEN as usize];
    for _ in 0..count {
        read_exact_or(r, &mut buf, "table of contents")?;
        let mut entry = Entry::default();
        entry.name_digest.copy_from_slice(&buf[0..16]);
        entry.first_block = u32::from_be_bytes(buf[16..20].try_into().unwrap());
        entry.uncompressed_size = wire::be40(&buf[20..25]);
        entry.file_offset = wire::be40(&buf[25..30]);
        entries.push(entry);
    }
    Ok(entries)
}

/// Writes the block-size table. The stream must be positioned at the end of
/// the TOC. Items equal to the block size are written as the 0 sentinel.
pub fn write_blocktable<W: Write>(
    w: &mut W,
    table: &[u64],
    item_width: usize,
    block_size: u64,
) -> io::Result<()> {
    for &size in table {
        let v = if size == block_size { 0 } else { size };
        match item_width {
            1 => w.write_all(&[v as u8])?,
            2 => w.write_all(&(v as u16).to_be_bytes())?,
            3 => {
                let mut buf = [0u8; 3];
                wire::put_be24(&mut buf, v as u32);
                w.write_all(&buf)?;
            }
            _ => w.write_all(&(v as u32).to_be_bytes())?,
        }
    }
    Ok(())
}

/// Reads `count` block-size-table items from the current position, resolving
/// the 0 sentinel to `block_size`.
pub fn read_blocktable<R: Read>(
    r: &mut R,
    count: u64,
    item_width: usize,
    block_size: u64,
) -> Result<Vec<u64>, PsarcError> {
    let mut table = Vec::with_capacity(count as usize);
    let mut buf = [0u8; 4];
    for _ in 0..count {
        read_exact_or(r, &mut buf[..item_width], "block-size table")?;
        let v = match item_width {
            1 => buf[0] as u64,
            2 => u16::from_be_bytes(buf[..2].try_into().unwrap()) as u64,
            3 => wire::be24(&buf) as u64,
            _ => u32::from_be_bytes(buf).into(),
        };
        table.push(if v == 0 { block_size } else { v });
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn descriptor() -> ArchiveDescriptor {
        ArchiveDescriptor {
            version: (1, 4),
            codec: Codec::Zlib,
            block_size: 65536,
            toc_length: toc_length(2, 3, 2),
            entry_count: 2,
            flags: ArchiveFlags { ignore_case: true, absolute_paths: false },
        }
    }

    #[test]
    fn header_round_trip() {
        let desc = descriptor();
        let mut cur = Cursor::new(Vec::new());
        write_header(&mut cur, &desc).unwrap();
        assert_eq!(cur.get_ref().len(), HEADER_LEN as usize);
        assert_eq!(&cur.get_ref()[0..4], b"PSAR");
        assert_eq!(&cur.get_ref()[4..8], &[0, 1, 0, 4]);
        assert_eq!(&cur.get_ref()[8..12], b"zlib");

        let parsed = read_header(&mut cur).unwrap();
        assert_eq!(parsed.version, (1, 4));
        assert_eq!(parsed.codec, Codec::Zlib);
        assert_eq!(parsed.block_size, 65536);
        assert_eq!(parsed.toc_length, desc.toc_length);
        assert_eq!(parsed.entry_count, 2);
        assert_eq!(parsed.flags, desc.flags);
    }

    #[test]
    fn header_rejects_bad_magic() {
        let mut cur = Cursor::new(b"RSAR************************1234".to_vec());
        assert!(matches!(read_header(&mut cur), Err(PsarcError::InvalidMagic)));
    }

    #[test]
    fn header_rejects_unknown_codec() {
        let desc = descriptor();
        let mut cur = Cursor::new(Vec::new());
        write_header(&mut cur, &desc).unwrap();
        cur.get_mut()[8..12].copy_from_slice(b"zstd");
        assert!(matches!(read_header(&mut cur), Err(PsarcError::UnsupportedCodec(_))));
    }

    #[test]
    fn short_header_is_truncated() {
        let mut cur = Cursor::new(b"PSAR".to_vec());
        assert!(matches!(read_header(&mut cur), Err(PsarcError::Truncated(_))));
    }

    #[test]
    fn toc_round_trip_digests_and_offsets() {
        let toc_len = toc_length(2, 1, 2);
        let entries = vec![
            Entry { uncompressed_size: 9, ..Default::default() },
            Entry {
                filename: "dir/file.bin".into(),
                first_block: 1,
                uncompressed_size: 6,
                file_offset: 5,
                ..Default::default()
            },
        ];
        let mut cur = Cursor::new(Vec::new());
        cur.seek(SeekFrom::Start(HEADER_LEN)).unwrap();
        write_toc(&mut cur, &entries, toc_len).unwrap();

        let parsed = read_toc(&mut cur, 2).unwrap();
        assert_eq!(parsed[0].name_digest, [0u8; 16]);
        assert_eq!(parsed[0].file_offset, toc_len);
        assert_eq!(parsed[1].name_digest, md5::compute(b"dir/file.bin").0);
        assert_eq!(parsed[1].first_block, 1);
        assert_eq!(parsed[1].uncompressed_size, 6);
        assert_eq!(parsed[1].file_offset, 5 + toc_len);
    }

    #[test]
    fn blocktable_sentinel_round_trip() {
        // 65536 with width 2 must be written as the 0 sentinel and resolved back.
        let table = vec![65536u64, 6, 512];
        let mut out = Vec::new();
        write_blocktable(&mut out, &table, 2, 65536).unwrap();
        assert_eq!(out, [0, 0, 0, 6, 2, 0]);

        let parsed = read_blocktable(&mut Cursor::new(out), 3, 2, 65536).unwrap();
        assert_eq!(parsed, table);
    }

    #[test]
    fn blocktable_widths() {
        let table = vec![0x0A_BC_DEu64];
        let mut out = Vec::new();
        write_blocktable(&mut out, &table, 3, 1 << 24).unwrap();
        assert_eq!(out, [0x0A, 0xBC, 0xDE]);

        let mut out = Vec::new();
        write_blocktable(&mut out, &[200], 1, 256).unwrap();
        assert_eq!(out, [200]);
        let parsed = read_blocktable(&mut Cursor::new(vec![0u8]), 1, 1, 256).unwrap();
        assert_eq!(parsed, [256]);
    }

    #[test]
    fn blocktable_len_validation() {
        let mut desc = descriptor();
        desc.toc_length = toc_length(2, 3, 2);
        assert_eq!(blocktable_len(&desc, 2).unwrap(), 3);

        desc.toc_length -= 1;
        assert!(matches!(blocktable_len(&desc, 2), Err(PsarcError::BadToc(_))));

        desc.toc_length = HEADER_LEN; // shorter than the entry table
        assert!(matches!(blocktable_len(&desc, 2), Err(PsarcError::BadToc(_))));
    }
}
