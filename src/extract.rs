//! # Archive Reader
//!
//! Parses the fixed regions of an archive, recovers filenames from the
//! manifest, and serves the three read operations: list, info, and extract.
//!
//! Opening validates the layout up front - entry offsets must be contiguous
//! starting at the end of the table region, block indices must stay inside
//! the block-size table, and the manifest must decode to exactly one name
//! per file entry. Everything after `open` can then index the tables
//! without re-checking.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::cli::OutputFormat;
use crate::codec;
use crate::common::{ArchiveDescriptor, Codec, Entry};
use crate::error::PsarcError;
use crate::format;
use crate::manifest;
use crate::report::{print_info, ArchiveInfoReport, Report, ReportKind};
use crate::wire;

/// Immutable settings for one extract operation.
pub struct ExtractOptions {
    pub target_dir: Option<PathBuf>,
    pub trim_paths: bool,
    pub overwrite: bool,
    pub skip_existing: bool,
    pub verbose: bool,
    pub format: OutputFormat,
}

/// Per-entry outcome counts of an extract run.
#[derive(Debug, Default)]
pub struct ExtractStats {
    pub successful: u64,
    pub errors: u64,
    pub bytes: u64,
}

/// An opened archive with its parsed tables.
pub struct Archive {
    pub desc: ArchiveDescriptor,
    pub entries: Vec<Entry>,
    /// Sentinel-resolved compressed block sizes.
    pub blocktable: Vec<u64>,
    path: PathBuf,
    file: File,
}

impl Archive {
    /// Opens and validates an archive, leaving it ready for any read
    /// operation.
    pub fn open(path: &Path) -> Result<Self, PsarcError> {
        let mut file = File::open(path).map_err(|e| PsarcError::io(e, path))?;
        let desc = format::read_header(&mut file)?;
        let width = wire::item_width(desc.block_size)
            .ok_or(PsarcError::InvalidBlockSize(desc.block_size))?;
        if desc.entry_count == 0 {
            return Err(PsarcError::BadToc("archive has no entries"));
        }

        let mut entries = format::read_toc(&mut file, desc.entry_count)?;
        let table_len = format::blocktable_len(&desc, width)?;
        let blocktable = format::read_blocktable(&mut file, table_len, width, desc.block_size)?;

        // Derive per-entry compressed sizes from the table and check that
        // entries sit back to back starting right after it.
        let mut expected_offset = desc.toc_length;
        for entry in entries.iter_mut() {
            let first = entry.first_block as u64;
            let blocks = entry.block_count(desc.block_size);
            if first + blocks > table_len {
                return Err(PsarcError::BadToc("entry block range exceeds the block-size table"));
            }
            entry.compressed_size =
                blocktable[first as usize..(first + blocks) as usize].iter().sum();
            if entry.file_offset != expected_offset {
                return Err(PsarcError::BadToc("entries are not contiguous"));
            }
            expected_offset += entry.compressed_size;
        }

        let manifest_entry = entries[0].clone();
        let mut manifest_buf = Vec::with_capacity(manifest_entry.uncompressed_size as usize + 1);
        decompress_entry(&mut file, desc.block_size, &blocktable, &manifest_entry, &mut manifest_buf)?;
        let names = manifest::parse(&manifest_buf, desc.entry_count as usize - 1)?;
        for (entry, name) in entries[1..].iter_mut().zip(names) {
            entry.filename = name;
        }

        Ok(Archive { desc, entries, blocktable, path: path.to_path_buf(), file })
    }

    /// Emits one report row per file entry.
    pub fn list(&self, format: OutputFormat, verbose: bool) {
        let mut report =
            Report::open(ReportKind::List, format, verbose, &self.path.display().to_string());
        report.begin_section();
        for entry in &self.entries[1..] {
            report.list_row(
                &entry.filename,
                &entry.name_digest,
                entry.uncompressed_size,
                entry.compressed_size,
            );
        }
        report.end_section();
        report.close_list(self.desc.entry_count - 1);
    }

    /// Prints archive totals, discriminating the manifest from the files
    /// and inferring whether each group was actually compressed.
    pub fn info(&self, format: OutputFormat) {
        let manifest_entry = &self.entries[0];
        let files_uncompressed: u64 =
            self.entries[1..].iter().map(|e| e.uncompressed_size).sum();
        let files_compressed: u64 = self.entries[1..].iter().map(|e| e.compressed_size).sum();

        // The header names one codec for the whole archive; a group that
        // never shrank was effectively stored.
        let manifest_codec = if manifest_entry.compressed_size != manifest_entry.uncompressed_size {
            self.desc.codec
        } else {
            Codec::Store
        };
        let files_codec = if self.entries[1..]
            .iter()
            .any(|e| e.compressed_size != e.uncompressed_size)
        {
            self.desc.codec
        } else {
            Codec::Store
        };

        print_info(
            format,
            &ArchiveInfoReport {
                archive: self.path.display().to_string(),
                version: self.desc.version,
                total_files: self.desc.entry_count - 1,
                block_size: self.desc.block_size,
                ignore_case: self.desc.flags.ignore_case,
                absolute_paths: self.desc.flags.absolute_paths,
                manifest_uncompressed: manifest_entry.uncompressed_size,
                manifest_compressed: manifest_entry.compressed_size,
                manifest_codec,
                files_uncompressed,
                files_compressed,
                files_codec,
                physical_size: manifest_entry.compressed_size
                    + files_compressed
                    + self.desc.toc_length,
            },
        );
    }

    /// Extracts the entries named by `patterns`, or everything when the
    /// list is empty. Failures are per-entry: extraction continues and the
    /// counts come back in [`ExtractStats`].
    pub fn extract(&mut self, patterns: &[String], opts: &ExtractOptions) -> ExtractStats {
        let ignore_case = self.desc.flags.ignore_case;
        let matcher: Option<HashSet<String>> = if patterns.is_empty() {
            None
        } else {
            Some(patterns.iter().map(|p| fold(p, ignore_case)).collect())
        };

        let mut report = Report::open(
            ReportKind::Extract,
            opts.format,
            opts.verbose,
            &self.path.display().to_string(),
        );
        report.begin_section();

        let mut stats = ExtractStats::default();
        for i in 1..self.entries.len() {
            let entry = self.entries[i].clone();
            if let Some(wanted) = &matcher {
                if !wanted.contains(&fold(&entry.filename, ignore_case)) {
                    continue;
                }
            }

            let target = output_path(&entry.filename, opts);
            report.begin_entry(&entry.filename, entry.uncompressed_size, entry.compressed_size);

            if !opts.trim_paths {
                if let Some(parent) = target.parent() {
                    if !parent.as_os_str().is_empty() && fs::create_dir_all(parent).is_err() {
                        report.end_entry_extract("fail");
                        stats.errors += 1;
                        continue;
                    }
                }
            }

            if target.exists() && !opts.overwrite {
                if opts.skip_existing {
                    report.end_entry_extract("skipped (file exists)");
                    stats.bytes += entry.uncompressed_size;
                    stats.successful += 1;
                } else {
                    report.end_entry_extract("fail (file already exists)");
                    stats.errors += 1;
                }
                continue;
            }

            let outcome = File::create(&target).map_err(PsarcError::from).and_then(|mut out| {
                decompress_entry(
                    &mut self.file,
                    self.desc.block_size,
                    &self.blocktable,
                    &entry,
                    &mut out,
                )
            });
            match outcome {
                Ok(()) => {
                    report.end_entry_extract("ok");
                    stats.bytes += entry.uncompressed_size;
                    stats.successful += 1;
                }
                Err(_) => {
                    report.end_entry_extract("fail");
                    stats.errors += 1;
                }
            }
        }

        report.end_section();
        report.close_extract(stats.successful, stats.bytes, stats.errors);
        stats
    }
}

fn fold(name: &str, ignore_case: bool) -> String {
    if ignore_case {
        name.to_lowercase()
    } else {
        name.to_string()
    }
}

/// Maps a stored name to the path it extracts to. Leading slashes and `.`
/// directory components are dropped so absolute-path archives still land
/// under the target directory.
fn output_path(stored: &str, opts: &ExtractOptions) -> PathBuf {
    let (dir, base) = match stored.rsplit_once('/') {
        Some((dir, base)) => (dir, base),
        None => ("", stored),
    };
    let dir = dir.trim_start_matches('/');
    let dir = if dir == "." { "" } else { dir };

    let relative = if opts.trim_paths || dir.is_empty() {
        base.to_string()
    } else {
        format!("{dir}/{base}")
    };
    match &opts.target_dir {
        Some(target) => target.join(relative),
        None => PathBuf::from(relative),
    }
}

/// Streams one entry's blocks through the codec into `out`.
fn decompress_entry(
    file: &mut File,
    block_size: u64,
    blocktable: &[u64],
    entry: &Entry,
    out: &mut dyn Write,
) -> Result<(), PsarcError> {
    if entry.uncompressed_size == 0 {
        return Ok(());
    }
    file.seek(SeekFrom::Start(entry.file_offset)).map_err(PsarcError::from)?;

    let mut remaining = entry.uncompressed_size;
    let mut index = entry.first_block as usize;
    let mut payload = Vec::new();
    let mut decoded = Vec::new();
    while remaining > 0 {
        let compressed = blocktable[index] as usize;
        payload.resize(compressed, 0);
        format::read_exact_or(file, &mut payload, "entry data")?;

        let natural = remaining.min(block_size) as usize;
        codec::decode_block(&payload, natural, &mut decoded)?;
        out.write_all(&decoded).map_err(PsarcError::from)?;

        remaining -= natural as u64;
        index += 1;
    }
    Ok(())
}
