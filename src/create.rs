//! # Archive Writer
//!
//! Drives the full creation flow: stat the selected files, build the
//! manifest, reserve the header/TOC/block-table region, stream every entry
//! through the block pipeline, then rewind and backfill the tables.
//!
//! The manifest is always compressed synchronously - it is entry 0 and the
//! worker pool has not started yet. File entries go through the pool when
//! threads were requested, or through the same commit path inline when not,
//! which is why the two modes produce byte-identical archives.

use std::fs::{self, File};
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::cli::OutputFormat;
use crate::codec::{self, CodecParams};
use crate::common::{block_count, ArchiveDescriptor, ArchiveFlags, Entry};
use crate::error::PsarcError;
use crate::fileset::FileSet;
use crate::format;
use crate::manifest;
use crate::report::{Report, ReportKind};
use crate::wire;
use crate::workers::{self, BlockJob, CommitState};

/// Immutable settings for one create operation.
pub struct CreateOptions {
    pub params: CodecParams,
    pub block_size: u64,
    pub flags: ArchiveFlags,
    pub trim_paths: bool,
    pub overwrite: bool,
    /// Worker threads; 0 compresses synchronously on the calling thread.
    pub threads: usize,
    pub verbose: bool,
    pub format: OutputFormat,
}

/// Creates an archive at `archive_path` from the selected files.
///
/// A partially written archive is removed on any fatal error.
pub fn create_archive(
    archive_path: &Path,
    files: &FileSet,
    opts: &CreateOptions,
) -> Result<(), PsarcError> {
    if files.is_empty() {
        return Err(PsarcError::NoInputs);
    }
    if !opts.overwrite && archive_path.exists() {
        return Err(PsarcError::Conflict { path: archive_path.to_path_buf() });
    }
    let width = wire::item_width(opts.block_size)
        .ok_or(PsarcError::InvalidBlockSize(opts.block_size))?;

    // Entry 0 is the manifest; files follow in selection order. The stat
    // pass fixes every uncompressed size so the table region can be laid
    // out before any data is written.
    let mut entries = vec![Entry::default()];
    let mut names = Vec::with_capacity(files.len());
    let mut sources: Vec<(PathBuf, u64)> = Vec::with_capacity(files.len());
    let mut total_blocks = 0u64;
    for file in files.iter() {
        let meta = fs::metadata(&file.disk).map_err(|e| PsarcError::io(e, &file.disk))?;
        let size = meta.len();
        let name = manifest::normalize_name(&file.stored, opts.flags.absolute_paths, opts.trim_paths);
        total_blocks += block_count(size, opts.block_size);
        entries.push(Entry {
            filename: name.clone(),
            uncompressed_size: size,
            ..Default::default()
        });
        names.push(name);
        sources.push((file.disk.clone(), size));
    }

    let manifest_bytes = manifest::build(&names);
    entries[0].uncompressed_size = manifest_bytes.len() as u64;
    total_blocks += block_count(manifest_bytes.len() as u64, opts.block_size);

    let entry_count = entries.len() as u32;
    let desc = ArchiveDescriptor {
        version: (1, 4),
        codec: opts.params.codec,
        block_size: opts.block_size,
        toc_length: format::toc_length(entry_count, total_blocks, width),
        entry_count,
        flags: opts.flags,
    };

    let out = File::create(archive_path).map_err(|e| PsarcError::io(e, archive_path))?;
    let result = write_archive(
        out,
        archive_path,
        &desc,
        entries,
        &sources,
        &manifest_bytes,
        total_blocks,
        width,
        opts,
    );
    if result.is_err() {
        let _ = fs::remove_file(archive_path);
    }
    result
}

#[allow(clippy::too_many_arguments)]
fn write_archive(
    mut out: File,
    archive_path: &Path,
    desc: &ArchiveDescriptor,
    entries: Vec<Entry>,
    sources: &[(PathBuf, u64)],
    manifest_bytes: &[u8],
    total_blocks: u64,
    width: usize,
    opts: &CreateOptions,
) -> Result<(), PsarcError> {
    format::write_header(&mut out, desc)?;
    out.seek(SeekFrom::Start(desc.toc_length))?;

    let report = Report::open(
        ReportKind::Create,
        opts.format,
        opts.verbose,
        &archive_path.display().to_string(),
    );
    let state = Mutex::new(CommitState {
        out,
        total_size: 0,
        blocktable: vec![0; total_blocks as usize],
        entries,
        report,
    });

    let mut table_index = 0u64;
    let mut scratch: Vec<u8> = Vec::with_capacity(opts.block_size as usize * 2);

    stream_entry(
        0,
        manifest_bytes.len() as u64,
        opts.block_size,
        &mut Cursor::new(manifest_bytes),
        &mut table_index,
        &mut |job| encode_and_commit(&state, &opts.params, &mut scratch, job),
    )?;

    state.lock().unwrap().report.begin_section();

    if opts.threads > 0 {
        workers::run_pool(opts.threads, opts.params, opts.block_size, &state, |dispatcher| {
            let mut table_index = table_index;
            for (i, (path, size)) in sources.iter().enumerate() {
                let mut input = File::open(path).map_err(|e| PsarcError::io(e, path))?;
                stream_entry(i + 1, *size, opts.block_size, &mut input, &mut table_index, &mut |job| {
                    dispatcher.submit(job)
                })?;
            }
            Ok(())
        })?;
    } else {
        for (i, (path, size)) in sources.iter().enumerate() {
            let mut input = File::open(path).map_err(|e| PsarcError::io(e, path))?;
            stream_entry(i + 1, *size, opts.block_size, &mut input, &mut table_index, &mut |job| {
                encode_and_commit(&state, &opts.params, &mut scratch, job)
            })?;
        }
    }

    let mut state = state.into_inner().unwrap();
    state.report.end_section();

    let files_uncompressed: u64 = state.entries[1..].iter().map(|e| e.uncompressed_size).sum();
    let files_compressed: u64 = state.entries[1..].iter().map(|e| e.compressed_size).sum();

    format::write_toc(&mut state.out, &state.entries, desc.toc_length)?;
    format::write_blocktable(&mut state.out, &state.blocktable, width, desc.block_size)?;

    state.report.close_create(desc.entry_count - 1, files_uncompressed, files_compressed);
    Ok(())
}

/// Slices one entry into block jobs and hands each to `submit` in order.
///
/// A zero-length entry produces a single slotless placeholder job so its
/// offset assignment and report events still pass through the serialised
/// commit path.
fn stream_entry<R: Read>(
    entry: usize,
    size: u64,
    block_size: u64,
    src: &mut R,
    table_index: &mut u64,
    submit: &mut dyn FnMut(BlockJob) -> Result<(), PsarcError>,
) -> Result<(), PsarcError> {
    if size == 0 {
        return submit(BlockJob {
            payload: Vec::new(),
            entry,
            table_index: *table_index,
            write_slot: false,
            is_first: true,
            is_last: true,
            ticket: 0,
        });
    }
    let blocks = block_count(size, block_size);
    let mut remaining = size;
    for k in 0..blocks {
        let to_read = remaining.min(block_size) as usize;
        let mut payload = vec![0u8; to_read];
        src.read_exact(&mut payload)?;
        submit(BlockJob {
            payload,
            entry,
            table_index: *table_index,
            write_slot: true,
            is_first: k == 0,
            is_last: k + 1 == blocks,
            ticket: 0,
        })?;
        *table_index += 1;
        remaining -= to_read as u64;
    }
    Ok(())
}

/// The synchronous twin of a pool worker: encode, then commit immediately.
fn encode_and_commit(
    state: &Mutex<CommitState>,
    params: &CodecParams,
    scratch: &mut Vec<u8>,
    job: BlockJob,
) -> Result<(), PsarcError> {
    let encoded = codec::encode_block(params, &job.payload, scratch);
    let bytes: &[u8] = if encoded { scratch } else { &job.payload };
    let mut state = state.lock().unwrap();
    workers::commit_block(&mut state, &job, bytes)?;
    Ok(())
}
