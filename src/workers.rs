//! # Ordered Worker Pool
//!
//! Parallel block compression with strictly serial commits.
//!
//! Compression is CPU-bound and embarrassingly parallel per block, but the
//! archive layout is not: bytes must land in the output file in submission
//! order so entry offsets stay monotonic, and each block-size-table slot is
//! owned by exactly one block. The pool therefore splits a worker's life
//! into a free-running encode phase and a serialised commit phase.
//!
//! Every submitted job carries a ticket from a monotonically increasing
//! counter. Workers encode concurrently into their own scratch buffers, then
//! block on the shared [`TicketGate`] until the gate's current ticket equals
//! their own. The holder of the current ticket writes its bytes, updates the
//! entry accumulators and the block-size table, emits its report events,
//! advances the gate, and broadcasts. Encoding of later blocks overlaps the
//! commit of earlier ones, and the global commit order equals the global
//! submission order, so an archive built with N workers is laid out exactly
//! like one built with one.
//!
//! Jobs are handed off through a zero-capacity channel: a submit blocks
//! until some worker is free to take it, which bounds in-flight work to the
//! pool size without polling.
//!
//! Write failures inside a commit are recorded in a shared first-error slot.
//! The failing worker still advances the gate (later tickets must not wait
//! forever), subsequent commits become no-ops, and the dispatcher surfaces
//! the error on the next submit or when the pool winds down.

use std::cell::Cell;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::thread;

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::codec::{self, CodecParams};
use crate::common::Entry;
use crate::error::PsarcError;
use crate::report::Report;

/// One block's worth of work.
///
/// `table_index` is the block's slot in the block-size table; `write_slot`
/// is false only for the placeholder job of a zero-length entry, which
/// claims no slot but still needs its offset assigned and its report events
/// emitted in order.
pub struct BlockJob {
    pub payload: Vec<u8>,
    pub entry: usize,
    pub table_index: u64,
    pub write_slot: bool,
    pub is_first: bool,
    pub is_last: bool,
    pub ticket: u64,
}

/// Everything a commit touches, guarded by one lock. Only the worker whose
/// ticket is current ever takes it, so there is no contention beyond the
/// hand-off itself.
pub struct CommitState {
    pub out: std::fs::File,
    /// Bytes of entry data written so far; the next entry offset.
    pub total_size: u64,
    pub blocktable: Vec<u64>,
    pub entries: Vec<Entry>,
    pub report: Report,
}

/// Applies one encoded (or stored) block to the archive: append the bytes,
/// update the owning entry, record the block size. The manifest (entry 0)
/// stays out of the report.
pub fn commit_block(state: &mut CommitState, job: &BlockJob, bytes: &[u8]) -> io::Result<()> {
    let CommitState { out, total_size, blocktable, entries, report } = state;

    out.write_all(bytes)?;

    let entry = &mut entries[job.entry];
    if job.is_first {
        entry.first_block = job.table_index as u32;
        entry.file_offset = *total_size;
        entry.compressed_size = bytes.len() as u64;
        if job.entry != 0 {
            report.begin_entry(&entry.filename, entry.uncompressed_size, 0);
        }
    } else {
        entry.compressed_size += bytes.len() as u64;
    }

    *total_size += bytes.len() as u64;
    if job.write_slot {
        blocktable[job.table_index as usize] = bytes.len() as u64;
    }

    if job.is_last && job.entry != 0 {
        report.end_entry_create(entry.uncompressed_size, entry.compressed_size);
    }
    Ok(())
}

/// The commit-order turnstile. Tickets start at 1; 0 is reserved as
/// "uninitialised", so the counter skips it when it wraps.
struct TicketGate {
    current: Mutex<u64>,
    ready: Condvar,
}

impl TicketGate {
    fn new() -> Self {
        TicketGate { current: Mutex::new(1), ready: Condvar::new() }
    }

    fn wait_for(&self, ticket: u64) {
        let mut current = self.current.lock().unwrap();
        while *current != ticket {
            current = self.ready.wait(current).unwrap();
        }
    }

    fn advance(&self) {
        let mut current = self.current.lock().unwrap();
        *current = current.wrapping_add(1);
        if *current == 0 {
            *current = 1;
        }
        self.ready.notify_all();
    }
}

/// Handle the feeding closure uses to push jobs into the pool. Assigns
/// tickets in submission order.
pub struct Dispatcher<'a> {
    tx: Sender<BlockJob>,
    next_ticket: Cell<u64>,
    failed: &'a AtomicBool,
    first_error: &'a Mutex<Option<PsarcError>>,
}

impl Dispatcher<'_> {
    pub fn submit(&self, mut job: BlockJob) -> Result<(), PsarcError> {
        if self.failed.load(Ordering::Acquire) {
            return Err(self.take_error());
        }
        let mut ticket = self.next_ticket.get().wrapping_add(1);
        if ticket == 0 {
            ticket = 1;
        }
        self.next_ticket.set(ticket);
        job.ticket = ticket;
        self.tx.send(job).map_err(|_| PsarcError::Io {
            source: io::Error::new(io::ErrorKind::BrokenPipe, "compression workers exited"),
            path: PathBuf::new(),
        })
    }

    fn take_error(&self) -> PsarcError {
        self.first_error.lock().unwrap().take().unwrap_or_else(|| PsarcError::Io {
            source: io::Error::new(io::ErrorKind::Other, "worker failed"),
            path: PathBuf::new(),
        })
    }
}

/// Runs `feed` against a pool of `num_workers` threads, then waits for every
/// submitted block to commit before returning.
pub fn run_pool<F>(
    num_workers: usize,
    params: CodecParams,
    block_size: u64,
    state: &Mutex<CommitState>,
    feed: F,
) -> Result<(), PsarcError>
where
    F: FnOnce(&Dispatcher) -> Result<(), PsarcError>,
{
    let gate = TicketGate::new();
    let failed = AtomicBool::new(false);
    let first_error: Mutex<Option<PsarcError>> = Mutex::new(None);

    let fed = thread::scope(|s| {
        let (tx, rx) = bounded::<BlockJob>(0);
        for _ in 0..num_workers.max(1) {
            let rx = rx.clone();
            let gate = &gate;
            let failed = &failed;
            let first_error = &first_error;
            s.spawn(move || worker_loop(rx, gate, state, params, block_size, failed, first_error));
        }
        drop(rx);

        let dispatcher = Dispatcher {
            tx,
            next_ticket: Cell::new(0),
            failed: &failed,
            first_error: &first_error,
        };
        feed(&dispatcher)
        // Dropping the dispatcher closes the channel; the scope join is the
        // wait-for-completion.
    });
    fed?;

    match first_error.into_inner().unwrap() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn worker_loop(
    rx: Receiver<BlockJob>,
    gate: &TicketGate,
    state: &Mutex<CommitState>,
    params: CodecParams,
    block_size: u64,
    failed: &AtomicBool,
    first_error: &Mutex<Option<PsarcError>>,
) {
    let mut scratch: Vec<u8> = Vec::with_capacity(block_size as usize * 2);
    for job in rx {
        let encoded = codec::encode_block(&params, &job.payload, &mut scratch);
        let bytes: &[u8] = if encoded { &scratch } else { &job.payload };

        gate.wait_for(job.ticket);
        if !failed.load(Ordering::Acquire) {
            let mut st = state.lock().unwrap();
            if let Err(e) = commit_block(&mut st, &job, bytes) {
                *first_error.lock().unwrap() = Some(e.into());
                failed.store(true, Ordering::Release);
            }
        }
        gate.advance();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::OutputFormat;
    use crate::common::Codec;
    use crate::report::{Report, ReportKind};
    use std::io::{Read, Seek, SeekFrom};

    /// Many tiny blocks through many workers must land in submission order.
    #[test]
    fn commits_follow_submission_order() {
        let file = tempfile::tempfile().unwrap();
        let blocks: usize = 300;
        let state = Mutex::new(CommitState {
            out: file,
            total_size: 0,
            blocktable: vec![0; blocks],
            entries: vec![Entry { uncompressed_size: blocks as u64, ..Default::default() }],
            report: Report::open(ReportKind::Create, OutputFormat::Standard, false, "t"),
        });

        let params = CodecParams::new(Codec::Store, None, false);
        run_pool(8, params, 1, &state, |d| {
            for i in 0..blocks {
                d.submit(BlockJob {
                    payload: vec![i as u8],
                    entry: 0,
                    table_index: i as u64,
                    write_slot: true,
                    is_first: i == 0,
                    is_last: i == blocks - 1,
                    ticket: 0,
                })?;
            }
            Ok(())
        })
        .unwrap();

        let mut st = state.into_inner().unwrap();
        assert_eq!(st.total_size, blocks as u64);
        assert_eq!(st.entries[0].compressed_size, blocks as u64);
        assert!(st.blocktable.iter().all(|&s| s == 1));

        let mut written = Vec::new();
        st.out.seek(SeekFrom::Start(0)).unwrap();
        st.out.read_to_end(&mut written).unwrap();
        let expected: Vec<u8> = (0..blocks).map(|i| i as u8).collect();
        assert_eq!(written, expected);
    }
}
