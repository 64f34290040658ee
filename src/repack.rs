//! Repacking reads between POD5 files.
//!
//! The repacker moves selected rows from reader handles into writer
//! outputs through a staged pipeline: a per-output producer expands
//! submissions into batch tasks, a transform pool decodes rows and
//! re-interns dictionary values for the destination, and a single
//! writer thread per output appends batches in submission order.
//! Stages are joined by bounded channels, so a slow disk applies
//! back-pressure all the way to the producer. Signal chunks are copied
//! as opaque compressed bytes and never decompressed in transit.

use std::{
    collections::{BTreeMap, HashSet},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::{bounded, Receiver, Sender};
use uuid::Uuid;

use crate::{
    error::Pod5Error,
    plan::{TraversalOrder, TraversalPlan},
    reader::{Reader, ReaderCore},
    records::CompressedRead,
    writer::{Writer, WriterOptions},
};

/// Default number of transform workers per output.
const DEFAULT_TRANSFORM_THREADS: usize = 4;
/// Bounded depth of the job and batch queues.
const JOB_QUEUE_DEPTH: usize = 16;

/// Handle identifying one registered output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepackerOutput(usize);

/// Snapshot of repack progress counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepackerStats {
    pub reads_requested: u64,
    pub reads_completed: u64,
    pub batches_requested: u64,
    pub batches_completed: u64,
    pub pending_batch_writes: u64,
    pub reads_sample_bytes_completed: u64,
}

#[derive(Default)]
struct Counters {
    reads_requested: AtomicU64,
    reads_completed: AtomicU64,
    batches_requested: AtomicU64,
    batches_completed: AtomicU64,
    pending_batch_writes: AtomicU64,
    reads_sample_bytes_completed: AtomicU64,
}

struct Job {
    core: ReaderCore,
    batches: Vec<(usize, Arc<Vec<u32>>)>,
}

struct BatchTask {
    seq: u64,
    core: ReaderCore,
    batch_index: usize,
    rows: Arc<Vec<u32>>,
}

type Transformed = (u64, Result<Vec<CompressedRead>, Pod5Error>);

struct OutputState {
    job_tx: Option<Sender<Job>>,
    producer: Option<JoinHandle<()>>,
    transforms: Vec<JoinHandle<()>>,
    writer_thread: Option<JoinHandle<()>>,
    finished: bool,
    done: Arc<AtomicBool>,
    error: Arc<Mutex<Option<Pod5Error>>>,
}

/// Moves reads between files while preserving columnar invariants and
/// dictionary deduplication.
pub struct Repacker {
    transform_threads: usize,
    counters: Arc<Counters>,
    cancelled: Arc<AtomicBool>,
    outputs: Vec<OutputState>,
}

impl Default for Repacker {
    fn default() -> Self {
        Self::new()
    }
}

impl Repacker {
    pub fn new() -> Self {
        Self::with_threads(DEFAULT_TRANSFORM_THREADS)
    }

    /// A repacker whose outputs each use `threads` transform workers.
    pub fn with_threads(threads: usize) -> Self {
        Self {
            transform_threads: threads.max(1),
            counters: Arc::new(Counters::default()),
            cancelled: Arc::new(AtomicBool::new(false)),
            outputs: Vec::new(),
        }
    }

    /// Register a destination writer. The repacker owns the writer from
    /// here on; its footer is written once the output is finished and
    /// drained.
    pub fn add_output(&mut self, writer: Writer) -> RepackerOutput {
        let handle = RepackerOutput(self.outputs.len());

        let (job_tx, job_rx) = bounded::<Job>(JOB_QUEUE_DEPTH);
        let (task_tx, task_rx) = bounded::<BatchTask>(self.transform_threads * 2);
        let (write_tx, write_rx) = bounded::<Transformed>(self.transform_threads * 2);

        let done = Arc::new(AtomicBool::new(false));
        let error = Arc::new(Mutex::new(None));

        let producer = {
            let cancelled = self.cancelled.clone();
            let counters = self.counters.clone();
            thread::spawn(move || {
                let mut seq = 0u64;
                for job in job_rx.iter() {
                    if cancelled.load(Ordering::SeqCst) {
                        break;
                    }
                    for (batch_index, rows) in job.batches {
                        counters.batches_requested.fetch_add(1, Ordering::SeqCst);
                        let task = BatchTask {
                            seq,
                            core: job.core.clone(),
                            batch_index,
                            rows,
                        };
                        seq += 1;
                        if task_tx.send(task).is_err() {
                            return;
                        }
                    }
                }
            })
        };

        let transforms = (0..self.transform_threads)
            .map(|_| {
                let task_rx = task_rx.clone();
                let write_tx = write_tx.clone();
                let cancelled = self.cancelled.clone();
                let counters = self.counters.clone();
                thread::spawn(move || {
                    for task in task_rx.iter() {
                        if cancelled.load(Ordering::SeqCst) {
                            break;
                        }
                        let result = transform_batch(&task);
                        counters.pending_batch_writes.fetch_add(1, Ordering::SeqCst);
                        if write_tx.send((task.seq, result)).is_err() {
                            break;
                        }
                    }
                })
            })
            .collect::<Vec<_>>();
        // The producer and transform workers hold the only remaining
        // clones; dropping ours lets the channels disconnect in stage
        // order when the output is finished.
        drop(task_rx);
        drop(write_tx);

        let writer_thread = {
            let cancelled = self.cancelled.clone();
            let counters = self.counters.clone();
            let done = done.clone();
            let error = error.clone();
            thread::spawn(move || {
                let failure = run_output_writer(writer, write_rx, cancelled, counters);
                if let Some(err) = failure {
                    *error.lock().expect("repack error lock poisoned") = Some(err);
                }
                done.store(true, Ordering::SeqCst);
            })
        };

        self.outputs.push(OutputState {
            job_tx: Some(job_tx),
            producer: Some(producer),
            transforms,
            writer_thread: Some(writer_thread),
            finished: false,
            done,
            error,
        });
        handle
    }

    fn output(&self, handle: RepackerOutput) -> &OutputState {
        &self.outputs[handle.0]
    }

    fn submit(&self, handle: RepackerOutput, job: Job) -> Result<(), Pod5Error> {
        let job_tx = self
            .output(handle)
            .job_tx
            .as_ref()
            .ok_or(Pod5Error::PipelineClosed)?;
        job_tx.send(job).map_err(|_| Pod5Error::PipelineClosed)
    }

    /// Submit every read of `reader` to the output.
    pub fn add_all_reads_to_output(
        &self,
        handle: RepackerOutput,
        reader: &Reader,
    ) -> Result<(), Pod5Error> {
        let core = reader.core().clone();
        let row_counts = core.read_batch_row_counts()?;
        let total: usize = row_counts.iter().sum();
        let batches = row_counts
            .into_iter()
            .enumerate()
            .map(|(index, rows)| (index, Arc::new((0..rows as u32).collect::<Vec<_>>())))
            .collect();
        self.counters
            .reads_requested
            .fetch_add(total as u64, Ordering::SeqCst);
        self.submit(handle, Job { core, batches })
    }

    /// Submit the planned traversal of `read_ids` in `reader` to the
    /// output. Fails with [`Pod5Error::MissingReads`] if any id is
    /// absent.
    pub fn add_selected_reads_to_output(
        &self,
        handle: RepackerOutput,
        reader: &Reader,
        read_ids: &[Uuid],
    ) -> Result<(), Pod5Error> {
        let plan = reader.plan_traversal(read_ids, TraversalOrder::ReadEfficient)?;
        if plan.successful_finds != read_ids.len() {
            return Err(Pod5Error::MissingReads {
                missing: read_ids.len() - plan.successful_finds,
            });
        }
        self.counters
            .reads_requested
            .fetch_add(plan.successful_finds as u64, Ordering::SeqCst);
        self.submit(handle, Job {
            core: reader.core().clone(),
            batches: plan_batches(&plan),
        })
    }

    /// Declare that no further input will be submitted to this output.
    /// Its footer is written once the pipeline drains.
    pub fn set_output_finished(&mut self, handle: RepackerOutput) {
        let output = &mut self.outputs[handle.0];
        output.finished = true;
        output.job_tx.take();
    }

    /// Whether every finished output has drained and sealed.
    pub fn is_complete(&self) -> bool {
        self.outputs
            .iter()
            .all(|output| output.finished && output.done.load(Ordering::SeqCst))
    }

    /// Current progress counters.
    pub fn stats(&self) -> RepackerStats {
        RepackerStats {
            reads_requested: self.counters.reads_requested.load(Ordering::SeqCst),
            reads_completed: self.counters.reads_completed.load(Ordering::SeqCst),
            batches_requested: self.counters.batches_requested.load(Ordering::SeqCst),
            batches_completed: self.counters.batches_completed.load(Ordering::SeqCst),
            pending_batch_writes: self.counters.pending_batch_writes.load(Ordering::SeqCst),
            reads_sample_bytes_completed: self
                .counters
                .reads_sample_bytes_completed
                .load(Ordering::SeqCst),
        }
    }

    /// Block until every finished output has drained.
    pub fn wait(&self) {
        while !self.is_complete() {
            thread::sleep(Duration::from_millis(20));
        }
    }

    /// Yield progress snapshots until the repack completes.
    pub fn waiter(&self) -> impl Iterator<Item = RepackerStats> + '_ {
        let mut live = true;
        std::iter::from_fn(move || {
            if !live {
                return None;
            }
            live = !self.is_complete();
            let stats = self.stats();
            if live {
                thread::sleep(Duration::from_millis(20));
            }
            Some(stats)
        })
    }

    /// Finish all outputs, block until they are sealed and surface the
    /// first error.
    pub fn finish(mut self) -> Result<(), Pod5Error> {
        for output in &mut self.outputs {
            output.finished = true;
            output.job_tx.take();
        }
        let mut first_error = None;
        for output in &mut self.outputs {
            if let Some(producer) = output.producer.take() {
                let _ = producer.join();
            }
            for transform in output.transforms.drain(..) {
                let _ = transform.join();
            }
            if let Some(writer_thread) = output.writer_thread.take() {
                let _ = writer_thread.join();
            }
            if first_error.is_none() {
                first_error = output
                    .error
                    .lock()
                    .expect("repack error lock poisoned")
                    .take();
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Drop for Repacker {
    fn drop(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
        for output in &mut self.outputs {
            output.job_tx.take();
            if let Some(producer) = output.producer.take() {
                let _ = producer.join();
            }
            for transform in output.transforms.drain(..) {
                let _ = transform.join();
            }
            if let Some(writer_thread) = output.writer_thread.take() {
                let _ = writer_thread.join();
            }
        }
    }
}

fn plan_batches(plan: &TraversalPlan) -> Vec<(usize, Arc<Vec<u32>>)> {
    plan.rows_by_batch()
        .into_iter()
        .enumerate()
        .filter(|(_, rows)| !rows.is_empty())
        .map(|(index, rows)| (index, Arc::new(rows.to_vec())))
        .collect()
}

/// Decode the selected rows of one source batch into owned reads whose
/// signal stays compressed.
fn transform_batch(task: &BatchTask) -> Result<Vec<CompressedRead>, Pod5Error> {
    let batch = task.core.record_batch(task.batch_index)?;
    task.rows
        .iter()
        .map(|&row| batch.get_read(row as usize).to_compressed_read())
        .collect()
}

/// The single-writer stage of one output: reorder transformed batches
/// by sequence number, append them, then seal the file. Returns the
/// fatal error for this output, if any.
fn run_output_writer(
    mut writer: Writer,
    write_rx: Receiver<Transformed>,
    cancelled: Arc<AtomicBool>,
    counters: Arc<Counters>,
) -> Option<Pod5Error> {
    let mut pending: BTreeMap<u64, Vec<CompressedRead>> = BTreeMap::new();
    let mut next_seq = 0u64;
    let mut failure: Option<Pod5Error> = None;

    let mut write_batch = |writer: &mut Writer, reads: Vec<CompressedRead>| {
        counters.pending_batch_writes.fetch_sub(1, Ordering::SeqCst);
        for read in &reads {
            if let Err(err) = writer.add_read_pre_compressed(read) {
                return Some(err);
            }
            counters.reads_completed.fetch_add(1, Ordering::SeqCst);
            counters
                .reads_sample_bytes_completed
                .fetch_add(read.sample_count() as u64 * 2, Ordering::SeqCst);
        }
        counters.batches_completed.fetch_add(1, Ordering::SeqCst);
        None
    };

    for (seq, result) in write_rx.iter() {
        if cancelled.load(Ordering::SeqCst) || failure.is_some() {
            counters.pending_batch_writes.fetch_sub(1, Ordering::SeqCst);
            continue;
        }
        match result {
            Ok(reads) => {
                pending.insert(seq, reads);
                while let Some(reads) = pending.remove(&next_seq) {
                    if let Some(err) = write_batch(&mut writer, reads) {
                        failure = Some(err);
                        break;
                    }
                    next_seq += 1;
                }
            }
            Err(err) => {
                counters.pending_batch_writes.fetch_sub(1, Ordering::SeqCst);
                failure = Some(err);
            }
        }
    }

    // The transform stage has disconnected; anything still pending is
    // already in order.
    if failure.is_none() && !cancelled.load(Ordering::SeqCst) {
        let remaining = std::mem::take(&mut pending);
        for (_, reads) in remaining {
            if let Some(err) = write_batch(&mut writer, reads) {
                failure = Some(err);
                break;
            }
        }
    }
    if !pending.is_empty() {
        counters
            .pending_batch_writes
            .fetch_sub(pending.len() as u64, Ordering::SeqCst);
        pending.clear();
    }

    if failure.is_none() && !cancelled.load(Ordering::SeqCst) {
        if let Err(err) = writer.close() {
            failure = Some(err);
        }
    } else {
        writer.abandon();
    }
    failure
}

/// Options for [`merge`].
#[derive(Debug, Clone, Default)]
pub struct MergeOptions {
    /// Allow the same read id to appear in several inputs; every copy is
    /// written to the output.
    pub duplicate_ok: bool,
}

/// Merge the input files into one output file, preserving per-file read
/// order and concatenating inputs in argument order.
pub fn merge(
    inputs: &[impl AsRef<Path>],
    output: impl AsRef<Path>,
    options: &MergeOptions,
) -> Result<(), Pod5Error> {
    let readers = inputs
        .iter()
        .map(Reader::open)
        .collect::<Result<Vec<_>, _>>()?;

    if !options.duplicate_ok {
        let mut seen = HashSet::new();
        for reader in &readers {
            for read_id in reader.read_ids()? {
                if !seen.insert(read_id) {
                    return Err(Pod5Error::DuplicateReads);
                }
            }
        }
    }

    let writer = Writer::create(output, WriterOptions::default())?;
    let mut repacker = Repacker::new();
    let handle = repacker.add_output(writer);
    for reader in &readers {
        repacker.add_all_reads_to_output(handle, reader)?;
    }
    repacker.set_output_finished(handle);
    repacker.finish()
}

/// Options for [`filter`].
#[derive(Debug, Clone, Default)]
pub struct FilterOptions {
    /// Ignore requested ids that are present in none of the inputs.
    pub missing_ok: bool,
    /// Permit ids found in more than one input; the first occurrence in
    /// input order wins.
    pub duplicate_ok: bool,
}

/// Copy the selected `read_ids` out of the inputs into one output file.
pub fn filter(
    inputs: &[impl AsRef<Path>],
    output: impl AsRef<Path>,
    read_ids: &[Uuid],
    options: &FilterOptions,
) -> Result<(), Pod5Error> {
    let readers = inputs
        .iter()
        .map(Reader::open)
        .collect::<Result<Vec<_>, _>>()?;

    let mut claimed: HashSet<Uuid> = HashSet::new();
    let mut per_reader: Vec<Vec<Uuid>> = Vec::with_capacity(readers.len());
    for reader in &readers {
        let mut mine = Vec::new();
        for read_id in read_ids {
            if !reader.contains_read(read_id)? {
                continue;
            }
            if claimed.contains(read_id) {
                if !options.duplicate_ok {
                    return Err(Pod5Error::DuplicateReads);
                }
                continue;
            }
            claimed.insert(*read_id);
            mine.push(*read_id);
        }
        per_reader.push(mine);
    }

    let requested: HashSet<Uuid> = read_ids.iter().copied().collect();
    let missing = requested.len() - claimed.len();
    if missing > 0 && !options.missing_ok {
        return Err(Pod5Error::MissingReads { missing });
    }

    let writer = Writer::create(output, WriterOptions::default())?;
    let mut repacker = Repacker::new();
    let handle = repacker.add_output(writer);
    for (reader, ids) in readers.iter().zip(&per_reader) {
        if !ids.is_empty() {
            repacker.add_selected_reads_to_output(handle, reader, ids)?;
        }
    }
    repacker.set_output_finished(handle);
    repacker.finish()
}

/// Repack each input into an identically named file under `output_dir`.
pub fn repack_files(
    inputs: &[impl AsRef<Path>],
    output_dir: impl AsRef<Path>,
) -> Result<Vec<PathBuf>, Pod5Error> {
    let output_dir = output_dir.as_ref();
    std::fs::create_dir_all(output_dir)?;

    let readers = inputs
        .iter()
        .map(Reader::open)
        .collect::<Result<Vec<_>, _>>()?;
    let mut repacker = Repacker::new();
    let mut destinations = Vec::with_capacity(readers.len());
    let mut handles = Vec::with_capacity(readers.len());
    for reader in &readers {
        let name = reader
            .path()
            .file_name()
            .ok_or_else(|| Pod5Error::Io(std::io::Error::other("input has no file name")))?;
        let dest = output_dir.join(name);
        let writer = Writer::create(&dest, WriterOptions::default())?;
        handles.push(repacker.add_output(writer));
        destinations.push(dest);
    }
    for (reader, &handle) in readers.iter().zip(&handles) {
        repacker.add_all_reads_to_output(handle, reader)?;
        repacker.set_output_finished(handle);
    }
    repacker.finish()?;
    Ok(destinations)
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;
    use crate::{records::Read, test_util, writer::WriterOptions};

    fn scratch() -> TempDir {
        tempfile::tempdir().unwrap()
    }

    fn write_file(path: &Path, acquisition: &str, count: u32, batch_size: usize) -> Vec<Read> {
        let info = test_util::run_info(acquisition);
        let reads = (0..count)
            .map(|n| test_util::read(n, &info, 32))
            .collect::<Vec<_>>();
        let mut writer =
            Writer::create(path, WriterOptions::default().read_batch_size(batch_size)).unwrap();
        writer.add_reads(&reads).unwrap();
        writer.close().unwrap();
        reads
    }

    fn read_all(path: &Path) -> Vec<Read> {
        let reader = Reader::open(path).unwrap();
        reader
            .reads()
            .map(|record| record.unwrap().to_read().unwrap())
            .collect()
    }

    #[test]
    fn test_repack_preserves_everything() {
        let dir = scratch();
        let src = dir.path().join("a.pod5");
        let dst = dir.path().join("b.pod5");
        let reads = write_file(&src, "acq-a", 25, 10);

        let reader = Reader::open(&src).unwrap();
        let writer = Writer::create(&dst, WriterOptions::default()).unwrap();
        let mut repacker = Repacker::new();
        let handle = repacker.add_output(writer);
        repacker.add_all_reads_to_output(handle, &reader).unwrap();
        repacker.set_output_finished(handle);
        repacker.finish().unwrap();

        assert_eq!(read_all(&dst), reads);
    }

    #[test]
    fn test_repack_stats_progress() {
        let dir = scratch();
        let src = dir.path().join("a.pod5");
        let dst = dir.path().join("b.pod5");
        write_file(&src, "acq-a", 12, 5);

        let reader = Reader::open(&src).unwrap();
        let writer = Writer::create(&dst, WriterOptions::default()).unwrap();
        let mut repacker = Repacker::new();
        let handle = repacker.add_output(writer);
        repacker.add_all_reads_to_output(handle, &reader).unwrap();
        repacker.set_output_finished(handle);
        repacker.wait();
        let stats = repacker.stats();
        assert_eq!(stats.reads_requested, 12);
        assert_eq!(stats.reads_completed, 12);
        assert_eq!(stats.batches_requested, 3);
        assert_eq!(stats.batches_completed, 3);
        assert_eq!(stats.pending_batch_writes, 0);
        assert_eq!(stats.reads_sample_bytes_completed, 12 * 32 * 2);
        repacker.finish().unwrap();
    }

    #[test]
    fn test_selected_missing_read_fails_fast() {
        let dir = scratch();
        let src = dir.path().join("a.pod5");
        let dst = dir.path().join("b.pod5");
        write_file(&src, "acq-a", 5, 5);

        let reader = Reader::open(&src).unwrap();
        let writer = Writer::create(&dst, WriterOptions::default()).unwrap();
        let mut repacker = Repacker::new();
        let handle = repacker.add_output(writer);
        let absent = Uuid::parse_str("ffffffff-ffff-ffff-ffff-ffffffffffff").unwrap();
        let err = repacker
            .add_selected_reads_to_output(handle, &reader, &[test_util::read_id(0), absent])
            .unwrap_err();
        assert!(matches!(err, Pod5Error::MissingReads { missing: 1 }));
        repacker.set_output_finished(handle);
        repacker.finish().unwrap();
    }

    #[test]
    fn test_merge_concatenates_inputs() {
        let dir = scratch();
        let a = dir.path().join("a.pod5");
        let b = dir.path().join("b.pod5");
        let out = dir.path().join("merged.pod5");

        let info_a = test_util::run_info("acq-a");
        let info_b = test_util::run_info("acq-b");
        let reads_a = (0..6)
            .map(|n| test_util::read(n, &info_a, 16))
            .collect::<Vec<_>>();
        let reads_b = (100..104)
            .map(|n| test_util::read(n, &info_b, 16))
            .collect::<Vec<_>>();
        for (path, reads) in [(&a, &reads_a), (&b, &reads_b)] {
            let mut writer = Writer::create(path, WriterOptions::default()).unwrap();
            writer.add_reads(reads.iter()).unwrap();
            writer.close().unwrap();
        }

        merge(&[&a, &b], &out, &MergeOptions::default()).unwrap();

        let merged = read_all(&out);
        let expected = reads_a
            .iter()
            .chain(reads_b.iter())
            .cloned()
            .collect::<Vec<_>>();
        assert_eq!(merged, expected);

        let reader = Reader::open(&out).unwrap();
        assert_eq!(reader.run_info_count().unwrap(), 2);
    }

    #[test]
    fn test_merge_detects_duplicates() {
        let dir = scratch();
        let a = dir.path().join("a.pod5");
        let b = dir.path().join("b.pod5");
        write_file(&a, "acq-a", 4, 4);
        write_file(&b, "acq-b", 4, 4);

        let err = merge(
            &[&a, &b],
            &dir.path().join("dup.pod5"),
            &MergeOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Pod5Error::DuplicateReads));

        merge(
            &[&a, &b],
            &dir.path().join("dup-ok.pod5"),
            &MergeOptions { duplicate_ok: true },
        )
        .unwrap();
        assert_eq!(read_all(&dir.path().join("dup-ok.pod5")).len(), 8);
    }

    #[test]
    fn test_filter_by_id_list() {
        let dir = scratch();
        let src = dir.path().join("a.pod5");
        write_file(&src, "acq-a", 10, 4);

        let fresh = Uuid::parse_str("ffffffff-ffff-ffff-ffff-ffffffffffff").unwrap();
        let wanted = vec![test_util::read_id(3), test_util::read_id(7), fresh];

        let err = filter(
            &[&src],
            &dir.path().join("strict.pod5"),
            &wanted,
            &FilterOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Pod5Error::MissingReads { missing: 1 }));

        let out = dir.path().join("filtered.pod5");
        filter(
            &[&src],
            &out,
            &wanted,
            &FilterOptions {
                missing_ok: true,
                ..Default::default()
            },
        )
        .unwrap();

        let kept = read_all(&out);
        assert_eq!(
            kept.iter().map(|read| read.read_id).collect::<Vec<_>>(),
            vec![test_util::read_id(3), test_util::read_id(7)]
        );
    }

    #[test]
    fn test_repack_files_one_to_one() {
        let dir = scratch();
        let src_dir = dir.path().join("in");
        let out_dir = dir.path().join("out");
        std::fs::create_dir_all(&src_dir).unwrap();
        let a = src_dir.join("a.pod5");
        let b = src_dir.join("b.pod5");
        let reads_a = write_file(&a, "acq-a", 5, 2);
        let reads_b = write_file(&b, "acq-b", 3, 2);

        let outputs = repack_files(&[&a, &b], &out_dir).unwrap();
        assert_eq!(outputs.len(), 2);
        assert_eq!(read_all(&outputs[0]), reads_a);
        assert_eq!(read_all(&outputs[1]), reads_b);
    }
}
