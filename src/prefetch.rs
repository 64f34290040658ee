//! Background signal loading.
//!
//! A small worker pool co-resident with the reader. Workers claim batch
//! indices from a shared counter, load and decompress the signal rows
//! the plan selected in that batch, and publish the result into a
//! bounded channel. The consumer releases batches strictly in plan
//! order using a reorder buffer keyed by batch sequence number; a full
//! channel blocks workers, which is the back-pressure this pipeline
//! needs. Dropping the loader disconnects the channel and the workers
//! wind down.

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
};

use crossbeam_channel::{bounded, Receiver};

use crate::{error::Pod5Error, reader::ReaderCore};

/// Which signal columns to materialise ahead of time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreloadOptions {
    /// Materialise decompressed samples.
    pub samples: bool,
    /// Materialise per-read sample counts.
    pub sample_count: bool,
}

impl PreloadOptions {
    /// Preload decompressed samples.
    pub fn samples() -> Self {
        Self {
            samples: true,
            sample_count: false,
        }
    }

    /// Preload samples and sample counts.
    pub fn all() -> Self {
        Self {
            samples: true,
            sample_count: true,
        }
    }
}

/// Prefetched signal for one planned batch, indexed by selection
/// position.
#[derive(Debug)]
pub struct SignalCacheBatch {
    batch_index: usize,
    sample_counts: Option<Vec<u64>>,
    samples: Option<Vec<Vec<i16>>>,
}

impl SignalCacheBatch {
    pub fn batch_index(&self) -> usize {
        self.batch_index
    }

    /// Per-read total sample counts, if requested.
    pub fn sample_counts(&self) -> Option<&[u64]> {
        self.sample_counts.as_deref()
    }

    /// Per-read decompressed signal, if requested.
    pub fn samples(&self) -> Option<&[Vec<i16>]> {
        self.samples.as_deref()
    }
}

/// Number of completed batches that may wait unconsumed before workers
/// block.
const COMPLETED_RING_CAPACITY: usize = 4;

fn default_workers() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
        .min(8)
}

fn load_batch(
    core: &ReaderCore,
    batch_index: usize,
    rows: &[u32],
    options: PreloadOptions,
) -> Result<SignalCacheBatch, Pod5Error> {
    let columns = core.read_columns(batch_index)?;
    let mut sample_counts = options.sample_count.then(|| Vec::with_capacity(rows.len()));
    let mut samples = options.samples.then(|| Vec::with_capacity(rows.len()));
    for &row in rows {
        let signal_rows = columns.signal_rows_at(row as usize);
        if let Some(counts) = sample_counts.as_mut() {
            counts.push(columns.num_samples_at(row as usize));
        }
        if let Some(samples) = samples.as_mut() {
            samples.push(core.signal_for_rows(&signal_rows)?);
        }
    }
    Ok(SignalCacheBatch {
        batch_index,
        sample_counts,
        samples,
    })
}

/// Handle over the worker pool. Owned by the batch iterator that
/// requested preloading.
pub(crate) struct SignalLoader {
    receiver: Option<Receiver<(usize, Result<SignalCacheBatch, Pod5Error>)>>,
    pending: BTreeMap<usize, SignalCacheBatch>,
    next_batch: usize,
    total_batches: usize,
    workers: Vec<JoinHandle<()>>,
}

impl SignalLoader {
    /// Start loading every batch of the plan in the background.
    pub fn spawn(
        core: ReaderCore,
        selections: Vec<Arc<Vec<u32>>>,
        options: PreloadOptions,
    ) -> Self {
        let total_batches = selections.len();
        let workers = default_workers().min(total_batches.max(1));
        let (sender, receiver) = bounded(COMPLETED_RING_CAPACITY.max(workers));
        let claim = Arc::new(AtomicUsize::new(0));
        let selections = Arc::new(selections);

        let handles = (0..workers)
            .map(|_| {
                let core = core.clone();
                let claim = claim.clone();
                let selections = selections.clone();
                let sender = sender.clone();
                thread::spawn(move || loop {
                    let batch_index = claim.fetch_add(1, Ordering::SeqCst);
                    if batch_index >= selections.len() {
                        break;
                    }
                    let result = load_batch(&core, batch_index, &selections[batch_index], options);
                    // The consumer dropping its receiver is cancellation,
                    // not an error.
                    if sender.send((batch_index, result)).is_err() {
                        break;
                    }
                })
            })
            .collect();

        Self {
            receiver: Some(receiver),
            pending: BTreeMap::new(),
            next_batch: 0,
            total_batches,
            workers: handles,
        }
    }

    /// Block until the next batch in plan order is ready and return it.
    pub fn release_next_batch(&mut self) -> Result<SignalCacheBatch, Pod5Error> {
        if self.next_batch >= self.total_batches {
            return Err(Pod5Error::PipelineClosed);
        }
        let receiver = self.receiver.as_ref().ok_or(Pod5Error::PipelineClosed)?;
        while !self.pending.contains_key(&self.next_batch) {
            let (batch_index, result) =
                receiver.recv().map_err(|_| Pod5Error::PipelineClosed)?;
            self.pending.insert(batch_index, result?);
        }
        let batch = self
            .pending
            .remove(&self.next_batch)
            .expect("presence checked above");
        self.next_batch += 1;
        Ok(batch)
    }
}

impl Drop for SignalLoader {
    fn drop(&mut self) {
        // Disconnect first so workers blocked on a full channel exit.
        self.receiver.take();
        self.pending.clear();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}
