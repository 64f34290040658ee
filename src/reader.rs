//! Reading from a POD5 file.
//!
//! [`Reader::open`] verifies the signatures at both ends of the file,
//! parses the trailing footer and memory-maps the three embedded Arrow
//! tables. Record and batch views are cheap handles over the decoded
//! columns: cloning them bumps reference counts, and any outstanding
//! view keeps the underlying mapping alive after the reader itself is
//! dropped.

use std::{
    collections::HashMap,
    fs::File,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use arrow::array::{
    Array, BooleanArray, DictionaryArray, FixedSizeBinaryArray, Float32Array, Int16Array,
    Int64Array, LargeBinaryArray, ListArray, MapArray, RecordBatch, StringArray, UInt16Array,
    UInt32Array, UInt64Array, UInt8Array,
};
use arrow::datatypes::Int16Type;
use memmap2::{Mmap, MmapOptions};
use pod5_footer::{ParsedFooter, FILE_SIGNATURE};
use uuid::Uuid;

use crate::{
    error::Pod5Error,
    index::{serialize_index, IndexEntry, ReadIndex},
    plan::{plan_traversal, TraversalOrder, TraversalPlan},
    prefetch::{PreloadOptions, SignalCacheBatch, SignalLoader},
    records::{
        Calibration, CompressedRead, EndReason, EndReasonKind, Pore, Read, RunInfo, ShiftScalePair,
    },
    schema,
    signal::decompress_signal,
    tables::{IndexBytes, TableBytes, TableSource},
};

/// Location and size information for one signal row of a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalRowInfo {
    pub batch_index: usize,
    pub batch_row_index: usize,
    pub sample_count: usize,
    pub byte_count: usize,
}

fn downcast_column<'a, T: 'static>(
    batch: &'a RecordBatch,
    name: &str,
) -> Result<&'a T, Pod5Error> {
    batch
        .column_by_name(name)
        .ok_or_else(|| Pod5Error::SchemaMismatch(format!("missing column {name:?}")))?
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| Pod5Error::SchemaMismatch(format!("column {name:?} has unexpected type")))
}

/// A dictionary-encoded utf8 column with its values pre-resolved.
#[derive(Clone)]
struct DictColumn {
    keys: Int16Array,
    values: StringArray,
}

impl DictColumn {
    fn from_batch(batch: &RecordBatch, name: &str) -> Result<Self, Pod5Error> {
        let dict = downcast_column::<DictionaryArray<Int16Type>>(batch, name)?;
        let values = dict
            .values()
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| {
                Pod5Error::SchemaMismatch(format!("dictionary column {name:?} is not utf8"))
            })?
            .clone();
        Ok(Self {
            keys: dict.keys().clone(),
            values,
        })
    }

    fn value(&self, row: usize) -> &str {
        self.values.value(self.keys.value(row) as usize)
    }

    fn key(&self, row: usize) -> i16 {
        self.keys.value(row)
    }
}

/// Typed views over the columns of one reads-table batch.
pub(crate) struct ReadBatchColumns {
    read_id: FixedSizeBinaryArray,
    read_number: UInt32Array,
    start: UInt64Array,
    channel: UInt16Array,
    well: UInt8Array,
    median_before: Float32Array,
    pore_type: DictColumn,
    calibration_offset: Float32Array,
    calibration_scale: Float32Array,
    end_reason: DictColumn,
    end_reason_forced: BooleanArray,
    run_info: DictColumn,
    signal: ListArray,
    num_minknow_events: UInt64Array,
    tracked_scaling_scale: Float32Array,
    tracked_scaling_shift: Float32Array,
    predicted_scaling_scale: Float32Array,
    predicted_scaling_shift: Float32Array,
    num_reads_since_mux_change: UInt32Array,
    time_since_mux_change: Float32Array,
    num_samples: UInt64Array,
}

impl ReadBatchColumns {
    pub(crate) fn from_batch(batch: &RecordBatch) -> Result<Self, Pod5Error> {
        let read_id = downcast_column::<FixedSizeBinaryArray>(batch, "read_id")?.clone();
        if read_id.value_length() != 16 {
            return Err(Pod5Error::SchemaMismatch(format!(
                "read_id width {} is not a packed uuid",
                read_id.value_length()
            )));
        }
        Ok(Self {
            read_id,
            read_number: downcast_column::<UInt32Array>(batch, "read_number")?.clone(),
            start: downcast_column::<UInt64Array>(batch, "start")?.clone(),
            channel: downcast_column::<UInt16Array>(batch, "channel")?.clone(),
            well: downcast_column::<UInt8Array>(batch, "well")?.clone(),
            median_before: downcast_column::<Float32Array>(batch, "median_before")?.clone(),
            pore_type: DictColumn::from_batch(batch, "pore_type")?,
            calibration_offset: downcast_column::<Float32Array>(batch, "calibration_offset")?
                .clone(),
            calibration_scale: downcast_column::<Float32Array>(batch, "calibration_scale")?
                .clone(),
            end_reason: DictColumn::from_batch(batch, "end_reason")?,
            end_reason_forced: downcast_column::<BooleanArray>(batch, "end_reason_forced")?
                .clone(),
            run_info: DictColumn::from_batch(batch, "run_info")?,
            signal: downcast_column::<ListArray>(batch, "signal")?.clone(),
            num_minknow_events: downcast_column::<UInt64Array>(batch, "num_minknow_events")?
                .clone(),
            tracked_scaling_scale: downcast_column::<Float32Array>(batch, "tracked_scaling_scale")?
                .clone(),
            tracked_scaling_shift: downcast_column::<Float32Array>(batch, "tracked_scaling_shift")?
                .clone(),
            predicted_scaling_scale: downcast_column::<Float32Array>(
                batch,
                "predicted_scaling_scale",
            )?
            .clone(),
            predicted_scaling_shift: downcast_column::<Float32Array>(
                batch,
                "predicted_scaling_shift",
            )?
            .clone(),
            num_reads_since_mux_change: downcast_column::<UInt32Array>(
                batch,
                "num_reads_since_mux_change",
            )?
            .clone(),
            time_since_mux_change: downcast_column::<Float32Array>(batch, "time_since_mux_change")?
                .clone(),
            num_samples: downcast_column::<UInt64Array>(batch, "num_samples")?.clone(),
        })
    }

    pub(crate) fn num_rows(&self) -> usize {
        self.read_id.len()
    }

    pub(crate) fn read_id_at(&self, row: usize) -> Uuid {
        let bytes: [u8; 16] = self
            .read_id
            .value(row)
            .try_into()
            .expect("column width checked at construction");
        Uuid::from_bytes(bytes)
    }

    pub(crate) fn num_samples_at(&self, row: usize) -> u64 {
        self.num_samples.value(row)
    }

    pub(crate) fn read_number_at(&self, row: usize) -> u32 {
        self.read_number.value(row)
    }

    pub(crate) fn start_at(&self, row: usize) -> u64 {
        self.start.value(row)
    }

    pub(crate) fn median_before_at(&self, row: usize) -> f32 {
        self.median_before.value(row)
    }

    pub(crate) fn pore_at(&self, row: usize) -> Pore {
        Pore {
            channel: self.channel.value(row),
            well: self.well.value(row),
            pore_type: self.pore_type.value(row).to_string(),
        }
    }

    pub(crate) fn calibration_at(&self, row: usize) -> Calibration {
        Calibration {
            offset: self.calibration_offset.value(row),
            scale: self.calibration_scale.value(row),
        }
    }

    pub(crate) fn end_reason_at(&self, row: usize) -> EndReason {
        EndReason {
            reason: EndReasonKind::from_name(self.end_reason.value(row)).unwrap_or_default(),
            forced: self.end_reason_forced.value(row),
        }
    }

    pub(crate) fn acquisition_id_at(&self, row: usize) -> &str {
        self.run_info.value(row)
    }

    pub(crate) fn num_minknow_events_at(&self, row: usize) -> u64 {
        self.num_minknow_events.value(row)
    }

    pub(crate) fn tracked_scaling_at(&self, row: usize) -> ShiftScalePair {
        ShiftScalePair {
            shift: self.tracked_scaling_shift.value(row),
            scale: self.tracked_scaling_scale.value(row),
        }
    }

    pub(crate) fn predicted_scaling_at(&self, row: usize) -> ShiftScalePair {
        ShiftScalePair {
            shift: self.predicted_scaling_shift.value(row),
            scale: self.predicted_scaling_scale.value(row),
        }
    }

    pub(crate) fn num_reads_since_mux_change_at(&self, row: usize) -> u32 {
        self.num_reads_since_mux_change.value(row)
    }

    pub(crate) fn time_since_mux_change_at(&self, row: usize) -> f32 {
        self.time_since_mux_change.value(row)
    }

    pub(crate) fn signal_rows_at(&self, row: usize) -> Vec<u64> {
        let values = self.signal.value(row);
        let values = values
            .as_any()
            .downcast_ref::<UInt64Array>()
            .expect("signal row list item type checked by schema");
        values.iter().flatten().collect()
    }
}

/// Typed views over the columns of one signal-table batch.
pub(crate) struct SignalBatchColumns {
    pub read_id: FixedSizeBinaryArray,
    pub signal: LargeBinaryArray,
    pub samples: UInt32Array,
}

impl SignalBatchColumns {
    pub(crate) fn from_batch(batch: &RecordBatch) -> Result<Self, Pod5Error> {
        Ok(Self {
            read_id: downcast_column::<FixedSizeBinaryArray>(batch, "read_id")?.clone(),
            signal: downcast_column::<LargeBinaryArray>(batch, "signal")?.clone(),
            samples: downcast_column::<UInt32Array>(batch, "samples")?.clone(),
        })
    }

    pub(crate) fn num_rows(&self) -> usize {
        self.samples.len()
    }
}

fn map_column_pairs(map: &MapArray, row: usize) -> Result<Vec<(String, String)>, Pod5Error> {
    let entries = map.value(row);
    let keys = entries
        .column(0)
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| Pod5Error::SchemaMismatch("map keys are not utf8".to_string()))?;
    let values = entries
        .column(1)
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| Pod5Error::SchemaMismatch("map values are not utf8".to_string()))?;
    Ok((0..keys.len())
        .map(|i| (keys.value(i).to_string(), values.value(i).to_string()))
        .collect())
}

/// Decode one row of a run-info batch into an owned [`RunInfo`].
pub(crate) fn run_info_at(batch: &RecordBatch, row: usize) -> Result<RunInfo, Pod5Error> {
    let utf8 = |name: &str| -> Result<String, Pod5Error> {
        Ok(downcast_column::<StringArray>(batch, name)?
            .value(row)
            .to_string())
    };
    Ok(RunInfo {
        acquisition_id: utf8("acquisition_id")?,
        acquisition_start_time: downcast_column::<Int64Array>(batch, "acquisition_start_time")?
            .value(row),
        adc_max: downcast_column::<Int16Array>(batch, "adc_max")?.value(row),
        adc_min: downcast_column::<Int16Array>(batch, "adc_min")?.value(row),
        context_tags: map_column_pairs(downcast_column::<MapArray>(batch, "context_tags")?, row)?,
        experiment_name: utf8("experiment_name")?,
        flow_cell_id: utf8("flow_cell_id")?,
        flow_cell_product_code: utf8("flow_cell_product_code")?,
        protocol_name: utf8("protocol_name")?,
        protocol_run_id: utf8("protocol_run_id")?,
        protocol_start_time: downcast_column::<Int64Array>(batch, "protocol_start_time")?
            .value(row),
        sample_id: utf8("sample_id")?,
        sample_rate: downcast_column::<UInt16Array>(batch, "sample_rate")?.value(row),
        sequencing_kit: utf8("sequencing_kit")?,
        sequencer_position: utf8("sequencer_position")?,
        sequencer_position_type: utf8("sequencer_position_type")?,
        software: utf8("software")?,
        system_name: utf8("system_name")?,
        system_type: utf8("system_type")?,
        tracking_id: map_column_pairs(downcast_column::<MapArray>(batch, "tracking_id")?, row)?,
    })
}

/// Shared, clonable internals of a [`Reader`]. Worker threads (signal
/// prefetch, repacking) hold clones of this to access the tables
/// independently of the `Reader` handle itself.
#[derive(Clone)]
pub(crate) struct ReaderCore {
    read_table: Arc<TableSource>,
    signal_table: Arc<TableSource>,
    run_info_table: Arc<TableSource>,
    index_section: Option<TableBytes>,
    index: Arc<Mutex<Option<Arc<ReadIndex<IndexBytes>>>>>,
    signal_batch_row_count: usize,
    read_columns: Arc<Mutex<HashMap<usize, Arc<ReadBatchColumns>>>>,
    signal_columns: Arc<Mutex<HashMap<usize, Arc<SignalBatchColumns>>>>,
    run_info_cache: Arc<Mutex<HashMap<String, Arc<RunInfo>>>>,
}

impl ReaderCore {
    pub(crate) fn read_batch_count(&self) -> usize {
        self.read_table.num_batches()
    }

    pub(crate) fn read_columns(&self, index: usize) -> Result<Arc<ReadBatchColumns>, Pod5Error> {
        if let Some(columns) = self
            .read_columns
            .lock()
            .expect("read column cache lock poisoned")
            .get(&index)
        {
            return Ok(columns.clone());
        }
        let batch = self.read_table.batch(index)?;
        let columns = Arc::new(ReadBatchColumns::from_batch(&batch)?);
        self.read_columns
            .lock()
            .expect("read column cache lock poisoned")
            .insert(index, columns.clone());
        Ok(columns)
    }

    pub(crate) fn signal_columns(
        &self,
        index: usize,
    ) -> Result<Arc<SignalBatchColumns>, Pod5Error> {
        if let Some(columns) = self
            .signal_columns
            .lock()
            .expect("signal column cache lock poisoned")
            .get(&index)
        {
            return Ok(columns.clone());
        }
        let batch = self.signal_table.batch(index)?;
        let columns = Arc::new(SignalBatchColumns::from_batch(&batch)?);
        self.signal_columns
            .lock()
            .expect("signal column cache lock poisoned")
            .insert(index, columns.clone());
        Ok(columns)
    }

    /// Map an absolute signal row id to its batch and in-batch row.
    fn locate_signal_row(&self, signal_row: u64) -> Result<(usize, usize), Pod5Error> {
        if self.signal_batch_row_count == 0 {
            return Err(Pod5Error::CorruptSignal(
                "file has signal references but no signal rows".to_string(),
            ));
        }
        let batch = (signal_row / self.signal_batch_row_count as u64) as usize;
        let row = (signal_row % self.signal_batch_row_count as u64) as usize;
        Ok((batch, row))
    }

    /// Gather and decompress the signal rows of one read, in order.
    pub(crate) fn signal_for_rows(&self, signal_rows: &[u64]) -> Result<Vec<i16>, Pod5Error> {
        let mut located = Vec::with_capacity(signal_rows.len());
        let mut total = 0usize;
        for &signal_row in signal_rows {
            let (batch, row) = self.locate_signal_row(signal_row)?;
            let columns = self.signal_columns(batch)?;
            total += columns.samples.value(row) as usize;
            located.push((columns, row));
        }
        let mut signal = Vec::with_capacity(total);
        for (columns, row) in located {
            let samples = columns.samples.value(row) as usize;
            signal.extend(decompress_signal(columns.signal.value(row), samples)?);
        }
        Ok(signal)
    }

    /// Copy the compressed chunk bytes of one read without decoding.
    pub(crate) fn compressed_chunks_for_rows(
        &self,
        signal_rows: &[u64],
    ) -> Result<(Vec<Vec<u8>>, Vec<u32>), Pod5Error> {
        let mut chunks = Vec::with_capacity(signal_rows.len());
        let mut chunk_lengths = Vec::with_capacity(signal_rows.len());
        for &signal_row in signal_rows {
            let (batch, row) = self.locate_signal_row(signal_row)?;
            let columns = self.signal_columns(batch)?;
            chunks.push(columns.signal.value(row).to_vec());
            chunk_lengths.push(columns.samples.value(row));
        }
        Ok((chunks, chunk_lengths))
    }

    /// Resolve a run info by acquisition id, caching the result so that
    /// repeated lookups across batches reuse one materialised value.
    pub(crate) fn lookup_run_info(&self, acquisition_id: &str) -> Result<Arc<RunInfo>, Pod5Error> {
        if let Some(found) = self
            .run_info_cache
            .lock()
            .expect("run info cache lock poisoned")
            .get(acquisition_id)
        {
            return Ok(found.clone());
        }
        for batch_idx in 0..self.run_info_table.num_batches() {
            let batch = self.run_info_table.batch(batch_idx)?;
            let ids = downcast_column::<StringArray>(&batch, "acquisition_id")?;
            for row in 0..batch.num_rows() {
                if ids.value(row) == acquisition_id {
                    let run_info = Arc::new(run_info_at(&batch, row)?);
                    self.run_info_cache
                        .lock()
                        .expect("run info cache lock poisoned")
                        .insert(acquisition_id.to_string(), run_info.clone());
                    return Ok(run_info);
                }
            }
        }
        Err(Pod5Error::SchemaMismatch(format!(
            "run info {acquisition_id:?} not present in run info table"
        )))
    }

    /// The read-id index, loaded from the index section or rebuilt by
    /// scanning the read-id column.
    pub(crate) fn index(&self) -> Result<Arc<ReadIndex<IndexBytes>>, Pod5Error> {
        let mut guard = self.index.lock().expect("index lock poisoned");
        if let Some(index) = &*guard {
            return Ok(index.clone());
        }
        let index = match &self.index_section {
            Some(section) => ReadIndex::from_section(IndexBytes::Mapped(section.clone()))?,
            None => {
                let mut entries = Vec::new();
                for batch_idx in 0..self.read_table.num_batches() {
                    let columns = self.read_columns(batch_idx)?;
                    for row in 0..columns.num_rows() {
                        entries.push(IndexEntry {
                            read_id: *columns.read_id_at(row).as_bytes(),
                            batch: batch_idx as u32,
                            row: row as u32,
                        });
                    }
                }
                ReadIndex::from_section(IndexBytes::Owned(Arc::new(serialize_index(
                    &mut entries,
                ))))?
            }
        };
        let index = Arc::new(index);
        *guard = Some(index.clone());
        Ok(index)
    }

    /// Build a full-batch view for internal consumers (repack workers)
    /// that hold a core but no `Reader` handle.
    pub(crate) fn record_batch(&self, index: usize) -> Result<ReadRecordBatch, Pod5Error> {
        Ok(ReadRecordBatch {
            core: self.clone(),
            columns: self.read_columns(index)?,
            selection: None,
            signal_cache: None,
        })
    }

    pub(crate) fn read_batch_row_counts(&self) -> Result<Vec<usize>, Pod5Error> {
        (0..self.read_table.num_batches())
            .map(|idx| Ok(self.read_columns(idx)?.num_rows()))
            .collect()
    }
}

/// The base reader for POD5 data.
pub struct Reader {
    path: PathBuf,
    core: ReaderCore,
    file_identifier: Uuid,
    writing_software: String,
    file_version: String,
    file_version_pre_migration: String,
}

impl Reader {
    /// Open a POD5 file for reading.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Pod5Error> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        // Safety: the mapping is read-only and POD5 files are sealed;
        // concurrent truncation of an input file is outside the
        // library's contract.
        let map = Arc::new(unsafe { MmapOptions::new().map(&file)? });
        drop(file);

        if map.len() < 2 * FILE_SIGNATURE.len() || map[..8] != FILE_SIGNATURE {
            return Err(Pod5Error::NotAPod5File("start"));
        }
        if map[map.len() - 8..] != FILE_SIGNATURE {
            return Err(Pod5Error::NotAPod5File("end"));
        }

        let footer =
            ParsedFooter::from_file_bytes(&map).map_err(|_| Pod5Error::TruncatedFooter)?;

        let table = |info: pod5_footer::TableInfo| -> Result<TableBytes, Pod5Error> {
            if info.offset() < 0 || info.length() < 0 {
                return Err(Pod5Error::TruncatedFooter);
            }
            TableBytes::new(map.clone(), info.offset() as usize, info.length() as usize)
        };
        let read_bytes = table(footer.read_table()?)?;
        let signal_bytes = table(footer.signal_table()?)?;
        let run_info_bytes = table(footer.run_info_table()?)?;
        let index_section = footer
            .index_table()
            .map_err(|_| Pod5Error::TruncatedFooter)?
            .map(table)
            .transpose()?;

        let read_table = Arc::new(TableSource::open(read_bytes)?);
        let signal_table = Arc::new(TableSource::open(signal_bytes)?);
        let run_info_table = Arc::new(TableSource::open(run_info_bytes)?);

        let metadata = read_table.schema().metadata().clone();
        let file_version = footer
            .pod5_version()
            .ok()
            .flatten()
            .or_else(|| metadata.get(schema::META_VERSION).cloned())
            .unwrap_or_else(|| "0.0.0".to_string());
        if !schema::version_supported(&file_version) {
            return Err(Pod5Error::VersionUnsupported {
                file: file_version,
                supported: schema::POD5_VERSION,
            });
        }
        let file_version_pre_migration = metadata
            .get(schema::META_VERSION_PRE_MIGRATION)
            .cloned()
            .unwrap_or_else(|| file_version.clone());
        let writing_software = metadata
            .get(schema::META_SOFTWARE)
            .cloned()
            .or_else(|| footer.software().ok().flatten())
            .unwrap_or_default();
        let file_identifier = metadata
            .get(schema::META_FILE_IDENTIFIER)
            .and_then(|raw| Uuid::parse_str(raw).ok())
            .or_else(|| {
                footer
                    .file_identifier()
                    .ok()
                    .flatten()
                    .and_then(|raw| Uuid::parse_str(&raw).ok())
            })
            .unwrap_or_else(|| {
                log::warn!("file carries no parseable identifier: {}", path.display());
                Uuid::nil()
            });

        let mut signal_batch_row_count = footer.signal_batch_row_count().unwrap_or(0) as usize;
        if signal_batch_row_count == 0 && signal_table.num_batches() > 0 {
            signal_batch_row_count = signal_table.batch(0)?.num_rows();
        }

        Ok(Self {
            path,
            core: ReaderCore {
                read_table,
                signal_table,
                run_info_table,
                index_section,
                index: Arc::new(Mutex::new(None)),
                signal_batch_row_count,
                read_columns: Arc::new(Mutex::new(HashMap::new())),
                signal_columns: Arc::new(Mutex::new(HashMap::new())),
                run_info_cache: Arc::new(Mutex::new(HashMap::new())),
            },
            file_identifier,
            writing_software,
            file_version,
            file_version_pre_migration,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_identifier(&self) -> Uuid {
        self.file_identifier
    }

    pub fn writing_software(&self) -> &str {
        &self.writing_software
    }

    pub fn file_version(&self) -> &str {
        &self.file_version
    }

    /// The version the file was originally written at, before any
    /// `update` rewrites.
    pub fn file_version_pre_migration(&self) -> &str {
        &self.file_version_pre_migration
    }

    /// Rows per signal batch, fixed at write time.
    pub fn signal_batch_row_count(&self) -> usize {
        self.core.signal_batch_row_count
    }

    /// Number of read batches in the file.
    pub fn batch_count(&self) -> usize {
        self.core.read_batch_count()
    }

    /// Total number of reads in the file.
    pub fn num_reads(&self) -> Result<usize, Pod5Error> {
        Ok(self.core.index()?.len())
    }

    /// Total number of rows in the run-info table.
    pub fn run_info_count(&self) -> Result<usize, Pod5Error> {
        self.core.run_info_table.total_rows()
    }

    /// All read ids, in file order.
    pub fn read_ids(&self) -> Result<Vec<Uuid>, Pod5Error> {
        let mut ids = Vec::new();
        for batch_idx in 0..self.batch_count() {
            let columns = self.core.read_columns(batch_idx)?;
            ids.extend((0..columns.num_rows()).map(|row| columns.read_id_at(row)));
        }
        Ok(ids)
    }

    /// Get one read batch by index.
    pub fn get_batch(&self, index: usize) -> Result<ReadRecordBatch, Pod5Error> {
        Ok(ReadRecordBatch {
            core: self.core.clone(),
            columns: self.core.read_columns(index)?,
            selection: None,
            signal_cache: None,
        })
    }

    /// Iterate batches in file order.
    pub fn read_batches(&self) -> Batches<'_> {
        Batches {
            reader: self,
            next: 0,
        }
    }

    /// Iterate all reads in file order.
    pub fn reads(&self) -> Reads<'_> {
        Reads {
            batches: self.read_batches(),
            current: None,
        }
    }

    /// Iterate a chosen subset of batches, in the order given.
    pub fn read_batches_by_index<'a>(
        &'a self,
        batch_indices: &[usize],
    ) -> impl Iterator<Item = Result<ReadRecordBatch, Pod5Error>> + 'a {
        batch_indices
            .to_vec()
            .into_iter()
            .map(move |index| self.get_batch(index))
    }

    /// Whether this file contains the given read id.
    pub fn contains_read(&self, read_id: &Uuid) -> Result<bool, Pod5Error> {
        Ok(self.core.index()?.lookup(read_id.as_bytes()).is_some())
    }

    /// Look up one read by id. Returns `Ok(None)` if absent.
    pub fn get_read(&self, read_id: &Uuid) -> Result<Option<ReadRecord>, Pod5Error> {
        let Some((batch, row)) = self.core.index()?.lookup(read_id.as_bytes()) else {
            return Ok(None);
        };
        let batch = self.get_batch(batch as usize)?;
        Ok(Some(batch.get_read(row as usize)))
    }

    /// Plan a traversal of `read_ids` over this file's batches.
    pub fn plan_traversal(
        &self,
        read_ids: &[Uuid],
        order: TraversalOrder,
    ) -> Result<TraversalPlan, Pod5Error> {
        let index = self.core.index()?;
        Ok(plan_traversal(&index, self.batch_count(), read_ids, order))
    }

    /// Iterate batches restricted to a previously planned selection.
    /// Every batch is yielded, including those with no selected rows.
    pub fn read_batches_selected(
        &self,
        plan: &TraversalPlan,
    ) -> Result<SelectedBatches<'_>, Pod5Error> {
        if plan.per_batch_counts.len() != self.batch_count() {
            return Err(Pod5Error::SchemaMismatch(
                "plan does not match this file's batch count".to_string(),
            ));
        }
        let selections = plan
            .rows_by_batch()
            .into_iter()
            .map(|rows| Arc::new(rows.to_vec()))
            .collect();
        Ok(SelectedBatches {
            reader: self,
            selections,
            next: 0,
            loader: None,
        })
    }

    /// Iterate reads matching `selection`, batch by batch. With
    /// `missing_ok` unset, absent ids fail with
    /// [`Pod5Error::MissingReads`] before any read is yielded.
    pub fn reads_selected(
        &self,
        selection: &[Uuid],
        missing_ok: bool,
    ) -> Result<SelectedReads<'_>, Pod5Error> {
        let plan = self.plan_traversal(selection, TraversalOrder::ReadEfficient)?;
        if !missing_ok && plan.successful_finds != selection.len() {
            return Err(Pod5Error::MissingReads {
                missing: selection.len() - plan.successful_finds,
            });
        }
        Ok(SelectedReads {
            batches: self.read_batches_selected(&plan)?,
            current: None,
        })
    }

    /// Iterate batches with signal prefetched by a background worker
    /// pool. `selection` limits rows; `None` preloads every read.
    pub fn read_batches_preloaded(
        &self,
        selection: Option<&[Uuid]>,
        missing_ok: bool,
        preload: PreloadOptions,
    ) -> Result<SelectedBatches<'_>, Pod5Error> {
        let plan = match selection {
            Some(ids) => {
                let plan = self.plan_traversal(ids, TraversalOrder::ReadEfficient)?;
                if !missing_ok && plan.successful_finds != ids.len() {
                    return Err(Pod5Error::MissingReads {
                        missing: ids.len() - plan.successful_finds,
                    });
                }
                plan
            }
            None => TraversalPlan::all_rows(&self.core.read_batch_row_counts()?),
        };
        let mut batches = self.read_batches_selected(&plan)?;
        batches.loader = Some(SignalLoader::spawn(
            self.core.clone(),
            batches.selections.clone(),
            preload,
        ));
        Ok(batches)
    }

    pub(crate) fn core(&self) -> &ReaderCore {
        &self.core
    }

    /// Close the reader, dropping its table handles and mapping. Views
    /// cloned out of this reader keep the mapping alive until they are
    /// dropped too.
    pub fn close(self) {}
}

/// Iterator over batches in file order.
pub struct Batches<'a> {
    reader: &'a Reader,
    next: usize,
}

impl Iterator for Batches<'_> {
    type Item = Result<ReadRecordBatch, Pod5Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.reader.batch_count() {
            return None;
        }
        let batch = self.reader.get_batch(self.next);
        self.next += 1;
        Some(batch)
    }
}

/// Iterator over all reads in file order.
pub struct Reads<'a> {
    batches: Batches<'a>,
    current: Option<(ReadRecordBatch, usize)>,
}

impl Iterator for Reads<'_> {
    type Item = Result<ReadRecord, Pod5Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((batch, pos)) = &mut self.current {
                if *pos < batch.num_reads() {
                    let record = batch.get_selected(*pos);
                    *pos += 1;
                    return Some(Ok(record));
                }
                self.current = None;
            }
            match self.batches.next()? {
                Ok(batch) => self.current = Some((batch, 0)),
                Err(err) => return Some(Err(err)),
            }
        }
    }
}

/// Iterator over planned batches, optionally with prefetched signal.
pub struct SelectedBatches<'a> {
    reader: &'a Reader,
    selections: Vec<Arc<Vec<u32>>>,
    next: usize,
    loader: Option<SignalLoader>,
}

impl Iterator for SelectedBatches<'_> {
    type Item = Result<ReadRecordBatch, Pod5Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.selections.len() {
            return None;
        }
        let index = self.next;
        self.next += 1;
        let signal_cache = match self.loader.as_mut() {
            Some(loader) => match loader.release_next_batch() {
                Ok(cache) => Some(Arc::new(cache)),
                Err(err) => return Some(Err(err)),
            },
            None => None,
        };
        let columns = match self.reader.core.read_columns(index) {
            Ok(columns) => columns,
            Err(err) => return Some(Err(err)),
        };
        Some(Ok(ReadRecordBatch {
            core: self.reader.core.clone(),
            columns,
            selection: Some(self.selections[index].clone()),
            signal_cache,
        }))
    }
}

/// Iterator over reads of a planned selection.
pub struct SelectedReads<'a> {
    batches: SelectedBatches<'a>,
    current: Option<(ReadRecordBatch, usize)>,
}

impl Iterator for SelectedReads<'_> {
    type Item = Result<ReadRecord, Pod5Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((batch, pos)) = &mut self.current {
                if *pos < batch.num_reads() {
                    let record = batch.get_selected(*pos);
                    *pos += 1;
                    return Some(Ok(record));
                }
                self.current = None;
            }
            match self.batches.next()? {
                Ok(batch) => self.current = Some((batch, 0)),
                Err(err) => return Some(Err(err)),
            }
        }
    }
}

/// Read data for one batch of reads.
#[derive(Clone)]
pub struct ReadRecordBatch {
    core: ReaderCore,
    columns: Arc<ReadBatchColumns>,
    selection: Option<Arc<Vec<u32>>>,
    signal_cache: Option<Arc<SignalCacheBatch>>,
}

impl ReadRecordBatch {
    /// Number of reads this batch yields: the selection size when a
    /// selection is set, otherwise the full row count.
    pub fn num_reads(&self) -> usize {
        match &self.selection {
            Some(selection) => selection.len(),
            None => self.columns.num_rows(),
        }
    }

    /// The full row count of the underlying record batch.
    pub fn num_rows(&self) -> usize {
        self.columns.num_rows()
    }

    /// Get a read by absolute row index, ignoring any selection.
    pub fn get_read(&self, row: usize) -> ReadRecord {
        ReadRecord {
            batch: self.clone(),
            row,
            cache_index: None,
        }
    }

    /// Get a read by position in the selection (or by row when no
    /// selection is set).
    pub fn get_selected(&self, position: usize) -> ReadRecord {
        match &self.selection {
            Some(selection) => ReadRecord {
                batch: self.clone(),
                row: selection[position] as usize,
                cache_index: Some(position),
            },
            None => ReadRecord {
                batch: self.clone(),
                row: position,
                cache_index: Some(position),
            },
        }
    }

    /// Iterate the reads this batch yields.
    pub fn reads(&self) -> impl Iterator<Item = ReadRecord> + '_ {
        (0..self.num_reads()).map(|position| self.get_selected(position))
    }

    /// Read ids yielded by this batch, in yield order.
    pub fn read_ids(&self) -> Vec<Uuid> {
        (0..self.num_reads())
            .map(|position| match &self.selection {
                Some(selection) => self.columns.read_id_at(selection[position] as usize),
                None => self.columns.read_id_at(position),
            })
            .collect()
    }

    pub(crate) fn columns(&self) -> &ReadBatchColumns {
        &self.columns
    }

    pub(crate) fn signal_cache(&self) -> Option<&SignalCacheBatch> {
        self.signal_cache.as_deref()
    }
}

/// A view of a single read within a batch.
#[derive(Clone)]
pub struct ReadRecord {
    batch: ReadRecordBatch,
    row: usize,
    cache_index: Option<usize>,
}

impl ReadRecord {
    fn columns(&self) -> &ReadBatchColumns {
        self.batch.columns()
    }

    pub fn read_id(&self) -> Uuid {
        self.columns().read_id_at(self.row)
    }

    pub fn read_number(&self) -> u32 {
        self.columns().read_number_at(self.row)
    }

    /// Absolute sample index at which this read started on its channel.
    pub fn start_sample(&self) -> u64 {
        self.columns().start_at(self.row)
    }

    pub fn median_before(&self) -> f32 {
        self.columns().median_before_at(self.row)
    }

    pub fn num_samples(&self) -> u64 {
        self.columns().num_samples.value(self.row)
    }

    /// Alias of [`ReadRecord::num_samples`].
    pub fn sample_count(&self) -> u64 {
        self.num_samples()
    }

    pub fn num_minknow_events(&self) -> u64 {
        self.columns().num_minknow_events_at(self.row)
    }

    pub fn tracked_scaling(&self) -> ShiftScalePair {
        self.columns().tracked_scaling_at(self.row)
    }

    pub fn predicted_scaling(&self) -> ShiftScalePair {
        self.columns().predicted_scaling_at(self.row)
    }

    pub fn num_reads_since_mux_change(&self) -> u32 {
        self.columns().num_reads_since_mux_change_at(self.row)
    }

    pub fn time_since_mux_change(&self) -> f32 {
        self.columns().time_since_mux_change_at(self.row)
    }

    pub fn pore(&self) -> Pore {
        self.columns().pore_at(self.row)
    }

    pub fn calibration(&self) -> Calibration {
        self.columns().calibration_at(self.row)
    }

    /// The digitisation value used by the sequencer, derived from the
    /// run's ADC range. Assists workflows ported from legacy formats.
    pub fn calibration_digitisation(&self) -> Result<i32, Pod5Error> {
        let run_info = self.run_info()?;
        Ok(run_info.adc_max as i32 - run_info.adc_min as i32 + 1)
    }

    /// The calibration range value, derived from the scale and the
    /// digitisation.
    pub fn calibration_range(&self) -> Result<f32, Pod5Error> {
        Ok(self.calibration().scale * self.calibration_digitisation()? as f32)
    }

    pub fn end_reason(&self) -> EndReason {
        self.columns().end_reason_at(self.row)
    }

    /// Dictionary index of this read's end reason.
    pub fn end_reason_index(&self) -> i16 {
        self.columns().end_reason.key(self.row)
    }

    /// Dictionary index of this read's run info.
    pub fn run_info_index(&self) -> i16 {
        self.columns().run_info.key(self.row)
    }

    /// Acquisition id of the run this read belongs to.
    pub fn acquisition_id(&self) -> &str {
        self.columns().acquisition_id_at(self.row)
    }

    pub fn run_info(&self) -> Result<Arc<RunInfo>, Pod5Error> {
        self.batch
            .core
            .lookup_run_info(self.columns().acquisition_id_at(self.row))
    }

    /// Absolute signal row ids referenced by this read, in signal order.
    pub fn signal_row_ids(&self) -> Vec<u64> {
        self.columns().signal_rows_at(self.row)
    }

    /// Location and size details of this read's signal rows.
    pub fn signal_rows(&self) -> Result<Vec<SignalRowInfo>, Pod5Error> {
        self.signal_row_ids()
            .into_iter()
            .map(|signal_row| {
                let (batch_index, batch_row_index) =
                    self.batch.core.locate_signal_row(signal_row)?;
                let columns = self.batch.core.signal_columns(batch_index)?;
                Ok(SignalRowInfo {
                    batch_index,
                    batch_row_index,
                    sample_count: columns.samples.value(batch_row_index) as usize,
                    byte_count: columns.signal.value(batch_row_index).len(),
                })
            })
            .collect()
    }

    /// Compressed size of this read's signal on disk.
    pub fn byte_count(&self) -> Result<usize, Pod5Error> {
        Ok(self
            .signal_rows()?
            .iter()
            .map(|info| info.byte_count)
            .sum())
    }

    /// Whether prefetched signal is available for this read.
    pub fn has_cached_signal(&self) -> bool {
        self.batch
            .signal_cache()
            .is_some_and(|cache| cache.samples().is_some())
    }

    /// The full signal of the read. Served from the prefetched cache
    /// when available, decoded on demand otherwise.
    pub fn signal(&self) -> Result<Vec<i16>, Pod5Error> {
        if let (Some(cache), Some(cache_index)) = (self.batch.signal_cache(), self.cache_index) {
            if let Some(samples) = cache.samples() {
                return Ok(samples[cache_index].clone());
            }
        }
        let signal = self
            .batch
            .core
            .signal_for_rows(&self.signal_row_ids())?;
        if signal.len() as u64 != self.num_samples() {
            return Err(Pod5Error::CorruptSignal(format!(
                "read {} has {} samples in signal rows, record says {}",
                self.read_id(),
                signal.len(),
                self.num_samples()
            )));
        }
        Ok(signal)
    }

    /// The signal calibrated into picoamps.
    pub fn signal_pa(&self) -> Result<Vec<f32>, Pod5Error> {
        let Calibration { offset, scale } = self.calibration();
        Ok(self
            .signal()?
            .into_iter()
            .map(|sample| (sample as f32 + offset) * scale)
            .collect())
    }

    /// Materialise this view into an owned [`Read`].
    pub fn to_read(&self) -> Result<Read, Pod5Error> {
        Ok(Read {
            read_id: self.read_id(),
            pore: self.pore(),
            calibration: self.calibration(),
            read_number: self.read_number(),
            start_sample: self.start_sample(),
            median_before: self.median_before(),
            end_reason: self.end_reason(),
            run_info: (*self.run_info()?).clone(),
            num_minknow_events: self.num_minknow_events(),
            tracked_scaling: self.tracked_scaling(),
            predicted_scaling: self.predicted_scaling(),
            num_reads_since_mux_change: self.num_reads_since_mux_change(),
            time_since_mux_change: self.time_since_mux_change(),
            signal: self.signal()?,
        })
    }

    /// Materialise this view with its signal kept as verbatim compressed
    /// chunks. This is the shape the repacker and `update` move between
    /// files.
    pub fn to_compressed_read(&self) -> Result<CompressedRead, Pod5Error> {
        let (signal_chunks, signal_chunk_lengths) = self
            .batch
            .core
            .compressed_chunks_for_rows(&self.signal_row_ids())?;
        Ok(CompressedRead {
            read_id: self.read_id(),
            pore: self.pore(),
            calibration: self.calibration(),
            read_number: self.read_number(),
            start_sample: self.start_sample(),
            median_before: self.median_before(),
            end_reason: self.end_reason(),
            run_info: (*self.run_info()?).clone(),
            num_minknow_events: self.num_minknow_events(),
            tracked_scaling: self.tracked_scaling(),
            predicted_scaling: self.predicted_scaling(),
            num_reads_since_mux_change: self.num_reads_since_mux_change(),
            time_since_mux_change: self.time_since_mux_change(),
            signal_chunks,
            signal_chunk_lengths,
        })
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        test_util,
        writer::{Writer, WriterOptions},
    };

    fn write_two_batch_file(path: &Path, per_batch: u32) -> Vec<Uuid> {
        let info = test_util::run_info("acq-planner");
        let mut writer = Writer::create(
            path,
            WriterOptions::default().read_batch_size(per_batch as usize),
        )
        .unwrap();
        let mut ids = Vec::new();
        for n in 0..per_batch * 2 {
            let read = test_util::read(n, &info, 8);
            ids.push(read.read_id);
            writer.add_read(&read).unwrap();
        }
        writer.close().unwrap();
        ids
    }

    #[test]
    fn test_open_rejects_non_pod5() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.pod5");
        std::fs::write(&path, b"this is not at all a pod5 file, sorry").unwrap();
        assert!(matches!(
            Reader::open(&path),
            Err(Pod5Error::NotAPod5File(_))
        ));
    }

    #[test]
    fn test_batch_iteration_equals_read_iteration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("iter.pod5");
        let info = test_util::run_info("acq-iter");
        let mut writer =
            Writer::create(&path, WriterOptions::default().read_batch_size(4)).unwrap();
        for n in 0..11 {
            writer.add_read(&test_util::read(n, &info, 8)).unwrap();
        }
        writer.close().unwrap();

        let reader = Reader::open(&path).unwrap();
        let from_batches = reader
            .read_batches()
            .flat_map(|batch| {
                batch
                    .unwrap()
                    .reads()
                    .map(|record| record.read_id())
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();
        let from_reads = reader
            .reads()
            .map(|record| record.unwrap().read_id())
            .collect::<Vec<_>>();
        assert_eq!(from_batches, from_reads);
        assert_eq!(from_reads.len(), 11);
    }

    #[test]
    fn test_planner_read_efficient_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.pod5");
        let ids = write_two_batch_file(&path, 1000);

        let reader = Reader::open(&path).unwrap();
        assert_eq!(reader.batch_count(), 2);

        let request = [ids[1999], ids[3], ids[5], ids[1500]];
        let plan = reader
            .plan_traversal(&request, TraversalOrder::ReadEfficient)
            .unwrap();
        assert_eq!(plan.successful_finds, 4);
        assert_eq!(plan.per_batch_counts, vec![2, 2]);
        assert_eq!(plan.batch_rows, vec![3, 5, 500, 999]);

        // Rows are non-decreasing within each batch.
        for rows in plan.rows_by_batch() {
            assert!(rows.windows(2).all(|pair| pair[0] <= pair[1]));
        }
    }

    #[test]
    fn test_planner_original_order_within_batch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("order.pod5");
        let ids = write_two_batch_file(&path, 100);

        let reader = Reader::open(&path).unwrap();
        let request = [ids[5], ids[3], ids[150], ids[120]];
        let plan = reader
            .plan_traversal(&request, TraversalOrder::OriginalOrder)
            .unwrap();
        assert_eq!(plan.per_batch_counts, vec![2, 2]);
        assert_eq!(plan.batch_rows, vec![5, 3, 50, 20]);

        // The selected batches concatenate read ids per batch in input
        // order.
        let selected = reader
            .read_batches_selected(&plan)
            .unwrap()
            .flat_map(|batch| batch.unwrap().read_ids())
            .collect::<Vec<_>>();
        assert_eq!(selected, vec![ids[5], ids[3], ids[150], ids[120]]);
    }

    #[test]
    fn test_missing_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.pod5");
        let ids = write_two_batch_file(&path, 1000);

        let reader = Reader::open(&path).unwrap();
        let absent = Uuid::parse_str("ffffffff-ffff-ffff-ffff-ffffffffffff").unwrap();
        let request = [ids[1999], ids[3], ids[5], ids[1500], absent];

        let plan = reader
            .plan_traversal(&request, TraversalOrder::ReadEfficient)
            .unwrap();
        assert_eq!(plan.successful_finds, 4);

        assert!(matches!(
            reader.reads_selected(&request, false),
            Err(Pod5Error::MissingReads { missing: 1 })
        ));
        let found = reader
            .reads_selected(&request, true)
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(found.len(), 4);
    }

    #[test]
    fn test_get_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("get.pod5");
        let ids = write_two_batch_file(&path, 10);

        let reader = Reader::open(&path).unwrap();
        let record = reader.get_read(&ids[13]).unwrap().unwrap();
        assert_eq!(record.read_id(), ids[13]);
        assert_eq!(record.read_number(), 13);
        // adc range -2048..=2047 from the test run info.
        assert_eq!(record.calibration_digitisation().unwrap(), 4096);
        assert_eq!(record.calibration_range().unwrap(), 4096.0);

        let absent = Uuid::parse_str("ffffffff-ffff-ffff-ffff-ffffffffffff").unwrap();
        assert!(reader.get_read(&absent).unwrap().is_none());
    }

    #[test]
    fn test_read_batches_by_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("by-index.pod5");
        write_two_batch_file(&path, 10);

        let reader = Reader::open(&path).unwrap();
        let numbers = reader
            .read_batches_by_index(&[1, 0])
            .flat_map(|batch| {
                batch
                    .unwrap()
                    .reads()
                    .map(|record| record.read_number())
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();
        assert_eq!(numbers, (10..20).chain(0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_preload_selection_matches_direct_decode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preload.pod5");
        let info = test_util::run_info("acq-preload");
        let mut writer =
            Writer::create(&path, WriterOptions::default().read_batch_size(5)).unwrap();
        let reads = (0..40)
            .map(|n| test_util::read(n, &info, 64))
            .collect::<Vec<_>>();
        writer.add_reads(&reads).unwrap();
        writer.close().unwrap();

        let reader = Reader::open(&path).unwrap();
        let wanted = [
            test_util::read_id(33),
            test_util::read_id(2),
            test_util::read_id(17),
        ];
        let mut seen = Vec::new();
        for batch in reader
            .read_batches_preloaded(Some(&wanted), false, PreloadOptions::all())
            .unwrap()
        {
            let batch = batch.unwrap();
            let cache = batch.signal_cache().expect("preload attaches a cache");
            assert_eq!(cache.samples().unwrap().len(), batch.num_reads());
            for record in batch.reads() {
                assert!(record.has_cached_signal());
                let direct = reads[record.read_number() as usize].signal.clone();
                assert_eq!(record.signal().unwrap(), direct);
                seen.push(record.read_id());
            }
        }
        let mut expected = wanted.to_vec();
        expected.sort_by_key(|id| *id.as_bytes());
        let mut seen_sorted = seen.clone();
        seen_sorted.sort_by_key(|id| *id.as_bytes());
        assert_eq!(seen_sorted, expected);
    }

    #[test]
    fn test_preload_all_batches_arrive_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preload-all.pod5");
        let info = test_util::run_info("acq-preload-all");
        let mut writer =
            Writer::create(&path, WriterOptions::default().read_batch_size(5)).unwrap();
        for n in 0..150 {
            writer.add_read(&test_util::read(n, &info, 16)).unwrap();
        }
        writer.close().unwrap();

        let reader = Reader::open(&path).unwrap();
        let mut numbers = Vec::new();
        for batch in reader
            .read_batches_preloaded(None, false, PreloadOptions::samples())
            .unwrap()
        {
            let batch = batch.unwrap();
            for record in batch.reads() {
                assert!(record.has_cached_signal());
                numbers.push(record.read_number());
            }
        }
        assert_eq!(numbers, (0..150).collect::<Vec<_>>());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_no_file_descriptors_leak() {
        fn open_fds() -> usize {
            std::fs::read_dir("/proc/self/fd").unwrap().count()
        }

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fds.pod5");
        let info = test_util::run_info("acq-fds");
        let mut writer = Writer::create(&path, WriterOptions::default()).unwrap();
        writer.add_read(&test_util::read(0, &info, 32)).unwrap();
        writer.close().unwrap();
        drop(writer);

        let before = open_fds();
        for _ in 0..4 {
            let reader = Reader::open(&path).unwrap();
            let record = reader.get_read(&test_util::read_id(0)).unwrap().unwrap();
            assert_eq!(record.signal().unwrap().len(), 32);
            reader.close();
        }
        assert_eq!(open_fds(), before);
    }
}
