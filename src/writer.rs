//! Writing POD5 files.
//!
//! The writer streams compressed signal batches straight into the
//! destination file while buffering read and run-info rows; `close`
//! finishes the signal table, appends the remaining tables, the read-id
//! index and the footer, and seals the file. Dictionary values (pore
//! types, end reasons, run infos) are interned by value, so indices are
//! stable for the lifetime of the writer.

use std::{
    collections::HashMap,
    fs::{File, OpenOptions},
    io::{self, BufWriter, Write},
    mem,
    path::{Path, PathBuf},
    sync::Arc,
};

use arrow::array::{
    ArrayRef, BooleanArray, DictionaryArray, FixedSizeBinaryBuilder, Float32Array, Int16Array,
    LargeBinaryBuilder, ListBuilder, MapBuilder, RecordBatch, StringArray, StringBuilder,
    UInt16Array, UInt32Array, UInt32Builder, UInt64Array, UInt64Builder, UInt8Array,
};
use arrow::datatypes::{Int16Type, Schema};
use arrow::ipc::writer::FileWriter;
use pod5_footer::footer_generated::minknow::reads_format::ContentType;
use pod5_footer::{FooterBuilder, TableInfo, FILE_SIGNATURE};
use uuid::Uuid;

use crate::{
    error::Pod5Error,
    index::{serialize_index, IndexEntry},
    records::{Calibration, CompressedRead, EndReason, EndReasonKind, Pore, Read, RunInfo,
        ShiftScalePair},
    schema,
    signal::{compress_signal_chunked, DEFAULT_SIGNAL_CHUNK_SIZE},
};

/// Reads per batch of the reads table unless overridden.
pub const DEFAULT_READ_BATCH_SIZE: usize = 1000;

/// Signal rows per batch of the signal table unless overridden.
pub const DEFAULT_SIGNAL_BATCH_ROW_COUNT: usize = 100;

/// File offset of the signal table: signature plus section marker.
const SIGNAL_TABLE_OFFSET: u64 = (FILE_SIGNATURE.len() + pod5_footer::SECTION_MARKER_LEN) as u64;

/// Options controlling a [`Writer`].
#[derive(Debug, Clone)]
pub struct WriterOptions {
    software_name: String,
    read_batch_size: usize,
    signal_chunk_size: usize,
    signal_batch_row_count: usize,
    file_identifier: Option<Uuid>,
    version_pre_migration: Option<String>,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            software_name: schema::DEFAULT_SOFTWARE_NAME.to_string(),
            read_batch_size: DEFAULT_READ_BATCH_SIZE,
            signal_chunk_size: DEFAULT_SIGNAL_CHUNK_SIZE,
            signal_batch_row_count: DEFAULT_SIGNAL_BATCH_ROW_COUNT,
            file_identifier: None,
            version_pre_migration: None,
        }
    }
}

impl WriterOptions {
    pub fn software_name(mut self, name: impl Into<String>) -> Self {
        self.software_name = name.into();
        self
    }

    /// Reads per batch. Fixed for the lifetime of the file.
    pub fn read_batch_size(mut self, size: usize) -> Self {
        assert!(size > 0, "read batch size must be non-zero");
        self.read_batch_size = size;
        self
    }

    /// Samples per compressed signal chunk.
    pub fn signal_chunk_size(mut self, size: usize) -> Self {
        assert!(size > 0, "signal chunk size must be non-zero");
        self.signal_chunk_size = size;
        self
    }

    /// Signal rows per signal batch. Fixed for the lifetime of the file
    /// and recorded in the footer.
    pub fn signal_batch_row_count(mut self, rows: usize) -> Self {
        assert!(rows > 0, "signal batch row count must be non-zero");
        self.signal_batch_row_count = rows;
        self
    }

    /// Use a fixed file identifier instead of a fresh random one. Used
    /// by `update` to preserve file identity across rewrites.
    pub fn file_identifier(mut self, file_identifier: Uuid) -> Self {
        self.file_identifier = Some(file_identifier);
        self
    }

    /// Record the version the data was originally written at.
    pub fn version_pre_migration(mut self, version: impl Into<String>) -> Self {
        self.version_pre_migration = Some(version.into());
        self
    }
}

/// A `Write` adapter that tracks the absolute file position.
struct CountingWriter<W> {
    inner: W,
    position: u64,
}

impl<W: Write> CountingWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner, position: 0 }
    }

    fn position(&self) -> u64 {
        self.position
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.position += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Final dictionary value arrays shared by every reads batch at close.
struct DictionaryValues {
    pore_types: ArrayRef,
    end_reasons: ArrayRef,
    run_infos: ArrayRef,
}

/// One buffered read row. Signal is already on disk; this is the
/// metadata that becomes the reads-table row at close.
struct PendingRead {
    read_id: Uuid,
    read_number: u32,
    start: u64,
    channel: u16,
    well: u8,
    median_before: f32,
    pore_type: i16,
    calibration_offset: f32,
    calibration_scale: f32,
    end_reason: i16,
    end_reason_forced: bool,
    run_info: i16,
    signal_rows: Vec<u64>,
    num_minknow_events: u64,
    tracked_scaling: ShiftScalePair,
    predicted_scaling: ShiftScalePair,
    num_reads_since_mux_change: u32,
    time_since_mux_change: f32,
    num_samples: u64,
}

/// Metadata shared by the compressed and uncompressed add paths.
struct RowMeta<'a> {
    read_id: Uuid,
    pore: &'a Pore,
    calibration: Calibration,
    read_number: u32,
    start_sample: u64,
    median_before: f32,
    end_reason: EndReason,
    run_info: &'a RunInfo,
    num_minknow_events: u64,
    tracked_scaling: ShiftScalePair,
    predicted_scaling: ShiftScalePair,
    num_reads_since_mux_change: u32,
    time_since_mux_change: f32,
}

impl<'a> RowMeta<'a> {
    fn from_read(read: &'a Read) -> Self {
        Self {
            read_id: read.read_id,
            pore: &read.pore,
            calibration: read.calibration,
            read_number: read.read_number,
            start_sample: read.start_sample,
            median_before: read.median_before,
            end_reason: read.end_reason,
            run_info: &read.run_info,
            num_minknow_events: read.num_minknow_events,
            tracked_scaling: read.tracked_scaling,
            predicted_scaling: read.predicted_scaling,
            num_reads_since_mux_change: read.num_reads_since_mux_change,
            time_since_mux_change: read.time_since_mux_change,
        }
    }

    fn from_compressed(read: &'a CompressedRead) -> Self {
        Self {
            read_id: read.read_id,
            pore: &read.pore,
            calibration: read.calibration,
            read_number: read.read_number,
            start_sample: read.start_sample,
            median_before: read.median_before,
            end_reason: read.end_reason,
            run_info: &read.run_info,
            num_minknow_events: read.num_minknow_events,
            tracked_scaling: read.tracked_scaling,
            predicted_scaling: read.predicted_scaling,
            num_reads_since_mux_change: read.num_reads_since_mux_change,
            time_since_mux_change: read.time_since_mux_change,
        }
    }
}

/// POD5 file writer.
pub struct Writer {
    path: PathBuf,
    options: WriterOptions,
    file_identifier: Uuid,
    section_marker: [u8; 16],
    signal_writer: Option<FileWriter<CountingWriter<BufWriter<File>>>>,
    signal_schema: Arc<Schema>,
    reads_schema: Arc<Schema>,
    run_info_schema: Arc<Schema>,

    pore_types: Vec<String>,
    pore_type_index: HashMap<String, i16>,
    end_reasons: Vec<EndReasonKind>,
    end_reason_index: HashMap<EndReasonKind, i16>,
    run_infos: Vec<RunInfo>,
    run_info_index: HashMap<RunInfo, i16>,
    acquisition_ids: HashMap<String, i16>,

    row_groups: Vec<Vec<PendingRead>>,
    pending: Vec<PendingRead>,
    index_entries: Vec<IndexEntry>,

    signal_read_id: FixedSizeBinaryBuilder,
    signal_bytes: LargeBinaryBuilder,
    signal_samples: UInt32Builder,
    signal_rows_in_batch: usize,
    next_signal_row: u64,

    sealed: bool,
}

impl Writer {
    /// Create a new POD5 file. Refuses to overwrite an existing path.
    pub fn create(path: impl AsRef<Path>, options: WriterOptions) -> Result<Self, Pod5Error> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)?;
        let mut out = CountingWriter::new(BufWriter::new(file));
        out.write_all(&FILE_SIGNATURE)?;
        let section_marker = *Uuid::new_v4().as_bytes();
        out.write_all(&section_marker)?;

        let file_identifier = options.file_identifier.unwrap_or_else(Uuid::new_v4);
        let metadata = schema::table_metadata(
            &file_identifier,
            &options.software_name,
            options.version_pre_migration.as_deref(),
        );
        let signal_schema = Arc::new(schema::signal_schema(metadata.clone()));
        let reads_schema = Arc::new(schema::reads_schema(metadata.clone()));
        let run_info_schema = Arc::new(schema::run_info_schema(metadata));

        let signal_writer = FileWriter::try_new(out, &signal_schema)?;

        Ok(Self {
            path,
            options,
            file_identifier,
            section_marker,
            signal_writer: Some(signal_writer),
            signal_schema,
            reads_schema,
            run_info_schema,
            pore_types: Vec::new(),
            pore_type_index: HashMap::new(),
            end_reasons: Vec::new(),
            end_reason_index: HashMap::new(),
            run_infos: Vec::new(),
            run_info_index: HashMap::new(),
            acquisition_ids: HashMap::new(),
            row_groups: Vec::new(),
            pending: Vec::new(),
            index_entries: Vec::new(),
            signal_read_id: FixedSizeBinaryBuilder::new(16),
            signal_bytes: LargeBinaryBuilder::new(),
            signal_samples: UInt32Builder::new(),
            signal_rows_in_batch: 0,
            next_signal_row: 0,
            sealed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_identifier(&self) -> Uuid {
        self.file_identifier
    }

    pub fn software_name(&self) -> &str {
        &self.options.software_name
    }

    /// Number of reads appended so far.
    pub fn num_reads(&self) -> usize {
        self.row_groups.iter().map(Vec::len).sum::<usize>() + self.pending.len()
    }

    fn ensure_open(&self) -> Result<(), Pod5Error> {
        if self.sealed || self.signal_writer.is_none() {
            return Err(Pod5Error::WriterSealed);
        }
        Ok(())
    }

    /// Intern a pore type, returning its stable dictionary index.
    pub fn add_pore_type(&mut self, pore_type: &str) -> Result<i16, Pod5Error> {
        self.ensure_open()?;
        Ok(self.intern_pore_type(pore_type))
    }

    fn intern_pore_type(&mut self, pore_type: &str) -> i16 {
        if let Some(&index) = self.pore_type_index.get(pore_type) {
            return index;
        }
        let index = self.pore_types.len() as i16;
        self.pore_types.push(pore_type.to_string());
        self.pore_type_index.insert(pore_type.to_string(), index);
        index
    }

    /// Intern an end reason, returning its stable dictionary index.
    pub fn add_end_reason(&mut self, reason: EndReasonKind) -> Result<i16, Pod5Error> {
        self.ensure_open()?;
        Ok(self.intern_end_reason(reason))
    }

    fn intern_end_reason(&mut self, reason: EndReasonKind) -> i16 {
        if let Some(&index) = self.end_reason_index.get(&reason) {
            return index;
        }
        let index = self.end_reasons.len() as i16;
        self.end_reasons.push(reason);
        self.end_reason_index.insert(reason, index);
        index
    }

    /// Intern a run info, returning its stable dictionary index.
    ///
    /// Deduplication is by full value equality. A run info whose
    /// acquisition id matches an existing entry but whose other fields
    /// differ is rejected, keeping acquisition ids unique within the
    /// file.
    pub fn add_run_info(&mut self, run_info: &RunInfo) -> Result<i16, Pod5Error> {
        self.ensure_open()?;
        self.intern_run_info(run_info)
    }

    fn intern_run_info(&mut self, run_info: &RunInfo) -> Result<i16, Pod5Error> {
        if let Some(&index) = self.run_info_index.get(run_info) {
            return Ok(index);
        }
        if self.acquisition_ids.contains_key(&run_info.acquisition_id) {
            return Err(Pod5Error::RunInfoConflict(run_info.acquisition_id.clone()));
        }
        let index = self.run_infos.len() as i16;
        self.run_infos.push(run_info.clone());
        self.run_info_index.insert(run_info.clone(), index);
        self.acquisition_ids
            .insert(run_info.acquisition_id.clone(), index);
        Ok(index)
    }

    /// Append one read, compressing its signal into chunks.
    pub fn add_read(&mut self, read: &Read) -> Result<(), Pod5Error> {
        self.ensure_open()?;
        let (chunks, chunk_lengths) =
            compress_signal_chunked(&read.signal, self.options.signal_chunk_size)?;
        let signal_rows = self.append_signal_rows(&read.read_id, &chunks, &chunk_lengths)?;
        self.append_read_row(
            RowMeta::from_read(read),
            signal_rows,
            read.signal.len() as u64,
        )
    }

    /// Append reads in order.
    pub fn add_reads<'a>(
        &mut self,
        reads: impl IntoIterator<Item = &'a Read>,
    ) -> Result<(), Pod5Error> {
        for read in reads {
            self.add_read(read)?;
        }
        Ok(())
    }

    /// Append one read whose signal is already compressed. Chunk bytes
    /// are written verbatim; this is the path the repacker, recovery and
    /// `update` use to move signal without a decode/encode round trip.
    pub fn add_read_pre_compressed(&mut self, read: &CompressedRead) -> Result<(), Pod5Error> {
        self.ensure_open()?;
        if read.signal_chunks.len() != read.signal_chunk_lengths.len() {
            return Err(Pod5Error::CorruptSignal(format!(
                "read {} has {} chunks but {} chunk lengths",
                read.read_id,
                read.signal_chunks.len(),
                read.signal_chunk_lengths.len()
            )));
        }
        let signal_rows =
            self.append_signal_rows(&read.read_id, &read.signal_chunks, &read.signal_chunk_lengths)?;
        let num_samples = read.sample_count() as u64;
        self.append_read_row(RowMeta::from_compressed(read), signal_rows, num_samples)
    }

    fn append_signal_rows(
        &mut self,
        read_id: &Uuid,
        chunks: &[Vec<u8>],
        chunk_lengths: &[u32],
    ) -> Result<Vec<u64>, Pod5Error> {
        let mut rows = Vec::with_capacity(chunks.len());
        for (chunk, &samples) in chunks.iter().zip(chunk_lengths) {
            self.signal_read_id.append_value(read_id.as_bytes())?;
            self.signal_bytes.append_value(chunk);
            self.signal_samples.append_value(samples);
            rows.push(self.next_signal_row);
            self.next_signal_row += 1;
            self.signal_rows_in_batch += 1;
            if self.signal_rows_in_batch == self.options.signal_batch_row_count {
                self.flush_signal_batch()?;
            }
        }
        Ok(rows)
    }

    fn flush_signal_batch(&mut self) -> Result<(), Pod5Error> {
        if self.signal_rows_in_batch == 0 {
            return Ok(());
        }
        let batch = RecordBatch::try_new(
            self.signal_schema.clone(),
            vec![
                Arc::new(self.signal_read_id.finish()) as ArrayRef,
                Arc::new(self.signal_bytes.finish()),
                Arc::new(self.signal_samples.finish()),
            ],
        )?;
        self.signal_writer
            .as_mut()
            .ok_or(Pod5Error::WriterSealed)?
            .write(&batch)?;
        self.signal_rows_in_batch = 0;
        Ok(())
    }

    fn append_read_row(
        &mut self,
        meta: RowMeta<'_>,
        signal_rows: Vec<u64>,
        num_samples: u64,
    ) -> Result<(), Pod5Error> {
        let pore_type = self.intern_pore_type(&meta.pore.pore_type);
        let end_reason = self.intern_end_reason(meta.end_reason.reason);
        let run_info = self.intern_run_info(meta.run_info)?;

        self.index_entries.push(IndexEntry {
            read_id: *meta.read_id.as_bytes(),
            batch: self.row_groups.len() as u32,
            row: self.pending.len() as u32,
        });
        self.pending.push(PendingRead {
            read_id: meta.read_id,
            read_number: meta.read_number,
            start: meta.start_sample,
            channel: meta.pore.channel,
            well: meta.pore.well,
            median_before: meta.median_before,
            pore_type,
            calibration_offset: meta.calibration.offset,
            calibration_scale: meta.calibration.scale,
            end_reason,
            end_reason_forced: meta.end_reason.forced,
            run_info,
            signal_rows,
            num_minknow_events: meta.num_minknow_events,
            tracked_scaling: meta.tracked_scaling,
            predicted_scaling: meta.predicted_scaling,
            num_reads_since_mux_change: meta.num_reads_since_mux_change,
            time_since_mux_change: meta.time_since_mux_change,
            num_samples,
        });
        if self.pending.len() == self.options.read_batch_size {
            self.rotate_row_group();
        }
        Ok(())
    }

    fn rotate_row_group(&mut self) {
        self.row_groups.push(mem::take(&mut self.pending));
    }

    /// Close the current read batch early. The next appended read
    /// starts a new batch.
    pub fn flush(&mut self) -> Result<(), Pod5Error> {
        self.ensure_open()?;
        if !self.pending.is_empty() {
            self.rotate_row_group();
        }
        Ok(())
    }

    /// The final dictionary value arrays, built once at close. Sharing
    /// one array across every batch keeps the IPC dictionary tracker on
    /// its pointer-equality fast path and guarantees no replacement is
    /// ever detected.
    fn dictionary_values(&self) -> DictionaryValues {
        DictionaryValues {
            pore_types: Arc::new(StringArray::from_iter_values(
                self.pore_types.iter().map(String::as_str),
            )),
            end_reasons: Arc::new(StringArray::from_iter_values(
                self.end_reasons.iter().map(|reason| reason.as_str()),
            )),
            run_infos: Arc::new(StringArray::from_iter_values(
                self.run_infos
                    .iter()
                    .map(|run_info| run_info.acquisition_id.as_str()),
            )),
        }
    }

    fn build_reads_batch(
        &self,
        rows: &[PendingRead],
        dictionaries: &DictionaryValues,
    ) -> Result<RecordBatch, Pod5Error> {
        let mut read_id = FixedSizeBinaryBuilder::new(16);
        for row in rows {
            read_id.append_value(row.read_id.as_bytes())?;
        }
        let mut signal = ListBuilder::new(UInt64Builder::new());
        for row in rows {
            for &signal_row in &row.signal_rows {
                signal.values().append_value(signal_row);
            }
            signal.append(true);
        }

        let dict = |values: &ArrayRef, keys: Vec<i16>| -> Result<ArrayRef, Pod5Error> {
            Ok(Arc::new(DictionaryArray::<Int16Type>::try_new(
                Int16Array::from(keys),
                values.clone(),
            )?))
        };
        let pore_type = dict(
            &dictionaries.pore_types,
            rows.iter().map(|r| r.pore_type).collect(),
        )?;
        let end_reason = dict(
            &dictionaries.end_reasons,
            rows.iter().map(|r| r.end_reason).collect(),
        )?;
        let run_info = dict(
            &dictionaries.run_infos,
            rows.iter().map(|r| r.run_info).collect(),
        )?;

        let columns: Vec<ArrayRef> = vec![
            Arc::new(read_id.finish()),
            Arc::new(UInt32Array::from(
                rows.iter().map(|r| r.read_number).collect::<Vec<_>>(),
            )),
            Arc::new(UInt64Array::from(
                rows.iter().map(|r| r.start).collect::<Vec<_>>(),
            )),
            Arc::new(UInt16Array::from(
                rows.iter().map(|r| r.channel).collect::<Vec<_>>(),
            )),
            Arc::new(UInt8Array::from(
                rows.iter().map(|r| r.well).collect::<Vec<_>>(),
            )),
            Arc::new(Float32Array::from(
                rows.iter().map(|r| r.median_before).collect::<Vec<_>>(),
            )),
            pore_type,
            Arc::new(Float32Array::from(
                rows.iter().map(|r| r.calibration_offset).collect::<Vec<_>>(),
            )),
            Arc::new(Float32Array::from(
                rows.iter().map(|r| r.calibration_scale).collect::<Vec<_>>(),
            )),
            end_reason,
            Arc::new(BooleanArray::from(
                rows.iter().map(|r| r.end_reason_forced).collect::<Vec<_>>(),
            )),
            run_info,
            Arc::new(signal.finish()),
            Arc::new(UInt64Array::from(
                rows.iter().map(|r| r.num_minknow_events).collect::<Vec<_>>(),
            )),
            Arc::new(Float32Array::from(
                rows.iter().map(|r| r.tracked_scaling.scale).collect::<Vec<_>>(),
            )),
            Arc::new(Float32Array::from(
                rows.iter().map(|r| r.tracked_scaling.shift).collect::<Vec<_>>(),
            )),
            Arc::new(Float32Array::from(
                rows.iter()
                    .map(|r| r.predicted_scaling.scale)
                    .collect::<Vec<_>>(),
            )),
            Arc::new(Float32Array::from(
                rows.iter()
                    .map(|r| r.predicted_scaling.shift)
                    .collect::<Vec<_>>(),
            )),
            Arc::new(UInt32Array::from(
                rows.iter()
                    .map(|r| r.num_reads_since_mux_change)
                    .collect::<Vec<_>>(),
            )),
            Arc::new(Float32Array::from(
                rows.iter()
                    .map(|r| r.time_since_mux_change)
                    .collect::<Vec<_>>(),
            )),
            Arc::new(UInt64Array::from(
                rows.iter().map(|r| r.num_samples).collect::<Vec<_>>(),
            )),
        ];
        Ok(RecordBatch::try_new(self.reads_schema.clone(), columns)?)
    }

    fn build_run_info_batch(&self) -> Result<RecordBatch, Pod5Error> {
        let rows = &self.run_infos;
        let utf8 = |get: fn(&RunInfo) -> &str| -> ArrayRef {
            Arc::new(StringArray::from_iter_values(rows.iter().map(get)))
        };
        let map = |get: fn(&RunInfo) -> &Vec<(String, String)>| -> Result<ArrayRef, Pod5Error> {
            let mut builder = MapBuilder::new(None, StringBuilder::new(), StringBuilder::new());
            for row in rows {
                for (key, value) in get(row) {
                    builder.keys().append_value(key);
                    builder.values().append_value(value);
                }
                builder.append(true)?;
            }
            Ok(Arc::new(builder.finish()))
        };

        let columns: Vec<ArrayRef> = vec![
            utf8(|r| &r.acquisition_id),
            Arc::new(arrow::array::Int64Array::from(
                rows.iter()
                    .map(|r| r.acquisition_start_time)
                    .collect::<Vec<_>>(),
            )),
            Arc::new(Int16Array::from(
                rows.iter().map(|r| r.adc_max).collect::<Vec<_>>(),
            )),
            Arc::new(Int16Array::from(
                rows.iter().map(|r| r.adc_min).collect::<Vec<_>>(),
            )),
            map(|r| &r.context_tags)?,
            utf8(|r| &r.experiment_name),
            utf8(|r| &r.flow_cell_id),
            utf8(|r| &r.flow_cell_product_code),
            utf8(|r| &r.protocol_name),
            utf8(|r| &r.protocol_run_id),
            Arc::new(arrow::array::Int64Array::from(
                rows.iter().map(|r| r.protocol_start_time).collect::<Vec<_>>(),
            )),
            utf8(|r| &r.sample_id),
            Arc::new(UInt16Array::from(
                rows.iter().map(|r| r.sample_rate).collect::<Vec<_>>(),
            )),
            utf8(|r| &r.sequencing_kit),
            utf8(|r| &r.sequencer_position),
            utf8(|r| &r.sequencer_position_type),
            utf8(|r| &r.software),
            utf8(|r| &r.system_name),
            utf8(|r| &r.system_type),
            map(|r| &r.tracking_id)?,
        ];
        Ok(RecordBatch::try_new(self.run_info_schema.clone(), columns)?)
    }

    fn build_table_ipc(
        schema: &Arc<Schema>,
        batches: impl IntoIterator<Item = Result<RecordBatch, Pod5Error>>,
    ) -> Result<Vec<u8>, Pod5Error> {
        let mut writer = FileWriter::try_new(Vec::new(), schema)?;
        for batch in batches {
            writer.write(&batch?)?;
        }
        writer.finish()?;
        Ok(writer.into_inner()?)
    }

    /// Seal the file: flush pending batches, append the reads, run-info
    /// and index sections, and write the footer and closing signature.
    /// Idempotent; appending after close fails with
    /// [`Pod5Error::WriterSealed`].
    pub fn close(&mut self) -> Result<(), Pod5Error> {
        if self.sealed {
            return Ok(());
        }
        self.sealed = true;

        self.flush_signal_batch()?;
        if !self.pending.is_empty() {
            self.rotate_row_group();
        }

        let mut signal_writer = self.signal_writer.take().ok_or(Pod5Error::WriterSealed)?;
        signal_writer.finish()?;
        let mut out = signal_writer.into_inner()?;

        let mut tables = Vec::with_capacity(4);
        Self::end_section(
            &mut out,
            &self.section_marker,
            &mut tables,
            SIGNAL_TABLE_OFFSET,
            ContentType::SignalTable,
        )?;

        let reads_offset = out.position();
        let row_groups = mem::take(&mut self.row_groups);
        let dictionaries = self.dictionary_values();
        let reads_ipc = Self::build_table_ipc(
            &self.reads_schema,
            row_groups
                .iter()
                .map(|group| self.build_reads_batch(group, &dictionaries)),
        )?;
        out.write_all(&reads_ipc)?;
        Self::end_section(
            &mut out,
            &self.section_marker,
            &mut tables,
            reads_offset,
            ContentType::ReadsTable,
        )?;

        let run_info_offset = out.position();
        let run_info_batches = if self.run_infos.is_empty() {
            Vec::new()
        } else {
            vec![self.build_run_info_batch()]
        };
        let run_info_ipc = Self::build_table_ipc(&self.run_info_schema, run_info_batches)?;
        out.write_all(&run_info_ipc)?;
        Self::end_section(
            &mut out,
            &self.section_marker,
            &mut tables,
            run_info_offset,
            ContentType::RunInfoTable,
        )?;

        let index_offset = out.position();
        let index_bytes = serialize_index(&mut self.index_entries);
        out.write_all(&index_bytes)?;
        Self::end_section(
            &mut out,
            &self.section_marker,
            &mut tables,
            index_offset,
            ContentType::IndexTable,
        )?;

        FooterBuilder::new(
            self.file_identifier.to_string(),
            self.options.software_name.clone(),
            schema::POD5_VERSION.to_string(),
        )
        .signal_batch_row_count(self.options.signal_batch_row_count as u32)
        .write_footer(&tables, &mut out)?;
        out.write_all(&self.section_marker)?;
        out.write_all(&FILE_SIGNATURE)?;
        out.flush()?;
        Ok(())
    }

    /// Seal the writer without writing the footer, leaving a partial
    /// file on disk. Used when a repack output is cancelled.
    pub(crate) fn abandon(&mut self) {
        self.sealed = true;
        self.signal_writer.take();
    }

    /// Pad to 8-byte alignment, write the section marker and record the
    /// finished section's location.
    fn end_section(
        out: &mut CountingWriter<BufWriter<File>>,
        marker: &[u8; 16],
        tables: &mut Vec<TableInfo>,
        offset: u64,
        content_type: ContentType,
    ) -> Result<(), Pod5Error> {
        let length = out.position() - offset;
        let padding = (8 - out.position() % 8) % 8;
        out.write_all(&[0u8; 8][..padding as usize])?;
        out.write_all(marker)?;
        tables.push(TableInfo::new(offset as i64, length as i64, content_type));
        Ok(())
    }
}

impl Drop for Writer {
    fn drop(&mut self) {
        if !self.sealed {
            if let Err(err) = self.close() {
                log::warn!(
                    "failed to seal pod5 file {} on drop: {err}",
                    self.path.display()
                );
            }
        }
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;
    use crate::{
        reader::Reader,
        records::{Calibration, EndReason, EndReasonKind, Pore, Read, ShiftScalePair},
        test_util,
    };

    fn scratch() -> TempDir {
        tempfile::tempdir().unwrap()
    }

    #[test]
    fn test_roundtrip_one_read() {
        let dir = scratch();
        let path = dir.path().join("one.pod5");
        let read = Read {
            read_id: Uuid::parse_str("00000000-0000-0000-0000-000000000001").unwrap(),
            pore: Pore::new(1, 1, "pore_t"),
            calibration: Calibration::new(0.0, 1.0),
            read_number: 1,
            start_sample: 0,
            median_before: 200.0,
            end_reason: EndReason::with_default_forced(EndReasonKind::SignalPositive),
            run_info: test_util::run_info("acq-1"),
            num_minknow_events: 10,
            tracked_scaling: ShiftScalePair::new(1.5, 2.5),
            predicted_scaling: ShiftScalePair::new(3.5, 4.5),
            num_reads_since_mux_change: 2,
            time_since_mux_change: 8.0,
            signal: (0..1024).collect(),
        };

        let mut writer = Writer::create(&path, WriterOptions::default()).unwrap();
        writer.add_read(&read).unwrap();
        writer.close().unwrap();

        let reader = Reader::open(&path).unwrap();
        let record = reader.get_read(&read.read_id).unwrap().unwrap();
        assert_eq!(record.sample_count(), 1024);
        assert!(!record.end_reason().forced);
        assert_eq!(record.signal().unwrap(), read.signal);
        assert_eq!(record.to_read().unwrap(), read);
        assert_eq!(reader.writing_software(), schema::DEFAULT_SOFTWARE_NAME);
        assert_eq!(reader.file_version(), schema::POD5_VERSION);
    }

    #[test]
    fn test_write_then_read_identity() {
        let dir = scratch();
        let path = dir.path().join("identity.pod5");
        let run_a = test_util::run_info("acq-a");
        let run_b = test_util::run_info("acq-b");
        let reads = (0..20)
            .map(|n| {
                let info = if n % 2 == 0 { &run_a } else { &run_b };
                test_util::read(n, info, 64 + n as usize)
            })
            .collect::<Vec<_>>();

        let mut writer =
            Writer::create(&path, WriterOptions::default().read_batch_size(8)).unwrap();
        writer.add_reads(&reads).unwrap();
        writer.close().unwrap();

        let reader = Reader::open(&path).unwrap();
        assert_eq!(reader.num_reads().unwrap(), reads.len());
        for read in &reads {
            let record = reader.get_read(&read.read_id).unwrap().unwrap();
            assert_eq!(&record.to_read().unwrap(), read);
        }
    }

    #[test]
    fn test_run_info_shared_by_reads() {
        let dir = scratch();
        let path = dir.path().join("shared.pod5");
        let info = test_util::run_info("acq-shared");
        let mut writer = Writer::create(&path, WriterOptions::default()).unwrap();
        for n in 0..10 {
            writer.add_read(&test_util::read(n, &info, 16)).unwrap();
        }
        writer.close().unwrap();

        let reader = Reader::open(&path).unwrap();
        assert_eq!(reader.run_info_count().unwrap(), 1);
        let mut seen = std::collections::HashSet::new();
        for record in reader.reads() {
            let record = record.unwrap();
            assert_eq!(*record.run_info().unwrap(), info);
            seen.insert(record.read_id());
        }
        assert_eq!(seen.len(), 10);
    }

    #[test]
    fn test_dictionaries_deduplicate() {
        let dir = scratch();
        let path = dir.path().join("dict.pod5");
        let mut writer = Writer::create(&path, WriterOptions::default()).unwrap();

        assert_eq!(writer.add_pore_type("pore_t").unwrap(), 0);
        assert_eq!(writer.add_pore_type("pore_t").unwrap(), 0);
        assert_eq!(writer.add_pore_type("pore_u").unwrap(), 1);

        assert_eq!(
            writer.add_end_reason(EndReasonKind::SignalPositive).unwrap(),
            0
        );
        assert_eq!(
            writer.add_end_reason(EndReasonKind::SignalPositive).unwrap(),
            0
        );

        let info = test_util::run_info("acq-dict");
        assert_eq!(writer.add_run_info(&info).unwrap(), 0);
        assert_eq!(writer.add_run_info(&info).unwrap(), 0);
        assert_eq!(writer.run_infos.len(), 1);

        let mut conflicting = test_util::run_info("acq-dict");
        conflicting.sample_id = "other-sample".to_string();
        assert!(matches!(
            writer.add_run_info(&conflicting),
            Err(Pod5Error::RunInfoConflict(_))
        ));
        writer.close().unwrap();
    }

    #[test]
    fn test_sealed_writer_rejects_appends() {
        let dir = scratch();
        let path = dir.path().join("sealed.pod5");
        let info = test_util::run_info("acq-sealed");
        let mut writer = Writer::create(&path, WriterOptions::default()).unwrap();
        writer.add_read(&test_util::read(0, &info, 8)).unwrap();
        writer.close().unwrap();
        // Close is idempotent, appending is not.
        writer.close().unwrap();
        assert!(matches!(
            writer.add_read(&test_util::read(1, &info, 8)),
            Err(Pod5Error::WriterSealed)
        ));
        assert!(matches!(
            writer.add_pore_type("pore_t"),
            Err(Pod5Error::WriterSealed)
        ));
    }

    #[test]
    fn test_refuses_to_overwrite() {
        let dir = scratch();
        let path = dir.path().join("exists.pod5");
        let mut writer = Writer::create(&path, WriterOptions::default()).unwrap();
        writer.close().unwrap();
        assert!(Writer::create(&path, WriterOptions::default()).is_err());
    }

    #[test]
    fn test_empty_file_roundtrip() {
        let dir = scratch();
        let path = dir.path().join("empty.pod5");
        let mut writer = Writer::create(&path, WriterOptions::default()).unwrap();
        writer.close().unwrap();

        let reader = Reader::open(&path).unwrap();
        assert_eq!(reader.num_reads().unwrap(), 0);
        assert_eq!(reader.batch_count(), 0);
        assert!(reader.reads().next().is_none());
    }

    #[test]
    fn test_flush_closes_batch_early() {
        let dir = scratch();
        let path = dir.path().join("flush.pod5");
        let info = test_util::run_info("acq-flush");
        let mut writer = Writer::create(&path, WriterOptions::default()).unwrap();
        for n in 0..3 {
            writer.add_read(&test_util::read(n, &info, 8)).unwrap();
        }
        writer.flush().unwrap();
        for n in 3..5 {
            writer.add_read(&test_util::read(n, &info, 8)).unwrap();
        }
        writer.close().unwrap();

        let reader = Reader::open(&path).unwrap();
        assert_eq!(reader.batch_count(), 2);
        let sizes = reader
            .read_batches()
            .map(|batch| batch.unwrap().num_reads())
            .collect::<Vec<_>>();
        assert_eq!(sizes, vec![3, 2]);
    }

    #[test]
    fn test_signal_chunking_and_batch_rows() {
        let dir = scratch();
        let path = dir.path().join("chunks.pod5");
        let info = test_util::run_info("acq-chunks");
        let read = test_util::read(0, &info, 250);
        let options = WriterOptions::default()
            .signal_chunk_size(100)
            .signal_batch_row_count(2);
        let mut writer = Writer::create(&path, options).unwrap();
        writer.add_read(&read).unwrap();
        writer.close().unwrap();

        let reader = Reader::open(&path).unwrap();
        assert_eq!(reader.signal_batch_row_count(), 2);
        let record = reader.get_read(&read.read_id).unwrap().unwrap();
        let rows = record.signal_rows().unwrap();
        assert_eq!(
            rows.iter().map(|r| r.sample_count).collect::<Vec<_>>(),
            vec![100, 100, 50]
        );
        assert_eq!(rows[0].batch_index, 0);
        assert_eq!(rows[2].batch_index, 1);
        assert_eq!(record.signal().unwrap(), read.signal);
    }
}
