//! Recovering a readable file from a partially written one.
//!
//! A writer crash can leave complete table bodies with no footer. The
//! section marker written after the leading signature reappears after
//! every table, so the table boundaries can be found without the
//! footer. Each candidate section is an Arrow IPC file whose body (after
//! the 8-byte `ARROW1` prefix) is a valid stream prefix, which lets a
//! tolerant stream reader consume whole batches and stop at the first
//! malformed one. Surviving rows are reconciled through the read-id
//! column stored redundantly in the signal table and rewritten through
//! an ordinary writer.

use std::{fs, path::Path};

use arrow::array::RecordBatch;
use arrow::ipc::reader::StreamReader;
use pod5_footer::{FILE_SIGNATURE, SECTION_MARKER_LEN};
use uuid::Uuid;

use crate::{
    error::Pod5Error,
    reader::{run_info_at, ReadBatchColumns, Reader, SignalBatchColumns},
    records::{Calibration, CompressedRead, EndReason, Pore, RunInfo, ShiftScalePair},
    writer::{Writer, WriterOptions},
};

const ARROW_MAGIC: [u8; 6] = *b"ARROW1";

/// What a recovery pass managed to salvage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveredCounts {
    pub reads: usize,
    pub signal_rows: usize,
    pub run_infos: usize,
}

enum SectionKind {
    Reads,
    Signal,
    RunInfo,
}

/// One signal row salvaged from the input.
struct RecoveredSignalRow {
    read_id: Uuid,
    samples: u32,
    bytes: Vec<u8>,
}

/// One read row salvaged from the input, with its signal still as
/// absolute row references.
struct RecoveredRead {
    read_id: Uuid,
    pore: Pore,
    calibration: Calibration,
    read_number: u32,
    start_sample: u64,
    median_before: f32,
    end_reason: EndReason,
    acquisition_id: String,
    num_minknow_events: u64,
    tracked_scaling: ShiftScalePair,
    predicted_scaling: ShiftScalePair,
    num_reads_since_mux_change: u32,
    time_since_mux_change: f32,
    signal_rows: Vec<u64>,
}

/// Find every occurrence of `marker` in `bytes` at or after `from`.
fn marker_positions(bytes: &[u8], marker: &[u8], from: usize) -> Vec<usize> {
    let mut positions = Vec::new();
    if marker.is_empty() || bytes.len() < marker.len() {
        return positions;
    }
    let mut at = from;
    while at + marker.len() <= bytes.len() {
        if &bytes[at..at + marker.len()] == marker {
            positions.push(at);
            at += marker.len();
        } else {
            at += 1;
        }
    }
    positions
}

/// Drain whole record batches from a section body, swallowing the error
/// that terminates a truncated stream.
fn drain_section(body: &[u8]) -> Option<(SectionKind, Vec<RecordBatch>)> {
    let reader = StreamReader::try_new(std::io::Cursor::new(body), None).ok()?;
    let schema = reader.schema();
    let field = |name: &str| schema.field_with_name(name).is_ok();
    let kind = if field("read_number") && field("signal") {
        SectionKind::Reads
    } else if field("signal") && field("samples") {
        SectionKind::Signal
    } else if field("acquisition_id") {
        SectionKind::RunInfo
    } else {
        return None;
    };
    let mut batches = Vec::new();
    for batch in reader {
        match batch {
            Ok(batch) => batches.push(batch),
            // First malformed batch: keep what we have.
            Err(_) => break,
        }
    }
    Some((kind, batches))
}

fn decode_reads(batches: &[RecordBatch]) -> Result<Vec<RecoveredRead>, Pod5Error> {
    let mut reads = Vec::new();
    for batch in batches {
        let columns = ReadBatchColumns::from_batch(batch)?;
        for row in 0..columns.num_rows() {
            reads.push(RecoveredRead {
                read_id: columns.read_id_at(row),
                pore: columns.pore_at(row),
                calibration: columns.calibration_at(row),
                read_number: columns.read_number_at(row),
                start_sample: columns.start_at(row),
                median_before: columns.median_before_at(row),
                end_reason: columns.end_reason_at(row),
                acquisition_id: columns.acquisition_id_at(row).to_string(),
                num_minknow_events: columns.num_minknow_events_at(row),
                tracked_scaling: columns.tracked_scaling_at(row),
                predicted_scaling: columns.predicted_scaling_at(row),
                num_reads_since_mux_change: columns.num_reads_since_mux_change_at(row),
                time_since_mux_change: columns.time_since_mux_change_at(row),
                signal_rows: columns.signal_rows_at(row),
            });
        }
    }
    Ok(reads)
}

fn decode_signal_rows(batches: &[RecordBatch]) -> Result<Vec<RecoveredSignalRow>, Pod5Error> {
    let mut rows = Vec::new();
    for batch in batches {
        let columns = SignalBatchColumns::from_batch(batch)?;
        for row in 0..columns.num_rows() {
            let read_id: [u8; 16] = columns.read_id.value(row).try_into().map_err(|_| {
                Pod5Error::SchemaMismatch("signal read_id is not a packed uuid".to_string())
            })?;
            rows.push(RecoveredSignalRow {
                read_id: Uuid::from_bytes(read_id),
                samples: columns.samples.value(row),
                bytes: columns.signal.value(row).to_vec(),
            });
        }
    }
    Ok(rows)
}

fn decode_run_infos(batches: &[RecordBatch]) -> Result<Vec<RunInfo>, Pod5Error> {
    let mut run_infos = Vec::new();
    for batch in batches {
        for row in 0..batch.num_rows() {
            run_infos.push(run_info_at(batch, row)?);
        }
    }
    Ok(run_infos)
}

/// Recover `src` into a fresh, sealed file at `dest`.
///
/// A source that opens cleanly is copied through unchanged. Otherwise
/// the tables are salvaged batch by batch; a read survives only if all
/// of its signal rows were recovered, each of those rows names it as
/// owner and its run info is resolvable. Signal rows without a
/// surviving owner are dropped. The output is always a valid sealed
/// file, possibly holding fewer reads than the input once did.
pub fn recover(src: impl AsRef<Path>, dest: impl AsRef<Path>) -> Result<RecoveredCounts, Pod5Error> {
    let src = src.as_ref();
    let dest = dest.as_ref();

    if let Ok(reader) = Reader::open(src) {
        // Already sealed and readable; pass through unchanged.
        let counts = RecoveredCounts {
            reads: reader.num_reads()?,
            signal_rows: signal_row_count(&reader)?,
            run_infos: reader.run_info_count()?,
        };
        drop(reader);
        fs::copy(src, dest)?;
        return Ok(counts);
    }

    let bytes = fs::read(src)?;
    if bytes.len() < FILE_SIGNATURE.len() + SECTION_MARKER_LEN
        || bytes[..FILE_SIGNATURE.len()] != FILE_SIGNATURE
    {
        return Err(Pod5Error::NotAPod5File("start"));
    }
    let marker = &bytes[FILE_SIGNATURE.len()..FILE_SIGNATURE.len() + SECTION_MARKER_LEN];
    let data_start = FILE_SIGNATURE.len() + SECTION_MARKER_LEN;

    let mut sections = Vec::new();
    let mut start = data_start;
    for position in marker_positions(&bytes, marker, data_start) {
        if position > start {
            sections.push(&bytes[start..position]);
        }
        start = position + SECTION_MARKER_LEN;
    }
    if start < bytes.len() {
        // Trailing, unterminated section from the interrupted write.
        sections.push(&bytes[start..]);
    }

    let mut read_batches = None;
    let mut signal_batches = None;
    let mut run_info_batches = None;
    for section in sections {
        // The IPC body starts after the padded 8-byte "ARROW1" prefix.
        if section.len() < 8 || section[..ARROW_MAGIC.len()] != ARROW_MAGIC {
            continue;
        }
        match drain_section(&section[8..]) {
            Some((SectionKind::Reads, batches)) => read_batches.get_or_insert(batches),
            Some((SectionKind::Signal, batches)) => signal_batches.get_or_insert(batches),
            Some((SectionKind::RunInfo, batches)) => run_info_batches.get_or_insert(batches),
            None => continue,
        };
    }

    let reads = decode_reads(&read_batches.unwrap_or_default())?;
    let signal_rows = decode_signal_rows(&signal_batches.unwrap_or_default())?;
    let run_infos = decode_run_infos(&run_info_batches.unwrap_or_default())?;

    let mut writer = Writer::create(dest, WriterOptions::default())?;
    let mut counts = RecoveredCounts::default();
    let mut used_run_infos = std::collections::HashSet::new();

    for read in reads {
        let Some(run_info) = run_infos
            .iter()
            .find(|info| info.acquisition_id == read.acquisition_id)
        else {
            log::warn!(
                "recover: dropping read {} with unresolved run info {:?}",
                read.read_id,
                read.acquisition_id
            );
            continue;
        };
        let rows = read
            .signal_rows
            .iter()
            .map(|&row| signal_rows.get(row as usize))
            .collect::<Option<Vec<_>>>();
        let Some(rows) = rows else {
            log::warn!(
                "recover: dropping read {} with missing signal rows",
                read.read_id
            );
            continue;
        };
        if rows.iter().any(|row| row.read_id != read.read_id) {
            log::warn!(
                "recover: dropping read {} whose signal rows name another owner",
                read.read_id
            );
            continue;
        }

        let compressed = CompressedRead {
            read_id: read.read_id,
            pore: read.pore,
            calibration: read.calibration,
            read_number: read.read_number,
            start_sample: read.start_sample,
            median_before: read.median_before,
            end_reason: read.end_reason,
            run_info: run_info.clone(),
            num_minknow_events: read.num_minknow_events,
            tracked_scaling: read.tracked_scaling,
            predicted_scaling: read.predicted_scaling,
            num_reads_since_mux_change: read.num_reads_since_mux_change,
            time_since_mux_change: read.time_since_mux_change,
            signal_chunks: rows.iter().map(|row| row.bytes.clone()).collect(),
            signal_chunk_lengths: rows.iter().map(|row| row.samples).collect(),
        };
        writer.add_read_pre_compressed(&compressed)?;
        counts.reads += 1;
        counts.signal_rows += compressed.signal_chunks.len();
        if used_run_infos.insert(run_info.acquisition_id.clone()) {
            counts.run_infos += 1;
        }
    }
    writer.close()?;
    Ok(counts)
}

fn signal_row_count(reader: &Reader) -> Result<usize, Pod5Error> {
    let mut rows = 0;
    for record in reader.reads() {
        rows += record?.signal_row_ids().len();
    }
    Ok(rows)
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{test_util, writer::WriterOptions};

    fn truncate_before_footer(path: &Path) {
        let bytes = fs::read(path).unwrap();
        let magic = pod5_footer::FOOTER_MAGIC;
        let cut = bytes
            .windows(magic.len())
            .rposition(|window| *window == magic)
            .expect("sealed file has a footer magic");
        fs::write(path, &bytes[..cut]).unwrap();
    }

    #[test]
    fn test_recover_truncated_file() {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("broken.pod5");
        let dest = dir.path().join("recovered.pod5");

        let info = test_util::run_info("acq-recover");
        let reads = (0..4)
            .map(|n| test_util::read(n, &info, 100))
            .collect::<Vec<_>>();
        let mut writer = Writer::create(&src, WriterOptions::default()).unwrap();
        writer.add_reads(&reads).unwrap();
        writer.close().unwrap();
        truncate_before_footer(&src);

        assert!(Reader::open(&src).is_err());
        let counts = recover(&src, &dest).unwrap();
        assert_eq!(counts.reads, 4);
        assert_eq!(counts.run_infos, 1);

        let reader = Reader::open(&dest).unwrap();
        let recovered = reader
            .reads()
            .map(|record| record.unwrap().to_read().unwrap())
            .collect::<Vec<_>>();
        assert_eq!(recovered, reads);
    }

    #[test]
    fn test_recover_single_read_like_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("one.pod5");
        let dest = dir.path().join("one_recovered.pod5");

        let info = test_util::run_info("acq-one");
        let read = test_util::read(1, &info, 1024);
        let mut writer = Writer::create(&src, WriterOptions::default()).unwrap();
        writer.add_read(&read).unwrap();
        writer.close().unwrap();
        truncate_before_footer(&src);

        let counts = recover(&src, &dest).unwrap();
        assert_eq!(counts.reads, 1);

        let reader = Reader::open(&dest).unwrap();
        let record = reader.get_read(&read.read_id).unwrap().unwrap();
        assert_eq!(record.signal().unwrap(), read.signal);
    }

    #[test]
    fn test_recover_valid_file_passes_through() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("fine.pod5");
        let dest = dir.path().join("fine_recovered.pod5");

        let info = test_util::run_info("acq-fine");
        let mut writer = Writer::create(&src, WriterOptions::default()).unwrap();
        writer.add_read(&test_util::read(0, &info, 64)).unwrap();
        writer.close().unwrap();

        let counts = recover(&src, &dest).unwrap();
        assert_eq!(counts.reads, 1);
        assert_eq!(fs::read(&src).unwrap(), fs::read(&dest).unwrap());
    }

    #[test]
    fn test_recover_garbage_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("garbage.bin");
        fs::write(&src, b"definitely not a pod5 file").unwrap();
        assert!(matches!(
            recover(&src, &dir.path().join("out.pod5")),
            Err(Pod5Error::NotAPod5File(_))
        ));
    }
}
