//! Owned record types for POD5 reads and their provenance metadata.
//!
//! These are the values callers hand to a [`crate::writer::Writer`] and
//! get back from [`crate::reader::ReadRecord::to_read`]. Dictionary
//! deduplication relies on value equality of [`RunInfo`], pore type
//! strings and [`EndReason`], so the types here implement `Eq`/`Hash`
//! where the writer keys its interning tables on them.

use std::fmt;

use uuid::Uuid;

/// The closed set of reasons a read can end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EndReasonKind {
    #[default]
    Unknown,
    MuxChange,
    UnblockMuxChange,
    DataServiceUnblockMuxChange,
    SignalPositive,
    SignalNegative,
}

impl EndReasonKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndReasonKind::Unknown => "unknown",
            EndReasonKind::MuxChange => "mux_change",
            EndReasonKind::UnblockMuxChange => "unblock_mux_change",
            EndReasonKind::DataServiceUnblockMuxChange => "data_service_unblock_mux_change",
            EndReasonKind::SignalPositive => "signal_positive",
            EndReasonKind::SignalNegative => "signal_negative",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "unknown" => EndReasonKind::Unknown,
            "mux_change" => EndReasonKind::MuxChange,
            "unblock_mux_change" => EndReasonKind::UnblockMuxChange,
            "data_service_unblock_mux_change" => EndReasonKind::DataServiceUnblockMuxChange,
            "signal_positive" => EndReasonKind::SignalPositive,
            "signal_negative" => EndReasonKind::SignalNegative,
            _ => return None,
        })
    }

    /// The default value of the `forced` flag for this reason. Mux-change
    /// variants are forced read breaks, signal-driven ends are not.
    pub fn default_forced(&self) -> bool {
        matches!(
            self,
            EndReasonKind::MuxChange
                | EndReasonKind::UnblockMuxChange
                | EndReasonKind::DataServiceUnblockMuxChange
        )
    }
}

impl fmt::Display for EndReasonKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a read ended, and whether the break was forced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EndReason {
    pub reason: EndReasonKind,
    pub forced: bool,
}

impl EndReason {
    pub fn new(reason: EndReasonKind, forced: bool) -> Self {
        Self { reason, forced }
    }

    /// An [`EndReason`] with the `forced` flag set to the default for the
    /// given reason.
    pub fn with_default_forced(reason: EndReasonKind) -> Self {
        Self {
            reason,
            forced: reason.default_forced(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.reason.as_str()
    }
}

/// The sensor a read was acquired on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pore {
    /// 1-indexed channel.
    pub channel: u16,
    /// 1-indexed well.
    pub well: u8,
    /// Name of the pore type present in the well.
    pub pore_type: String,
}

impl Pore {
    pub fn new(channel: u16, well: u8, pore_type: impl Into<String>) -> Self {
        Self {
            channel,
            well,
            pore_type: pore_type.into(),
        }
    }
}

/// Linear calibration converting raw ADC readings to picoamps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    pub offset: f32,
    pub scale: f32,
}

impl Calibration {
    pub fn new(offset: f32, scale: f32) -> Self {
        Self { offset, scale }
    }

    /// Build a calibration from the legacy offset/range/digitisation
    /// triple.
    pub fn from_range(offset: f32, adc_range: f32, digitisation: f32) -> Self {
        Self {
            offset,
            scale: adc_range / digitisation,
        }
    }
}

/// A pair of floating point shift and scale values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShiftScalePair {
    pub shift: f32,
    pub scale: f32,
}

impl ShiftScalePair {
    pub fn new(shift: f32, scale: f32) -> Self {
        Self { shift, scale }
    }
}

impl Default for ShiftScalePair {
    fn default() -> Self {
        Self {
            shift: f32::NAN,
            scale: f32::NAN,
        }
    }
}

/// Acquisition-level metadata shared by every read of a sequencing run.
///
/// Timestamps are milliseconds since the Unix epoch. The tag maps keep
/// their insertion order; two run infos are equal only if their tags
/// match pairwise in order, which is also the identity the writer's
/// dictionary deduplication uses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct RunInfo {
    /// A unique identifier for the acquisition.
    pub acquisition_id: String,
    /// Clock time for sample 0, in milliseconds since the epoch.
    pub acquisition_start_time: i64,
    /// The maximum ADC value that might be encountered.
    pub adc_max: i16,
    /// The minimum ADC value that might be encountered.
    pub adc_min: i16,
    /// The context tags for the run (for compatibility with fast5).
    pub context_tags: Vec<(String, String)>,
    /// The user-supplied name for the experiment being run.
    pub experiment_name: String,
    /// Uniquely identifies the flow cell the data was captured on.
    pub flow_cell_id: String,
    /// Identifies the type of flow cell the data was captured on.
    pub flow_cell_product_code: String,
    /// The name of the protocol that was run.
    pub protocol_name: String,
    /// The unique identifier for the protocol run that produced this data.
    pub protocol_run_id: String,
    /// When the protocol that the acquisition was part of started.
    pub protocol_start_time: i64,
    /// A user-supplied name for the sample being analysed.
    pub sample_id: String,
    /// The number of samples acquired each second on each channel.
    pub sample_rate: u16,
    /// The type of sequencing kit used to prepare the sample.
    pub sequencing_kit: String,
    /// The sequencer position the data was collected on.
    pub sequencer_position: String,
    /// The type of sequencing hardware the data was collected on.
    pub sequencer_position_type: String,
    /// A description of the software that acquired the data.
    pub software: String,
    /// The name of the system the data was collected on.
    pub system_name: String,
    /// The type of system the data was collected on.
    pub system_type: String,
    /// The tracking id for the run (for compatibility with fast5).
    pub tracking_id: Vec<(String, String)>,
}

/// One nanopore read with its uncompressed signal.
#[derive(Debug, Clone, PartialEq)]
pub struct Read {
    /// The read_id of this read.
    pub read_id: Uuid,
    /// Pore metadata.
    pub pore: Pore,
    /// Calibration metadata.
    pub calibration: Calibration,
    /// The read number on channel. Increasing but typically not
    /// consecutive.
    pub read_number: u32,
    /// The number of samples recorded on this channel before the read
    /// started.
    pub start_sample: u64,
    /// The level of current in the well before this read.
    pub median_before: f32,
    /// Why the read ended.
    pub end_reason: EndReason,
    /// Acquisition metadata.
    pub run_info: RunInfo,
    /// Number of minknow events that the read contains.
    pub num_minknow_events: u64,
    /// Tracked read scaling (based on previous reads' shift).
    pub tracked_scaling: ShiftScalePair,
    /// Predicted read scaling (based on this read's raw signal).
    pub predicted_scaling: ShiftScalePair,
    /// Number of selected reads since the last mux change on this channel.
    pub num_reads_since_mux_change: u32,
    /// Seconds since the last mux change on this channel.
    pub time_since_mux_change: f32,
    /// Uncompressed signal data.
    pub signal: Vec<i16>,
}

impl Read {
    /// Total number of samples in the signal.
    pub fn sample_count(&self) -> usize {
        self.signal.len()
    }
}

/// One nanopore read whose signal is held as compressed chunks.
///
/// This is the shape the repacker, recovery and update paths use to move
/// signal between files without decompressing it.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressedRead {
    pub read_id: Uuid,
    pub pore: Pore,
    pub calibration: Calibration,
    pub read_number: u32,
    pub start_sample: u64,
    pub median_before: f32,
    pub end_reason: EndReason,
    pub run_info: RunInfo,
    pub num_minknow_events: u64,
    pub tracked_scaling: ShiftScalePair,
    pub predicted_scaling: ShiftScalePair,
    pub num_reads_since_mux_change: u32,
    pub time_since_mux_change: f32,
    /// Compressed signal data, one entry per signal row.
    pub signal_chunks: Vec<Vec<u8>>,
    /// Sample count of each chunk before compression.
    pub signal_chunk_lengths: Vec<u32>,
}

impl CompressedRead {
    /// Total number of samples across all chunks.
    pub fn sample_count(&self) -> usize {
        self.signal_chunk_lengths.iter().map(|&n| n as usize).sum()
    }

    /// Decompress the chunked signal into a contiguous vector.
    pub fn decompressed_signal(&self) -> Result<Vec<i16>, crate::error::Pod5Error> {
        crate::signal::decompress_signal_chunked(&self.signal_chunks, &self.signal_chunk_lengths)
    }
}

/// Parse a collection of read-id strings into UUIDs.
///
/// With `invalid_ok`, strings that do not parse are dropped (callers
/// that also pass `missing_ok` to the planner treat them like absent
/// ids); otherwise the first bad string is an error.
pub fn pack_read_ids<S: AsRef<str>>(
    read_ids: &[S],
    invalid_ok: bool,
) -> Result<Vec<Uuid>, crate::error::Pod5Error> {
    let mut packed = Vec::with_capacity(read_ids.len());
    for raw in read_ids {
        match Uuid::parse_str(raw.as_ref()) {
            Ok(read_id) => packed.push(read_id),
            Err(_) if invalid_ok => continue,
            Err(_) => {
                return Err(crate::error::Pod5Error::InvalidReadId(
                    raw.as_ref().to_string(),
                ))
            }
        }
    }
    Ok(packed)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_pack_read_ids() {
        let raw = [
            "00000000-0000-0000-0000-000000000001",
            "not-a-uuid",
            "00000000-0000-0000-0000-000000000002",
        ];
        assert!(matches!(
            pack_read_ids(&raw, false),
            Err(crate::error::Pod5Error::InvalidReadId(_))
        ));
        let packed = pack_read_ids(&raw, true).unwrap();
        assert_eq!(packed.len(), 2);
        assert_eq!(packed[0].as_u128(), 1);
        assert_eq!(packed[1].as_u128(), 2);
    }

    #[test]
    fn test_end_reason_names_roundtrip() {
        for kind in [
            EndReasonKind::Unknown,
            EndReasonKind::MuxChange,
            EndReasonKind::UnblockMuxChange,
            EndReasonKind::DataServiceUnblockMuxChange,
            EndReasonKind::SignalPositive,
            EndReasonKind::SignalNegative,
        ] {
            assert_eq!(EndReasonKind::from_name(kind.as_str()), Some(kind));
        }
        assert_eq!(EndReasonKind::from_name("nonsense"), None);
    }

    #[test]
    fn test_default_forced() {
        assert!(!EndReason::with_default_forced(EndReasonKind::Unknown).forced);
        assert!(!EndReason::with_default_forced(EndReasonKind::SignalPositive).forced);
        assert!(!EndReason::with_default_forced(EndReasonKind::SignalNegative).forced);
        assert!(EndReason::with_default_forced(EndReasonKind::MuxChange).forced);
        assert!(EndReason::with_default_forced(EndReasonKind::UnblockMuxChange).forced);
        assert!(
            EndReason::with_default_forced(EndReasonKind::DataServiceUnblockMuxChange).forced
        );
    }

    #[test]
    fn test_calibration_from_range() {
        let calibration = Calibration::from_range(10.0, 2048.0, 4096.0);
        assert_eq!(calibration.offset, 10.0);
        assert_eq!(calibration.scale, 0.5);
    }
}
