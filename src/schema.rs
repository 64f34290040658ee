//! Arrow schemas for the three POD5 tables.
//!
//! Column names, order and types follow the V3 read table layout. The
//! `read_id` columns carry the `minknow.uuid` extension tag and the
//! signal blob column carries `minknow.vbz`; unknown extension tags on
//! other columns are ignored on read.

use std::{collections::HashMap, sync::Arc};

use arrow::datatypes::{DataType, Field, Fields, Schema};
use uuid::Uuid;

/// Version of the POD5 format this library writes.
pub const POD5_VERSION: &str = "0.0.41";

/// Software name recorded in files written by this library when the
/// caller does not override it.
pub const DEFAULT_SOFTWARE_NAME: &str = "pod5-rs";

pub const META_FILE_IDENTIFIER: &str = "MINKNOW:file_identifier";
pub const META_SOFTWARE: &str = "MINKNOW:software";
pub const META_VERSION: &str = "MINKNOW:pod5_version";
/// Set by `update` on rewritten files to preserve the source version.
pub const META_VERSION_PRE_MIGRATION: &str = "MINKNOW:pod5_version_pre_migration";

const EXTENSION_KEY: &str = "ARROW:extension:name";
const UUID_EXTENSION: &str = "minknow.uuid";
const VBZ_EXTENSION: &str = "minknow.vbz";

fn uuid_field(name: &str) -> Field {
    Field::new(name, DataType::FixedSizeBinary(16), false).with_metadata(HashMap::from([(
        EXTENSION_KEY.to_string(),
        UUID_EXTENSION.to_string(),
    )]))
}

fn dict_field(name: &str) -> Field {
    Field::new(
        name,
        DataType::Dictionary(Box::new(DataType::Int16), Box::new(DataType::Utf8)),
        false,
    )
}

fn map_field(name: &str) -> Field {
    let entries = Field::new(
        "entries",
        DataType::Struct(Fields::from(vec![
            Field::new("keys", DataType::Utf8, false),
            Field::new("values", DataType::Utf8, true),
        ])),
        false,
    );
    Field::new(name, DataType::Map(Arc::new(entries), false), false)
}

/// Schema metadata identifying the file, its writer and format version.
pub(crate) fn table_metadata(
    file_identifier: &Uuid,
    software: &str,
    version_pre_migration: Option<&str>,
) -> HashMap<String, String> {
    let mut metadata = HashMap::from([
        (META_VERSION.to_string(), POD5_VERSION.to_string()),
        (META_SOFTWARE.to_string(), software.to_string()),
        (
            META_FILE_IDENTIFIER.to_string(),
            file_identifier.to_string(),
        ),
    ]);
    if let Some(pre) = version_pre_migration {
        metadata.insert(META_VERSION_PRE_MIGRATION.to_string(), pre.to_string());
    }
    metadata
}

/// The V3 reads-table schema.
pub fn reads_schema(metadata: HashMap<String, String>) -> Schema {
    Schema::new_with_metadata(
        vec![
            uuid_field("read_id"),
            Field::new("read_number", DataType::UInt32, false),
            Field::new("start", DataType::UInt64, false),
            Field::new("channel", DataType::UInt16, false),
            Field::new("well", DataType::UInt8, false),
            Field::new("median_before", DataType::Float32, false),
            dict_field("pore_type"),
            Field::new("calibration_offset", DataType::Float32, false),
            Field::new("calibration_scale", DataType::Float32, false),
            dict_field("end_reason"),
            Field::new("end_reason_forced", DataType::Boolean, false),
            dict_field("run_info"),
            Field::new(
                "signal",
                DataType::List(Arc::new(Field::new("item", DataType::UInt64, true))),
                false,
            ),
            Field::new("num_minknow_events", DataType::UInt64, false),
            Field::new("tracked_scaling_scale", DataType::Float32, false),
            Field::new("tracked_scaling_shift", DataType::Float32, false),
            Field::new("predicted_scaling_scale", DataType::Float32, false),
            Field::new("predicted_scaling_shift", DataType::Float32, false),
            Field::new("num_reads_since_mux_change", DataType::UInt32, false),
            Field::new("time_since_mux_change", DataType::Float32, false),
            Field::new("num_samples", DataType::UInt64, false),
        ],
        metadata,
    )
}

/// The signal-table schema. The `read_id` column is redundant with the
/// reads table and exists so that recovery can reattach orphaned rows.
pub fn signal_schema(metadata: HashMap<String, String>) -> Schema {
    Schema::new_with_metadata(
        vec![
            uuid_field("read_id"),
            Field::new("signal", DataType::LargeBinary, false).with_metadata(HashMap::from([(
                EXTENSION_KEY.to_string(),
                VBZ_EXTENSION.to_string(),
            )])),
            Field::new("samples", DataType::UInt32, false),
        ],
        metadata,
    )
}

/// The run-info-table schema.
pub fn run_info_schema(metadata: HashMap<String, String>) -> Schema {
    Schema::new_with_metadata(
        vec![
            Field::new("acquisition_id", DataType::Utf8, false),
            Field::new("acquisition_start_time", DataType::Int64, false),
            Field::new("adc_max", DataType::Int16, false),
            Field::new("adc_min", DataType::Int16, false),
            map_field("context_tags"),
            Field::new("experiment_name", DataType::Utf8, false),
            Field::new("flow_cell_id", DataType::Utf8, false),
            Field::new("flow_cell_product_code", DataType::Utf8, false),
            Field::new("protocol_name", DataType::Utf8, false),
            Field::new("protocol_run_id", DataType::Utf8, false),
            Field::new("protocol_start_time", DataType::Int64, false),
            Field::new("sample_id", DataType::Utf8, false),
            Field::new("sample_rate", DataType::UInt16, false),
            Field::new("sequencing_kit", DataType::Utf8, false),
            Field::new("sequencer_position", DataType::Utf8, false),
            Field::new("sequencer_position_type", DataType::Utf8, false),
            Field::new("software", DataType::Utf8, false),
            Field::new("system_name", DataType::Utf8, false),
            Field::new("system_type", DataType::Utf8, false),
            map_field("tracking_id"),
        ],
        metadata,
    )
}

fn parse_version(version: &str) -> Option<(u32, u32, u32)> {
    let mut parts = version.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    let patch = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((major, minor, patch))
}

/// A file is readable if its written version parses and is not newer
/// than [`POD5_VERSION`].
pub(crate) fn version_supported(file_version: &str) -> bool {
    match (parse_version(file_version), parse_version(POD5_VERSION)) {
        (Some(file), Some(current)) => file <= current,
        _ => false,
    }
}
