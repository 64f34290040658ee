//! Shared fixtures for the crate's tests.

use uuid::Uuid;

use crate::records::{Calibration, EndReason, EndReasonKind, Pore, Read, RunInfo, ShiftScalePair};

pub(crate) fn run_info(acquisition_id: &str) -> RunInfo {
    RunInfo {
        acquisition_id: acquisition_id.to_string(),
        acquisition_start_time: 1_618_000_000_000,
        adc_max: 2047,
        adc_min: -2048,
        context_tags: vec![
            ("experiment_type".to_string(), "genomic_dna".to_string()),
            ("package".to_string(), "bream4".to_string()),
        ],
        experiment_name: "test-experiment".to_string(),
        flow_cell_id: "FAH00000".to_string(),
        flow_cell_product_code: "FLO-MIN106".to_string(),
        protocol_name: "sequencing/sequencing_MIN106_DNA".to_string(),
        protocol_run_id: "00000000-1111-2222-3333-444444444444".to_string(),
        protocol_start_time: 1_617_999_000_000,
        sample_id: "sample-1".to_string(),
        sample_rate: 4000,
        sequencing_kit: "SQK-LSK109".to_string(),
        sequencer_position: "MN12345".to_string(),
        sequencer_position_type: "MinION Mk1B".to_string(),
        software: "MinKNOW 21.05.12".to_string(),
        system_name: "Lab PC".to_string(),
        system_type: "Ubuntu 20.04".to_string(),
        tracking_id: vec![("run_id".to_string(), acquisition_id.to_string())],
    }
}

/// A deterministic read id: `n` packed into the trailing bytes.
pub(crate) fn read_id(n: u32) -> Uuid {
    let mut bytes = [0u8; 16];
    bytes[12..].copy_from_slice(&n.to_be_bytes());
    Uuid::from_bytes(bytes)
}

/// A deterministic read with a short ramp signal.
pub(crate) fn read(n: u32, run_info: &RunInfo, signal_len: usize) -> Read {
    Read {
        read_id: read_id(n),
        pore: Pore::new(1 + (n % 512) as u16, 1 + (n % 4) as u8, "pore_t"),
        calibration: Calibration::new(0.0, 1.0),
        read_number: n,
        start_sample: u64::from(n) * 1000,
        median_before: 200.0 + n as f32,
        end_reason: EndReason::with_default_forced(EndReasonKind::SignalPositive),
        run_info: run_info.clone(),
        num_minknow_events: u64::from(n) * 2,
        tracked_scaling: ShiftScalePair::new(1.0, 2.0),
        predicted_scaling: ShiftScalePair::new(3.0, 4.0),
        num_reads_since_mux_change: n % 7,
        time_since_mux_change: n as f32 * 0.5,
        signal: (0..signal_len)
            .map(|i| ((i as u32 + n) % 3000) as i16 - 1500)
            .collect(),
    }
}
