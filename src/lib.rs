//! Reading, writing and maintaining POD5 files in Rust.
//!
//! POD5 stores nanopore reads in a single file holding three columnar
//! Arrow tables (reads, signal, run info) framed by section markers and
//! indexed by a FlatBuffers footer. This crate provides:
//!
//! - [`reader::Reader`]: memory-mapped random and streaming access,
//!   including planned traversals by read id and background signal
//!   prefetch.
//! - [`writer::Writer`]: append reads with chunked, compressed signal;
//!   dictionaries are deduplicated and the file is sealed with an index
//!   and footer on close.
//! - [`repack::Repacker`]: a concurrent pipeline copying selected reads
//!   between files without re-compressing signal, plus the `merge`,
//!   `filter` and `repack_files` operations built on it.
//! - [`recover::recover`]: salvage a readable file from a partially
//!   written one whose footer is missing.
//! - [`dataset::DatasetReader`]: treat a directory tree of files as one
//!   addressable collection.
//! - [`update::update_file`]: rewrite older files at the current format
//!   version.

pub mod dataset;
pub mod error;
mod index;
pub mod plan;
pub mod prefetch;
pub mod reader;
pub mod records;
pub mod recover;
pub mod repack;
pub mod schema;
pub mod signal;
mod tables;
#[cfg(test)]
mod test_util;
pub mod update;
pub mod writer;

pub use error::Pod5Error;
pub use plan::{TraversalOrder, TraversalPlan};
pub use prefetch::{PreloadOptions, SignalCacheBatch};
pub use reader::{ReadRecord, ReadRecordBatch, Reader};
pub use records::{
    pack_read_ids, Calibration, CompressedRead, EndReason, EndReasonKind, Pore, Read, RunInfo,
    ShiftScalePair,
};
pub use recover::{recover, RecoveredCounts};
pub use repack::{filter, merge, repack_files, FilterOptions, MergeOptions, Repacker};
pub use update::update_file;
pub use writer::{Writer, WriterOptions};

/// Signature found at the start and end of every POD5 file.
pub use pod5_footer::FILE_SIGNATURE;
