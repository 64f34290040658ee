//! Error types.
use std::io;

use arrow::error::ArrowError;
use pod5_footer::FooterError;

#[derive(Debug, thiserror::Error)]
pub enum Pod5Error {
    #[error("{0}")]
    Io(#[from] io::Error),

    /// The signature at the beginning or end of the file could not be
    /// verified. The file is either not a POD5 file or was corrupted.
    #[error("not a POD5 file, bad signature at {0} of file")]
    NotAPod5File(&'static str),

    /// The footer could not be parsed, or one of the table locations it
    /// lists falls outside the file.
    #[error("truncated or invalid footer")]
    TruncatedFooter,

    #[error("file version {file} is newer than the supported version {supported}")]
    VersionUnsupported {
        file: String,
        supported: &'static str,
    },

    /// Signal bytes failed to round-trip through the codec.
    #[error("corrupt signal data: {0}")]
    CorruptSignal(String),

    /// A traversal plan located fewer reads than were requested.
    #[error("failed to find {missing} requested reads")]
    MissingReads { missing: usize },

    #[error("duplicate read ids detected")]
    DuplicateReads,

    /// The writer has been sealed; appending is a caller error.
    #[error("writer is sealed, no further data can be appended")]
    WriterSealed,

    /// A read id string was not a valid UUID.
    #[error("invalid read id {0:?}")]
    InvalidReadId(String),

    /// A table did not have the column layout this library writes.
    #[error("table schema mismatch: {0}")]
    SchemaMismatch(String),

    /// A run info shares an acquisition id with a previously added run
    /// info whose other fields differ.
    #[error("run info for acquisition {0:?} conflicts with an existing entry")]
    RunInfoConflict(String),

    #[error("footer: {0}")]
    Footer(#[from] FooterError),

    #[error("arrow: {0}")]
    Arrow(#[from] ArrowError),

    /// A background worker disappeared without reporting a result.
    #[error("worker pipeline terminated unexpectedly")]
    PipelineClosed,
}

impl From<svb16::CodecError> for Pod5Error {
    fn from(err: svb16::CodecError) -> Self {
        Pod5Error::CorruptSignal(err.to_string())
    }
}
