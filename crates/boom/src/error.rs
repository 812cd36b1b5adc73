//! Error and Result types for Boom container operations.

use std::io;
use thiserror::Error;

/// A convenience `Result` type for Boom operations.
pub type Result<T> = std::result::Result<T, BoomError>;

/// The error type for Boom operations.
#[derive(Debug, Error)]
pub enum BoomError {
    /// Invalid magic bytes at the start of a container file.
    #[error("Invalid magic bytes: expected Obj\\x01, got {0:?}")]
    BadMagic([u8; 4]),

    /// The input ended before a complete value could be read.
    #[error("Truncated input while reading {context}")]
    TruncatedInput {
        /// What was being read when the input ran out.
        context: &'static str,
    },

    /// A variable-length integer did not terminate within its maximum width.
    #[error("Malformed varint: no terminating byte after {bytes} bytes")]
    MalformedVarint {
        /// Number of continuation bytes consumed before giving up.
        bytes: usize,
    },

    /// The sync marker following a block does not match the file's marker.
    #[error("Sync marker mismatch after block ending at offset {offset}")]
    Desync {
        /// File offset at which the mismatching marker starts.
        offset: u64,
    },

    /// Two containers with different schema or codec were combined.
    #[error("Incompatible schema: {0}")]
    IncompatibleSchema(String),

    /// Compression or decompression failed.
    #[error("Codec error: {0}")]
    Codec(String),

    /// The container names a codec this crate cannot handle.
    #[error("Unsupported codec: {0}")]
    UnsupportedCodec(String),

    /// A sealed block could not be serialized and its lines were dropped.
    #[error("Data lost on flush: {lines} lines dropped ({reason})")]
    DataLossOnFlush {
        /// Number of log lines that were dropped.
        lines: u64,
        /// Description of the underlying failure.
        reason: String,
    },

    /// A required metadata key is missing from the container header.
    #[error("Missing metadata key: {0}")]
    MissingMetadata(&'static str),

    /// A decoded log block violates the data model.
    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    /// A string field was not valid UTF-8.
    #[error("Invalid UTF-8 in {0}")]
    InvalidUtf8(String),

    /// Configuration values are out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// An append call does not match the writer's operating mode.
    #[error("Wrong writer mode: expected {expected}, writer is in {actual} mode")]
    WrongMode {
        /// Mode required by the call.
        expected: &'static str,
        /// Mode the writer was configured with.
        actual: &'static str,
    },

    /// The locking collaborator refused or failed a request.
    #[error("Lock error: {0}")]
    Lock(String),

    /// A line filter could not be built.
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl BoomError {
    /// Maps an I/O error raised while reading `context`, turning an early
    /// end-of-file into [`BoomError::TruncatedInput`].
    pub(crate) fn from_read(err: io::Error, context: &'static str) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            Self::TruncatedInput { context }
        } else {
            Self::Io(err)
        }
    }

    /// Returns true if this error means the input simply ran out.
    pub fn is_truncation(&self) -> bool {
        matches!(self, Self::TruncatedInput { .. })
    }
}
