//! Error types for tilesegy operations

use crate::types::Coordinate;
use thiserror::Error;

/// Main error type for SEG-Y ingestion and structured access
#[derive(Error, Debug)]
pub enum SegyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// File size is not `header_bytes + trace_count * trace_bytes`
    #[error(
        "Truncated SEG-Y file: {file_size} bytes cannot hold {trace_count} traces of {trace_bytes} bytes after a {header_bytes} byte header"
    )]
    TruncatedFile {
        file_size: u64,
        header_bytes: u64,
        trace_bytes: u64,
        trace_count: usize,
    },

    #[error("Corrupt header in trace {trace}: field {field:?} = {value:?}")]
    CorruptHeader {
        trace: usize,
        field: String,
        value: Option<i64>,
    },

    #[error("Survey geometry is unstructured: {0}")]
    UnstructuredSurvey(String),

    #[error("No trace at coordinate {0}")]
    Gap(Coordinate),

    #[error("Trace index {index} out of range (trace count {len})")]
    IndexOutOfRange { index: usize, len: usize },

    /// A coordinate value is not a member of its axis
    #[error("Coordinate {0} is outside the survey grid")]
    CoordinateOutOfRange(Coordinate),

    #[error("Coordinate {coordinate} is shared by traces {first} and {duplicate}")]
    DuplicateCoordinate {
        coordinate: Coordinate,
        first: usize,
        duplicate: usize,
    },

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Compression error: {0}")]
    Compression(String),

    #[error("Decompression error: {0}")]
    Decompression(String),

    #[error("Invalid dimensions: {0}")]
    InvalidDimensions(String),

    #[error("Out of bounds: {0}")]
    OutOfBounds(String),

    #[error("Storage backend error: {0}")]
    StorageBackend(String),

    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unknown axis: {0}")]
    UnknownAxis(String),

    #[error("Unknown header field: {0}")]
    UnknownHeaderField(String),
}

/// Specialized Result type for tilesegy operations
pub type Result<T> = std::result::Result<T, SegyError>;

impl From<serde_json::Error> for SegyError {
    fn from(err: serde_json::Error) -> Self {
        SegyError::Serialization(err.to_string())
    }
}

impl SegyError {
    /// True for errors scoped to a single query call (the volume stays usable)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SegyError::Gap(_)
                | SegyError::IndexOutOfRange { .. }
                | SegyError::CoordinateOutOfRange(_)
                | SegyError::UnstructuredSurvey(_)
                | SegyError::UnknownAxis(_)
                | SegyError::UnknownHeaderField(_)
                | SegyError::OutOfBounds(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_errors_are_recoverable() {
        assert!(SegyError::Gap(Coordinate::new(1, 2, 0)).is_recoverable());
        assert!(SegyError::IndexOutOfRange { index: 9, len: 3 }.is_recoverable());
        assert!(!SegyError::InvalidFormat("bad".into()).is_recoverable());
        assert!(!SegyError::TruncatedFile {
            file_size: 10,
            header_bytes: 3600,
            trace_bytes: 240,
            trace_count: 1,
        }
        .is_recoverable());
    }

    #[test]
    fn test_gap_message_names_coordinate() {
        let err = SegyError::Gap(Coordinate::new(10, 20, 0));
        assert_eq!(err.to_string(), "No trace at coordinate (10, 20, 0)");
    }
}
