//! Error types for driftlog core.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in log and segment operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage primitive error.
    #[error("storage error: {0}")]
    Storage(#[from] driftlog_storage::StorageError),

    /// I/O error outside the storage primitives (directory handling).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The requested offset has no backing record.
    #[error("offset out of range: {offset}")]
    OffsetOutOfRange {
        /// The requested offset.
        offset: u64,
    },

    /// A segment cannot accept another record.
    #[error("segment {base_offset} is full")]
    SegmentFull {
        /// Base offset of the full segment.
        base_offset: u64,
    },

    /// A stored record could not be decoded.
    #[error("record corruption: {message}")]
    RecordCorruption {
        /// Description of the corruption.
        message: String,
    },

    /// The log has been closed or removed.
    #[error("log is closed")]
    LogClosed,
}

impl CoreError {
    /// Creates an out-of-range error for `offset`.
    #[must_use]
    pub fn out_of_range(offset: u64) -> Self {
        Self::OffsetOutOfRange { offset }
    }

    /// Creates a record corruption error.
    pub fn record_corruption(message: impl Into<String>) -> Self {
        Self::RecordCorruption {
            message: message.into(),
        }
    }

    /// Returns true if the error is an out-of-range read.
    #[must_use]
    pub fn is_out_of_range(&self) -> bool {
        matches!(self, Self::OffsetOutOfRange { .. })
    }

    /// Returns the requested offset of an out-of-range error.
    #[must_use]
    pub fn out_of_range_offset(&self) -> Option<u64> {
        match self {
            Self::OffsetOutOfRange { offset } => Some(*offset),
            _ => None,
        }
    }

    /// Returns true if a segment or index reached its configured limit.
    #[must_use]
    pub fn is_capacity_exhausted(&self) -> bool {
        match self {
            Self::SegmentFull { .. } => true,
            Self::Storage(e) => e.is_capacity_exhausted(),
            _ => false,
        }
    }
}
