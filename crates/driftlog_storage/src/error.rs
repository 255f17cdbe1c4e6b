//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Attempted to read beyond the end of a store.
    #[error("read beyond end of store: position {position}, len {len}, size {size}")]
    ReadPastEnd {
        /// The requested read position.
        position: u64,
        /// The number of bytes the read needed.
        len: u64,
        /// The current store size.
        size: u64,
    },

    /// The index has no room for another entry.
    #[error("index full: {size} of {capacity} bytes used")]
    IndexFull {
        /// Bytes currently used by entries.
        size: u64,
        /// Reserved capacity in bytes.
        capacity: u64,
    },

    /// The requested index entry does not exist.
    #[error("end of index: entry {entry} not written")]
    EndOfIndex {
        /// The requested entry number (`-1` means "last").
        entry: i64,
    },

    /// The store or index has been closed.
    #[error("storage is closed")]
    Closed,
}

impl StorageError {
    /// Returns true if the error means a configured capacity was reached.
    #[must_use]
    pub fn is_capacity_exhausted(&self) -> bool {
        matches!(self, Self::IndexFull { .. })
    }

    /// Returns true if the error means the requested data does not exist.
    #[must_use]
    pub fn is_end_of_data(&self) -> bool {
        matches!(self, Self::EndOfIndex { .. } | Self::ReadPastEnd { .. })
    }
}
