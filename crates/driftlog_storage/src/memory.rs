//! In-memory index buffer for testing.

use crate::buffer::{check_range, IndexBuffer};
use crate::error::{StorageError, StorageResult};
use parking_lot::Mutex;
use std::sync::Arc;

/// An in-memory index buffer.
///
/// Clones share the same bytes, which lets a test close an index and open a
/// new one over the "same file".
///
/// # Example
///
/// ```rust
/// use driftlog_storage::{InMemoryBuffer, IndexBuffer};
///
/// let mut buffer = InMemoryBuffer::new();
/// assert_eq!(buffer.reserve(36).unwrap(), 0);
/// buffer.write_at(0, b"entry").unwrap();
/// buffer.flush_and_truncate(5).unwrap();
/// assert_eq!(buffer.data(), b"entry");
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryBuffer {
    data: Arc<Mutex<Vec<u8>>>,
    capacity: u64,
    closed: bool,
}

impl InMemoryBuffer {
    /// Creates a new empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a buffer with pre-existing bytes.
    ///
    /// Useful for testing recovery scenarios.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(Mutex::new(data)),
            capacity: 0,
            closed: false,
        }
    }

    /// Returns a copy of the backing bytes.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.lock().clone()
    }
}

impl IndexBuffer for InMemoryBuffer {
    fn reserve(&mut self, capacity: u64) -> StorageResult<u64> {
        let mut data = self.data.lock();
        let existing = data.len() as u64;
        let capacity = capacity.max(existing);
        data.resize(capacity as usize, 0);
        self.capacity = capacity;
        self.closed = false;
        Ok(existing)
    }

    fn capacity(&self) -> u64 {
        self.capacity
    }

    fn read_at(&self, position: u64, buf: &mut [u8]) -> StorageResult<()> {
        if self.closed {
            return Err(StorageError::Closed);
        }
        let start = check_range(position, buf.len(), self.capacity)?;
        buf.copy_from_slice(&self.data.lock()[start..start + buf.len()]);
        Ok(())
    }

    fn write_at(&mut self, position: u64, data: &[u8]) -> StorageResult<()> {
        if self.closed {
            return Err(StorageError::Closed);
        }
        let start = check_range(position, data.len(), self.capacity)?;
        self.data.lock()[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn flush(&mut self) -> StorageResult<()> {
        // Nothing is buffered outside the shared bytes
        Ok(())
    }

    fn flush_and_truncate(&mut self, len: u64) -> StorageResult<()> {
        if self.closed {
            return Err(StorageError::Closed);
        }
        self.data.lock().truncate(len as usize);
        self.capacity = 0;
        self.closed = true;
        Ok(())
    }
}
