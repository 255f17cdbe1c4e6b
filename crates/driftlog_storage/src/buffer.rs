//! Index buffer trait definition.

use crate::error::StorageResult;

/// Fixed-capacity byte buffer backing an [`super::Index`].
///
/// Buffers are **opaque byte regions**. The index owns the entry layout;
/// a buffer only knows how to reserve space up front, serve positional
/// reads and writes inside that space, and shrink itself back to the bytes
/// that were actually used.
///
/// # Invariants
///
/// - `reserve` returns the length the backing storage had before it was
///   grown, which is how an index recovers its used size on reopen
/// - reads and writes never touch bytes outside `[0, capacity())`
/// - `flush_and_truncate` leaves exactly `len` bytes in the backing storage
///   and releases it; the buffer is unusable afterwards
///
/// # Implementors
///
/// - [`super::FileBuffer`] - For persistent indexes
/// - [`super::InMemoryBuffer`] - For testing
pub trait IndexBuffer: Send + Sync {
    /// Grows the backing storage to at least `capacity` bytes.
    ///
    /// Returns the length of the backing storage before it was grown.
    /// If the existing storage is already larger than `capacity` it is
    /// kept as is, so no written entry is ever discarded.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be resized or read.
    fn reserve(&mut self, capacity: u64) -> StorageResult<u64>;

    /// Returns the number of bytes currently reserved.
    fn capacity(&self) -> u64;

    /// Fills `buf` with the bytes starting at `position`.
    ///
    /// # Errors
    ///
    /// Returns an error if the range falls outside the reserved capacity.
    fn read_at(&self, position: u64, buf: &mut [u8]) -> StorageResult<()>;

    /// Writes `data` starting at `position`.
    ///
    /// # Errors
    ///
    /// Returns an error if the range falls outside the reserved capacity.
    fn write_at(&mut self, position: u64, data: &[u8]) -> StorageResult<()>;

    /// Pushes written bytes to the backing storage. Syncing is left to
    /// [`IndexBuffer::flush_and_truncate`].
    ///
    /// # Errors
    ///
    /// Returns an error if the write-back fails.
    fn flush(&mut self) -> StorageResult<()>;

    /// Flushes, syncs, cuts the backing storage down to `len` bytes and
    /// releases it.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the steps fail.
    fn flush_and_truncate(&mut self, len: u64) -> StorageResult<()>;
}

pub(crate) fn check_range(position: u64, len: usize, capacity: u64) -> std::io::Result<usize> {
    let end = position.saturating_add(len as u64);
    if end > capacity {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("range {position}..{end} outside reserved capacity {capacity}"),
        ));
    }
    usize::try_from(position).map_err(|_| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("position {position} does not fit in memory"),
        )
    })
}
