//! Fixed-width offset index.

use crate::buffer::IndexBuffer;
use crate::error::{StorageError, StorageResult};
use crate::file::FileBuffer;
use std::path::{Path, PathBuf};

/// Width of the segment-relative offset field.
pub const OFFSET_WIDTH: u64 = 4;
/// Width of the store position field.
pub const POSITION_WIDTH: u64 = 8;
/// Width of one index entry.
pub const ENTRY_WIDTH: u64 = OFFSET_WIDTH + POSITION_WIDTH;

/// Maps segment-relative record numbers to byte positions in a store.
///
/// ## Entry Format
///
/// ```text
/// | relative_offset (4, BE) | store_position (8, BE) |
/// ```
///
/// Entry `n` lives at byte `n * ENTRY_WIDTH`, so any entry is found without
/// scanning. The backing buffer is reserved to the configured maximum when
/// the index opens and cut back to the used size when it closes; `size`
/// marks how many of the reserved bytes hold entries.
///
/// The index has no lock of its own. Entries below `size` never change once
/// written, and writers go through `&mut self`.
pub struct Index {
    buffer: Box<dyn IndexBuffer>,
    path: Option<PathBuf>,
    size: u64,
}

impl std::fmt::Debug for Index {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Index")
            .field("path", &self.path)
            .field("size", &self.size)
            .field("capacity", &self.buffer.capacity())
            .finish()
    }
}

impl Index {
    /// Opens the index file at `path`, reserving `max_bytes` of capacity.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or resized.
    pub fn open(path: &Path, max_bytes: u64) -> StorageResult<Self> {
        let buffer = FileBuffer::open(path)?;
        let mut index = Self::with_buffer(Box::new(buffer), max_bytes)?;
        index.path = Some(path.to_path_buf());
        Ok(index)
    }

    /// Builds an index over an arbitrary buffer.
    ///
    /// The used size is recovered from the buffer's length before
    /// reservation.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer cannot be reserved.
    pub fn with_buffer(mut buffer: Box<dyn IndexBuffer>, max_bytes: u64) -> StorageResult<Self> {
        let reserved = buffer.reserve(max_bytes)?;
        let mut index = Self {
            buffer,
            path: None,
            size: reserved - reserved % ENTRY_WIDTH,
        };
        index.size = index.valid_entries()? * ENTRY_WIDTH;
        if index.size != reserved {
            tracing::warn!(
                reserved,
                recovered = index.size,
                "index was not closed cleanly"
            );
        }
        tracing::trace!(size = index.size, capacity = index.capacity(), "index opened");
        Ok(index)
    }

    /// Counts the leading entries that form a valid sequence.
    ///
    /// An index that was never closed still carries its reserved zero tail.
    /// Entry `n` is valid if its relative offset is `n` and, past the first
    /// entry, its position is above the previous one.
    fn valid_entries(&self) -> StorageResult<u64> {
        let mut previous = None;
        for n in 0..self.len() {
            let (relative, position) = self.read(n as i64)?;
            if u64::from(relative) != n || previous.is_some_and(|p| position <= p) {
                return Ok(n);
            }
            previous = Some(position);
        }
        Ok(self.len())
    }

    /// Drops the last entry, if any. The next write reuses its slot.
    pub fn pop(&mut self) {
        self.size = self.size.saturating_sub(ENTRY_WIDTH);
    }

    /// Appends an entry.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::IndexFull`] if the entry does not fit in the
    /// reserved capacity.
    pub fn write(&mut self, relative_offset: u32, position: u64) -> StorageResult<()> {
        if self.is_full() {
            return Err(StorageError::IndexFull {
                size: self.size,
                capacity: self.buffer.capacity(),
            });
        }

        let mut entry = [0u8; ENTRY_WIDTH as usize];
        entry[..OFFSET_WIDTH as usize].copy_from_slice(&relative_offset.to_be_bytes());
        entry[OFFSET_WIDTH as usize..].copy_from_slice(&position.to_be_bytes());
        self.buffer.write_at(self.size, &entry)?;
        self.size += ENTRY_WIDTH;
        Ok(())
    }

    /// Reads entry `n`, or the last entry when `n == -1`.
    ///
    /// Returns `(relative_offset, store_position)`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::EndOfIndex`] if the index is empty or the
    /// entry has not been written.
    pub fn read(&self, n: i64) -> StorageResult<(u32, u64)> {
        let entries = self.len();
        let entry = match n {
            -1 if entries > 0 => entries - 1,
            n if n >= 0 && (n as u64) < entries => n as u64,
            _ => return Err(StorageError::EndOfIndex { entry: n }),
        };

        let mut raw = [0u8; ENTRY_WIDTH as usize];
        self.buffer.read_at(entry * ENTRY_WIDTH, &mut raw)?;

        let mut offset = [0u8; OFFSET_WIDTH as usize];
        offset.copy_from_slice(&raw[..OFFSET_WIDTH as usize]);
        let mut position = [0u8; POSITION_WIDTH as usize];
        position.copy_from_slice(&raw[OFFSET_WIDTH as usize..]);

        Ok((u32::from_be_bytes(offset), u64::from_be_bytes(position)))
    }

    /// Writes entries through to the backing storage without releasing the
    /// buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the write-back fails.
    pub fn flush(&mut self) -> StorageResult<()> {
        self.buffer.flush()
    }

    /// Syncs entries and truncates the backing storage to the used size.
    ///
    /// # Errors
    ///
    /// Returns an error if syncing or truncation fails, or if the index is
    /// already closed.
    pub fn close(&mut self) -> StorageResult<()> {
        self.buffer.flush_and_truncate(self.size)?;
        tracing::trace!(size = self.size, "index closed");
        Ok(())
    }

    /// Bytes occupied by written entries.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Number of written entries.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.size / ENTRY_WIDTH
    }

    /// Returns true if no entry has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Reserved capacity in bytes.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.buffer.capacity()
    }

    /// Returns true if another entry would not fit.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.size + ENTRY_WIDTH > self.buffer.capacity()
    }

    /// Path of the backing file, if file-backed.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}
