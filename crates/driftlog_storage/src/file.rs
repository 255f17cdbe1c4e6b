//! File-backed index buffer.

use crate::buffer::{check_range, IndexBuffer};
use crate::error::{StorageError, StorageResult};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};

/// A file-backed index buffer.
///
/// The whole reserved region is mirrored in memory, so reads and writes are
/// plain memory accesses. Written bytes are tracked as a dirty range and
/// pushed to the file by [`IndexBuffer::flush`].
///
/// # Durability
///
/// - `reserve()` extends the file to the reserved capacity with zeros
/// - `flush()` writes the dirty range to the file, so the entries survive
///   the process going away without a close
/// - `flush_and_truncate()` calls `File::sync_all()` and then cuts the file
///   to the used length, so a cleanly closed index file holds only entries
///
/// # Example
///
/// ```no_run
/// use driftlog_storage::{FileBuffer, IndexBuffer};
/// use std::path::Path;
///
/// let mut buffer = FileBuffer::open(Path::new("0.index")).unwrap();
/// let used = buffer.reserve(1024).unwrap();
/// buffer.write_at(used, &[0u8; 12]).unwrap();
/// buffer.flush_and_truncate(used + 12).unwrap();
/// ```
#[derive(Debug)]
pub struct FileBuffer {
    path: PathBuf,
    file: Option<File>,
    data: Vec<u8>,
    dirty: Option<Range<usize>>,
}

impl FileBuffer {
    /// Opens or creates the file at `path`.
    ///
    /// Nothing is reserved until [`IndexBuffer::reserve`] is called.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or created.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            file: Some(file),
            data: Vec::new(),
            dirty: None,
        })
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn file(&mut self) -> StorageResult<&mut File> {
        self.file.as_mut().ok_or(StorageError::Closed)
    }
}

impl IndexBuffer for FileBuffer {
    fn reserve(&mut self, capacity: u64) -> StorageResult<u64> {
        let file = self.file()?;
        let existing = file.metadata()?.len();
        let capacity = capacity.max(existing);
        file.set_len(capacity)?;

        let len = usize::try_from(capacity).map_err(|_| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("index capacity {capacity} does not fit in memory"),
            )
        })?;
        let mut data = vec![0u8; len];
        file.seek(SeekFrom::Start(0))?;
        // Only the pre-existing prefix carries entries; the tail is zeros.
        file.read_exact(&mut data[..existing as usize])?;

        self.data = data;
        self.dirty = None;
        Ok(existing)
    }

    fn capacity(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_at(&self, position: u64, buf: &mut [u8]) -> StorageResult<()> {
        if self.file.is_none() {
            return Err(StorageError::Closed);
        }
        let start = check_range(position, buf.len(), self.capacity())?;
        buf.copy_from_slice(&self.data[start..start + buf.len()]);
        Ok(())
    }

    fn write_at(&mut self, position: u64, data: &[u8]) -> StorageResult<()> {
        if self.file.is_none() {
            return Err(StorageError::Closed);
        }
        let start = check_range(position, data.len(), self.capacity())?;
        let end = start + data.len();
        self.data[start..end].copy_from_slice(data);

        self.dirty = Some(match self.dirty.take() {
            Some(range) => range.start.min(start)..range.end.max(end),
            None => start..end,
        });
        Ok(())
    }

    fn flush(&mut self) -> StorageResult<()> {
        let Some(range) = self.dirty.take() else {
            return Ok(());
        };
        let start = range.start as u64;
        let file = self.file.as_mut().ok_or(StorageError::Closed)?;
        file.seek(SeekFrom::Start(start))?;
        file.write_all(&self.data[range])?;
        Ok(())
    }

    fn flush_and_truncate(&mut self, len: u64) -> StorageResult<()> {
        self.flush()?;
        let file = self.file.take().ok_or(StorageError::Closed)?;
        file.sync_all()?;
        file.set_len(len)?;
        file.sync_all()?;
        self.data.truncate(len as usize);
        Ok(())
    }
}
