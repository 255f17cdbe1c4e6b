//! Append-only record store.

use crate::error::{StorageError, StorageResult};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Width of the length prefix in front of every stored payload.
pub const LEN_WIDTH: u64 = 8;

/// An append-only file of length-prefixed payloads.
///
/// ## Entry Format
///
/// ```text
/// | payload_len (8, BE) | payload (N) |
/// ```
///
/// Appends go through a buffered writer. Every read flushes the buffer first
/// so a store always observes its own pending writes. One mutex serializes
/// appends, reads and close.
///
/// # Example
///
/// ```no_run
/// use driftlog_storage::Store;
/// use std::path::Path;
///
/// let store = Store::open(Path::new("0.store")).unwrap();
/// let (written, position) = store.append(b"hello").unwrap();
/// assert_eq!(written, 13);
/// assert_eq!(store.read(position).unwrap(), b"hello");
/// ```
#[derive(Debug)]
pub struct Store {
    path: PathBuf,
    inner: Mutex<StoreInner>,
}

#[derive(Debug)]
struct StoreInner {
    writer: Option<BufWriter<File>>,
    size: u64,
}

impl StoreInner {
    fn writer(&mut self) -> StorageResult<&mut BufWriter<File>> {
        self.writer.as_mut().ok_or(StorageError::Closed)
    }

    /// Flushes pending appends and hands out the file for positional reads.
    fn flushed_file(&mut self) -> StorageResult<&mut File> {
        let writer = self.writer()?;
        writer.flush()?;
        Ok(writer.get_mut())
    }
}

impl Store {
    /// Opens or creates the store file at `path`.
    ///
    /// The file is opened in append mode; the current size is taken from
    /// the file length.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or created.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)?;
        let size = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(StoreInner {
                writer: Some(BufWriter::new(file)),
                size,
            }),
        })
    }

    /// Appends a payload.
    ///
    /// Returns `(bytes_written, position)`: the number of bytes the entry
    /// occupies including its length prefix, and the position where the
    /// entry starts.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails or the store is closed.
    pub fn append(&self, payload: &[u8]) -> StorageResult<(u64, u64)> {
        let mut inner = self.inner.lock();
        let position = inner.size;

        let writer = inner.writer()?;
        writer.write_all(&(payload.len() as u64).to_be_bytes())?;
        writer.write_all(payload)?;

        let written = LEN_WIDTH + payload.len() as u64;
        inner.size += written;
        Ok((written, position))
    }

    /// Reads the payload of the entry starting at `position`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ReadPastEnd`] if the entry extends past the
    /// end of the store.
    pub fn read(&self, position: u64) -> StorageResult<Vec<u8>> {
        let mut inner = self.inner.lock();
        let size = inner.size;

        if position.saturating_add(LEN_WIDTH) > size {
            return Err(StorageError::ReadPastEnd {
                position,
                len: LEN_WIDTH,
                size,
            });
        }

        let file = inner.flushed_file()?;
        file.seek(SeekFrom::Start(position))?;
        let mut len = [0u8; LEN_WIDTH as usize];
        file.read_exact(&mut len)?;
        let len = u64::from_be_bytes(len);

        let end = (position + LEN_WIDTH).saturating_add(len);
        if end > size {
            return Err(StorageError::ReadPastEnd {
                position,
                len: LEN_WIDTH + len,
                size,
            });
        }

        let mut payload = vec![0u8; len as usize];
        file.read_exact(&mut payload)?;
        Ok(payload)
    }

    /// Reads raw bytes starting at `offset` into `buf`.
    ///
    /// Returns the number of bytes read; `0` means `offset` is at or past
    /// the end of the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or the store is closed.
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> StorageResult<usize> {
        let mut inner = self.inner.lock();
        let size = inner.size;
        if offset >= size || buf.is_empty() {
            return Ok(0);
        }

        let available = usize::try_from(size - offset).unwrap_or(usize::MAX);
        let len = buf.len().min(available);

        let file = inner.flushed_file()?;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut buf[..len])?;
        Ok(len)
    }

    /// Flushes buffered appends to the OS without closing.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails or the store is closed.
    pub fn flush(&self) -> StorageResult<()> {
        self.inner.lock().writer()?.flush()?;
        Ok(())
    }

    /// Flushes, syncs and closes the file.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Closed`] if the store was already closed, or
    /// an I/O error if flushing fails.
    pub fn close(&self) -> StorageResult<()> {
        let mut inner = self.inner.lock();
        let writer = inner.writer.take().ok_or(StorageError::Closed)?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        Ok(())
    }

    /// Current size in bytes, including buffered appends.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.inner.lock().size
    }

    /// Returns true once [`Store::close`] has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.lock().writer.is_none()
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}
