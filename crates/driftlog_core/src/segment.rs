//! Log segments.
//!
//! A segment pairs one [`Store`] with one [`Index`] under a shared base
//! offset. Both files are named after the base offset:
//!
//! ```text
//! <base_offset>.store   length-prefixed encoded records
//! <base_offset>.index   (relative offset, store position) entries
//! ```

use crate::config::SegmentConfig;
use crate::error::{CoreError, CoreResult};
use crate::record::Record;
use driftlog_storage::{Index, Store};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Extension of segment store files.
pub const STORE_EXTENSION: &str = "store";

/// Extension of segment index files.
pub const INDEX_EXTENSION: &str = "index";

/// A bounded, offset-contiguous slice of the log.
///
/// Invariant: `next_offset - base_offset` equals the number of index
/// entries.
#[derive(Debug)]
pub struct Segment {
    store: Arc<Store>,
    index: Index,
    store_path: PathBuf,
    index_path: PathBuf,
    base_offset: u64,
    next_offset: u64,
    config: SegmentConfig,
    closed: bool,
}

/// Summary of a segment's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentInfo {
    /// First offset the segment is responsible for.
    pub base_offset: u64,
    /// Offset the next append would receive.
    pub next_offset: u64,
    /// Store size in bytes.
    pub store_bytes: u64,
    /// Bytes used by index entries.
    pub index_bytes: u64,
}

impl Segment {
    /// Opens or creates the segment with `base_offset` in `dir`.
    ///
    /// `next_offset` is recovered from the last index entry that points
    /// inside the store.
    ///
    /// # Errors
    ///
    /// Returns an error if either file cannot be opened.
    pub fn open(dir: &Path, base_offset: u64, config: SegmentConfig) -> CoreResult<Self> {
        let store_path = dir.join(format!("{base_offset}.{STORE_EXTENSION}"));
        let index_path = dir.join(format!("{base_offset}.{INDEX_EXTENSION}"));

        let store = Arc::new(Store::open(&store_path)?);
        let mut index = Index::open(&index_path, config.max_index_bytes)?;

        // Entries whose record never reached the store are dropped
        let store_size = store.size();
        while let Ok((relative, position)) = index.read(-1) {
            if position < store_size {
                break;
            }
            tracing::warn!(
                base_offset,
                relative,
                position,
                store_size,
                "dropping dangling index entry"
            );
            index.pop();
        }

        let next_offset = match index.read(-1) {
            Ok((relative, _)) => base_offset + u64::from(relative) + 1,
            Err(e) if e.is_end_of_data() => base_offset,
            Err(e) => return Err(e.into()),
        };

        tracing::debug!(base_offset, next_offset, "segment opened");

        Ok(Self {
            store,
            index,
            store_path,
            index_path,
            base_offset,
            next_offset,
            config,
            closed: false,
        })
    }

    /// Appends a record, stamping it with the next offset.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::SegmentFull`] without writing anything if the
    /// index has no room left, or a storage error if a write fails.
    pub fn append(&mut self, record: &mut Record) -> CoreResult<u64> {
        let full = CoreError::SegmentFull {
            base_offset: self.base_offset,
        };
        if self.index.is_full() {
            return Err(full);
        }
        let offset = self.next_offset;
        let relative = u32::try_from(offset - self.base_offset).map_err(|_| full)?;

        record.offset = offset;
        let (_, position) = self.store.append(&record.encode())?;
        self.index.write(relative, position)?;
        // Store first, so a written index entry never points past the store
        self.store.flush()?;
        self.index.flush()?;
        self.next_offset += 1;

        Ok(offset)
    }

    /// Reads the record stored at absolute `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::OffsetOutOfRange`] if the segment holds no
    /// record at `offset`.
    pub fn read(&self, offset: u64) -> CoreResult<Record> {
        if !self.contains(offset) {
            return Err(CoreError::out_of_range(offset));
        }
        let relative =
            i64::try_from(offset - self.base_offset).map_err(|_| CoreError::out_of_range(offset))?;

        let (_, position) = self.index.read(relative).map_err(|e| {
            if e.is_end_of_data() {
                CoreError::out_of_range(offset)
            } else {
                e.into()
            }
        })?;

        let data = self.store.read(position)?;
        Record::decode(&data)
    }

    /// Returns true if the store or the index reached its limit.
    #[must_use]
    pub fn is_maxed(&self) -> bool {
        self.store.size() >= self.config.max_store_bytes
            || self.index.size() >= self.config.max_index_bytes
            || self.index.is_full()
    }

    /// Returns true if `offset` falls in `[base_offset, next_offset)`.
    #[must_use]
    pub fn contains(&self, offset: u64) -> bool {
        self.base_offset <= offset && offset < self.next_offset
    }

    /// First offset this segment is responsible for.
    #[must_use]
    pub fn base_offset(&self) -> u64 {
        self.base_offset
    }

    /// Offset the next append will receive.
    #[must_use]
    pub fn next_offset(&self) -> u64 {
        self.next_offset
    }

    /// Shared handle to the store, for raw readers.
    #[must_use]
    pub fn store(&self) -> Arc<Store> {
        Arc::clone(&self.store)
    }

    /// Returns a summary of the segment.
    #[must_use]
    pub fn info(&self) -> SegmentInfo {
        SegmentInfo {
            base_offset: self.base_offset,
            next_offset: self.next_offset,
            store_bytes: self.store.size(),
            index_bytes: self.index.size(),
        }
    }

    /// Closes the store and index. Closing a closed segment is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if flushing or truncating either file fails.
    pub fn close(&mut self) -> CoreResult<()> {
        if self.closed {
            return Ok(());
        }
        self.index.close()?;
        self.store.close()?;
        self.closed = true;
        tracing::debug!(base_offset = self.base_offset, "segment closed");
        Ok(())
    }

    /// Closes the segment and deletes both files. Files that are already
    /// gone are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if closing or deleting fails.
    pub fn remove(&mut self) -> CoreResult<()> {
        self.close()?;
        remove_if_exists(&self.index_path)?;
        remove_if_exists(&self.store_path)?;
        tracing::debug!(base_offset = self.base_offset, "segment removed");
        Ok(())
    }
}

fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        result => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftlog_storage::{ENTRY_WIDTH, LEN_WIDTH};
    use tempfile::tempdir;

    fn limits(max_store_bytes: u64, max_index_bytes: u64) -> SegmentConfig {
        SegmentConfig {
            max_store_bytes,
            max_index_bytes,
            initial_offset: 0,
        }
    }

    #[test]
    fn index_limit_rolls_over() {
        let dir = tempdir().unwrap();
        let mut segment = Segment::open(dir.path(), 16, limits(1024, ENTRY_WIDTH * 3)).unwrap();
        assert_eq!(segment.next_offset(), 16);
        assert!(!segment.is_maxed());

        for i in 0..3u64 {
            let mut record = Record::new(b"hello world".to_vec());
            let offset = segment.append(&mut record).unwrap();
            assert_eq!(offset, 16 + i);
            assert_eq!(record.offset, offset);

            let read = segment.read(offset).unwrap();
            assert_eq!(read.value, b"hello world");
            assert_eq!(read.offset, offset);
        }

        assert!(segment.is_maxed());
        let err = segment
            .append(&mut Record::new(b"hello world".to_vec()))
            .unwrap_err();
        assert!(err.is_capacity_exhausted());
        assert_eq!(segment.info().store_bytes, 3 * (LEN_WIDTH + 8 + 11));
    }

    #[test]
    fn store_limit_on_reopen() {
        let dir = tempdir().unwrap();
        let record_width = LEN_WIDTH + 8 + 11;

        let mut segment = Segment::open(dir.path(), 16, limits(1024, 1024)).unwrap();
        for _ in 0..3 {
            segment
                .append(&mut Record::new(b"hello world".to_vec()))
                .unwrap();
        }
        segment.close().unwrap();

        let segment = Segment::open(dir.path(), 16, limits(record_width * 3, 1024)).unwrap();
        assert_eq!(segment.next_offset(), 19);
        assert!(segment.is_maxed());
    }

    #[test]
    fn read_outside_segment_is_out_of_range() {
        let dir = tempdir().unwrap();
        let mut segment = Segment::open(dir.path(), 10, limits(1024, 1024)).unwrap();
        segment.append(&mut Record::new(b"x".to_vec())).unwrap();

        assert!(segment.read(9).unwrap_err().is_out_of_range());
        assert!(segment.read(11).unwrap_err().is_out_of_range());
        assert!(segment.read(10).is_ok());
    }

    #[test]
    fn remove_deletes_files() {
        let dir = tempdir().unwrap();
        let mut segment = Segment::open(dir.path(), 0, limits(1024, 1024)).unwrap();
        segment.append(&mut Record::new(b"x".to_vec())).unwrap();

        assert!(dir.path().join("0.store").exists());
        assert!(dir.path().join("0.index").exists());

        segment.remove().unwrap();
        assert!(!dir.path().join("0.store").exists());
        assert!(!dir.path().join("0.index").exists());
    }

    #[test]
    fn unclosed_segment_recovers_next_offset() {
        let dir = tempdir().unwrap();

        let mut segment = Segment::open(dir.path(), 16, limits(1024, 1024)).unwrap();
        for _ in 0..3 {
            segment
                .append(&mut Record::new(b"hello world".to_vec()))
                .unwrap();
        }
        drop(segment);

        let mut segment = Segment::open(dir.path(), 16, limits(1024, 1024)).unwrap();
        assert_eq!(segment.next_offset(), 19);
        assert_eq!(segment.read(18).unwrap().offset, 18);
        assert_eq!(
            segment
                .append(&mut Record::new(b"again".to_vec()))
                .unwrap(),
            19
        );
    }

    #[test]
    fn entries_past_store_end_are_dropped() {
        let dir = tempdir().unwrap();

        let mut segment = Segment::open(dir.path(), 0, limits(1024, 1024)).unwrap();
        for _ in 0..3 {
            segment.append(&mut Record::new(b"x".to_vec())).unwrap();
        }
        segment.close().unwrap();

        // Lose the last record but keep its index entry
        let store_path = dir.path().join("0.store");
        let width = std::fs::metadata(&store_path).unwrap().len() / 3;
        let file = std::fs::OpenOptions::new()
            .write(true)
            .open(&store_path)
            .unwrap();
        file.set_len(2 * width).unwrap();
        drop(file);

        let segment = Segment::open(dir.path(), 0, limits(1024, 1024)).unwrap();
        assert_eq!(segment.next_offset(), 2);
        assert!(segment.read(2).unwrap_err().is_out_of_range());
    }

    #[test]
    fn empty_unclosed_segment_starts_at_base() {
        let dir = tempdir().unwrap();
        drop(Segment::open(dir.path(), 5, limits(1024, 1024)).unwrap());

        let segment = Segment::open(dir.path(), 5, limits(1024, 1024)).unwrap();
        assert_eq!(segment.next_offset(), 5);
    }

    #[test]
    fn close_is_idempotent() {
        let dir = tempdir().unwrap();
        let mut segment = Segment::open(dir.path(), 0, limits(1024, 1024)).unwrap();
        segment.close().unwrap();
        segment.close().unwrap();
    }
}
