//! The segmented commit log.

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::reader::LogReader;
use crate::record::Record;
use crate::segment::{Segment, SegmentInfo, INDEX_EXTENSION, STORE_EXTENSION};
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// An ordered set of segments spanning one directory.
///
/// Segments are contiguous and non-overlapping in offset space. The last
/// segment is the active one and the only one that accepts appends.
///
/// # Locking
///
/// One reader-writer lock guards the segment list. Reads share it; appends,
/// truncation, close and reset take it exclusively, so any append blocks
/// every other log operation while it runs.
///
/// # Example
///
/// ```no_run
/// use driftlog_core::{Config, Log, Record};
///
/// let log = Log::open("data/log", Config::default()).unwrap();
/// let offset = log.append(Record::new(b"hello".to_vec())).unwrap();
/// assert_eq!(log.read(offset).unwrap().value, b"hello");
/// log.close().unwrap();
/// ```
#[derive(Debug)]
pub struct Log {
    dir: PathBuf,
    config: Config,
    state: RwLock<LogState>,
}

#[derive(Debug)]
struct LogState {
    segments: Vec<Segment>,
    closed: bool,
}

impl LogState {
    fn active(&mut self) -> CoreResult<&mut Segment> {
        if self.closed {
            return Err(CoreError::LogClosed);
        }
        self.segments.last_mut().ok_or(CoreError::LogClosed)
    }
}

impl Log {
    /// Opens the log in `dir`, recovering any existing segments.
    ///
    /// The directory is created if missing. Zero limits in `config` are
    /// replaced with defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or a segment cannot be opened.
    pub fn open(dir: impl AsRef<Path>, config: Config) -> CoreResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        let config = config.normalized();
        fs::create_dir_all(&dir)?;

        let segments = setup(&dir, &config)?;
        tracing::info!(
            dir = %dir.display(),
            segments = segments.len(),
            "log opened"
        );

        Ok(Self {
            dir,
            config,
            state: RwLock::new(LogState {
                segments,
                closed: false,
            }),
        })
    }

    /// Appends a record and returns its offset.
    ///
    /// Rolls over to a new segment starting at `offset + 1` once the active
    /// segment is maxed.
    ///
    /// # Errors
    ///
    /// Returns an error if the log is closed, or if the write or a rollover
    /// fails.
    pub fn append(&self, mut record: Record) -> CoreResult<u64> {
        let mut state = self.state.write();

        // A recovered active segment may already be at its limit
        if state.active()?.is_maxed() {
            let next = state.active()?.next_offset();
            self.roll(&mut state, next)?;
        }

        let offset = state.active()?.append(&mut record)?;

        if state.active()?.is_maxed() {
            self.roll(&mut state, offset + 1)?;
        }
        Ok(offset)
    }

    /// Reads the record at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::OffsetOutOfRange`] if no segment holds `offset`.
    pub fn read(&self, offset: u64) -> CoreResult<Record> {
        let state = self.state.read();
        if state.closed {
            return Err(CoreError::LogClosed);
        }

        let segments = &state.segments;
        let idx = segments.partition_point(|s| s.base_offset() <= offset);
        let segment = idx
            .checked_sub(1)
            .and_then(|i| segments.get(i))
            .filter(|s| s.contains(offset))
            .ok_or_else(|| CoreError::out_of_range(offset))?;

        segment.read(offset)
    }

    /// Base offset of the oldest segment.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::LogClosed`] if the log has been removed.
    pub fn lowest_offset(&self) -> CoreResult<u64> {
        let state = self.state.read();
        state
            .segments
            .first()
            .map(Segment::base_offset)
            .ok_or(CoreError::LogClosed)
    }

    /// Offset of the newest record, or `0` for a log that never received
    /// one.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::LogClosed`] if the log has been removed.
    pub fn highest_offset(&self) -> CoreResult<u64> {
        let state = self.state.read();
        state
            .segments
            .last()
            .map(|s| s.next_offset().saturating_sub(1))
            .ok_or(CoreError::LogClosed)
    }

    /// Removes every segment whose records all lie below `lowest`.
    ///
    /// If that removes the active segment too, a fresh one starts where the
    /// removed range ended.
    ///
    /// # Errors
    ///
    /// Returns an error if the log is closed or a segment cannot be
    /// removed. Segments removed before the failure stay removed; the rest
    /// of the log is untouched.
    pub fn truncate(&self, lowest: u64) -> CoreResult<()> {
        let mut state = self.state.write();
        if state.closed {
            return Err(CoreError::LogClosed);
        }

        // Segments are ordered, so the removable ones form a prefix
        let removable = state
            .segments
            .iter()
            .take_while(|s| s.next_offset() <= lowest)
            .count();
        let mut resume_at = None;
        for _ in 0..removable {
            let next_offset = state.segments[0].next_offset();
            state.segments[0].remove()?;
            state.segments.remove(0);
            resume_at = Some(next_offset);
        }

        if state.segments.is_empty() {
            let base = resume_at.unwrap_or(self.config.segment.initial_offset);
            state
                .segments
                .push(Segment::open(&self.dir, base, self.config.segment)?);
        }

        tracing::info!(lowest, segments = state.segments.len(), "log truncated");
        Ok(())
    }

    /// Returns a reader over the raw store bytes of every segment in order.
    #[must_use]
    pub fn reader(&self) -> LogReader {
        let state = self.state.read();
        LogReader::new(state.segments.iter().map(Segment::store).collect())
    }

    /// Returns a summary of every segment.
    #[must_use]
    pub fn segments(&self) -> Vec<SegmentInfo> {
        self.state.read().segments.iter().map(Segment::info).collect()
    }

    /// Closes every segment. Closing a closed log is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if a segment fails to close.
    pub fn close(&self) -> CoreResult<()> {
        let mut state = self.state.write();
        if state.closed {
            return Ok(());
        }
        close_segments(&mut state)?;
        tracing::info!(dir = %self.dir.display(), "log closed");
        Ok(())
    }

    /// Closes the log and deletes its directory.
    ///
    /// # Errors
    ///
    /// Returns an error if closing or deleting fails.
    pub fn remove(&self) -> CoreResult<()> {
        let mut state = self.state.write();
        close_segments(&mut state)?;
        state.segments.clear();
        fs::remove_dir_all(&self.dir)?;
        Ok(())
    }

    /// Deletes all data and starts over with a fresh segment.
    ///
    /// # Errors
    ///
    /// Returns an error if deleting or recreating the directory fails.
    pub fn reset(&self) -> CoreResult<()> {
        let mut state = self.state.write();
        close_segments(&mut state)?;
        state.segments.clear();
        fs::remove_dir_all(&self.dir)?;

        fs::create_dir_all(&self.dir)?;
        state.segments = setup(&self.dir, &self.config)?;
        state.closed = false;
        Ok(())
    }

    /// Directory holding the segment files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Effective configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn roll(&self, state: &mut LogState, base_offset: u64) -> CoreResult<()> {
        let segment = Segment::open(&self.dir, base_offset, self.config.segment)?;
        state.segments.push(segment);
        tracing::debug!(base_offset, "rolled over to new segment");
        Ok(())
    }
}

impl Drop for Log {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

fn close_segments(state: &mut LogState) -> CoreResult<()> {
    if state.closed {
        return Ok(());
    }
    for segment in &mut state.segments {
        segment.close()?;
    }
    state.closed = true;
    Ok(())
}

/// Rebuilds segments from `<offset>.store` / `<offset>.index` files.
fn setup(dir: &Path, config: &Config) -> CoreResult<Vec<Segment>> {
    let mut base_offsets = BTreeSet::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_segment_file = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == STORE_EXTENSION || ext == INDEX_EXTENSION);
        if !is_segment_file {
            continue;
        }
        match path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .and_then(|stem| stem.parse::<u64>().ok())
        {
            Some(offset) => {
                base_offsets.insert(offset);
            }
            None => tracing::warn!(path = %path.display(), "skipping unrecognised segment file"),
        }
    }

    let mut segments = Vec::with_capacity(base_offsets.len().max(1));
    for base_offset in base_offsets {
        segments.push(Segment::open(dir, base_offset, config.segment)?);
    }
    if segments.is_empty() {
        segments.push(Segment::open(
            dir,
            config.segment.initial_offset,
            config.segment,
        )?);
    }
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftlog_storage::ENTRY_WIDTH;
    use std::io::Read;
    use tempfile::tempdir;

    fn record() -> Record {
        Record::new(b"hello world".to_vec())
    }

    #[test]
    fn append_read() {
        let dir = tempdir().unwrap();
        let log = Log::open(dir.path(), Config::new().max_store_bytes(32)).unwrap();

        let offset = log.append(record()).unwrap();
        assert_eq!(offset, 0);

        let read = log.read(offset).unwrap();
        assert_eq!(read.value, b"hello world");
        assert_eq!(read.offset, 0);
    }

    #[test]
    fn out_of_range() {
        let dir = tempdir().unwrap();
        let log = Log::open(dir.path(), Config::default()).unwrap();

        let err = log.read(1).unwrap_err();
        assert_eq!(err.out_of_range_offset(), Some(1));
    }

    #[test]
    fn init_existing() {
        let dir = tempdir().unwrap();
        let config = Config::new().max_store_bytes(32);

        let log = Log::open(dir.path(), config).unwrap();
        for _ in 0..3 {
            log.append(record()).unwrap();
        }
        log.close().unwrap();

        assert_eq!(log.lowest_offset().unwrap(), 0);
        assert_eq!(log.highest_offset().unwrap(), 2);

        let log = Log::open(dir.path(), config).unwrap();
        assert_eq!(log.lowest_offset().unwrap(), 0);
        assert_eq!(log.highest_offset().unwrap(), 2);
        for offset in 0..3 {
            assert_eq!(log.read(offset).unwrap().value, b"hello world");
        }
    }

    #[test]
    fn reader_yields_store_bytes() {
        let dir = tempdir().unwrap();
        let log = Log::open(dir.path(), Config::default()).unwrap();
        log.append(record()).unwrap();

        let mut bytes = Vec::new();
        log.reader().read_to_end(&mut bytes).unwrap();

        let len = driftlog_storage::LEN_WIDTH as usize;
        let decoded = Record::decode(&bytes[len..]).unwrap();
        assert_eq!(decoded.value, b"hello world");
        assert_eq!(decoded.offset, 0);
    }

    #[test]
    fn truncate_drops_old_segments() {
        let dir = tempdir().unwrap();
        let log = Log::open(dir.path(), Config::new().max_index_bytes(ENTRY_WIDTH)).unwrap();
        for _ in 0..3 {
            log.append(record()).unwrap();
        }

        log.truncate(1).unwrap();

        assert!(log.read(0).unwrap_err().is_out_of_range());
        assert_eq!(log.lowest_offset().unwrap(), 1);
        assert_eq!(log.read(1).unwrap().offset, 1);
        assert!(!dir.path().join("0.store").exists());
    }

    #[test]
    fn truncate_everything_keeps_offsets_monotonic() {
        let dir = tempdir().unwrap();
        let log = Log::open(dir.path(), Config::default()).unwrap();
        for _ in 0..3 {
            log.append(record()).unwrap();
        }

        log.truncate(10).unwrap();

        assert_eq!(log.lowest_offset().unwrap(), 3);
        assert_eq!(log.append(record()).unwrap(), 3);
    }

    #[test]
    fn reset_starts_fresh() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log");
        let log = Log::open(&path, Config::default()).unwrap();
        log.append(record()).unwrap();
        log.append(record()).unwrap();

        log.reset().unwrap();

        assert_eq!(log.highest_offset().unwrap(), 0);
        assert!(log.read(0).unwrap_err().is_out_of_range());
        assert_eq!(log.append(record()).unwrap(), 0);
    }

    #[test]
    fn remove_deletes_directory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log");
        let log = Log::open(&path, Config::default()).unwrap();
        log.append(record()).unwrap();

        log.remove().unwrap();

        assert!(!path.exists());
        assert!(matches!(log.append(record()), Err(CoreError::LogClosed)));
    }

    #[test]
    fn closed_log_rejects_operations() {
        let dir = tempdir().unwrap();
        let log = Log::open(dir.path(), Config::default()).unwrap();
        log.close().unwrap();
        log.close().unwrap();

        assert!(matches!(log.append(record()), Err(CoreError::LogClosed)));
        assert!(matches!(log.read(0), Err(CoreError::LogClosed)));
    }

    #[test]
    fn unrelated_files_are_ignored() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("README"), b"notes").unwrap();
        std::fs::write(dir.path().join("junk.store"), b"").unwrap();

        let log = Log::open(dir.path(), Config::default()).unwrap();
        assert_eq!(log.segments().len(), 1);
        assert_eq!(log.lowest_offset().unwrap(), 0);
    }

    #[test]
    fn initial_offset_applies_to_fresh_log() {
        let dir = tempdir().unwrap();
        let log = Log::open(dir.path(), Config::new().initial_offset(100)).unwrap();

        assert_eq!(log.append(record()).unwrap(), 100);
        assert_eq!(log.lowest_offset().unwrap(), 100);
        assert_eq!(log.highest_offset().unwrap(), 100);
    }
}
