//! Raw byte reader over a log's stores.

use driftlog_storage::{StorageError, Store};
use std::io::{self, Read};
use std::sync::Arc;

/// Concatenated view of every segment store, oldest first.
///
/// Yields the stores' raw bytes: each entry is an 8-byte big-endian length
/// followed by an encoded [`Record`](crate::Record). The reader holds the
/// stores it was created with; segments added afterwards are not visible.
#[derive(Debug)]
pub struct LogReader {
    stores: Vec<Arc<Store>>,
    current: usize,
    position: u64,
}

impl LogReader {
    pub(crate) fn new(stores: Vec<Arc<Store>>) -> Self {
        Self {
            stores,
            current: 0,
            position: 0,
        }
    }
}

impl Read for LogReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while let Some(store) = self.stores.get(self.current) {
            let n = store.read_at(buf, self.position).map_err(into_io)?;
            if n > 0 {
                self.position += n as u64;
                return Ok(n);
            }
            self.current += 1;
            self.position = 0;
        }
        Ok(0)
    }
}

fn into_io(err: StorageError) -> io::Error {
    match err {
        StorageError::Io(e) => e,
        other => io::Error::new(io::ErrorKind::Other, other),
    }
}
