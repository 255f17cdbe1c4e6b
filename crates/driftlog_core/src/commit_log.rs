//! The append/read seam shared by the RPC server and the replicator.

use crate::error::CoreResult;
use crate::log::Log;
use crate::record::Record;

/// Anything records can be appended to and read back from by offset.
///
/// Servers and replicators hold an `Arc<dyn CommitLog>` so tests can swap
/// in a fake without touching disk.
pub trait CommitLog: Send + Sync {
    /// Appends `record` and returns the offset it was stored at.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be stored.
    fn append(&self, record: Record) -> CoreResult<u64>;

    /// Reads the record at `offset`.
    ///
    /// # Errors
    ///
    /// Returns an out-of-range error if nothing is stored at `offset`.
    fn read(&self, offset: u64) -> CoreResult<Record>;
}

impl CommitLog for Log {
    fn append(&self, record: Record) -> CoreResult<u64> {
        Log::append(self, record)
    }

    fn read(&self, offset: u64) -> CoreResult<Record> {
        Log::read(self, offset)
    }
}
