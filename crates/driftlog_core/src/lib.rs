//! # driftlog Core
//!
//! A segmented, offset-addressed commit log.
//!
//! Records are appended to the active [`Segment`] and receive consecutive
//! offsets. Once a segment's store or index reaches its limit the [`Log`]
//! rolls over to a new segment whose base offset is the next offset.
//!
//! ## On-disk Layout
//!
//! ```text
//! <dir>/
//!   0.store     0.index
//!   16.store    16.index
//!   ...
//! ```
//!
//! Opening a log over an existing directory recovers every segment and
//! resumes at the offset after the last stored record.
//!
//! ## Example
//!
//! ```no_run
//! use driftlog_core::{Config, Log, Record};
//!
//! let log = Log::open("data", Config::new().max_store_bytes(4096)).unwrap();
//! let offset = log.append(Record::new(b"hello world".to_vec())).unwrap();
//! let record = log.read(offset).unwrap();
//! assert_eq!(record.offset, offset);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod commit_log;
mod config;
mod error;
mod log;
mod reader;
mod record;
mod segment;

pub use commit_log::CommitLog;
pub use config::{Config, SegmentConfig, DEFAULT_MAX_INDEX_BYTES, DEFAULT_MAX_STORE_BYTES};
pub use error::{CoreError, CoreResult};
pub use log::Log;
pub use reader::LogReader;
pub use record::Record;
pub use segment::{Segment, SegmentInfo, INDEX_EXTENSION, STORE_EXTENSION};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
