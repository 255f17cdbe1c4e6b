//! # driftlog Storage
//!
//! The two on-disk primitives a log segment is built from.
//!
//! - [`Store`] - an append-only file of length-prefixed payloads
//! - [`Index`] - a fixed-width table from segment-relative record number to
//!   store position
//!
//! Neither primitive knows about records, offsets across segments or
//! networking. Segments and the log own that.
//!
//! ## Index Buffers
//!
//! An index lives in an [`IndexBuffer`]: capacity is reserved up front so
//! the hot append path never grows the file, and the unused tail is cut off
//! on close.
//!
//! - [`FileBuffer`] - For persistent indexes
//! - [`InMemoryBuffer`] - For testing and ephemeral indexes
//!
//! ## Example
//!
//! ```rust
//! use driftlog_storage::{Index, InMemoryBuffer};
//!
//! let mut index = Index::with_buffer(Box::new(InMemoryBuffer::new()), 1024).unwrap();
//! index.write(0, 0).unwrap();
//! index.write(1, 19).unwrap();
//! assert_eq!(index.read(-1).unwrap(), (1, 19));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod buffer;
mod error;
mod file;
mod index;
mod memory;
mod store;

pub use buffer::IndexBuffer;
pub use error::{StorageError, StorageResult};
pub use file::FileBuffer;
pub use index::{Index, ENTRY_WIDTH, OFFSET_WIDTH, POSITION_WIDTH};
pub use memory::InMemoryBuffer;
pub use store::{Store, LEN_WIDTH};
