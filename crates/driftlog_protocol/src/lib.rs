//! # driftlog Protocol
//!
//! Messages exchanged between driftlog clients, servers and replicas.
//!
//! This crate provides:
//! - [`Request`] / [`Response`] and the append/read payloads
//! - [`Status`] for errors that cross the wire
//! - Length-prefixed CBOR framing over any tokio stream
//!
//! ## Status Mapping
//!
//! | Log error | Status code | Details |
//! |-----------|-------------|---------|
//! | offset out of range | `NotFound` | `OffsetOutOfRange`, `LocalizedMessage` |
//! | anything else | `Internal` | none |
//!
//! Authorization failures surface as `PermissionDenied`.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod frame;
mod messages;
mod status;

pub use error::{ProtocolError, ProtocolResult};
pub use frame::{
    decode_body, encode_frame, read_frame, write_frame, HEADER_SIZE, MAX_FRAME_SIZE,
};
pub use messages::{AppendRequest, AppendResponse, ReadRequest, ReadResponse, Request, Response};
pub use status::{Code, Detail, Status, DEFAULT_LOCALE};
