//! Request and response messages.

use crate::status::Status;
use driftlog_core::Record;
use serde::{Deserialize, Serialize};

/// Append one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendRequest {
    /// Record to append. Its offset is ignored.
    pub record: Record,
}

/// Offset assigned to an appended record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendResponse {
    /// Assigned offset.
    pub offset: u64,
}

/// Read the record at an offset, or stream from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadRequest {
    /// Offset to read (or start streaming) from.
    pub offset: u64,
}

/// A record read from the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadResponse {
    /// The record, with its offset set.
    pub record: Record,
}

/// A client-to-server message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    /// Sets the subject used for authorization on this connection.
    Authenticate {
        /// Caller identity.
        subject: String,
    },
    /// Unary append. Several may be pipelined on one connection.
    Append(AppendRequest),
    /// Unary read.
    Read(ReadRequest),
    /// Server-streamed reads starting at an offset.
    ReadStream(ReadRequest),
}

impl Request {
    /// Short name for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Authenticate { .. } => "authenticate",
            Self::Append(_) => "append",
            Self::Read(_) => "read",
            Self::ReadStream(_) => "read_stream",
        }
    }
}

/// A server-to-client message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    /// The subject was accepted.
    Authenticated,
    /// Result of an append.
    Append(AppendResponse),
    /// Result of a read, or one item of a read stream.
    Read(ReadResponse),
    /// The request failed.
    Error(Status),
}

impl Response {
    /// Short name for logging and error messages.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Authenticated => "authenticated",
            Self::Append(_) => "append",
            Self::Read(_) => "read",
            Self::Error(_) => "error",
        }
    }
}

impl From<Status> for Response {
    fn from(status: Status) -> Self {
        Self::Error(status)
    }
}
