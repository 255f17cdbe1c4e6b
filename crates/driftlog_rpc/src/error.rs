//! Error types for the RPC layer.

use driftlog_protocol::{Code, ProtocolError, Status};
use std::io;
use thiserror::Error;

/// Result type for RPC operations.
pub type RpcResult<T> = Result<T, RpcError>;

/// Errors that can occur talking to or serving a log.
#[derive(Error, Debug)]
pub enum RpcError {
    /// Framing or codec failure.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Socket error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The server answered with an error status.
    #[error("remote error: {0}")]
    Remote(#[from] Status),

    /// The server answered with the wrong message type.
    #[error("unexpected response: expected {expected}, got {got}")]
    UnexpectedResponse {
        /// Expected response kind.
        expected: &'static str,
        /// Received response kind.
        got: &'static str,
    },

    /// The connection closed before a response arrived.
    #[error("connection closed")]
    ConnectionClosed,
}

impl RpcError {
    /// Returns the remote status, if the server sent one.
    #[must_use]
    pub fn status(&self) -> Option<&Status> {
        match self {
            RpcError::Remote(status) => Some(status),
            _ => None,
        }
    }

    /// Returns true if the server reported an out-of-range offset.
    #[must_use]
    pub fn is_out_of_range(&self) -> bool {
        self.status().is_some_and(Status::is_out_of_range)
    }

    /// Returns true if the server rejected the caller.
    #[must_use]
    pub fn is_permission_denied(&self) -> bool {
        self.status()
            .is_some_and(|s| s.code == Code::PermissionDenied)
    }

    /// Returns true if the peer went away.
    #[must_use]
    pub fn is_disconnect(&self) -> bool {
        match self {
            RpcError::ConnectionClosed => true,
            RpcError::Protocol(e) => e.is_disconnect(),
            RpcError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        let err = RpcError::from(Status::out_of_range(3));
        assert!(err.is_out_of_range());
        assert!(!err.is_permission_denied());

        let err = RpcError::from(Status::permission_denied("", "*", "read"));
        assert!(err.is_permission_denied());

        assert!(RpcError::ConnectionClosed.is_disconnect());
        assert!(RpcError::from(io::Error::from(io::ErrorKind::BrokenPipe)).is_disconnect());
        assert!(!RpcError::from(io::Error::from(io::ErrorKind::NotFound)).is_disconnect());
    }

    #[test]
    fn error_display() {
        let err = RpcError::UnexpectedResponse {
            expected: "append",
            got: "read",
        };
        assert_eq!(err.to_string(), "unexpected response: expected append, got read");
    }
}
