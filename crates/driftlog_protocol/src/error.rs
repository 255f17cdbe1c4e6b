//! Error types for the wire protocol.

use std::io;
use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while framing or (de)serializing messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Transport I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A message could not be serialized.
    #[error("encode error: {0}")]
    Encode(String),

    /// A frame body could not be deserialized.
    #[error("decode error: {0}")]
    Decode(String),

    /// A frame exceeds the size limit.
    #[error("frame of {size} bytes exceeds limit of {max}")]
    FrameTooLarge {
        /// Announced or encoded body size.
        size: usize,
        /// Maximum allowed body size.
        max: usize,
    },
}

impl ProtocolError {
    /// Creates an encode error.
    pub fn encode(message: impl ToString) -> Self {
        Self::Encode(message.to_string())
    }

    /// Creates a decode error.
    pub fn decode(message: impl ToString) -> Self {
        Self::Decode(message.to_string())
    }

    /// Returns true if the peer went away mid-conversation.
    #[must_use]
    pub fn is_disconnect(&self) -> bool {
        match self {
            Self::Io(e) => matches!(
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
