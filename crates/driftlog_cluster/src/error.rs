//! Error types for membership, replication and the agent.

use driftlog_core::CoreError;
use driftlog_protocol::ProtocolError;
use driftlog_rpc::RpcError;
use std::io;
use thiserror::Error;

/// Result type for cluster operations.
pub type ClusterResult<T> = Result<T, ClusterError>;

/// Errors that can occur while running a node.
#[derive(Error, Debug)]
pub enum ClusterError {
    /// Local log error.
    #[error("log error: {0}")]
    Log(#[from] CoreError),

    /// Error talking to a log server.
    #[error("rpc error: {0}")]
    Rpc(#[from] RpcError),

    /// Gossip framing error.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Socket error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A network exchange did not finish in time.
    #[error("{operation} timed out")]
    Timeout {
        /// What timed out.
        operation: &'static str,
    },

    /// None of the seed addresses answered.
    #[error("failed to join cluster: none of {attempted} seed(s) reachable")]
    JoinFailed {
        /// Number of seeds tried.
        attempted: usize,
    },

    /// A peer closed the connection before answering.
    #[error("peer closed the connection")]
    ConnectionClosed,

    /// The configuration cannot be used.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A component needs a tokio runtime but was created outside one.
    #[error("no tokio runtime available")]
    NoRuntime,

    /// A background task failed.
    #[error("task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ClusterError {
    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(operation: &'static str) -> Self {
        Self::Timeout { operation }
    }

    /// Returns true if the error came from the network rather than local
    /// state.
    #[must_use]
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            ClusterError::Rpc(_)
                | ClusterError::Protocol(_)
                | ClusterError::Io(_)
                | ClusterError::Timeout { .. }
                | ClusterError::ConnectionClosed
                | ClusterError::JoinFailed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        assert!(ClusterError::timeout("gossip exchange").is_network());
        assert!(ClusterError::ConnectionClosed.is_network());
        assert!(!ClusterError::from(CoreError::LogClosed).is_network());
        assert!(!ClusterError::NoRuntime.is_network());
    }

    #[test]
    fn error_display() {
        assert_eq!(
            ClusterError::timeout("gossip exchange").to_string(),
            "gossip exchange timed out"
        );
        assert_eq!(
            ClusterError::JoinFailed { attempted: 2 }.to_string(),
            "failed to join cluster: none of 2 seed(s) reachable"
        );
    }
}
