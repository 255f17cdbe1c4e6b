//! Connections the replicator pulls records through.

use crate::error::ClusterResult;
use async_trait::async_trait;
use driftlog_core::Record;
use driftlog_rpc::{LogClient, RecordStream};

/// An ordered source of records from one peer.
#[async_trait]
pub trait RecordSource: Send {
    /// Waits for the next record. `Ok(None)` means the peer ended the
    /// stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream breaks.
    async fn next_record(&mut self) -> ClusterResult<Option<Record>>;
}

/// Opens record streams to peers.
#[async_trait]
pub trait PeerDialer: Send + Sync {
    /// Subscribes to the log at `addr` starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if the peer cannot be reached or refuses the
    /// stream.
    async fn subscribe(&self, addr: &str, offset: u64) -> ClusterResult<Box<dyn RecordSource>>;
}

/// Dials peers' log servers over the network.
#[derive(Debug, Clone, Default)]
pub struct RpcDialer {
    subject: Option<String>,
}

impl RpcDialer {
    /// Creates a dialer that connects as the anonymous subject.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Authenticates as `subject` on every connection.
    #[must_use]
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }
}

#[async_trait]
impl PeerDialer for RpcDialer {
    async fn subscribe(&self, addr: &str, offset: u64) -> ClusterResult<Box<dyn RecordSource>> {
        let mut client = LogClient::connect(addr).await?;
        if let Some(subject) = &self.subject {
            client.authenticate(subject.as_str()).await?;
        }
        let stream = client.read_stream(offset).await?;
        Ok(Box::new(stream))
    }
}

#[async_trait]
impl RecordSource for RecordStream {
    async fn next_record(&mut self) -> ClusterResult<Option<Record>> {
        Ok(self.next().await?)
    }
}
