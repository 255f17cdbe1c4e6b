//! Server configuration.

use std::net::SocketAddr;
use std::time::Duration;

/// Configuration for the log server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to. Port 0 picks a free port.
    pub bind_addr: SocketAddr,
    /// How long a read stream waits before retrying an offset that is not
    /// written yet.
    pub read_stream_poll_interval: Duration,
}

impl ServerConfig {
    /// Creates a new server configuration.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            read_stream_poll_interval: Duration::from_millis(50),
        }
    }

    /// Sets the read stream poll interval.
    #[must_use]
    pub fn with_read_stream_poll_interval(mut self, interval: Duration) -> Self {
        self.read_stream_poll_interval = interval;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], 8400)))
    }
}
