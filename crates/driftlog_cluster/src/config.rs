//! Configuration for membership and the agent.

use crate::member::RPC_ADDR_TAG;
use driftlog_core::Config as LogConfig;
use driftlog_rpc::AclAuthorizer;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for gossip membership.
#[derive(Debug, Clone)]
pub struct MembershipConfig {
    /// Unique name of this node in the cluster.
    pub node_name: String,
    /// Gossip listen address. Port 0 picks a free port.
    pub bind_addr: SocketAddr,
    /// Tags advertised to other members. Must include `rpc_addr` for
    /// replication to find this node.
    pub tags: BTreeMap<String, String>,
    /// Gossip addresses of existing members to join through.
    pub start_join_addrs: Vec<SocketAddr>,
    /// Time between gossip rounds.
    pub gossip_interval: Duration,
    /// Deadline for one gossip exchange.
    pub probe_timeout: Duration,
    /// Consecutive failed exchanges before a member is marked failed.
    pub suspicion_threshold: u32,
    /// Peers contacted per gossip round.
    pub fanout: usize,
}

impl MembershipConfig {
    /// Creates a new membership configuration.
    pub fn new(node_name: impl Into<String>, bind_addr: SocketAddr) -> Self {
        Self {
            node_name: node_name.into(),
            bind_addr,
            tags: BTreeMap::new(),
            start_join_addrs: Vec::new(),
            gossip_interval: Duration::from_millis(200),
            probe_timeout: Duration::from_millis(500),
            suspicion_threshold: 3,
            fanout: 3,
        }
    }

    /// Adds a tag.
    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Sets the log server address advertised under `rpc_addr`.
    #[must_use]
    pub fn with_rpc_addr(self, addr: SocketAddr) -> Self {
        self.with_tag(RPC_ADDR_TAG, addr.to_string())
    }

    /// Sets the seed addresses.
    #[must_use]
    pub fn with_start_join_addrs(mut self, addrs: Vec<SocketAddr>) -> Self {
        self.start_join_addrs = addrs;
        self
    }

    /// Sets the gossip interval.
    #[must_use]
    pub fn with_gossip_interval(mut self, interval: Duration) -> Self {
        self.gossip_interval = interval;
        self
    }

    /// Sets the exchange deadline.
    #[must_use]
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Sets the failure threshold.
    #[must_use]
    pub fn with_suspicion_threshold(mut self, threshold: u32) -> Self {
        self.suspicion_threshold = threshold;
        self
    }

    /// Sets the fanout.
    #[must_use]
    pub fn with_fanout(mut self, fanout: usize) -> Self {
        self.fanout = fanout;
        self
    }
}

/// Configuration for a node agent.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Directory holding the log segments.
    pub data_dir: PathBuf,
    /// Gossip listen address.
    pub bind_addr: SocketAddr,
    /// Log server port on the host of `bind_addr`. 0 picks a free port.
    pub rpc_port: u16,
    /// Unique node name.
    pub node_name: String,
    /// Gossip addresses of existing members.
    pub start_join_addrs: Vec<SocketAddr>,
    /// Log segment limits.
    pub log: LogConfig,
    /// Access control for the log server. `None` allows everything.
    pub acl: Option<Arc<AclAuthorizer>>,
    /// Subject this node authenticates as when pulling from peers.
    pub peer_subject: Option<String>,
    /// Time between gossip rounds.
    pub gossip_interval: Duration,
    /// Deadline for one gossip exchange.
    pub probe_timeout: Duration,
}

impl AgentConfig {
    /// Creates a new agent configuration.
    pub fn new(
        node_name: impl Into<String>,
        data_dir: impl Into<PathBuf>,
        bind_addr: SocketAddr,
        rpc_port: u16,
    ) -> Self {
        Self {
            data_dir: data_dir.into(),
            bind_addr,
            rpc_port,
            node_name: node_name.into(),
            start_join_addrs: Vec::new(),
            log: LogConfig::default(),
            acl: None,
            peer_subject: None,
            gossip_interval: Duration::from_millis(200),
            probe_timeout: Duration::from_millis(500),
        }
    }

    /// Sets the seed addresses.
    #[must_use]
    pub fn with_start_join_addrs(mut self, addrs: Vec<SocketAddr>) -> Self {
        self.start_join_addrs = addrs;
        self
    }

    /// Sets the log configuration.
    #[must_use]
    pub fn with_log_config(mut self, log: LogConfig) -> Self {
        self.log = log;
        self
    }

    /// Enables access control.
    #[must_use]
    pub fn with_acl(mut self, acl: Arc<AclAuthorizer>) -> Self {
        self.acl = Some(acl);
        self
    }

    /// Sets the subject used when replicating from peers.
    #[must_use]
    pub fn with_peer_subject(mut self, subject: impl Into<String>) -> Self {
        self.peer_subject = Some(subject.into());
        self
    }

    /// Sets the gossip interval.
    #[must_use]
    pub fn with_gossip_interval(mut self, interval: Duration) -> Self {
        self.gossip_interval = interval;
        self
    }

    /// Sets the gossip exchange deadline.
    #[must_use]
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Log server address: the host of `bind_addr` with `rpc_port`.
    #[must_use]
    pub fn rpc_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr.ip(), self.rpc_port)
    }
}
