//! A complete driftlog node.

use crate::config::{AgentConfig, MembershipConfig};
use crate::dialer::RpcDialer;
use crate::error::{ClusterError, ClusterResult};
use crate::member::Member;
use crate::membership::Membership;
use crate::replicator::Replicator;
use driftlog_core::{CommitLog, Log};
use driftlog_rpc::{AllowAll, Authorizer, LogServer, ServerConfig, ServerHandle};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::Instrument;

/// Runs the log, its server, replication and membership of one node.
///
/// # Startup
///
/// log -> log server -> replicator -> membership. Membership advertises the
/// server's actual address, so other nodes can start replicating as soon as
/// they hear about this one.
///
/// # Shutdown
///
/// Stop accepting connections, leave the cluster, stop replication, stop
/// the server, close the log.
pub struct Agent {
    config: AgentConfig,
    log: Arc<Log>,
    server: ServerHandle,
    replicator: Replicator,
    membership: Membership,
    shut_down: AtomicBool,
}

impl Agent {
    /// Starts a node.
    ///
    /// # Errors
    ///
    /// Returns an error if any component fails to start. Components that
    /// already started are stopped again.
    pub async fn start(config: AgentConfig) -> ClusterResult<Self> {
        let span = tracing::info_span!("agent", node = %config.node_name);
        Self::start_inner(config).instrument(span).await
    }

    async fn start_inner(config: AgentConfig) -> ClusterResult<Self> {
        let log = Arc::new(Log::open(&config.data_dir, config.log)?);

        let authorizer: Arc<dyn Authorizer> = match &config.acl {
            Some(acl) => Arc::clone(acl) as Arc<dyn Authorizer>,
            None => Arc::new(AllowAll),
        };
        let server = match LogServer::bind(
            ServerConfig::new(config.rpc_addr()),
            Arc::clone(&log) as Arc<dyn CommitLog>,
            authorizer,
        )
        .await
        {
            Ok(server) => server.spawn(),
            Err(e) => {
                close_log(&log);
                return Err(e.into());
            }
        };

        let mut dialer = RpcDialer::new();
        if let Some(subject) = &config.peer_subject {
            dialer = dialer.with_subject(subject.as_str());
        }
        let replicator = Replicator::new(Arc::new(dialer), Arc::clone(&log) as Arc<dyn CommitLog>)?;

        let membership_config = MembershipConfig::new(config.node_name.clone(), config.bind_addr)
            .with_rpc_addr(server.local_addr())
            .with_start_join_addrs(config.start_join_addrs.clone())
            .with_gossip_interval(config.gossip_interval)
            .with_probe_timeout(config.probe_timeout);
        let membership =
            match Membership::start(Arc::new(replicator.clone()), membership_config).await {
                Ok(membership) => membership,
                Err(e) => {
                    replicator.close();
                    server.shutdown().await;
                    close_log(&log);
                    return Err(e);
                }
            };

        tracing::info!(
            rpc_addr = %server.local_addr(),
            gossip_addr = %membership.local_addr(),
            "agent started"
        );

        Ok(Self {
            config,
            log,
            server,
            replicator,
            membership,
            shut_down: AtomicBool::new(false),
        })
    }

    /// Stops the node. Calling it again is a no-op.
    ///
    /// Every step runs even if an earlier one fails; the first error is
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns the first error from leaving the cluster or closing the log.
    pub async fn shutdown(&self) -> ClusterResult<()> {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        tracing::info!(node = %self.config.node_name, "agent shutting down");

        self.server.stop_accepting();
        let left = self.membership.leave().await;
        self.replicator.close();
        self.server.shutdown().await;

        let log = Arc::clone(&self.log);
        let closed = tokio::task::spawn_blocking(move || log.close())
            .await
            .map_err(ClusterError::from)
            .and_then(|r| r.map_err(ClusterError::from));

        left.and(closed)
    }

    /// The node's log.
    #[must_use]
    pub fn log(&self) -> &Arc<Log> {
        &self.log
    }

    /// Address of the log server.
    #[must_use]
    pub fn rpc_addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    /// Address of the gossip listener.
    #[must_use]
    pub fn gossip_addr(&self) -> SocketAddr {
        self.membership.local_addr()
    }

    /// Current cluster view.
    #[must_use]
    pub fn members(&self) -> Vec<Member> {
        self.membership.members()
    }

    /// Peers currently replicated from.
    #[must_use]
    pub fn replicating_from(&self) -> Vec<String> {
        self.replicator.peers()
    }

    /// Configuration the agent was started with.
    #[must_use]
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("node_name", &self.config.node_name)
            .field("rpc_addr", &self.rpc_addr())
            .field("gossip_addr", &self.gossip_addr())
            .finish_non_exhaustive()
    }
}

fn close_log(log: &Log) {
    if let Err(e) = log.close() {
        tracing::error!(error = %e, "failed to close log");
    }
}
