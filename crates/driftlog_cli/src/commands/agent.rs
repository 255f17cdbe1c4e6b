//! Agent command implementation.

use driftlog_cluster::{Agent, AgentConfig};
use driftlog_core::Config;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;

/// Flags of the agent command.
pub struct AgentOptions {
    /// Unique node name.
    pub name: String,
    /// Log directory.
    pub data_dir: PathBuf,
    /// Gossip listen address.
    pub bind: SocketAddr,
    /// Log server port.
    pub rpc_port: u16,
    /// Seed gossip addresses.
    pub join: Vec<SocketAddr>,
    /// Subject used when replicating from peers.
    pub peer_subject: Option<String>,
    /// Segment limits.
    pub log: Config,
}

impl AgentOptions {
    fn into_config(self) -> AgentConfig {
        let mut config = AgentConfig::new(self.name, self.data_dir, self.bind, self.rpc_port)
            .with_start_join_addrs(self.join)
            .with_log_config(self.log);
        if let Some(subject) = self.peer_subject {
            config = config.with_peer_subject(subject);
        }
        config
    }
}

/// Runs a node until Ctrl-C, then shuts it down.
pub fn run(options: AgentOptions) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let agent = Agent::start(options.into_config()).await?;

        println!("✓ Agent {} running", agent.config().node_name);
        println!("  RPC:    {}", agent.rpc_addr());
        println!("  Gossip: {}", agent.gossip_addr());

        tokio::signal::ctrl_c().await?;
        info!("interrupt received");

        agent.shutdown().await?;
        println!("✓ Agent stopped");
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}
