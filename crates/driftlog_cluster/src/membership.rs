//! Gossip-based cluster membership.
//!
//! Nodes run push-pull anti-entropy over TCP: every gossip round a node
//! sends its whole member table to a few random alive peers and merges the
//! table each peer sends back. Joining is one such exchange with each seed.
//!
//! ## Merge Rules
//!
//! - Higher incarnation wins.
//! - At equal incarnation the status precedence is left > failed > alive.
//! - A node that hears it is failed bumps its own incarnation to refute.
//!
//! A peer that fails `suspicion_threshold` exchanges in a row is marked
//! failed locally and the verdict spreads with the next rounds.

use crate::config::MembershipConfig;
use crate::error::{ClusterError, ClusterResult};
use crate::member::{Member, MemberEvent, MemberStatus, MemberTable};
use driftlog_protocol::{read_frame, write_frame};
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Receives membership changes of remote nodes.
///
/// Calls are made one at a time from a single task, so the calls for one
/// node are strictly ordered. Slow handlers delay later events.
pub trait Handler: Send + Sync {
    /// A node joined, or came back; `rpc_addr` is its log server address.
    ///
    /// # Errors
    ///
    /// Errors are logged by the caller.
    fn join(&self, name: &str, rpc_addr: &str) -> ClusterResult<()>;

    /// A node left or failed.
    ///
    /// # Errors
    ///
    /// Errors are logged by the caller.
    fn leave(&self, name: &str) -> ClusterResult<()>;
}

#[derive(Debug, Serialize, Deserialize)]
enum GossipMessage {
    /// Full member table of the sender.
    Sync { members: Vec<Member> },
}

/// A running membership participant.
///
/// Dropping it stops the background tasks without announcing a leave.
pub struct Membership {
    inner: Arc<Inner>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

struct Inner {
    config: MembershipConfig,
    local_addr: SocketAddr,
    table: Mutex<MemberTable>,
    events: mpsc::UnboundedSender<MemberEvent>,
    shutdown: CancellationToken,
}

impl Membership {
    /// Starts listening for gossip and joins through the seed addresses.
    ///
    /// # Errors
    ///
    /// Returns an error if the node name is empty, the address cannot be
    /// bound, or seeds were given and none of them answered.
    pub async fn start(handler: Arc<dyn Handler>, config: MembershipConfig) -> ClusterResult<Self> {
        if config.node_name.is_empty() {
            return Err(ClusterError::InvalidConfig("node name is empty".into()));
        }

        let listener = TcpListener::bind(config.bind_addr).await?;
        let local_addr = listener.local_addr()?;
        let local = Member {
            name: config.node_name.clone(),
            addr: local_addr,
            tags: config.tags.clone(),
            status: MemberStatus::Alive,
            incarnation: 0,
        };

        let span = tracing::info_span!("membership", node = %config.node_name);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            config,
            local_addr,
            table: Mutex::new(MemberTable::new(local)),
            events: events_tx,
            shutdown: CancellationToken::new(),
        });

        let tasks = vec![
            tokio::spawn(listen(Arc::clone(&inner), listener).instrument(span.clone())),
            tokio::spawn(
                dispatch_events(handler, events_rx, inner.shutdown.clone()).instrument(span.clone()),
            ),
        ];
        let membership = Self {
            inner: Arc::clone(&inner),
            tasks: Mutex::new(tasks),
        };

        if let Err(e) = join_seeds(&inner).instrument(span.clone()).await {
            membership.stop().await;
            return Err(e);
        }

        membership
            .tasks
            .lock()
            .push(tokio::spawn(gossip_loop(inner).instrument(span)));
        Ok(membership)
    }

    /// Every known member, this node included, sorted by name.
    #[must_use]
    pub fn members(&self) -> Vec<Member> {
        self.inner.table.lock().snapshot()
    }

    /// Gossip address this node listens on.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr
    }

    /// Name of this node.
    #[must_use]
    pub fn node_name(&self) -> &str {
        &self.inner.config.node_name
    }

    /// Leaves the cluster: marks this node left, tells every alive peer and
    /// stops gossiping. The local handler is never called for this node.
    ///
    /// Leaving twice is a no-op.
    ///
    /// # Errors
    ///
    /// Currently infallible; unreachable peers learn of the leave through
    /// gossip from the others.
    pub async fn leave(&self) -> ClusterResult<()> {
        let (members, peers) = {
            let mut table = self.inner.table.lock();
            if table.leave_local().is_none() {
                return Ok(());
            }
            (table.snapshot(), table.remote_with_status(MemberStatus::Alive))
        };

        tracing::info!(node = %self.inner.config.node_name, peers = peers.len(), "leaving cluster");
        let timeout = self.inner.config.probe_timeout;
        let mut announcements = JoinSet::new();
        for peer in peers {
            let members = members.clone();
            announcements.spawn(async move { (peer.name, exchange(peer.addr, members, timeout).await) });
        }
        while let Some(result) = announcements.join_next().await {
            if let Ok((peer, Err(e))) = result {
                tracing::debug!(peer = %peer, error = %e, "failed to announce leave");
            }
        }

        self.stop().await;
        Ok(())
    }

    async fn stop(&self) {
        self.inner.shutdown.cancel();
        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "membership task failed");
            }
        }
    }
}

impl Drop for Membership {
    fn drop(&mut self) {
        self.inner.shutdown.cancel();
    }
}

impl std::fmt::Debug for Membership {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Membership")
            .field("node_name", &self.inner.config.node_name)
            .field("local_addr", &self.inner.local_addr)
            .finish_non_exhaustive()
    }
}

impl Inner {
    fn merge(&self, remote: Vec<Member>) {
        let events = self.table.lock().merge(remote);
        self.emit(events);
    }

    fn emit(&self, events: impl IntoIterator<Item = MemberEvent>) {
        for event in events {
            // Closed only after shutdown, when events no longer matter.
            let _ = self.events.send(event);
        }
    }

    /// Picks up to `fanout` alive peers plus one failed peer, so a
    /// recovered node is noticed.
    fn pick_targets(&self) -> Vec<Member> {
        let table = self.table.lock();
        let mut rng = rand::thread_rng();
        let mut targets: Vec<Member> = table
            .remote_with_status(MemberStatus::Alive)
            .choose_multiple(&mut rng, self.config.fanout)
            .cloned()
            .collect();
        if let Some(failed) = table
            .remote_with_status(MemberStatus::Failed)
            .choose(&mut rng)
        {
            targets.push(failed.clone());
        }
        targets
    }
}

async fn join_seeds(inner: &Inner) -> ClusterResult<()> {
    let seeds = &inner.config.start_join_addrs;
    if seeds.is_empty() {
        return Ok(());
    }

    let mut joined = 0;
    for &seed in seeds {
        let members = inner.table.lock().snapshot();
        match exchange(seed, members, inner.config.probe_timeout).await {
            Ok(remote) => {
                inner.merge(remote);
                joined += 1;
            }
            Err(e) => tracing::warn!(seed = %seed, error = %e, "failed to contact seed"),
        }
    }

    if joined == 0 {
        return Err(ClusterError::JoinFailed {
            attempted: seeds.len(),
        });
    }
    tracing::info!(joined, "joined cluster");
    Ok(())
}

async fn listen(inner: Arc<Inner>, listener: TcpListener) {
    loop {
        tokio::select! {
            () = inner.shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let inner = Arc::clone(&inner);
                    tokio::spawn(
                        async move {
                            if let Err(e) = serve_exchange(&inner, stream).await {
                                tracing::debug!(peer = %peer, error = %e, "gossip exchange failed");
                            }
                        }
                        .in_current_span(),
                    );
                }
                Err(e) => tracing::warn!(error = %e, "failed to accept gossip connection"),
            },
        }
    }
}

async fn serve_exchange(inner: &Inner, mut stream: TcpStream) -> ClusterResult<()> {
    let request = tokio::time::timeout(
        inner.config.probe_timeout,
        read_frame::<_, GossipMessage>(&mut stream),
    )
    .await
    .map_err(|_| ClusterError::timeout("gossip exchange"))??;

    let Some(GossipMessage::Sync { members }) = request else {
        return Ok(());
    };
    inner.merge(members);

    let reply = GossipMessage::Sync {
        members: inner.table.lock().snapshot(),
    };
    write_frame(&mut stream, &reply).await?;
    Ok(())
}

async fn gossip_loop(inner: Arc<Inner>) {
    let mut ticker = tokio::time::interval(inner.config.gossip_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            () = inner.shutdown.cancelled() => break,
            _ = ticker.tick() => gossip_round(&inner).await,
        }
    }
}

async fn gossip_round(inner: &Arc<Inner>) {
    let targets = inner.pick_targets();
    if targets.is_empty() {
        return;
    }

    let members = inner.table.lock().snapshot();
    let timeout = inner.config.probe_timeout;
    let mut exchanges = JoinSet::new();
    for target in targets {
        let members = members.clone();
        exchanges.spawn(async move { (target.name, exchange(target.addr, members, timeout).await) });
    }

    while let Some(result) = exchanges.join_next().await {
        let Ok((peer, outcome)) = result else {
            continue;
        };
        match outcome {
            Ok(remote) => {
                inner.table.lock().exchange_succeeded(&peer);
                inner.merge(remote);
            }
            Err(e) => {
                tracing::debug!(peer = %peer, error = %e, "gossip exchange failed");
                let event = inner
                    .table
                    .lock()
                    .exchange_failed(&peer, inner.config.suspicion_threshold);
                if let Some(event) = event {
                    tracing::warn!(peer = %peer, "member marked failed");
                    inner.emit(Some(event));
                }
            }
        }
    }
}

/// One push-pull round trip with the node at `addr`.
async fn exchange(
    addr: SocketAddr,
    members: Vec<Member>,
    timeout: Duration,
) -> ClusterResult<Vec<Member>> {
    let round_trip = async {
        let mut stream = TcpStream::connect(addr).await?;
        write_frame(&mut stream, &GossipMessage::Sync { members }).await?;
        match read_frame(&mut stream).await? {
            Some(GossipMessage::Sync { members }) => Ok(members),
            None => Err(ClusterError::ConnectionClosed),
        }
    };
    tokio::time::timeout(timeout, round_trip)
        .await
        .map_err(|_| ClusterError::timeout("gossip exchange"))?
}

async fn dispatch_events(
    handler: Arc<dyn Handler>,
    mut events: mpsc::UnboundedReceiver<MemberEvent>,
    shutdown: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            () = shutdown.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        match event {
            MemberEvent::Join(member) => {
                tracing::info!(member = %member.name, "member joined");
                match member.rpc_addr() {
                    Some(addr) => {
                        if let Err(e) = handler.join(&member.name, addr) {
                            tracing::error!(member = %member.name, error = %e, "failed to handle join");
                        }
                    }
                    None => tracing::warn!(member = %member.name, "member has no rpc_addr tag"),
                }
            }
            MemberEvent::Leave(member) => {
                tracing::info!(member = %member.name, status = %member.status, "member left");
                if let Err(e) = handler.leave(&member.name) {
                    tracing::error!(member = %member.name, error = %e, "failed to handle leave");
                }
            }
        }
    }
}
