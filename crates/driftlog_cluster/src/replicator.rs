//! Pull-based replication from every known peer.
//!
//! For each peer the replicator runs one task that subscribes to the
//! peer's log from offset 0 and appends every received record to the
//! local sink. Records travel from the receiving side to the appending side
//! through a bounded queue, so a slow local log applies backpressure to the
//! peer stream.
//!
//! ```text
//! close token
//!   └── peer token (one per peer, cancelled by leave)
//!         └── receiver token (cancelled when the peer task ends)
//! ```
//!
//! There is no offset tracking: a peer that leaves and joins again is read
//! from offset 0 again, so its records are appended again.

use crate::dialer::PeerDialer;
use crate::error::{ClusterError, ClusterResult};
use crate::membership::Handler;
use driftlog_core::CommitLog;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span};

/// Records buffered between a peer stream and the local log.
const QUEUE_DEPTH: usize = 64;

/// Copies peers' logs into the local log.
///
/// Cloning yields another handle to the same replicator.
#[derive(Clone)]
pub struct Replicator {
    inner: Arc<Inner>,
}

struct Inner {
    dialer: Arc<dyn PeerDialer>,
    sink: Arc<dyn CommitLog>,
    runtime: Handle,
    close: CancellationToken,
    state: Mutex<State>,
    span: Span,
}

#[derive(Default)]
struct State {
    peers: HashMap<String, PeerTask>,
    next_generation: u64,
    closed: bool,
}

struct PeerTask {
    token: CancellationToken,
    generation: u64,
}

impl Replicator {
    /// Creates a replicator that spawns its tasks on the current runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::NoRuntime`] outside a tokio runtime.
    pub fn new(dialer: Arc<dyn PeerDialer>, sink: Arc<dyn CommitLog>) -> ClusterResult<Self> {
        let runtime = Handle::try_current().map_err(|_| ClusterError::NoRuntime)?;
        Ok(Self::with_runtime(dialer, sink, runtime))
    }

    /// Creates a replicator that spawns its tasks on `runtime`.
    pub fn with_runtime(
        dialer: Arc<dyn PeerDialer>,
        sink: Arc<dyn CommitLog>,
        runtime: Handle,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                dialer,
                sink,
                runtime,
                close: CancellationToken::new(),
                state: Mutex::new(State::default()),
                span: tracing::info_span!("replicator"),
            }),
        }
    }

    /// Starts replicating from `name` at `addr`.
    ///
    /// Does nothing if the replicator is closed or already replicating from
    /// `name`.
    ///
    /// # Errors
    ///
    /// Currently infallible; dial and stream errors end the peer task and
    /// are logged.
    pub fn join(&self, name: &str, addr: &str) -> ClusterResult<()> {
        let mut state = self.inner.state.lock();
        if state.closed || state.peers.contains_key(name) {
            return Ok(());
        }

        let token = self.inner.close.child_token();
        let generation = state.next_generation;
        state.next_generation += 1;
        state.peers.insert(
            name.to_string(),
            PeerTask {
                token: token.clone(),
                generation,
            },
        );

        let span = tracing::info_span!(parent: &self.inner.span, "peer", peer = %name, addr = %addr);
        self.inner.runtime.spawn(
            replicate(
                Arc::clone(&self.inner),
                name.to_string(),
                addr.to_string(),
                token,
                generation,
            )
            .instrument(span),
        );
        Ok(())
    }

    /// Stops replicating from `name`. Unknown names are ignored.
    ///
    /// # Errors
    ///
    /// Currently infallible.
    pub fn leave(&self, name: &str) -> ClusterResult<()> {
        if let Some(task) = self.inner.state.lock().peers.remove(name) {
            task.token.cancel();
        }
        Ok(())
    }

    /// Stops every peer task and refuses new joins. Closing twice is a
    /// no-op.
    pub fn close(&self) {
        let mut state = self.inner.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        state.peers.clear();
        self.inner.close.cancel();
        tracing::info!(parent: &self.inner.span, "replicator closed");
    }

    /// Returns true once [`Replicator::close`] has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Names of peers with a running task, sorted.
    #[must_use]
    pub fn peers(&self) -> Vec<String> {
        let mut peers: Vec<String> = self.inner.state.lock().peers.keys().cloned().collect();
        peers.sort();
        peers
    }
}

impl Handler for Replicator {
    fn join(&self, name: &str, rpc_addr: &str) -> ClusterResult<()> {
        Replicator::join(self, name, rpc_addr)
    }

    fn leave(&self, name: &str) -> ClusterResult<()> {
        Replicator::leave(self, name)
    }
}

impl std::fmt::Debug for Replicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Replicator")
            .field("peers", &self.peers())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Inner {
    /// Drops the registry entry of a finished task unless a newer task for
    /// the same peer replaced it.
    fn forget(&self, name: &str, generation: u64) {
        let mut state = self.state.lock();
        if state
            .peers
            .get(name)
            .is_some_and(|task| task.generation == generation)
        {
            state.peers.remove(name);
        }
    }
}

async fn replicate(
    inner: Arc<Inner>,
    name: String,
    addr: String,
    token: CancellationToken,
    generation: u64,
) {
    tracing::info!("replication started");
    let outcome = tokio::select! {
        () = token.cancelled() => Ok(()),
        result = pull(&inner, &addr, &token) => result,
    };
    match outcome {
        Ok(()) => tracing::info!("replication stopped"),
        Err(e) => tracing::error!(error = %e, "replication failed"),
    }
    inner.forget(&name, generation);
}

async fn pull(inner: &Inner, addr: &str, token: &CancellationToken) -> ClusterResult<()> {
    let mut source = inner.dialer.subscribe(addr, 0).await?;

    let (tx, mut rx) = mpsc::channel(QUEUE_DEPTH);
    let receiver_token = token.child_token();
    let _stop_receiver = receiver_token.clone().drop_guard();
    tokio::spawn(
        async move {
            loop {
                let next = tokio::select! {
                    () = receiver_token.cancelled() => break,
                    next = source.next_record() => next,
                };
                match next {
                    Ok(Some(record)) => {
                        if tx.send(record).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        tracing::info!("peer ended the stream");
                        break;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "failed to receive record");
                        break;
                    }
                }
            }
        }
        .in_current_span(),
    );

    while let Some(record) = rx.recv().await {
        let sink = Arc::clone(&inner.sink);
        let offset = tokio::task::spawn_blocking(move || sink.append(record)).await??;
        tracing::trace!(offset, "replicated record");
    }
    Ok(())
}
