//! TCP log server.

use crate::auth::Authorizer;
use crate::config::ServerConfig;
use crate::error::RpcResult;
use crate::handler::{HandlerContext, Session};
use driftlog_core::CommitLog;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Serves a [`CommitLog`] over framed TCP.
///
/// # Example
///
/// ```no_run
/// use driftlog_core::{Config, Log};
/// use driftlog_rpc::{AllowAll, LogServer, ServerConfig};
/// use std::sync::Arc;
///
/// # async fn run() -> driftlog_rpc::RpcResult<()> {
/// let log = Arc::new(Log::open("data", Config::default()).unwrap());
/// let server = LogServer::bind(ServerConfig::default(), log, Arc::new(AllowAll)).await?;
/// let handle = server.spawn();
/// // ...
/// handle.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct LogServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    context: Arc<HandlerContext>,
}

impl LogServer {
    /// Binds the listening socket.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn bind(
        config: ServerConfig,
        log: Arc<dyn CommitLog>,
        authorizer: Arc<dyn Authorizer>,
    ) -> RpcResult<Self> {
        let listener = TcpListener::bind(config.bind_addr).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(addr = %local_addr, "log server listening");

        Ok(Self {
            listener,
            local_addr,
            context: Arc::new(HandlerContext {
                log,
                authorizer,
                poll_interval: config.read_stream_poll_interval,
            }),
        })
    }

    /// Address the server is bound to.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Starts accepting connections on the current tokio runtime.
    #[must_use]
    pub fn spawn(self) -> ServerHandle {
        let shutdown = CancellationToken::new();
        let accepting = shutdown.child_token();
        let span = tracing::info_span!("log_server", addr = %self.local_addr);
        let local_addr = self.local_addr;

        let task = tokio::spawn(
            accept_loop(
                self.listener,
                self.context,
                accepting.clone(),
                shutdown.clone(),
            )
            .instrument(span),
        );

        ServerHandle {
            local_addr,
            accepting,
            shutdown,
            task: Mutex::new(Some(task)),
        }
    }
}

/// Controls a running [`LogServer`].
///
/// Dropping the handle stops the server without waiting for it.
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    accepting: CancellationToken,
    shutdown: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ServerHandle {
    /// Address the server is bound to.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting new connections. Open connections keep being served.
    pub fn stop_accepting(&self) {
        self.accepting.cancel();
    }

    /// Stops the server: ends read streams and idle connections, lets
    /// in-flight requests answer, and waits for every connection task.
    ///
    /// Calling it again is a no-op.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "log server task failed");
            }
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn accept_loop(
    listener: TcpListener,
    context: Arc<HandlerContext>,
    accepting: CancellationToken,
    shutdown: CancellationToken,
) {
    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            () = accepting.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let span = tracing::debug_span!("connection", %peer);
                    connections.spawn(
                        serve(stream, peer, Arc::clone(&context), shutdown.clone()).instrument(span),
                    );
                }
                Err(e) => tracing::warn!(error = %e, "failed to accept connection"),
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }
    drop(listener);
    tracing::info!("stopped accepting connections");

    while let Some(result) = connections.join_next().await {
        if let Err(e) = result {
            tracing::error!(error = %e, "connection task failed");
        }
    }
    tracing::info!("log server stopped");
}

async fn serve(
    stream: TcpStream,
    peer: SocketAddr,
    context: Arc<HandlerContext>,
    shutdown: CancellationToken,
) {
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!(error = %e, "failed to set TCP_NODELAY");
    }
    let (reader, writer) = stream.into_split();
    match Session::new(context, reader, writer, shutdown).run().await {
        Ok(()) => tracing::debug!(%peer, "connection closed"),
        Err(e) if e.is_disconnect() => tracing::debug!(%peer, error = %e, "client went away"),
        Err(e) => tracing::warn!(%peer, error = %e, "connection closed with error"),
    }
}
