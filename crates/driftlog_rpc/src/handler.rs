//! Per-connection request handling.

use crate::auth::{Authorizer, APPEND_ACTION, OBJECT_WILDCARD, READ_ACTION};
use crate::error::RpcResult;
use driftlog_core::{CommitLog, CoreResult};
use driftlog_protocol::{
    read_frame, write_frame, AppendRequest, AppendResponse, Code, ReadRequest, ReadResponse,
    Request, Response, Status,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio_util::sync::CancellationToken;

/// State shared by every connection of one server.
pub(crate) struct HandlerContext {
    pub(crate) log: Arc<dyn CommitLog>,
    pub(crate) authorizer: Arc<dyn Authorizer>,
    pub(crate) poll_interval: Duration,
}

/// One client connection.
///
/// Requests are served in arrival order, so pipelined appends are answered
/// in the order they were sent. A read stream takes over the connection
/// until it ends.
pub(crate) struct Session<R, W> {
    ctx: Arc<HandlerContext>,
    reader: R,
    writer: W,
    subject: String,
    shutdown: CancellationToken,
}

impl<R, W> Session<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub(crate) fn new(
        ctx: Arc<HandlerContext>,
        reader: R,
        writer: W,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            ctx,
            reader,
            writer,
            subject: String::new(),
            shutdown,
        }
    }

    /// Serves requests until the client disconnects or the server shuts
    /// down.
    pub(crate) async fn run(mut self) -> RpcResult<()> {
        loop {
            let frame = tokio::select! {
                () = self.shutdown.cancelled() => return Ok(()),
                frame = read_frame::<_, Request>(&mut self.reader) => frame?,
            };
            let Some(request) = frame else {
                return Ok(());
            };
            tracing::trace!(kind = request.kind(), "request received");

            let response = match request {
                Request::Authenticate { subject } => {
                    tracing::debug!(subject = %subject, "subject set");
                    self.subject = subject;
                    Response::Authenticated
                }
                Request::Append(request) => self.append(request).await,
                Request::Read(request) => self.read(request).await,
                Request::ReadStream(request) => return self.read_stream(request).await,
            };
            write_frame(&mut self.writer, &response).await?;
        }
    }

    async fn append(&self, request: AppendRequest) -> Response {
        if let Err(status) = self.authorize(APPEND_ACTION) {
            return status.into();
        }
        let log = Arc::clone(&self.ctx.log);
        match blocking(move || log.append(request.record)).await {
            Ok(offset) => Response::Append(AppendResponse { offset }),
            Err(status) => status.into(),
        }
    }

    async fn read(&self, request: ReadRequest) -> Response {
        if let Err(status) = self.authorize(READ_ACTION) {
            return status.into();
        }
        let log = Arc::clone(&self.ctx.log);
        match blocking(move || log.read(request.offset)).await {
            Ok(record) => Response::Read(ReadResponse { record }),
            Err(status) => status.into(),
        }
    }

    /// Streams records from `request.offset` on.
    ///
    /// Offsets not written yet are retried every poll interval. The stream
    /// ends when the server shuts down, the client closes its side or sends
    /// anything, or a read fails with something other than out-of-range.
    async fn read_stream(self, request: ReadRequest) -> RpcResult<()> {
        if let Err(status) = self.authorize(READ_ACTION) {
            let mut writer = self.writer;
            write_frame(&mut writer, &Response::Error(status)).await?;
            return Ok(());
        }

        let Self {
            ctx,
            mut reader,
            mut writer,
            shutdown,
            ..
        } = self;

        let mut probe = [0u8; 1];
        let client_done = reader.read(&mut probe);
        tokio::pin!(client_done);

        let mut offset = request.offset;
        tracing::debug!(offset, "read stream started");
        loop {
            if shutdown.is_cancelled() {
                return Ok(());
            }

            let log = Arc::clone(&ctx.log);
            match blocking(move || log.read(offset)).await {
                Ok(record) => {
                    write_frame(&mut writer, &Response::Read(ReadResponse { record })).await?;
                    offset += 1;
                }
                Err(status) if status.is_out_of_range() => {
                    tokio::select! {
                        () = shutdown.cancelled() => return Ok(()),
                        _ = &mut client_done => {
                            tracing::debug!(offset, "read stream closed by client");
                            return Ok(());
                        }
                        () = tokio::time::sleep(ctx.poll_interval) => {}
                    }
                }
                Err(status) => {
                    write_frame(&mut writer, &Response::Error(status)).await?;
                    return Ok(());
                }
            }
        }
    }

    fn authorize(&self, action: &str) -> Result<(), Status> {
        self.ctx
            .authorizer
            .authorize(&self.subject, OBJECT_WILDCARD, action)
    }
}

/// Runs a log call on the blocking pool and maps failures to a status.
async fn blocking<T, F>(f: F) -> Result<T, Status>
where
    T: Send + 'static,
    F: FnOnce() -> CoreResult<T> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            let status = Status::from(&e);
            if status.code == Code::Internal {
                tracing::warn!(error = %e, "log operation failed");
            }
            Err(status)
        }
        Err(e) => {
            tracing::error!(error = %e, "log task panicked");
            Err(Status::internal(format!("log task failed: {e}")))
        }
    }
}
