//! Log client.

use crate::error::{RpcError, RpcResult};
use driftlog_core::Record;
use driftlog_protocol::{
    read_frame, write_frame, AppendRequest, AppendResponse, ReadRequest, ReadResponse, Request,
    Response,
};
use std::net::SocketAddr;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};

/// A connection to a log server.
///
/// Calls are sequential on one connection. Use [`LogClient::append_stream`]
/// to pipeline appends and [`LogClient::read_stream`] to follow the log.
#[derive(Debug)]
pub struct LogClient {
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
    peer: SocketAddr,
}

impl LogClient {
    /// Connects to a server.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails.
    pub async fn connect(addr: impl ToSocketAddrs) -> RpcResult<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;
        let (reader, writer) = stream.into_split();
        tracing::debug!(%peer, "connected to log server");
        Ok(Self {
            reader,
            writer,
            peer,
        })
    }

    /// Server address.
    #[must_use]
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Sets the subject used for authorization on this connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails.
    pub async fn authenticate(&mut self, subject: impl Into<String>) -> RpcResult<()> {
        let request = Request::Authenticate {
            subject: subject.into(),
        };
        match self.call(&request).await? {
            Response::Authenticated => Ok(()),
            other => Err(unexpected("authenticated", &other)),
        }
    }

    /// Appends a record and returns its offset.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Remote`] if the server rejects the append.
    pub async fn append(&mut self, record: Record) -> RpcResult<u64> {
        let response = self
            .call(&Request::Append(AppendRequest { record }))
            .await?;
        into_offset(response)
    }

    /// Reads the record at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Remote`] with an out-of-range status if nothing is
    /// stored at `offset`.
    pub async fn read(&mut self, offset: u64) -> RpcResult<Record> {
        let response = self.call(&Request::Read(ReadRequest { offset })).await?;
        into_record(response)
    }

    /// Follows the log from `offset`, consuming the connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be sent.
    pub async fn read_stream(mut self, offset: u64) -> RpcResult<RecordStream> {
        write_frame(&mut self.writer, &Request::ReadStream(ReadRequest { offset })).await?;
        Ok(RecordStream {
            reader: self.reader,
            _writer: self.writer,
        })
    }

    /// Starts pipelining appends on this connection.
    pub fn append_stream(&mut self) -> AppendStream<'_> {
        AppendStream {
            client: self,
            in_flight: 0,
        }
    }

    async fn call(&mut self, request: &Request) -> RpcResult<Response> {
        write_frame(&mut self.writer, request).await?;
        self.receive().await
    }

    async fn receive(&mut self) -> RpcResult<Response> {
        read_frame(&mut self.reader)
            .await?
            .ok_or(RpcError::ConnectionClosed)
    }
}

/// Records streamed from a server.
#[derive(Debug)]
pub struct RecordStream {
    reader: OwnedReadHalf,
    // Dropping the write half tells the server the stream is done.
    _writer: OwnedWriteHalf,
}

impl RecordStream {
    /// Waits for the next record. Returns `Ok(None)` once the server ends
    /// the stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the server sends an error status or the
    /// connection breaks.
    pub async fn next(&mut self) -> RpcResult<Option<Record>> {
        match read_frame(&mut self.reader).await? {
            None => Ok(None),
            Some(response) => into_record(response).map(Some),
        }
    }
}

/// Pipelined appends on one connection.
///
/// Responses arrive in send order, one per record.
#[derive(Debug)]
pub struct AppendStream<'a> {
    client: &'a mut LogClient,
    in_flight: usize,
}

impl AppendStream<'_> {
    /// Sends a record without waiting for its offset.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn send(&mut self, record: Record) -> RpcResult<()> {
        write_frame(
            &mut self.client.writer,
            &Request::Append(AppendRequest { record }),
        )
        .await?;
        self.in_flight += 1;
        Ok(())
    }

    /// Waits for the offset of the oldest unanswered record.
    ///
    /// # Errors
    ///
    /// Returns an error if nothing is in flight, the server rejected the
    /// append, or the connection breaks.
    pub async fn recv(&mut self) -> RpcResult<u64> {
        if self.in_flight == 0 {
            return Err(RpcError::UnexpectedResponse {
                expected: "append",
                got: "nothing in flight",
            });
        }
        let response = self.client.receive().await?;
        self.in_flight -= 1;
        into_offset(response)
    }

    /// Number of records sent but not yet answered.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }
}

fn into_offset(response: Response) -> RpcResult<u64> {
    match response {
        Response::Append(AppendResponse { offset }) => Ok(offset),
        Response::Error(status) => Err(status.into()),
        other => Err(unexpected("append", &other)),
    }
}

fn into_record(response: Response) -> RpcResult<Record> {
    match response {
        Response::Read(ReadResponse { record }) => Ok(record),
        Response::Error(status) => Err(status.into()),
        other => Err(unexpected("read", &other)),
    }
}

fn unexpected(expected: &'static str, got: &Response) -> RpcError {
    RpcError::UnexpectedResponse {
        expected,
        got: got.kind(),
    }
}
