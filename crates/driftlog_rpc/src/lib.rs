//! # driftlog RPC
//!
//! Framed TCP server and client for a driftlog commit log.
//!
//! This crate provides:
//! - [`LogServer`] serving any [`CommitLog`](driftlog_core::CommitLog)
//! - [`LogClient`] with unary calls, pipelined appends and read streams
//! - [`Authorizer`] implementations checked before every append and read
//!
//! # Lifecycle
//!
//! ```text
//! bind -> spawn -> stop_accepting -> shutdown
//! ```
//!
//! `shutdown` ends read streams and idle connections, lets in-flight
//! requests answer and waits for all connection tasks.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod auth;
mod client;
mod config;
mod error;
mod handler;
mod server;

pub use auth::{AclAuthorizer, AllowAll, Authorizer, APPEND_ACTION, OBJECT_WILDCARD, READ_ACTION};
pub use client::{AppendStream, LogClient, RecordStream};
pub use config::ServerConfig;
pub use error::{RpcError, RpcResult};
pub use server::{LogServer, ServerHandle};
