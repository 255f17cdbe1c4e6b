//! # driftlog Cluster
//!
//! Turns a set of driftlog nodes into a cluster.
//!
//! This crate provides:
//! - [`Membership`]: push-pull gossip that tells each node who is alive
//! - [`Replicator`]: one pull task per peer copying its log into ours
//! - [`Agent`]: a node wiring log, server, replication and membership
//!
//! # Architecture
//!
//! ```text
//!        gossip                 membership events
//! peers <------> Membership --------------------> Replicator
//!                                                    |  read stream per peer
//!                                                    v
//! clients ---> LogServer ---> Log <----------- append
//! ```
//!
//! Replication is multi-source copying, not consensus. Every node pulls
//! every peer's full log, so records appended on one node show up on all
//! others, possibly more than once.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod agent;
mod config;
mod dialer;
mod error;
mod member;
mod membership;
mod replicator;

pub use agent::Agent;
pub use config::{AgentConfig, MembershipConfig};
pub use dialer::{PeerDialer, RecordSource, RpcDialer};
pub use error::{ClusterError, ClusterResult};
pub use member::{Member, MemberEvent, MemberStatus, RPC_ADDR_TAG};
pub use membership::{Handler, Membership};
pub use replicator::Replicator;
