//! CLI command implementations.

pub mod agent;
pub mod dump;
pub mod inspect;
