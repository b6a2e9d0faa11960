//! Questvars – quest variable synchronization for persistent world servers
//!
//! This crate keeps per-character quest progress variables in a write-through
//! cache backed by a remote persistent store:
//! - Synchronous reads served from the character's cache
//! - Writes published to the store only when the value actually changes
//! - Asynchronous fill-on-miss with any number of waiting callbacks
//! - Callbacks never outlive the character they refer to
//! - An NDJSON control surface for driving a world server from other processes

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

/// Runtime core: characters, cache, pending ledger, lifecycle guard
pub mod runtime;

/// NDJSON control-plane service
pub mod service;

// Re-export key types for convenience
pub use runtime::{RuntimeConfig, WorldServer};

/// Current version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Protocol version for the NDJSON control surface
pub const PROTOCOL_VERSION: &str = "1.0.0";
