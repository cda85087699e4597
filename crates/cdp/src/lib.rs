//! Chrome DevTools Protocol transport: target discovery over the browser's
//! `/json` HTTP endpoint, a single-socket JSON-RPC client, and a thin
//! session wrapper for the one target a watcher attaches to.
//!
//! This crate knows nothing about ring buffers, reconnect policy, or HTTP
//! routes — that orchestration lives above it. It only speaks CDP.

pub mod client;
pub mod discovery;
pub mod error;
pub mod protocol;
pub mod session;

pub use client::CdpClient;
pub use discovery::{discover_target, probe_version, MatchSpec};
pub use error::{CdpError, Result};
pub use session::CdpSession;
