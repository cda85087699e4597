//! Watcher runtime: attaches to a single Chrome target over CDP, tails its
//! console/network activity into bounded buffers, and exposes everything
//! through a loopback HTTP control API.

pub mod artifact;
pub mod buffer;
pub mod config;
pub mod connection;
pub mod controller;
pub mod demux;
pub mod error;
pub mod events;
pub mod http;
pub mod supervisor;

pub use config::WatcherConfig;
pub use error::{ArgusError, Result};
pub use supervisor::Supervisor;
