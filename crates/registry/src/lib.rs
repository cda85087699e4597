//! The cross-process watcher registry: a JSON file under `$ARGUS_HOME`
//! mutated by concurrent CLI and watcher processes under an advisory file
//! lock, with TTL and reachability-based pruning.

pub mod error;
pub mod lock;
pub mod model;
pub mod paths;
pub mod store;

pub use error::{RegistryError, Result};
pub use model::{MatchSpec, Registry, WatcherRecord, REGISTRY_VERSION};
pub use store::{now_ms, ReadResult, ReadWarning, RegistryStore};
