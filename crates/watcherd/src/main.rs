//! Minimal binary entrypoint for one watcher process. Wired entirely from
//! environment variables (`ARGUS_*`, `RUST_LOG`) — argument parsing belongs
//! to the embedding CLI, not here.

use argus_watcher::{Supervisor, WatcherConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = WatcherConfig::from_env();
    let supervisor = Supervisor::new(config)?;
    argus_watcher::supervisor::spawn_hard_exit_timer(supervisor.shutdown_handle());

    supervisor.run().await
}
