//! Wires together the connection manager, buffers, controllers, event
//! demultiplexer, artifact sink, registry entry, and HTTP server, then runs
//! until `SIGINT`/`SIGTERM`/`POST /shutdown`.

use std::sync::atomic::AtomicU32;
use std::sync::Arc;
use std::time::Duration;

use argus_registry::{MatchSpec as RegistryMatchSpec, RegistryStore, WatcherRecord};
use tokio::sync::broadcast;

use crate::artifact::{ArtifactSink, TraceRecorder};
use crate::buffer::{LogBuffer, NetworkBuffer};
use crate::config::WatcherConfig;
use crate::connection::{ConnectionManager, OnAttachHooks};
use crate::controller::{EmulationController, ThrottleController};
use crate::events::EventBus;
use crate::http::{self, AppState};

const PROTOCOL_VERSION: &str = "1";
const REGISTRY_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// A one-shot, multi-listener shutdown trigger: any number of tasks can
/// `subscribe()` and `trigger()` may be called exactly once (subsequent
/// calls are no-ops since the channel is already closed for new data).
#[derive(Clone)]
pub struct ShutdownSignal {
    tx: broadcast::Sender<()>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

fn random_watcher_id() -> String {
    use rand::Rng;
    let n: u64 = rand::thread_rng().gen();
    format!("{n:016x}")
}

pub struct Supervisor {
    config: WatcherConfig,
    watcher_id: String,
    shutdown: ShutdownSignal,
    connection: Arc<ConnectionManager>,
    throttle: Arc<ThrottleController>,
    emulation: Arc<EmulationController>,
    registry: Arc<RegistryStore>,
}

impl Supervisor {
    pub fn new(config: WatcherConfig) -> anyhow::Result<Self> {
        let watcher_id = random_watcher_id();
        let event_bus = EventBus::new();
        let throttle = ThrottleController::new();
        let emulation = EmulationController::new();

        let connection = ConnectionManager::new(
            config.chrome_host.clone(),
            config.chrome_port,
            config.match_spec.clone(),
            config.network_capture_enabled,
            event_bus,
            OnAttachHooks {
                throttle: throttle.clone(),
                emulation: emulation.clone(),
            },
        );

        let registry = Arc::new(RegistryStore::open_default()?);

        Ok(Self {
            config,
            watcher_id,
            shutdown: ShutdownSignal::new(),
            connection,
            throttle,
            emulation,
            registry,
        })
    }

    pub fn shutdown_handle(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Runs until shutdown. Binds the HTTP listener first so the chosen port
    /// is known before the registry entry is written.
    pub async fn run(self) -> anyhow::Result<()> {
        let logs = Arc::new(LogBuffer::new(self.config.log_capacity));
        let network = Arc::new(NetworkBuffer::new(self.config.net_capacity));
        let demux = crate::demux::EventDemux::new(logs.clone(), network.clone());
        let trace_recorder = TraceRecorder::new();
        let artifacts = Arc::new(ArtifactSink::new(
            self.config.artifacts_dir.clone(),
            self.watcher_id.clone(),
        ));

        let listener = tokio::net::TcpListener::bind(("127.0.0.1", self.config.port)).await?;
        let bound_port = listener.local_addr()?.port();

        let started_at = argus_registry::store::now_ms();
        let pid = std::process::id();
        let cwd = std::env::current_dir()
            .map(|p| p.display().to_string())
            .unwrap_or_default();

        self.registry.upsert(WatcherRecord {
            id: self.watcher_id.clone(),
            pid,
            host: "127.0.0.1".to_string(),
            port: bound_port,
            started_at,
            heartbeat_at: started_at,
            cwd,
            match_spec: RegistryMatchSpec {
                url: self.config.match_spec.url_contains.clone(),
                title: self.config.match_spec.title_contains.clone(),
            },
            protocol_version: PROTOCOL_VERSION.to_string(),
        })?;

        // Subscribes to each attach generation's raw event stream and feeds
        // the demux and trace recorder; re-subscribes after every reattach.
        {
            let connection = self.connection.clone();
            let demux = demux.clone();
            let trace_recorder = trace_recorder.clone();
            let mut shutdown_rx = self.shutdown.subscribe();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = shutdown_rx.recv() => break,
                        _ = tokio::time::sleep(Duration::from_millis(200)) => {}
                    }
                    if let Some(rx) = connection.subscribe_events().await {
                        let demux = demux.clone();
                        let demux_rx = rx.resubscribe();
                        tokio::spawn(demux.run(demux_rx));
                        tokio::spawn(crate::artifact::run_trace_feed(trace_recorder.clone(), rx));
                        // Wait for this generation to end before looping back
                        // to poll for the next attach.
                        while connection.is_attached().await {
                            tokio::time::sleep(Duration::from_millis(200)).await;
                        }
                    }
                }
            });
        }

        tokio::spawn(self.connection.clone().run());

        // Registry heartbeat loop.
        {
            let registry = self.registry.clone();
            let watcher_id = self.watcher_id.clone();
            let mut shutdown_rx = self.shutdown.subscribe();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(REGISTRY_HEARTBEAT_INTERVAL);
                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            let now = argus_registry::store::now_ms();
                            if let Err(e) = registry.heartbeat(&watcher_id, now) {
                                tracing::warn!(error = %e, "registry heartbeat failed");
                            }
                        }
                        _ = shutdown_rx.recv() => break,
                    }
                }
            });
        }

        let state = AppState {
            watcher_id: self.watcher_id.clone(),
            started_at,
            protocol_version: PROTOCOL_VERSION.to_string(),
            connection: self.connection.clone(),
            logs,
            network,
            throttle: self.throttle.clone(),
            emulation: self.emulation.clone(),
            artifacts,
            trace_recorder,
            network_capture_enabled: self.config.network_capture_enabled,
            shutdown: self.shutdown.clone(),
            request_count: Arc::new(AtomicU32::new(0)),
        };

        let router = http::build_router(state);
        tracing::info!(watcher_id = %self.watcher_id, port = bound_port, "watcher listening");

        let mut shutdown_rx = self.shutdown.subscribe();
        let serve = axum::serve(listener, router).with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
        });

        tokio::select! {
            result = serve => {
                if let Err(e) = result {
                    tracing::error!(error = %e, "http server error");
                }
            }
            _ = wait_for_os_signal() => {
                self.shutdown.trigger();
            }
        }

        self.shutdown.trigger();
        self.teardown().await;
        Ok(())
    }

    async fn teardown(&self) {
        let session = self.connection.current_session().await;
        if self.config.restore_on_exit {
            self.throttle.clear_desired(session.as_ref()).await;
            self.emulation.clear_desired(session.as_ref()).await;
        }
        self.connection.close().await;
        if let Err(e) = self.registry.remove(&self.watcher_id) {
            tracing::warn!(error = %e, "failed to remove registry entry on shutdown");
        }
        tracing::info!(watcher_id = %self.watcher_id, "watcher stopped");
    }
}

async fn wait_for_os_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("install SIGINT handler");
        tokio::select! {
            _ = sigterm.recv() => {}
            _ = sigint.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Forces process exit if graceful teardown hasn't finished within the grace
/// period, guarding against a wedged CDP call blocking shutdown forever.
pub fn spawn_hard_exit_timer(shutdown: ShutdownSignal) {
    tokio::spawn(async move {
        let mut rx = shutdown.subscribe();
        if rx.recv().await.is_ok() {
            tokio::time::sleep(SHUTDOWN_GRACE).await;
            tracing::warn!("shutdown grace period elapsed, forcing exit");
            std::process::exit(0);
        }
    });
}
