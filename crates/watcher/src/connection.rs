//! Owns the attach/detach/reattach lifecycle against a single target.
//!
//! Reconnection uses exponential backoff (250ms, doubling, capped at 8s,
//! +-20% jitter) and re-discovers the target fresh each attempt, since the
//! original target may have navigated away or closed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use argus_cdp::{discover_target, CdpClient, CdpSession, MatchSpec};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};

use crate::controller::{EmulationController, ThrottleController};
use crate::events::{EventBus, WatcherEvent};

const INITIAL_BACKOFF: Duration = Duration::from_millis(250);
const MAX_BACKOFF: Duration = Duration::from_secs(8);
const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Discovering,
    Attaching,
    Attached,
    Detaching,
}

/// Hooks fired in registration order whenever a new attach succeeds.
pub struct OnAttachHooks {
    pub throttle: Arc<ThrottleController>,
    pub emulation: Arc<EmulationController>,
}

pub struct ConnectionManager {
    http_client: reqwest::Client,
    chrome_host: String,
    chrome_port: u16,
    match_spec: MatchSpec,
    network_capture_enabled: bool,

    state: RwLock<ConnectionState>,
    session: RwLock<Option<CdpSession>>,
    client: RwLock<Option<Arc<CdpClient>>>,
    generation: AtomicU64,

    event_bus: EventBus,
    hooks: OnAttachHooks,
}

impl ConnectionManager {
    pub fn new(
        chrome_host: String,
        chrome_port: u16,
        match_spec: MatchSpec,
        network_capture_enabled: bool,
        event_bus: EventBus,
        hooks: OnAttachHooks,
    ) -> Arc<Self> {
        Arc::new(Self {
            http_client: reqwest::Client::new(),
            chrome_host,
            chrome_port,
            match_spec,
            network_capture_enabled,
            state: RwLock::new(ConnectionState::Disconnected),
            session: RwLock::new(None),
            client: RwLock::new(None),
            generation: AtomicU64::new(0),
            event_bus,
            hooks,
        })
    }

    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    pub async fn current_session(&self) -> Option<CdpSession> {
        self.session.read().await.clone()
    }

    pub async fn is_attached(&self) -> bool {
        self.session.read().await.is_some()
    }

    pub fn event_bus(&self) -> EventBus {
        self.event_bus.clone()
    }

    /// Subscribes to the raw CDP event stream of whichever connection is
    /// currently attached. Returns `None` if nothing is attached yet.
    pub async fn subscribe_events(&self) -> Option<broadcast::Receiver<argus_cdp::protocol::CdpEvent>> {
        self.client.read().await.as_ref().map(|c| c.subscribe())
    }

    /// Runs the attach loop forever: discover, attach, wait for the
    /// connection to die, back off, repeat. Spawned once by the supervisor.
    pub async fn run(self: Arc<Self>) {
        let mut backoff = INITIAL_BACKOFF;
        loop {
            match self.attempt_attach().await {
                Ok(my_generation) => {
                    backoff = INITIAL_BACKOFF;
                    self.wait_until_detached(my_generation).await;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "attach attempt failed, backing off");
                }
            }

            *self.state.write().await = ConnectionState::Disconnected;
            let jitter_frac = rand::thread_rng().gen_range(-0.2..=0.2);
            let jittered = backoff.mul_f64(1.0 + jitter_frac).max(Duration::from_millis(1));
            tokio::time::sleep(jittered).await;
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }

    async fn attempt_attach(&self) -> argus_cdp::Result<u64> {
        *self.state.write().await = ConnectionState::Discovering;
        let target = discover_target(
            &self.http_client,
            &self.chrome_host,
            self.chrome_port,
            &self.match_spec,
            DISCOVERY_TIMEOUT,
        )
        .await?;

        let ws_url = target
            .web_socket_debugger_url
            .clone()
            .ok_or_else(|| argus_cdp::CdpError::NoTarget("target has no websocket url".into()))?;

        *self.state.write().await = ConnectionState::Attaching;
        let client = CdpClient::connect(&ws_url).await?;
        let session = CdpSession::attach(client.clone(), &target).await?;
        if self.network_capture_enabled {
            session.enable_network().await?;
        }

        let my_generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self.client.write().await = Some(client);
        *self.session.write().await = Some(session.clone());
        *self.state.write().await = ConnectionState::Attached;

        // Registration order: throttle before emulation, matching the order
        // the supervisor wires them.
        self.hooks.throttle.on_attach(&session).await;
        self.hooks.emulation.on_attach(&session).await;

        self.event_bus.publish(WatcherEvent::CdpAttached {
            target_id: session.target_id.clone(),
            url: target.url.clone(),
        });
        tracing::info!(target_id = %session.target_id, url = %target.url, "attached");
        Ok(my_generation)
    }

    async fn wait_until_detached(&self, my_generation: u64) {
        loop {
            let client = self.client.read().await.clone();
            match client {
                Some(c) if !c.is_closed() => {
                    tokio::time::sleep(Duration::from_millis(250)).await;
                }
                _ => break,
            }
            if self.generation.load(Ordering::SeqCst) != my_generation {
                break;
            }
        }
        *self.state.write().await = ConnectionState::Detaching;
        *self.session.write().await = None;
        *self.client.write().await = None;
        self.event_bus.publish(WatcherEvent::CdpDetached {
            reason: "connection closed".into(),
        });
        tracing::info!("detached");
    }

    /// Closes the current connection, if any, as part of a graceful
    /// watcher shutdown.
    pub async fn close(&self) {
        if let Some(client) = self.client.read().await.as_ref() {
            let _ = client.close().await;
        }
    }
}
