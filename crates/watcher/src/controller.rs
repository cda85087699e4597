//! Throttle and emulation controllers.
//!
//! Both hold desired state ahead of attach and reconcile it against CDP on
//! every successful attach. Applying is best-effort per aspect: one failing
//! CDP call doesn't stop the others from being tried.

use std::sync::Arc;

use argus_cdp::CdpSession;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuThrottle {
    pub rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkThrottle {
    #[serde(default)]
    pub offline: bool,
    #[serde(default)]
    pub latency: f64,
    #[serde(rename = "downloadThroughput", default)]
    pub download_throughput: f64,
    #[serde(rename = "uploadThroughput", default)]
    pub upload_throughput: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheThrottle {
    pub disabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThrottleState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu: Option<CpuThrottle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkThrottle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheThrottle>,
}

impl ThrottleState {
    /// The shorthand `{rate}` request body maps to CPU throttling only.
    pub fn from_rate(rate: f64) -> Self {
        Self {
            cpu: Some(CpuThrottle { rate }),
            network: None,
            cache: None,
        }
    }

    fn neutral() -> Self {
        Self {
            cpu: Some(CpuThrottle { rate: 1.0 }),
            network: Some(NetworkThrottle {
                offline: false,
                latency: 0.0,
                download_throughput: -1.0,
                upload_throughput: -1.0,
            }),
            cache: Some(CacheThrottle { disabled: false }),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    #[serde(rename = "deviceScaleFactor", default)]
    pub device_scale_factor: f64,
    #[serde(default)]
    pub mobile: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Geolocation {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmulationState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewport: Option<Viewport>,
    #[serde(rename = "userAgent", skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub touch: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geolocation: Option<Geolocation>,
}

pub struct ThrottleController {
    desired: Mutex<Option<ThrottleState>>,
    applied: Mutex<bool>,
    last_error: Mutex<Option<String>>,
}

impl ThrottleController {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            desired: Mutex::new(None),
            applied: Mutex::new(false),
            last_error: Mutex::new(None),
        })
    }

    pub fn status(&self, attached: bool) -> (bool, bool, Option<ThrottleState>, Option<String>) {
        (
            attached,
            *self.applied.lock(),
            self.desired.lock().clone(),
            self.last_error.lock().clone(),
        )
    }

    pub async fn set_desired(&self, state: ThrottleState, session: Option<&CdpSession>) {
        *self.desired.lock() = Some(state.clone());
        if let Some(session) = session {
            self.apply(&state, session).await;
        }
    }

    pub async fn clear_desired(&self, session: Option<&CdpSession>) {
        *self.desired.lock() = None;
        if let Some(session) = session {
            self.apply(&ThrottleState::neutral(), session).await;
        }
    }

    /// Re-applies whatever is currently desired; called by the connection
    /// manager after every successful (re)attach.
    pub async fn on_attach(&self, session: &CdpSession) {
        let desired = self.desired.lock().clone();
        if let Some(state) = desired {
            self.apply(&state, session).await;
        }
    }

    async fn apply(&self, state: &ThrottleState, session: &CdpSession) {
        let mut first_error: Option<String> = None;
        let mut ok = true;

        if let Some(cpu) = &state.cpu {
            if let Err(e) = session
                .send(
                    "Emulation.setCPUThrottlingRate",
                    Some(json!({ "rate": cpu.rate })),
                )
                .await
            {
                ok = false;
                first_error.get_or_insert(e.to_string());
            }
        }
        if let Some(net) = &state.network {
            if let Err(e) = session
                .send(
                    "Network.emulateNetworkConditions",
                    Some(json!({
                        "offline": net.offline,
                        "latency": net.latency,
                        "downloadThroughput": net.download_throughput,
                        "uploadThroughput": net.upload_throughput,
                    })),
                )
                .await
            {
                ok = false;
                first_error.get_or_insert(e.to_string());
            }
        }
        if let Some(cache) = &state.cache {
            if let Err(e) = session
                .send(
                    "Network.setCacheDisabled",
                    Some(json!({ "cacheDisabled": cache.disabled })),
                )
                .await
            {
                ok = false;
                first_error.get_or_insert(e.to_string());
            }
        }

        *self.applied.lock() = ok;
        if let Some(err) = first_error {
            tracing::warn!(error = %err, "failed to fully apply throttle state");
            *self.last_error.lock() = Some(err);
        } else if ok {
            *self.last_error.lock() = None;
        }
    }
}

pub struct EmulationController {
    desired: Mutex<Option<EmulationState>>,
    applied: Mutex<bool>,
    last_error: Mutex<Option<String>>,
}

impl EmulationController {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            desired: Mutex::new(None),
            applied: Mutex::new(false),
            last_error: Mutex::new(None),
        })
    }

    pub fn status(&self, attached: bool) -> (bool, bool, Option<EmulationState>, Option<String>) {
        (
            attached,
            *self.applied.lock(),
            self.desired.lock().clone(),
            self.last_error.lock().clone(),
        )
    }

    pub async fn set_desired(&self, state: EmulationState, session: Option<&CdpSession>) {
        *self.desired.lock() = Some(state.clone());
        if let Some(session) = session {
            self.apply(&state, session).await;
        }
    }

    pub async fn clear_desired(&self, session: Option<&CdpSession>) {
        *self.desired.lock() = None;
        if let Some(session) = session {
            self.apply(&EmulationState::default(), session).await;
        }
    }

    pub async fn on_attach(&self, session: &CdpSession) {
        let desired = self.desired.lock().clone();
        if let Some(state) = desired {
            self.apply(&state, session).await;
        }
    }

    async fn apply(&self, state: &EmulationState, session: &CdpSession) {
        let mut first_error: Option<String> = None;
        let mut ok = true;

        if let Some(viewport) = &state.viewport {
            if let Err(e) = session
                .send(
                    "Emulation.setDeviceMetricsOverride",
                    Some(json!({
                        "width": viewport.width,
                        "height": viewport.height,
                        "deviceScaleFactor": viewport.device_scale_factor,
                        "mobile": viewport.mobile,
                    })),
                )
                .await
            {
                ok = false;
                first_error.get_or_insert(e.to_string());
            }
        }
        if let Some(ua) = &state.user_agent {
            if let Err(e) = session
                .send(
                    "Network.setUserAgentOverride",
                    Some(json!({ "userAgent": ua })),
                )
                .await
            {
                ok = false;
                first_error.get_or_insert(e.to_string());
            }
        }
        if let Some(touch) = state.touch {
            if let Err(e) = session
                .send(
                    "Emulation.setTouchEmulationEnabled",
                    Some(json!({ "enabled": touch })),
                )
                .await
            {
                ok = false;
                first_error.get_or_insert(e.to_string());
            }
        }
        if let Some(geo) = &state.geolocation {
            if let Err(e) = session
                .send(
                    "Emulation.setGeolocationOverride",
                    Some(json!({
                        "latitude": geo.latitude,
                        "longitude": geo.longitude,
                        "accuracy": geo.accuracy,
                    })),
                )
                .await
            {
                ok = false;
                first_error.get_or_insert(e.to_string());
            }
        }

        *self.applied.lock() = ok;
        if let Some(err) = first_error {
            tracing::warn!(error = %err, "failed to fully apply emulation state");
            *self.last_error.lock() = Some(err);
        } else if ok {
            *self.last_error.lock() = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_desired_without_session_only_stores_state() {
        let controller = ThrottleController::new();
        controller
            .set_desired(ThrottleState::from_rate(4.0), None)
            .await;
        let (attached, applied, state, _) = controller.status(false);
        assert!(!attached);
        assert!(!applied);
        assert_eq!(state.unwrap().cpu.unwrap().rate, 4.0);
    }

    #[tokio::test]
    async fn clear_desired_resets_state() {
        let controller = ThrottleController::new();
        controller
            .set_desired(ThrottleState::from_rate(4.0), None)
            .await;
        controller.clear_desired(None).await;
        let (_, _, state, _) = controller.status(false);
        assert!(state.is_none());
    }

    #[test]
    fn throttle_state_from_rate_maps_to_cpu_only() {
        let state = ThrottleState::from_rate(2.0);
        assert_eq!(state.cpu.unwrap().rate, 2.0);
        assert!(state.network.is_none());
        assert!(state.cache.is_none());
    }
}
