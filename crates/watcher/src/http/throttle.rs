use axum::extract::State;
use axum::response::Response;
use crate::http::ArgusJson as Json;
use serde::Deserialize;
use serde_json::json;

use super::{ok_json, AppState};
use crate::controller::{EmulationState, ThrottleState};
use crate::http::ApiError;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum ThrottleBody {
    /// `{"action":"clear"}`
    Clear { action: ClearAction },
    /// The bare `{rate}` shorthand, mapped to CPU-only throttling.
    Rate { rate: f64 },
    /// The full `{cpu?, network?, cache?}` shape.
    Full(ThrottleState),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ClearAction {
    Clear,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum EmulationBody {
    Clear { action: ClearAction },
    Full(EmulationState),
}

pub async fn get_throttle(State(state): State<AppState>) -> Response {
    let attached = state.connection.is_attached().await;
    let (attached, applied, desired, last_error) = state.throttle.status(attached);
    ok_json(json!({ "ok": true, "attached": attached, "applied": applied, "state": desired, "lastError": last_error }))
}

pub async fn set_throttle(
    State(state): State<AppState>,
    Json(body): Json<ThrottleBody>,
) -> Result<Response, ApiError> {
    let session = state.connection.current_session().await;

    match body {
        ThrottleBody::Clear { .. } => {
            state.throttle.clear_desired(session.as_ref()).await;
        }
        ThrottleBody::Rate { rate } => {
            state
                .throttle
                .set_desired(ThrottleState::from_rate(rate), session.as_ref())
                .await;
        }
        ThrottleBody::Full(desired_state) => {
            state.throttle.set_desired(desired_state, session.as_ref()).await;
        }
    }

    let attached = state.connection.is_attached().await;
    let (attached, applied, desired, last_error) = state.throttle.status(attached);
    Ok(ok_json(json!({ "ok": true, "attached": attached, "applied": applied, "state": desired, "lastError": last_error })))
}

pub async fn get_emulation(State(state): State<AppState>) -> Response {
    let attached = state.connection.is_attached().await;
    let (attached, applied, desired, last_error) = state.emulation.status(attached);
    ok_json(json!({ "ok": true, "attached": attached, "applied": applied, "state": desired, "lastError": last_error }))
}

pub async fn set_emulation(
    State(state): State<AppState>,
    Json(body): Json<EmulationBody>,
) -> Result<Response, ApiError> {
    let session = state.connection.current_session().await;

    match body {
        EmulationBody::Clear { .. } => {
            state.emulation.clear_desired(session.as_ref()).await;
        }
        EmulationBody::Full(desired_state) => {
            state.emulation.set_desired(desired_state, session.as_ref()).await;
        }
    }

    let attached = state.connection.is_attached().await;
    let (attached, applied, desired, last_error) = state.emulation.status(attached);
    Ok(ok_json(json!({ "ok": true, "attached": attached, "applied": applied, "state": desired, "lastError": last_error })))
}
