//! The HTTP control surface: one axum router per watcher process, bound to
//! loopback only. Every response is `{ok:true,...}` or
//! `{ok:false,error:{code,message}}`; see `ApiError` for the status-code
//! mapping.

mod control;
mod dom;
mod logs;
mod net;
mod throttle;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use axum::extract::{FromRequest, Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{async_trait, Json, Router};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::artifact::{ArtifactSink, TraceRecorder};
use crate::buffer::{LogBuffer, NetworkBuffer};
use crate::connection::ConnectionManager;
use crate::controller::{EmulationController, ThrottleController};
use crate::error::ArgusError;
use crate::events::WatcherEvent;
use crate::supervisor::ShutdownSignal;

const MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub watcher_id: String,
    pub started_at: u64,
    pub protocol_version: String,
    pub connection: Arc<ConnectionManager>,
    pub logs: Arc<LogBuffer>,
    pub network: Arc<NetworkBuffer>,
    pub throttle: Arc<ThrottleController>,
    pub emulation: Arc<EmulationController>,
    pub artifacts: Arc<ArtifactSink>,
    pub trace_recorder: Arc<TraceRecorder>,
    pub network_capture_enabled: bool,
    pub shutdown: ShutdownSignal,
    pub request_count: Arc<AtomicU32>,
}

/// Wraps an `ArgusError` for the `{ok:false, error:{code, message}}`
/// envelope. HTTP status is `400` for malformed bodies, `500` for anything
/// internal, and `200` for every other domain error — the failure is still
/// visible in the body, it just isn't a transport-level error.
#[derive(Debug)]
pub struct ApiError(pub ArgusError);

impl From<ArgusError> for ApiError {
    fn from(e: ArgusError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ArgusError::InvalidBody(_) => StatusCode::BAD_REQUEST,
            ArgusError::Internal(_) | ArgusError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::OK,
        };
        let body = json!({
            "ok": false,
            "error": { "code": self.0.code(), "message": self.0.to_string() },
        });
        (status, Json(body)).into_response()
    }
}

pub fn ok_json<T: Serialize>(value: T) -> Response {
    Json(value).into_response()
}

/// `axum::Json` extractor wrapper that turns a malformed body into the
/// `{ok:false,error:{code:"invalid_body",...}}` envelope instead of axum's
/// own plaintext rejection response.
pub struct ArgusJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ArgusJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ArgusJson(value)),
            Err(rejection) => Err(ApiError(ArgusError::InvalidBody(rejection.to_string()))),
        }
    }
}

/// Maps an unwound handler panic to the same error envelope as any other
/// internal failure, instead of dropping the connection.
fn handle_panic(err: Box<dyn std::any::Any + Send + 'static>) -> Response {
    let message = if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    };
    tracing::error!(message = %message, "request handler panicked");
    ApiError(ArgusError::Internal(message)).into_response()
}

pub fn clamp(value: Option<u64>, default: u64, min: u64, max: u64) -> u64 {
    value.unwrap_or(default).clamp(min, max)
}

async fn status_handler(State(state): State<AppState>) -> Response {
    let attached = state.connection.is_attached().await;
    ok_json(json!({
        "ok": true,
        "pid": std::process::id(),
        "watcherId": state.watcher_id,
        "attached": attached,
        "protocolVersion": state.protocol_version,
        "startedAt": state.started_at,
    }))
}

async fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "ok": false, "error": { "code": "not_found", "message": "unknown route" } })),
    )
        .into_response()
}

/// Publishes `httpRequested` to the in-process bus before the handler runs,
/// per the contract that every accepted request is observable that way.
async fn track_request(
    State(state): State<AppState>,
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    state.request_count.fetch_add(1, Ordering::Relaxed);
    state.connection.event_bus().publish(WatcherEvent::HttpRequested {
        method: req.method().to_string(),
        path: req.uri().path().to_string(),
    });
    next.run(req).await
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/status", get(status_handler))
        .route("/logs", get(logs::get_logs))
        .route("/logs/tail", get(logs::tail_logs))
        .route("/net", get(net::get_net))
        .route("/net/tail", get(net::tail_net))
        .route("/eval", post(control::eval))
        .route("/screenshot", post(control::screenshot))
        .route("/trace/start", post(control::trace_start))
        .route("/trace/stop", post(control::trace_stop))
        .route("/dom/info", post(dom::info))
        .route("/dom/click", post(dom::click))
        .route("/dom/hover", post(dom::hover))
        .route("/dom/focus", post(dom::focus))
        .route("/dom/fill", post(dom::fill))
        .route("/dom/set-file", post(dom::set_file))
        .route("/dom/tree", post(dom::tree))
        .route("/storage/local", post(control::storage_local))
        .route("/reload", post(control::reload))
        .route("/throttle", get(throttle::get_throttle).post(throttle::set_throttle))
        .route("/emulation", get(throttle::get_emulation).post(throttle::set_emulation))
        .route("/shutdown", post(control::shutdown))
        .fallback(not_found)
        .layer(axum::middleware::from_fn_with_state(state.clone(), track_request))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(CatchPanicLayer::custom(handle_panic))
        .with_state(state)
}
