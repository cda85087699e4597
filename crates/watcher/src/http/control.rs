//! Handlers for the one-shot control routes: eval, screenshot, tracing,
//! local storage, reload, shutdown.

use axum::extract::State;
use axum::response::Response;
use crate::http::ArgusJson as Json;
use serde::Deserialize;
use serde_json::json;

use super::{ok_json, AppState};
use crate::error::ArgusError;
use crate::http::ApiError;

async fn require_session(state: &AppState) -> Result<argus_cdp::CdpSession, ApiError> {
    state
        .connection
        .current_session()
        .await
        .ok_or_else(|| ApiError(ArgusError::Disconnected))
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[derive(Debug, Deserialize)]
pub struct EvalBody {
    expression: String,
}

pub async fn eval(
    State(state): State<AppState>,
    Json(body): Json<EvalBody>,
) -> Result<Response, ApiError> {
    let session = require_session(&state).await?;
    let value = session.evaluate(&body.expression).await.map_err(ArgusError::from)?;
    Ok(ok_json(json!({ "ok": true, "value": value })))
}

pub async fn screenshot(State(state): State<AppState>) -> Result<Response, ApiError> {
    let session = require_session(&state).await?;
    let ts = now_ms();
    let path = state
        .artifacts
        .capture_screenshot(&session, ts)
        .await?;
    Ok(ok_json(json!({ "ok": true, "path": path, "ts": ts })))
}

#[derive(Debug, Deserialize)]
pub struct TraceStartBody {
    #[serde(rename = "traceId")]
    trace_id: Option<String>,
}

pub async fn trace_start(
    State(state): State<AppState>,
    Json(body): Json<TraceStartBody>,
) -> Result<Response, ApiError> {
    let session = require_session(&state).await?;
    let trace_id = body.trace_id.unwrap_or_else(|| format!("{:016x}", now_ms()));
    state.trace_recorder.start(&session, trace_id.clone()).await?;
    Ok(ok_json(json!({ "ok": true, "traceId": trace_id })))
}

pub async fn trace_stop(State(state): State<AppState>) -> Result<Response, ApiError> {
    let session = require_session(&state).await?;
    let (trace_id, events) = state.trace_recorder.stop(&session).await?;
    let path = state.artifacts.write_trace(&trace_id, &events).await?;
    Ok(ok_json(json!({ "ok": true, "traceId": trace_id, "path": path })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum StorageAction {
    Get,
    Set,
    Remove,
    List,
    Clear,
}

#[derive(Debug, Deserialize)]
pub struct StorageLocalBody {
    action: StorageAction,
    key: Option<String>,
    value: Option<String>,
    origin: Option<String>,
}

/// `DOMStorage.*` keys off a `StorageId{securityOrigin, isLocalStorage}`; we
/// derive the origin from the page's current URL since callers act on
/// "the current page's local storage", not an arbitrary one.
async fn resolve_storage_id(
    session: &argus_cdp::CdpSession,
    requested_origin: Option<&str>,
) -> Result<serde_json::Value, ApiError> {
    let frame_tree = session
        .send("Page.getFrameTree", None)
        .await
        .map_err(ArgusError::from)?;
    let url = frame_tree
        .get("frameTree")
        .and_then(|f| f.get("frame"))
        .and_then(|f| f.get("url"))
        .and_then(|v| v.as_str())
        .unwrap_or("");
    let origin = url_origin(url);

    if let Some(requested) = requested_origin {
        if !origins_match(requested, &origin) {
            return Err(ApiError(ArgusError::OriginMismatch));
        }
    }

    Ok(json!({ "securityOrigin": origin, "isLocalStorage": true }))
}

/// Strips path/query/fragment from a URL, leaving `scheme://host[:port]`.
/// Good enough for origin comparison; we don't need a full URL parser here.
fn url_origin(url: &str) -> String {
    let Some(scheme_end) = url.find("://") else {
        return url.to_string();
    };
    let rest = &url[scheme_end + 3..];
    let authority_end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    format!("{}{}", &url[..scheme_end + 3], &rest[..authority_end])
}

fn origins_match(requested: &str, actual: &str) -> bool {
    url_origin(requested) == *actual
}

pub async fn storage_local(
    State(state): State<AppState>,
    Json(body): Json<StorageLocalBody>,
) -> Result<Response, ApiError> {
    let session = require_session(&state).await?;
    let storage_id = resolve_storage_id(&session, body.origin.as_deref()).await?;

    let value = match body.action {
        StorageAction::Get => {
            let key = body
                .key
                .ok_or_else(|| ArgusError::InvalidBody("get requires 'key'".into()))?;
            let items = session
                .send("DOMStorage.getDOMStorageItems", Some(json!({ "storageId": storage_id })))
                .await
                .map_err(ArgusError::from)?;
            let found = items
                .get("entries")
                .and_then(|e| e.as_array())
                .and_then(|entries| entries.iter().find(|pair| pair.get(0).and_then(|k| k.as_str()) == Some(key.as_str())))
                .and_then(|pair| pair.get(1).cloned());
            json!({ "key": key, "value": found })
        }
        StorageAction::Set => {
            let key = body
                .key
                .ok_or_else(|| ArgusError::InvalidBody("set requires 'key'".into()))?;
            let val = body
                .value
                .ok_or_else(|| ArgusError::InvalidBody("set requires 'value'".into()))?;
            session
                .send(
                    "DOMStorage.setDOMStorageItem",
                    Some(json!({ "storageId": storage_id, "key": key, "value": val })),
                )
                .await
                .map_err(ArgusError::from)?;
            json!({ "key": key })
        }
        StorageAction::Remove => {
            let key = body
                .key
                .ok_or_else(|| ArgusError::InvalidBody("remove requires 'key'".into()))?;
            session
                .send(
                    "DOMStorage.removeDOMStorageItem",
                    Some(json!({ "storageId": storage_id, "key": key })),
                )
                .await
                .map_err(ArgusError::from)?;
            json!({ "key": key })
        }
        StorageAction::List => {
            let items = session
                .send("DOMStorage.getDOMStorageItems", Some(json!({ "storageId": storage_id })))
                .await
                .map_err(ArgusError::from)?;
            items.get("entries").cloned().unwrap_or(json!([]))
        }
        StorageAction::Clear => {
            session
                .send("DOMStorage.clear", Some(json!({ "storageId": storage_id })))
                .await
                .map_err(ArgusError::from)?;
            json!(null)
        }
    };

    Ok(ok_json(json!({ "ok": true, "result": value })))
}

pub async fn reload(State(state): State<AppState>) -> Result<Response, ApiError> {
    let session = require_session(&state).await?;
    session.reload().await.map_err(ArgusError::from)?;
    Ok(ok_json(json!({ "ok": true })))
}

pub async fn shutdown(State(state): State<AppState>) -> Response {
    state.shutdown.trigger();
    ok_json(json!({ "ok": true }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_origin_strips_path_and_query() {
        assert_eq!(url_origin("https://example.com/a/b?x=1"), "https://example.com");
    }

    #[test]
    fn origins_match_ignores_trailing_path() {
        assert!(origins_match("http://localhost:3000/foo", "http://localhost:3000"));
    }

    #[test]
    fn origins_match_rejects_different_host() {
        assert!(!origins_match("https://other.com", "https://example.com"));
    }
}
