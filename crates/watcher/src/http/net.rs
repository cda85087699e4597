use axum::extract::{Query, State};
use axum::response::Response;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::{clamp, ok_json, AppState};
use crate::buffer::NetworkFilter;
use crate::error::ArgusError;
use crate::http::ApiError;

const DEFAULT_LIMIT: u64 = 500;
const MAX_LIMIT: u64 = 5000;
const DEFAULT_TIMEOUT_MS: u64 = 25_000;
const MIN_TIMEOUT_MS: u64 = 1_000;
const MAX_TIMEOUT_MS: u64 = 120_000;

#[derive(Debug, Deserialize)]
pub struct NetQuery {
    #[serde(alias = "after")]
    cursor: Option<u64>,
    limit: Option<u64>,
    #[serde(rename = "timeoutMs")]
    timeout_ms: Option<u64>,
    grep: Option<String>,
    #[serde(rename = "sinceTs")]
    since_ts: Option<u64>,
}

fn build_filter(q: &NetQuery) -> NetworkFilter {
    NetworkFilter {
        grep: q.grep.clone(),
        since_ts: q.since_ts,
    }
}

pub async fn get_net(
    State(state): State<AppState>,
    Query(q): Query<NetQuery>,
) -> Result<Response, ApiError> {
    if !state.network_capture_enabled {
        return Err(ArgusError::NetDisabled.into());
    }
    let limit = clamp(q.limit, DEFAULT_LIMIT, 1, MAX_LIMIT) as usize;
    let cursor = q.cursor.unwrap_or(0);
    let filter = build_filter(&q);

    let entries = state.network.snapshot_after(cursor, &|e| filter.matches(e), limit);
    let next_after = entries.last().map(|e| e.id).unwrap_or(cursor);
    Ok(ok_json(json!({ "ok": true, "entries": entries, "nextAfter": next_after })))
}

pub async fn tail_net(
    State(state): State<AppState>,
    Query(q): Query<NetQuery>,
) -> Result<Response, ApiError> {
    if !state.network_capture_enabled {
        return Err(ArgusError::NetDisabled.into());
    }
    let limit = clamp(q.limit, DEFAULT_LIMIT, 1, MAX_LIMIT) as usize;
    let timeout_ms = clamp(q.timeout_ms, DEFAULT_TIMEOUT_MS, MIN_TIMEOUT_MS, MAX_TIMEOUT_MS);
    let cursor = q.cursor.unwrap_or(0);
    let filter = build_filter(&q);

    let (entries, timed_out) = state
        .network
        .wait_for_after(cursor, |e| filter.matches(e), limit, Duration::from_millis(timeout_ms))
        .await;
    let next_after = entries.last().map(|e| e.id).unwrap_or(cursor);
    Ok(ok_json(json!({ "ok": true, "entries": entries, "nextAfter": next_after, "timedOut": timed_out })))
}
