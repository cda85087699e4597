use axum::extract::{Query, State};
use axum::response::Response;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::{clamp, ok_json, AppState};
use crate::buffer::{LogFilter, LogLevel, LogSource, MatchCase};

const DEFAULT_LIMIT: u64 = 500;
const MAX_LIMIT: u64 = 5000;
const DEFAULT_TIMEOUT_MS: u64 = 25_000;
const MIN_TIMEOUT_MS: u64 = 1_000;
const MAX_TIMEOUT_MS: u64 = 120_000;

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    #[serde(alias = "after")]
    cursor: Option<u64>,
    limit: Option<u64>,
    #[serde(rename = "timeoutMs")]
    timeout_ms: Option<u64>,
    levels: Option<String>,
    #[serde(rename = "match")]
    match_: Option<String>,
    #[serde(rename = "matchCase")]
    match_case: Option<String>,
    source: Option<String>,
    #[serde(rename = "sinceTs")]
    since_ts: Option<u64>,
}

fn parse_level(s: &str) -> Option<LogLevel> {
    match s {
        "log" => Some(LogLevel::Log),
        "info" => Some(LogLevel::Info),
        "warning" => Some(LogLevel::Warning),
        "error" => Some(LogLevel::Error),
        "debug" => Some(LogLevel::Debug),
        "exception" => Some(LogLevel::Exception),
        _ => None,
    }
}

fn parse_source(s: &str) -> Option<LogSource> {
    match s {
        "console" => Some(LogSource::Console),
        "exception" => Some(LogSource::Exception),
        "system" => Some(LogSource::System),
        _ => None,
    }
}

fn parse_match_case(s: &str) -> MatchCase {
    match s {
        "sensitive" => MatchCase::Sensitive,
        _ => MatchCase::Insensitive,
    }
}

fn build_filter(q: &LogsQuery) -> LogFilter {
    LogFilter {
        levels: q
            .levels
            .as_ref()
            .map(|s| s.split(',').filter_map(parse_level).collect()),
        match_substrings: q
            .match_
            .as_ref()
            .map(|s| s.split(',').map(String::from).collect()),
        match_case: q.match_case.as_deref().map(parse_match_case).unwrap_or_default(),
        source: q.source.as_deref().and_then(parse_source),
        since_ts: q.since_ts,
    }
}

pub async fn get_logs(State(state): State<AppState>, Query(q): Query<LogsQuery>) -> Response {
    let limit = clamp(q.limit, DEFAULT_LIMIT, 1, MAX_LIMIT) as usize;
    let cursor = q.cursor.unwrap_or(0);
    let filter = build_filter(&q);

    let entries = state.logs.snapshot_after(cursor, &|e| filter.matches(e), limit);
    let next_after = entries.last().map(|e| e.id).unwrap_or(cursor);
    ok_json(json!({ "ok": true, "entries": entries, "nextAfter": next_after }))
}

pub async fn tail_logs(State(state): State<AppState>, Query(q): Query<LogsQuery>) -> Response {
    let limit = clamp(q.limit, DEFAULT_LIMIT, 1, MAX_LIMIT) as usize;
    let timeout_ms = clamp(q.timeout_ms, DEFAULT_TIMEOUT_MS, MIN_TIMEOUT_MS, MAX_TIMEOUT_MS);
    let cursor = q.cursor.unwrap_or(0);
    let filter = build_filter(&q);

    let (entries, timed_out) = state
        .logs
        .wait_for_after(cursor, |e| filter.matches(e), limit, Duration::from_millis(timeout_ms))
        .await;
    let next_after = entries.last().map(|e| e.id).unwrap_or(cursor);
    ok_json(json!({ "ok": true, "entries": entries, "nextAfter": next_after, "timedOut": timed_out }))
}
