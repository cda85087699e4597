//! Binds raw CDP events onto the log/network ring buffers.
//!
//! Runs as a dedicated task per attach generation: subscribes to the
//! connection manager's raw event stream and decodes just enough of each
//! domain's payload to build a `LogEntry` or `NetworkEntry`. Unknown methods
//! are ignored, not logged, since the set of CDP events is large and most are
//! irrelevant here.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use argus_cdp::protocol::CdpEvent;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::buffer::{LogBuffer, LogEntry, LogLevel, LogSource, NetworkBuffer, NetworkEntry};

const MAX_TEXT_LEN: usize = 16 * 1024;
const MAX_ARGS: usize = 32;
const PENDING_REQUEST_TTL: Duration = Duration::from_secs(60);

fn truncate_text(s: &str) -> String {
    if s.len() <= MAX_TEXT_LEN {
        s.to_string()
    } else {
        s.chars().take(MAX_TEXT_LEN).collect()
    }
}

struct PendingRequest {
    url: String,
    method: String,
    resource_type: Option<String>,
    status: Option<u16>,
    started_at_ms: u64,
    last_touched: std::time::Instant,
}

/// Holds page-navigation context that gets stamped onto subsequent log
/// entries, and the in-flight network request side table.
pub struct EventDemux {
    logs: Arc<LogBuffer>,
    network: Arc<NetworkBuffer>,
    page_url: Mutex<Option<String>>,
    page_title: Mutex<Option<String>>,
    pending: Mutex<HashMap<String, PendingRequest>>,
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl EventDemux {
    pub fn new(logs: Arc<LogBuffer>, network: Arc<NetworkBuffer>) -> Arc<Self> {
        Arc::new(Self {
            logs,
            network,
            page_url: Mutex::new(None),
            page_title: Mutex::new(None),
            pending: Mutex::new(HashMap::new()),
        })
    }

    /// Drains `rx` until the sender side (the underlying CDP connection) is
    /// dropped or lagged, at which point this generation's loop exits; the
    /// connection manager spawns a fresh demux task on the next attach.
    pub async fn run(self: Arc<Self>, mut rx: broadcast::Receiver<CdpEvent>) {
        loop {
            match rx.recv().await {
                Ok(event) => self.handle(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "event demux lagged behind cdp event stream");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
            self.evict_stale_pending();
        }
    }

    fn handle(&self, event: CdpEvent) {
        let params = event.params.clone().unwrap_or(Value::Null);
        match event.method.as_str() {
            "Runtime.consoleAPICalled" => self.on_console_api_called(&params),
            "Runtime.exceptionThrown" => self.on_exception_thrown(&params),
            "Log.entryAdded" => self.on_log_entry_added(&params),
            "Network.requestWillBeSent" => self.on_request_will_be_sent(&params),
            "Network.responseReceived" => self.on_response_received(&params),
            "Network.loadingFinished" => self.on_loading_finished(&params),
            "Network.loadingFailed" => self.on_loading_failed(&params),
            "Page.frameNavigated" => self.on_frame_navigated(&params),
            _ => {}
        }
    }

    fn push_log(&self, level: LogLevel, source: LogSource, text: String, args: Vec<Value>, file: Option<String>, line: Option<u32>, column: Option<u32>) {
        let id = self.logs.next_id();
        let entry = LogEntry {
            id,
            ts: now_ms(),
            level,
            text: truncate_text(&text),
            args: args.into_iter().take(MAX_ARGS).collect(),
            file,
            line,
            column,
            page_url: self.page_url.lock().clone(),
            page_title: self.page_title.lock().clone(),
            source,
        };
        self.logs.append(entry);
    }

    fn on_console_api_called(&self, params: &Value) {
        let kind = params.get("type").and_then(|v| v.as_str()).unwrap_or("log");
        let level = match kind {
            "info" => LogLevel::Info,
            "warning" => LogLevel::Warning,
            "error" => LogLevel::Error,
            "debug" => LogLevel::Debug,
            "log" | "assert" | "dir" => LogLevel::Log,
            "table" | "profile" | "profileEnd" | "clear" | "startGroup" | "startGroupCollapsed" | "endGroup" | "count" | "timeEnd" => return,
            _ => LogLevel::Log,
        };

        let args: Vec<Value> = params
            .get("args")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        let text = args
            .iter()
            .map(stringify_remote_object)
            .collect::<Vec<_>>()
            .join(" ");

        let frame = params
            .get("stackTrace")
            .and_then(|st| st.get("callFrames"))
            .and_then(|cf| cf.get(0));
        let file = frame.and_then(|f| f.get("url")).and_then(|v| v.as_str()).map(String::from);
        let line = frame.and_then(|f| f.get("lineNumber")).and_then(|v| v.as_u64()).map(|v| v as u32);
        let column = frame.and_then(|f| f.get("columnNumber")).and_then(|v| v.as_u64()).map(|v| v as u32);

        self.push_log(level, LogSource::Console, text, args, file, line, column);
    }

    fn on_exception_thrown(&self, params: &Value) {
        let details = params.get("exceptionDetails").cloned().unwrap_or(Value::Null);
        let text = details
            .get("exception")
            .and_then(|e| e.get("description"))
            .and_then(|v| v.as_str())
            .or_else(|| details.get("text").and_then(|v| v.as_str()))
            .unwrap_or("unknown exception")
            .to_string();
        let file = details.get("url").and_then(|v| v.as_str()).map(String::from);
        let line = details.get("lineNumber").and_then(|v| v.as_u64()).map(|v| v as u32);
        let column = details.get("columnNumber").and_then(|v| v.as_u64()).map(|v| v as u32);

        self.push_log(LogLevel::Exception, LogSource::Exception, text, vec![], file, line, column);
    }

    fn on_log_entry_added(&self, params: &Value) {
        let entry = params.get("entry").cloned().unwrap_or(Value::Null);
        let level = match entry.get("level").and_then(|v| v.as_str()).unwrap_or("info") {
            "verbose" => LogLevel::Debug,
            "warning" => LogLevel::Warning,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        };
        let text = entry.get("text").and_then(|v| v.as_str()).unwrap_or("").to_string();
        let url = entry.get("url").and_then(|v| v.as_str()).map(String::from);
        let line = entry.get("lineNumber").and_then(|v| v.as_u64()).map(|v| v as u32);

        self.push_log(level, LogSource::System, text, vec![], url, line, None);
    }

    fn on_frame_navigated(&self, params: &Value) {
        let frame = params.get("frame").cloned().unwrap_or(Value::Null);
        if frame.get("parentId").is_some() {
            // Only the top frame updates the cached page context.
            return;
        }
        if let Some(url) = frame.get("url").and_then(|v| v.as_str()) {
            *self.page_url.lock() = Some(url.to_string());
        }
        if let Some(name) = frame.get("name").and_then(|v| v.as_str()) {
            *self.page_title.lock() = Some(name.to_string());
        }
    }

    fn on_request_will_be_sent(&self, params: &Value) {
        let Some(request_id) = params.get("requestId").and_then(|v| v.as_str()) else {
            return;
        };
        let request = params.get("request").cloned().unwrap_or(Value::Null);
        let url = request.get("url").and_then(|v| v.as_str()).unwrap_or("").to_string();
        let method = request.get("method").and_then(|v| v.as_str()).unwrap_or("GET").to_string();
        let resource_type = params.get("type").and_then(|v| v.as_str()).map(String::from);

        self.pending.lock().insert(
            request_id.to_string(),
            PendingRequest {
                url,
                method,
                resource_type,
                status: None,
                started_at_ms: now_ms(),
                last_touched: std::time::Instant::now(),
            },
        );
    }

    fn on_response_received(&self, params: &Value) {
        let Some(request_id) = params.get("requestId").and_then(|v| v.as_str()) else {
            return;
        };
        let status = params
            .get("response")
            .and_then(|r| r.get("status"))
            .and_then(|v| v.as_u64())
            .map(|v| v as u16);
        if let Some(pending) = self.pending.lock().get_mut(request_id) {
            pending.status = status;
            pending.last_touched = std::time::Instant::now();
        }
    }

    fn on_loading_finished(&self, params: &Value) {
        let Some(request_id) = params.get("requestId").and_then(|v| v.as_str()) else {
            return;
        };
        let encoded_data_length = params
            .get("encodedDataLength")
            .and_then(|v| v.as_f64())
            .map(|v| v as u64);

        let Some(pending) = self.pending.lock().remove(request_id) else {
            return;
        };
        let id = self.network.next_id();
        self.network.append(NetworkEntry {
            id,
            ts: pending.started_at_ms,
            request_id: request_id.to_string(),
            url: truncate_text(&pending.url),
            method: pending.method,
            resource_type: pending.resource_type,
            status: pending.status,
            encoded_data_length,
            error_text: None,
            duration_ms: Some(now_ms().saturating_sub(pending.started_at_ms)),
        });
    }

    fn on_loading_failed(&self, params: &Value) {
        let Some(request_id) = params.get("requestId").and_then(|v| v.as_str()) else {
            return;
        };
        let error_text = params.get("errorText").and_then(|v| v.as_str()).map(String::from);

        let Some(pending) = self.pending.lock().remove(request_id) else {
            return;
        };
        let id = self.network.next_id();
        self.network.append(NetworkEntry {
            id,
            ts: pending.started_at_ms,
            request_id: request_id.to_string(),
            url: truncate_text(&pending.url),
            method: pending.method,
            resource_type: pending.resource_type,
            status: pending.status,
            encoded_data_length: None,
            error_text,
            duration_ms: Some(now_ms().saturating_sub(pending.started_at_ms)),
        });
    }

    fn evict_stale_pending(&self) {
        let mut pending = self.pending.lock();
        pending.retain(|_, p| p.last_touched.elapsed() < PENDING_REQUEST_TTL);
    }
}

/// Best-effort stringification of a `Runtime.RemoteObject` for console args.
fn stringify_remote_object(obj: &Value) -> String {
    if let Some(s) = obj.get("value").and_then(|v| v.as_str()) {
        return s.to_string();
    }
    if let Some(v) = obj.get("value") {
        return v.to_string();
    }
    if let Some(desc) = obj.get("description").and_then(|v| v.as_str()) {
        return desc.to_string();
    }
    obj.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn demux() -> Arc<EventDemux> {
        EventDemux::new(Arc::new(LogBuffer::new(100)), Arc::new(NetworkBuffer::new(100)))
    }

    #[test]
    fn console_api_called_maps_level_and_joins_args() {
        let d = demux();
        d.on_console_api_called(&json!({
            "type": "warning",
            "args": [{"value": "a"}, {"value": 1}]
        }));
        let entries = d.logs.snapshot_after(0, &crate::buffer::no_filter(), 10);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].level, LogLevel::Warning);
        assert_eq!(entries[0].text, "a 1");
    }

    #[test]
    fn console_api_called_ignores_table_type() {
        let d = demux();
        d.on_console_api_called(&json!({ "type": "table", "args": [] }));
        assert!(d.logs.snapshot_after(0, &crate::buffer::no_filter(), 10).is_empty());
    }

    #[test]
    fn exception_thrown_uses_description() {
        let d = demux();
        d.on_exception_thrown(&json!({
            "exceptionDetails": { "exception": { "description": "boom" } }
        }));
        let entries = d.logs.snapshot_after(0, &crate::buffer::no_filter(), 10);
        assert_eq!(entries[0].level, LogLevel::Exception);
        assert_eq!(entries[0].text, "boom");
    }

    #[test]
    fn network_request_publishes_only_on_terminal_state() {
        let d = demux();
        d.on_request_will_be_sent(&json!({
            "requestId": "r1",
            "request": { "url": "http://x/a", "method": "GET" },
            "type": "Document",
        }));
        assert!(d.network.snapshot_after(0, &crate::buffer::no_filter(), 10).is_empty());

        d.on_response_received(&json!({ "requestId": "r1", "response": { "status": 200 } }));
        assert!(d.network.snapshot_after(0, &crate::buffer::no_filter(), 10).is_empty());

        d.on_loading_finished(&json!({ "requestId": "r1", "encodedDataLength": 512 }));
        let entries = d.network.snapshot_after(0, &crate::buffer::no_filter(), 10);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, Some(200));
        assert_eq!(entries[0].encoded_data_length, Some(512));
    }

    #[test]
    fn network_loading_failed_sets_error_text() {
        let d = demux();
        d.on_request_will_be_sent(&json!({
            "requestId": "r2",
            "request": { "url": "http://x/b", "method": "GET" },
        }));
        d.on_loading_failed(&json!({ "requestId": "r2", "errorText": "net::ERR_FAILED" }));
        let entries = d.network.snapshot_after(0, &crate::buffer::no_filter(), 10);
        assert_eq!(entries[0].error_text.as_deref(), Some("net::ERR_FAILED"));
    }

    #[test]
    fn frame_navigated_updates_page_context_for_subsequent_logs() {
        let d = demux();
        d.on_frame_navigated(&json!({
            "frame": { "url": "http://x/page", "name": "Page Title" }
        }));
        d.on_console_api_called(&json!({ "type": "log", "args": [{"value": "hi"}] }));
        let entries = d.logs.snapshot_after(0, &crate::buffer::no_filter(), 10);
        assert_eq!(entries[0].page_url.as_deref(), Some("http://x/page"));
    }
}
