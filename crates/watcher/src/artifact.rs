//! Writes screenshots and traces under `<artifacts_dir>/<watcherId>/...`.
//!
//! File logging (when enabled) also lands here, one file per UTC date, since
//! it shares the same base-directory-per-watcher layout.

use std::path::PathBuf;
use std::sync::Arc;

use argus_cdp::CdpSession;
use base64::Engine;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::{ArgusError, Result};

pub struct ArtifactSink {
    base_dir: PathBuf,
    watcher_id: String,
}

impl ArtifactSink {
    pub fn new(base_dir: PathBuf, watcher_id: String) -> Self {
        Self { base_dir, watcher_id }
    }

    fn screenshots_dir(&self) -> PathBuf {
        self.base_dir.join(&self.watcher_id).join("screenshots")
    }

    fn traces_dir(&self) -> PathBuf {
        self.base_dir.join(&self.watcher_id).join("traces")
    }

    fn logs_dir(&self) -> PathBuf {
        self.base_dir.join(&self.watcher_id).join("logs")
    }

    /// Captures a PNG screenshot via `Page.captureScreenshot` and writes it
    /// to `screenshots/<ts>.png`. Returns the path written.
    pub async fn capture_screenshot(&self, session: &CdpSession, ts: u64) -> Result<PathBuf> {
        let result = session
            .send(
                "Page.captureScreenshot",
                Some(serde_json::json!({ "format": "png" })),
            )
            .await?;
        let data = result
            .get("data")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ArgusError::Internal("captureScreenshot returned no data".into()))?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(data)
            .map_err(|e| ArgusError::Internal(format!("invalid base64 screenshot: {e}")))?;

        let dir = self.screenshots_dir();
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(format!("{ts}.png"));
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }

    pub async fn write_trace(&self, trace_id: &str, events: &[Value]) -> Result<PathBuf> {
        let dir = self.traces_dir();
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(format!("{trace_id}.json"));
        let json = serde_json::to_vec_pretty(events)
            .map_err(|e| ArgusError::Internal(format!("failed to serialize trace: {e}")))?;
        tokio::fs::write(&path, json).await?;
        Ok(path)
    }

    pub fn log_path_for_today(&self) -> PathBuf {
        let days_since_epoch = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() / 86_400)
            .unwrap_or(0);
        self.logs_dir().join(format!("{days_since_epoch}.log"))
    }

    pub async fn append_log_line(&self, line: &str) -> Result<()> {
        use tokio::io::AsyncWriteExt;
        tokio::fs::create_dir_all(self.logs_dir()).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path_for_today())
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        Ok(())
    }
}

struct ActiveTrace {
    trace_id: String,
    events: Vec<Value>,
}

/// Collects `Tracing.dataCollected` chunks between `/trace/start` and
/// `/trace/stop`. One recorder per watcher; only one trace may be active at
/// a time.
pub struct TraceRecorder {
    active: Mutex<Option<ActiveTrace>>,
}

impl TraceRecorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            active: Mutex::new(None),
        })
    }

    pub fn is_active(&self) -> bool {
        self.active.lock().is_some()
    }

    pub async fn start(&self, session: &CdpSession, trace_id: String) -> Result<()> {
        if self.active.lock().is_some() {
            return Err(ArgusError::NotAvailable("a trace is already active".into()));
        }
        session
            .send(
                "Tracing.start",
                Some(serde_json::json!({ "categories": "devtools.timeline,v8,blink" })),
            )
            .await?;
        *self.active.lock() = Some(ActiveTrace {
            trace_id,
            events: Vec::new(),
        });
        Ok(())
    }

    /// Feeds one decoded `Tracing.dataCollected` payload's `value` array into
    /// the active trace, if any. Called by the connection manager's event
    /// loop alongside the log/network demux.
    pub fn on_data_collected(&self, params: &Value) {
        let mut guard = self.active.lock();
        if let Some(active) = guard.as_mut() {
            if let Some(chunk) = params.get("value").and_then(|v| v.as_array()) {
                active.events.extend(chunk.iter().cloned());
            }
        }
    }

    /// Ends tracing and returns the trace id plus collected events for the
    /// caller to hand to `ArtifactSink::write_trace`.
    pub async fn stop(&self, session: &CdpSession) -> Result<(String, Vec<Value>)> {
        let active = self
            .active
            .lock()
            .take()
            .ok_or_else(|| ArgusError::NotAvailable("no trace is active".into()))?;
        session.send("Tracing.end", None).await?;
        Ok((active.trace_id, active.events))
    }
}

impl Default for TraceRecorder {
    fn default() -> Self {
        Self {
            active: Mutex::new(None),
        }
    }
}

/// Forwards `Tracing.dataCollected` events from the raw CDP stream into a
/// recorder, for the lifetime of one attach generation.
pub async fn run_trace_feed(
    recorder: Arc<TraceRecorder>,
    mut rx: broadcast::Receiver<argus_cdp::protocol::CdpEvent>,
) {
    loop {
        match rx.recv().await {
            Ok(event) if event.method == "Tracing.dataCollected" => {
                if let Some(params) = &event.params {
                    recorder.on_data_collected(params);
                }
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(_)) => {}
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn trace_recorder_rejects_concurrent_starts() {
        let recorder = TraceRecorder::new();
        *recorder.active.lock() = Some(ActiveTrace {
            trace_id: "t1".into(),
            events: vec![],
        });
        assert!(recorder.is_active());
    }

    #[test]
    fn on_data_collected_appends_to_active_trace() {
        let recorder = TraceRecorder::new();
        *recorder.active.lock() = Some(ActiveTrace {
            trace_id: "t1".into(),
            events: vec![],
        });
        recorder.on_data_collected(&serde_json::json!({ "value": [{"name": "x"}] }));
        let guard = recorder.active.lock();
        assert_eq!(guard.as_ref().unwrap().events.len(), 1);
    }

    #[tokio::test]
    async fn write_trace_creates_file_under_traces_dir() {
        let dir = tempfile::tempdir().unwrap();
        let sink = ArtifactSink::new(dir.path().to_path_buf(), "w1".into());
        let path = sink
            .write_trace("trace-1", &[serde_json::json!({"a": 1})])
            .await
            .unwrap();
        assert!(path.ends_with("w1/traces/trace-1.json"));
        assert!(tokio::fs::metadata(&path).await.is_ok());
    }
}
