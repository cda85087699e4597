//! Bounded ring buffers with monotonic ids and long-poll tailing.
//!
//! Capacity eviction is silent by design: callers detect a gap by noticing
//! that the oldest id returned is greater than `cursor + 1`, exactly as
//! wraparound is detected in any bounded log.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

pub trait HasId {
    fn id(&self) -> u64;
}

/// A bounded, append-only buffer of entries with strictly increasing ids.
pub struct RingBuffer<T> {
    capacity: usize,
    entries: Mutex<VecDeque<T>>,
    next_id: AtomicU64,
    notify: Notify,
}

impl<T: HasId + Clone> RingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            next_id: AtomicU64::new(1),
            notify: Notify::new(),
        }
    }

    /// Reserves the next id for an entry the caller is about to construct.
    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Appends an already-id-assigned entry and wakes all long-poll waiters.
    pub fn append(&self, entry: T) {
        let mut entries = self.entries.lock();
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
        drop(entries);
        self.notify.notify_waiters();
    }

    pub fn snapshot_after<F>(&self, cursor: u64, filter: &F, limit: usize) -> Vec<T>
    where
        F: Fn(&T) -> bool,
    {
        let entries = self.entries.lock();
        entries
            .iter()
            .filter(|e| e.id() > cursor && filter(e))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn last_id(&self) -> u64 {
        self.next_id.load(Ordering::SeqCst).saturating_sub(1)
    }

    fn has_match_after<F>(&self, cursor: u64, filter: &F) -> bool
    where
        F: Fn(&T) -> bool,
    {
        self.entries
            .lock()
            .iter()
            .any(|e| e.id() > cursor && filter(e))
    }

    /// Long-polls for entries after `cursor` matching `filter`. Returns
    /// immediately if a match already exists; otherwise waits for the next
    /// `append` (re-checking, since `Notify` can wake spuriously relative to
    /// a specific predicate) up to `timeout`.
    pub async fn wait_for_after<F>(
        &self,
        cursor: u64,
        filter: F,
        limit: usize,
        timeout: Duration,
    ) -> (Vec<T>, bool)
    where
        F: Fn(&T) -> bool,
    {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            if self.has_match_after(cursor, &filter) {
                return (self.snapshot_after(cursor, &filter, limit), false);
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                return (Vec::new(), true);
            }

            let notified = self.notify.notified();
            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep(deadline - now) => {
                    return (Vec::new(), true);
                }
            }
        }
    }
}

fn default_true<T>(_: &T) -> bool {
    true
}

pub fn no_filter<T>() -> impl Fn(&T) -> bool {
    default_true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Log,
    Info,
    Warning,
    Error,
    Debug,
    Exception,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSource {
    Console,
    Exception,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: u64,
    pub ts: u64,
    pub level: LogLevel,
    pub text: String,
    #[serde(default)]
    pub args: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    #[serde(rename = "pageUrl", skip_serializing_if = "Option::is_none")]
    pub page_url: Option<String>,
    #[serde(rename = "pageTitle", skip_serializing_if = "Option::is_none")]
    pub page_title: Option<String>,
    pub source: LogSource,
}

impl HasId for LogEntry {
    fn id(&self) -> u64 {
        self.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchCase {
    Sensitive,
    Insensitive,
}

impl Default for MatchCase {
    fn default() -> Self {
        MatchCase::Insensitive
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogFilter {
    #[serde(default)]
    pub levels: Option<Vec<LogLevel>>,
    #[serde(rename = "match", default)]
    pub match_substrings: Option<Vec<String>>,
    #[serde(rename = "matchCase", default)]
    pub match_case: MatchCase,
    #[serde(default)]
    pub source: Option<LogSource>,
    #[serde(rename = "sinceTs", default)]
    pub since_ts: Option<u64>,
}

impl LogFilter {
    pub fn matches(&self, entry: &LogEntry) -> bool {
        if let Some(levels) = &self.levels {
            if !levels.contains(&entry.level) {
                return false;
            }
        }
        if let Some(source) = &self.source {
            if *source != entry.source {
                return false;
            }
        }
        if let Some(since_ts) = self.since_ts {
            if entry.ts < since_ts {
                return false;
            }
        }
        if let Some(patterns) = &self.match_substrings {
            let matched = match self.match_case {
                MatchCase::Sensitive => patterns.iter().any(|p| entry.text.contains(p.as_str())),
                MatchCase::Insensitive => {
                    let haystack = entry.text.to_lowercase();
                    patterns.iter().any(|p| haystack.contains(&p.to_lowercase()))
                }
            };
            if !matched {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkEntry {
    pub id: u64,
    pub ts: u64,
    #[serde(rename = "requestId")]
    pub request_id: String,
    pub url: String,
    pub method: String,
    #[serde(rename = "resourceType", skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(rename = "encodedDataLength", skip_serializing_if = "Option::is_none")]
    pub encoded_data_length: Option<u64>,
    #[serde(rename = "errorText", skip_serializing_if = "Option::is_none")]
    pub error_text: Option<String>,
    #[serde(rename = "durationMs", skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl HasId for NetworkEntry {
    fn id(&self) -> u64 {
        self.id
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkFilter {
    #[serde(default)]
    pub grep: Option<String>,
    #[serde(rename = "sinceTs", default)]
    pub since_ts: Option<u64>,
}

impl NetworkFilter {
    pub fn matches(&self, entry: &NetworkEntry) -> bool {
        if let Some(since_ts) = self.since_ts {
            if entry.ts < since_ts {
                return false;
            }
        }
        if let Some(grep) = &self.grep {
            let grep = grep.to_lowercase();
            if !entry.url.to_lowercase().contains(&grep) && !entry.method.to_lowercase().contains(&grep)
            {
                return false;
            }
        }
        true
    }
}

pub type LogBuffer = RingBuffer<LogEntry>;
pub type NetworkBuffer = RingBuffer<NetworkEntry>;

pub fn shared<T>(buf: RingBuffer<T>) -> Arc<RingBuffer<T>> {
    Arc::new(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: u64) -> LogEntry {
        LogEntry {
            id,
            ts: id,
            level: LogLevel::Log,
            text: format!("entry-{id}"),
            args: vec![],
            file: None,
            line: None,
            column: None,
            page_url: None,
            page_title: None,
            source: LogSource::Console,
        }
    }

    #[test]
    fn append_evicts_oldest_beyond_capacity() {
        let buf = RingBuffer::new(3);
        for i in 1..=5u64 {
            let id = buf.next_id();
            assert_eq!(id, i);
            buf.append(entry(id));
        }
        let snapshot = buf.snapshot_after(0, &no_filter(), 100);
        let ids: Vec<u64> = snapshot.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![3, 4, 5]);
    }

    #[test]
    fn snapshot_after_returns_strictly_increasing_ids_above_cursor() {
        let buf = RingBuffer::new(10);
        for i in 1..=5u64 {
            buf.append(entry(i));
        }
        let snapshot = buf.snapshot_after(2, &no_filter(), 100);
        let ids: Vec<u64> = snapshot.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![3, 4, 5]);
    }

    #[tokio::test]
    async fn wait_for_after_returns_synchronously_when_already_matching() {
        let buf = RingBuffer::new(10);
        buf.append(entry(1));
        let (entries, timed_out) = buf
            .wait_for_after(0, no_filter(), 10, Duration::from_millis(500))
            .await;
        assert!(!timed_out);
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn wait_for_after_times_out_with_empty_result() {
        let buf: RingBuffer<LogEntry> = RingBuffer::new(10);
        let (entries, timed_out) = buf
            .wait_for_after(0, no_filter(), 10, Duration::from_millis(50))
            .await;
        assert!(timed_out);
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn wait_for_after_wakes_on_matching_append() {
        let buf = Arc::new(RingBuffer::new(10));
        let waiter = {
            let buf = buf.clone();
            tokio::spawn(async move {
                buf.wait_for_after(0, no_filter(), 10, Duration::from_secs(5))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        buf.append(entry(1));
        let (entries, timed_out) = waiter.await.unwrap();
        assert!(!timed_out);
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn log_filter_matches_level_and_substring() {
        let filter = LogFilter {
            levels: Some(vec![LogLevel::Error]),
            match_substrings: Some(vec!["boom".into()]),
            match_case: MatchCase::Insensitive,
            source: None,
            since_ts: None,
        };
        let mut e = entry(1);
        e.level = LogLevel::Error;
        e.text = "kaboom".into();
        assert!(filter.matches(&e));
        e.level = LogLevel::Log;
        assert!(!filter.matches(&e));
    }

    #[test]
    fn log_filter_match_case_sensitive_rejects_different_casing() {
        let filter = LogFilter {
            match_substrings: Some(vec!["Boom".into()]),
            match_case: MatchCase::Sensitive,
            ..Default::default()
        };
        let mut e = entry(1);
        e.text = "kaboom".into();
        assert!(!filter.matches(&e));
        e.text = "kaBoom".into();
        assert!(filter.matches(&e));
    }
}
