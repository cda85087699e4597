//! Read/modify/write access to the shared registry file.
//!
//! Every mutation takes the advisory lock first, reads the current file,
//! applies the change, and writes via temp-file-then-rename so a reader
//! never observes a partially written file. The lock's critical section is
//! kept to exactly that read-modify-write span; no I/O happens afterward
//! while still holding it.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::Rng;

use crate::error::Result;
use crate::lock::RegistryLock;
use crate::model::{Registry, WatcherRecord};
use crate::paths::{lock_path_for, registry_path};

const MAX_UPDATE_RETRIES: u32 = 5;
const RETRY_JITTER_MS: u64 = 50;

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// A non-fatal issue encountered while reading the registry; the caller
/// still gets a usable (possibly empty) `Registry` back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadWarning {
    Missing,
    ParseError(String),
    UnknownVersion(u32),
}

pub struct ReadResult {
    pub registry: Registry,
    pub warnings: Vec<ReadWarning>,
}

pub struct RegistryStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl RegistryStore {
    pub fn open_default() -> Result<Self> {
        let path = registry_path()?;
        Self::at(path)
    }

    pub fn at(path: PathBuf) -> Result<Self> {
        let lock_path = lock_path_for(&path);
        Ok(Self { path, lock_path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the registry without locking. Readers tolerate a torn write in
    /// flight by falling back to an empty registry with a warning rather
    /// than failing outright — a CLI listing watchers should never crash
    /// because a write raced it.
    pub fn read(&self) -> ReadResult {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return ReadResult {
                    registry: Registry::empty(),
                    warnings: vec![ReadWarning::Missing],
                };
            }
            Err(_) => {
                return ReadResult {
                    registry: Registry::empty(),
                    warnings: vec![ReadWarning::ParseError("unreadable file".into())],
                };
            }
        };

        match serde_json::from_str::<Registry>(&contents) {
            Ok(r) if r.version == crate::model::REGISTRY_VERSION => ReadResult {
                registry: r,
                warnings: vec![],
            },
            Ok(r) => ReadResult {
                registry: Registry::empty(),
                warnings: vec![ReadWarning::UnknownVersion(r.version)],
            },
            Err(e) => ReadResult {
                registry: Registry::empty(),
                warnings: vec![ReadWarning::ParseError(e.to_string())],
            },
        }
    }

    /// Locks, reads, applies `f`, writes back if `f` returned `true`
    /// (changed), and releases the lock. Retries on lock contention.
    pub fn update<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&mut Registry) -> bool,
    {
        let mut attempt = 0;
        loop {
            match RegistryLock::acquire(&self.lock_path) {
                Ok(lock) => {
                    if let Some(parent) = self.path.parent() {
                        std::fs::create_dir_all(parent).ok();
                    }
                    let mut registry = self.read().registry;
                    let changed = f(&mut registry);
                    if changed {
                        self.write_locked(&registry)?;
                    }
                    drop(lock);
                    return Ok(());
                }
                Err(e) => {
                    attempt += 1;
                    if attempt >= MAX_UPDATE_RETRIES {
                        return Err(e);
                    }
                    let jitter = rand::thread_rng().gen_range(0..RETRY_JITTER_MS);
                    std::thread::sleep(Duration::from_millis(RETRY_JITTER_MS + jitter));
                }
            }
        }
    }

    fn write_locked(&self, registry: &Registry) -> Result<()> {
        let tmp_path = self.path.with_extension("json.tmp");
        let body =
            serde_json::to_vec_pretty(registry).map_err(crate::error::RegistryError::Serialize)?;
        std::fs::write(&tmp_path, &body).map_err(|e| crate::error::RegistryError::Io {
            path: tmp_path.clone(),
            source: e,
        })?;
        std::fs::rename(&tmp_path, &self.path).map_err(|e| crate::error::RegistryError::Io {
            path: self.path.clone(),
            source: e,
        })?;
        Ok(())
    }

    pub fn upsert(&self, record: WatcherRecord) -> Result<()> {
        self.update(|r| {
            r.watchers.insert(record.id.clone(), record.clone());
            true
        })
    }

    pub fn remove(&self, id: &str) -> Result<()> {
        self.update(|r| r.watchers.remove(id).is_some())
    }

    pub fn heartbeat(&self, id: &str, now: u64) -> Result<()> {
        self.update(|r| {
            if let Some(rec) = r.watchers.get_mut(id) {
                rec.heartbeat_at = now;
                true
            } else {
                false
            }
        })
    }

    /// Removes watchers whose heartbeat is older than `ttl_ms`.
    pub fn prune_stale(&self, now: u64, ttl_ms: u64) -> Result<Vec<String>> {
        let mut removed = Vec::new();
        self.update(|r| {
            let stale: Vec<String> = r
                .watchers
                .iter()
                .filter(|(_, rec)| now.saturating_sub(rec.heartbeat_at) > ttl_ms)
                .map(|(id, _)| id.clone())
                .collect();
            for id in &stale {
                r.watchers.remove(id);
            }
            removed = stale;
            !removed.is_empty()
        })?;
        Ok(removed)
    }

    /// Removes watchers whose `/status` endpoint does not answer within
    /// `probe_timeout`. Slower than `prune_stale`; meant for an explicit
    /// `argus prune --reachability` invocation, not the heartbeat path.
    pub async fn prune_reachability(
        &self,
        client: &reqwest::Client,
        probe_timeout: Duration,
    ) -> Result<Vec<String>> {
        let snapshot = self.read().registry;
        let mut unreachable = Vec::new();
        for (id, rec) in &snapshot.watchers {
            let url = format!("http://{}:{}/status", rec.host, rec.port);
            let reachable = client
                .get(&url)
                .timeout(probe_timeout)
                .send()
                .await
                .map(|resp| resp.status().is_success())
                .unwrap_or(false);
            if !reachable {
                unreachable.push(id.clone());
            }
        }

        if !unreachable.is_empty() {
            self.update(|r| {
                let mut changed = false;
                for id in &unreachable {
                    if r.watchers.remove(id).is_some() {
                        changed = true;
                    }
                }
                changed
            })?;
        }
        Ok(unreachable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MatchSpec;

    fn sample_record(id: &str, heartbeat_at: u64) -> WatcherRecord {
        WatcherRecord {
            id: id.to_string(),
            pid: 1234,
            host: "127.0.0.1".to_string(),
            port: 9000,
            started_at: 1000,
            heartbeat_at,
            cwd: "/tmp".to_string(),
            match_spec: MatchSpec {
                url: Some("localhost:3000".to_string()),
                title: None,
            },
            protocol_version: "1".to_string(),
        }
    }

    #[test]
    fn round_trip_upsert_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let store = RegistryStore::at(dir.path().join("registry.json")).unwrap();

        store.upsert(sample_record("a", 1000)).unwrap();
        store.upsert(sample_record("b", 1000)).unwrap();

        let read = store.read();
        assert!(read.warnings.is_empty());
        assert_eq!(read.registry.watchers.len(), 2);
        assert!(read.registry.watchers.contains_key("a"));
    }

    #[test]
    fn missing_file_reads_as_empty_with_warning() {
        let dir = tempfile::tempdir().unwrap();
        let store = RegistryStore::at(dir.path().join("registry.json")).unwrap();
        let read = store.read();
        assert_eq!(read.warnings, vec![ReadWarning::Missing]);
        assert!(read.registry.watchers.is_empty());
    }

    #[test]
    fn prune_stale_removes_only_expired() {
        let dir = tempfile::tempdir().unwrap();
        let store = RegistryStore::at(dir.path().join("registry.json")).unwrap();
        store.upsert(sample_record("fresh", 9_000)).unwrap();
        store.upsert(sample_record("stale", 1_000)).unwrap();

        let removed = store.prune_stale(10_000, 5_000).unwrap();
        assert_eq!(removed, vec!["stale".to_string()]);

        let read = store.read();
        assert!(read.registry.watchers.contains_key("fresh"));
        assert!(!read.registry.watchers.contains_key("stale"));
    }

    #[test]
    fn prune_stale_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = RegistryStore::at(dir.path().join("registry.json")).unwrap();
        store.upsert(sample_record("stale", 1_000)).unwrap();

        store.prune_stale(10_000, 5_000).unwrap();
        let after_first = store.read().registry;
        store.prune_stale(10_000, 5_000).unwrap();
        let after_second = store.read().registry;

        assert_eq!(after_first, after_second);
    }

    #[test]
    fn remove_missing_id_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let store = RegistryStore::at(dir.path().join("registry.json")).unwrap();
        store.upsert(sample_record("a", 1000)).unwrap();
        store.remove("does-not-exist").unwrap();
        assert_eq!(store.read().registry.watchers.len(), 1);
    }

    #[test]
    fn concurrent_updates_are_not_lost() {
        use std::sync::Arc;
        use std::thread;

        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(RegistryStore::at(dir.path().join("registry.json")).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                thread::spawn(move || {
                    store.upsert(sample_record(&format!("w{i}"), 1000)).unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(store.read().registry.watchers.len(), 8);
    }
}
