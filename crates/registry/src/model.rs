use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub const REGISTRY_VERSION: u32 = 1;

/// Substrings a watcher was started with to select its target, echoed back
/// so `argus list` can show what each watcher is attached to.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MatchSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WatcherRecord {
    pub id: String,
    pub pid: u32,
    pub host: String,
    pub port: u16,
    #[serde(rename = "startedAt")]
    pub started_at: u64,
    #[serde(rename = "heartbeatAt")]
    pub heartbeat_at: u64,
    pub cwd: String,
    #[serde(rename = "matchSpec")]
    pub match_spec: MatchSpec,
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Registry {
    pub version: u32,
    pub watchers: HashMap<String, WatcherRecord>,
}

impl Registry {
    pub fn empty() -> Self {
        Self {
            version: REGISTRY_VERSION,
            watchers: HashMap::new(),
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::empty()
    }
}
