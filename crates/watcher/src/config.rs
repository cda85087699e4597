//! Environment-driven configuration. Loaded once at startup; never reloaded.

use argus_cdp::MatchSpec;

#[derive(Debug, Clone)]
pub struct WatcherConfig {
    pub port: u16,
    pub chrome_host: String,
    pub chrome_port: u16,
    pub match_spec: MatchSpec,
    pub log_capacity: usize,
    pub net_capacity: usize,
    pub network_capture_enabled: bool,
    pub restore_on_exit: bool,
    pub artifacts_dir: std::path::PathBuf,
    pub file_logging_enabled: bool,
}

impl WatcherConfig {
    pub const DEFAULT_LOG_CAPACITY: usize = 5000;
    pub const DEFAULT_NET_CAPACITY: usize = 2000;

    /// Builds configuration from environment variables, following the
    /// defaults fixed in the external interface:
    /// `ARGUS_HOME`, `ARGUS_CHROME_HOST`/`ARGUS_CHROME_PORT`,
    /// `ARGUS_WATCHER_PORT`, `ARGUS_MATCH_URL`/`ARGUS_MATCH_TITLE`.
    pub fn from_env() -> Self {
        let chrome_host = std::env::var("ARGUS_CHROME_HOST").unwrap_or_else(|_| "localhost".into());
        let chrome_port = std::env::var("ARGUS_CHROME_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(9222);
        let port = std::env::var("ARGUS_WATCHER_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        let match_spec = MatchSpec {
            url_contains: std::env::var("ARGUS_MATCH_URL").ok(),
            title_contains: std::env::var("ARGUS_MATCH_TITLE").ok(),
        };

        let artifacts_dir = argus_home().join("artifacts");

        Self {
            port,
            chrome_host,
            chrome_port,
            match_spec,
            log_capacity: Self::DEFAULT_LOG_CAPACITY,
            net_capacity: Self::DEFAULT_NET_CAPACITY,
            network_capture_enabled: std::env::var("ARGUS_NETWORK_CAPTURE")
                .map(|v| v != "0")
                .unwrap_or(true),
            restore_on_exit: std::env::var("ARGUS_RESTORE_ON_EXIT")
                .map(|v| v != "0")
                .unwrap_or(true),
            artifacts_dir,
            file_logging_enabled: std::env::var("ARGUS_FILE_LOGGING")
                .map(|v| v == "1")
                .unwrap_or(false),
        }
    }
}

pub fn argus_home() -> std::path::PathBuf {
    std::env::var("ARGUS_HOME")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| dirs::home_dir().unwrap_or_default().join(".argus"))
}
