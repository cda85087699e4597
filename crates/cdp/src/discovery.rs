//! Target discovery against the browser's `/json` HTTP endpoint.

use std::time::Duration;

use serde::Deserialize;

use crate::error::{CdpError, Result};
use crate::protocol::TargetInfo;

/// Substrings to match against a target's `url` or `title`, case-insensitively.
/// A target matches if either field, when present, contains the corresponding
/// substring; fields left `None` are not checked.
#[derive(Debug, Clone, Default)]
pub struct MatchSpec {
    pub url_contains: Option<String>,
    pub title_contains: Option<String>,
}

impl MatchSpec {
    pub fn is_empty(&self) -> bool {
        self.url_contains.is_none() && self.title_contains.is_none()
    }

    fn matches(&self, target: &TargetInfo) -> bool {
        if target.target_type != "page" {
            return false;
        }
        let url_ok = self
            .url_contains
            .as_ref()
            .map(|s| target.url.to_lowercase().contains(&s.to_lowercase()))
            .unwrap_or(true);
        let title_ok = self
            .title_contains
            .as_ref()
            .map(|s| target.title.to_lowercase().contains(&s.to_lowercase()))
            .unwrap_or(true);
        url_ok && title_ok
    }

    fn describe(&self) -> String {
        format!(
            "url~={:?} title~={:?}",
            self.url_contains, self.title_contains
        )
    }
}

/// Minimal shape of `Browser/Version`, used only to confirm Chrome is up.
#[derive(Debug, Deserialize)]
struct VersionInfo {
    #[serde(rename = "webSocketDebuggerUrl")]
    #[allow(dead_code)]
    web_socket_debugger_url: Option<String>,
}

/// Poll `http://{host}:{port}/json` until a target matches `spec` or
/// `max_wait` elapses. Returns `CdpError::NoTarget` on timeout and
/// `CdpError::ChromeUnreachable` if the endpoint never answers at all.
pub async fn discover_target(
    client: &reqwest::Client,
    host: &str,
    port: u16,
    spec: &MatchSpec,
    max_wait: Duration,
) -> Result<TargetInfo> {
    let list_url = format!("http://{host}:{port}/json");
    let poll_interval = Duration::from_millis(500);
    let deadline = tokio::time::Instant::now() + max_wait;
    let mut ever_reached = false;
    let mut last_err: Option<CdpError> = None;

    loop {
        match list_targets(client, &list_url).await {
            Ok(targets) => {
                ever_reached = true;
                let mut matches: Vec<TargetInfo> =
                    targets.into_iter().filter(|t| spec.matches(t)).collect();
                match matches.len() {
                    0 => {}
                    1 => return Ok(matches.remove(0)),
                    _ => return Err(CdpError::MultipleMatches(spec.describe())),
                }
            }
            Err(e) => last_err = Some(e),
        }

        if tokio::time::Instant::now() >= deadline {
            return if ever_reached {
                Err(CdpError::NoTarget(spec.describe()))
            } else {
                Err(last_err.unwrap_or_else(|| CdpError::ChromeUnreachable(list_url.clone())))
            };
        }
        tokio::time::sleep(poll_interval).await;
    }
}

async fn list_targets(client: &reqwest::Client, list_url: &str) -> Result<Vec<TargetInfo>> {
    let resp = client
        .get(list_url)
        .send()
        .await
        .map_err(|_| CdpError::ChromeUnreachable(list_url.to_string()))?;
    let targets: Vec<TargetInfo> = resp.json().await?;
    Ok(targets)
}

/// Quick reachability probe used by the registry's reachability GC and by
/// `discover_target`'s error classification.
pub async fn probe_version(client: &reqwest::Client, host: &str, port: u16) -> Result<()> {
    let url = format!("http://{host}:{port}/json/version");
    client
        .get(&url)
        .timeout(Duration::from_secs(2))
        .send()
        .await
        .map_err(|_| CdpError::ChromeUnreachable(url))?
        .json::<VersionInfo>()
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(url: &str, title: &str, kind: &str) -> TargetInfo {
        TargetInfo {
            target_id: "t1".into(),
            target_type: kind.into(),
            title: title.into(),
            url: url.into(),
            attached: false,
            web_socket_debugger_url: Some("ws://127.0.0.1:9222/devtools/page/t1".into()),
        }
    }

    #[test]
    fn match_spec_filters_non_page_targets() {
        let spec = MatchSpec {
            url_contains: Some("localhost:3000".into()),
            title_contains: None,
        };
        let worker = target("http://localhost:3000/sw.js", "", "service_worker");
        assert!(!spec.matches(&worker));
        let page = target("http://localhost:3000/a", "App", "page");
        assert!(spec.matches(&page));
    }

    #[test]
    fn match_spec_is_case_insensitive() {
        let spec = MatchSpec {
            url_contains: None,
            title_contains: Some("Dashboard".into()),
        };
        let page = target("http://x", "My DASHBOARD View", "page");
        assert!(spec.matches(&page));
    }

    #[test]
    fn empty_spec_matches_any_page() {
        let spec = MatchSpec::default();
        assert!(spec.matches(&target("http://x", "", "page")));
    }
}
