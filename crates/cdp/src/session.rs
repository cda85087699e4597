//! A session attached to a single page target.
//!
//! Unlike a general-purpose automation client that juggles many tabs, a
//! watcher attaches to exactly one target for its whole lifetime; this type
//! reflects that by holding a single `session_id`, not a map of them.

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::client::CdpClient;
use crate::error::{CdpError, Result};
use crate::protocol::{AttachToTargetResult, SessionId, TargetId, TargetInfo};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Domains enabled on attach (and re-enabled on every reattach). Network is
/// enabled separately since capture is configurable.
pub const CORE_DOMAINS: &[&str] = &["Runtime", "Log", "Page", "DOM", "DOMStorage"];

#[derive(Clone)]
pub struct CdpSession {
    client: Arc<CdpClient>,
    pub target_id: TargetId,
    pub session_id: SessionId,
}

impl CdpSession {
    pub async fn attach(client: Arc<CdpClient>, target: &TargetInfo) -> Result<Self> {
        let result: AttachToTargetResult = serde_json::from_value(
            client
                .send_request_timeout(
                    "Target.attachToTarget",
                    Some(json!({ "targetId": target.target_id, "flatten": true })),
                    None,
                    REQUEST_TIMEOUT,
                )
                .await?,
        )?;

        let session = Self {
            client,
            target_id: target.target_id.clone(),
            session_id: result.session_id,
        };

        for domain in CORE_DOMAINS {
            session.enable_domain(domain).await?;
        }

        Ok(session)
    }

    pub async fn enable_domain(&self, domain: &str) -> Result<()> {
        self.send(&format!("{domain}.enable"), None).await?;
        Ok(())
    }

    pub async fn enable_network(&self) -> Result<()> {
        self.enable_domain("Network").await
    }

    pub async fn send(&self, method: &str, params: Option<Value>) -> Result<Value> {
        self.client
            .send_request_timeout(
                method,
                params,
                Some(self.session_id.clone()),
                REQUEST_TIMEOUT,
            )
            .await
    }

    pub async fn navigate(&self, url: &str) -> Result<()> {
        self.send("Page.navigate", Some(json!({ "url": url })))
            .await?;
        Ok(())
    }

    pub async fn reload(&self) -> Result<()> {
        self.send("Page.reload", Some(json!({}))).await?;
        Ok(())
    }

    pub async fn evaluate(&self, expression: &str) -> Result<Value> {
        let result = self
            .send(
                "Runtime.evaluate",
                Some(json!({ "expression": expression, "returnByValue": true, "awaitPromise": true })),
            )
            .await?;
        result
            .get("result")
            .and_then(|r| r.get("value"))
            .cloned()
            .ok_or_else(|| CdpError::Protocol {
                code: 0,
                message: "Runtime.evaluate returned no value".into(),
            })
    }

    pub async fn get_document(&self) -> Result<Value> {
        self.send(
            "DOM.getDocument",
            Some(json!({ "depth": -1, "pierce": true })),
        )
        .await
    }

    /// Resolves a CSS selector against the current document to a backend
    /// node id, or `None` if nothing matches.
    pub async fn query_selector(&self, selector: &str) -> Result<Option<i64>> {
        let doc = self.get_document().await?;
        let root_node_id = doc
            .get("root")
            .and_then(|r| r.get("nodeId"))
            .and_then(|v| v.as_i64())
            .ok_or_else(|| CdpError::Protocol {
                code: 0,
                message: "DOM.getDocument returned no root".into(),
            })?;

        let result = self
            .send(
                "DOM.querySelector",
                Some(json!({ "nodeId": root_node_id, "selector": selector })),
            )
            .await?;
        let node_id = result.get("nodeId").and_then(|v| v.as_i64()).unwrap_or(0);
        if node_id == 0 {
            return Ok(None);
        }

        let described = self
            .send(
                "DOM.describeNode",
                Some(json!({ "nodeId": node_id, "depth": 0 })),
            )
            .await?;
        Ok(described
            .get("node")
            .and_then(|n| n.get("backendNodeId"))
            .and_then(|v| v.as_i64()))
    }

    pub async fn box_model(&self, backend_node_id: i64) -> Result<Value> {
        self.send(
            "DOM.getBoxModel",
            Some(json!({ "backendNodeId": backend_node_id })),
        )
        .await
    }
}
