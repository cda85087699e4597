//! Wire types for the Chrome DevTools Protocol JSON-RPC framing.
//!
//! Keep these minimal; domain-specific payloads are decoded on demand by the
//! callers that need them rather than modeled exhaustively here.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request ID, monotonically increasing per connection.
pub type RequestId = u64;

/// Target ID as assigned by the browser.
pub type TargetId = String;

/// Session ID returned by `Target.attachToTarget`.
pub type SessionId = String;

#[derive(Debug, Clone, Serialize)]
pub struct CdpRequest {
    pub id: RequestId,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CdpResponse {
    pub id: RequestId,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<CdpError>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CdpError {
    pub code: i32,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CdpEvent {
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(rename = "sessionId", default)]
    pub session_id: Option<SessionId>,
}

/// A decoded inbound frame is either a response to one of our requests, or an
/// unsolicited event. There is no `id` field on events, which is what makes
/// the untagged decode unambiguous.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CdpMessage {
    Response(CdpResponse),
    Event(CdpEvent),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TargetInfo {
    #[serde(rename = "targetId")]
    pub target_id: TargetId,
    #[serde(rename = "type")]
    pub target_type: String,
    pub title: String,
    pub url: String,
    pub attached: bool,
    #[serde(rename = "webSocketDebuggerUrl", default)]
    pub web_socket_debugger_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttachToTargetResult {
    #[serde(rename = "sessionId")]
    pub session_id: SessionId,
}
