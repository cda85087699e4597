use thiserror::Error;

use crate::protocol::RequestId;

#[derive(Error, Debug)]
pub enum CdpError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("cdp protocol error: {code} {message}")]
    Protocol { code: i32, message: String },

    #[error("request timed out")]
    Timeout,

    #[error("connection closed")]
    Closed,

    #[error("invalid response for request {0}")]
    InvalidResponse(RequestId),

    #[error("no target matched {0}")]
    NoTarget(String),

    #[error("chrome unreachable at {0}")]
    ChromeUnreachable(String),

    #[error("multiple targets matched {0}, expected exactly one")]
    MultipleMatches(String),
}

pub type Result<T> = std::result::Result<T, CdpError>;
