//! Error types for DOM operations. Flat, no nesting.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DomError>;

#[derive(Debug, Error)]
pub enum DomError {
    #[error("node not found: {0}")]
    NodeNotFound(u32),

    #[error("invalid node type: expected {expected}, got {actual}")]
    InvalidNodeType { expected: String, actual: String },

    #[error("cdp protocol error: {0}")]
    CdpError(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("parse error: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
}
