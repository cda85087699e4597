//! Errors surfaced through the HTTP envelope (`{ok:false, error:{code, message}}`).
//! Every variant maps to exactly one wire code; adding a new failure mode
//! means adding both a variant and an arm in `code()`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArgusError {
    #[error("invalid request body: {0}")]
    InvalidBody(String),

    #[error("{0} not available")]
    NotAvailable(String),

    #[error("no target matched: {0}")]
    NoTarget(String),

    #[error("chrome unreachable: {0}")]
    ChromeUnreachable(String),

    #[error("not attached")]
    Disconnected,

    #[error("request timed out")]
    Timeout,

    #[error("cdp error: {0}")]
    CdpError(String),

    #[error("multiple targets matched: {0}")]
    MultipleMatches(String),

    #[error("network capture is disabled for this watcher")]
    NetDisabled,

    #[error("origin mismatch")]
    OriginMismatch,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ArgusError {
    pub fn code(&self) -> &'static str {
        match self {
            ArgusError::InvalidBody(_) => "invalid_body",
            ArgusError::NotAvailable(_) => "not_available",
            ArgusError::NoTarget(_) => "no_target",
            ArgusError::ChromeUnreachable(_) => "chrome_unreachable",
            ArgusError::Disconnected => "disconnected",
            ArgusError::Timeout => "timeout",
            ArgusError::CdpError(_) => "cdp_error",
            ArgusError::MultipleMatches(_) => "multiple_matches",
            ArgusError::NetDisabled => "net_disabled",
            ArgusError::OriginMismatch => "origin_mismatch",
            ArgusError::Io(_) => "io_error",
            ArgusError::Internal(_) => "internal",
        }
    }
}

impl From<argus_cdp::CdpError> for ArgusError {
    fn from(e: argus_cdp::CdpError) -> Self {
        match e {
            argus_cdp::CdpError::NoTarget(m) => ArgusError::NoTarget(m),
            argus_cdp::CdpError::ChromeUnreachable(m) => ArgusError::ChromeUnreachable(m),
            argus_cdp::CdpError::MultipleMatches(m) => ArgusError::MultipleMatches(m),
            argus_cdp::CdpError::Timeout => ArgusError::Timeout,
            argus_cdp::CdpError::Closed => ArgusError::Disconnected,
            argus_cdp::CdpError::Protocol { code, message } => {
                ArgusError::CdpError(format!("{code}: {message}"))
            }
            other => ArgusError::CdpError(other.to_string()),
        }
    }
}

impl From<argus_dom::DomError> for ArgusError {
    fn from(e: argus_dom::DomError) -> Self {
        ArgusError::Internal(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ArgusError>;
