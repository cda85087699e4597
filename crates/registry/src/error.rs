use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("could not determine argus home directory")]
    NoHomeDir,

    #[error("failed to acquire lock on {0}: {1}")]
    LockFailed(PathBuf, #[source] std::io::Error),

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize registry: {0}")]
    Serialize(#[source] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RegistryError>;
