use std::path::PathBuf;

use crate::error::{RegistryError, Result};

/// Resolves `$ARGUS_HOME` (default `~/.argus`).
pub fn argus_home() -> Result<PathBuf> {
    if let Ok(home) = std::env::var("ARGUS_HOME") {
        return Ok(PathBuf::from(home));
    }
    dirs::home_dir()
        .map(|h| h.join(".argus"))
        .ok_or(RegistryError::NoHomeDir)
}

/// Resolves the registry file path, honoring `$ARGUS_REGISTRY_PATH` as an
/// override of the default `$ARGUS_HOME/registry.json`.
pub fn registry_path() -> Result<PathBuf> {
    if let Ok(p) = std::env::var("ARGUS_REGISTRY_PATH") {
        return Ok(PathBuf::from(p));
    }
    Ok(argus_home()?.join("registry.json"))
}

pub fn lock_path_for(registry_path: &std::path::Path) -> PathBuf {
    let mut p = registry_path.as_os_str().to_owned();
    p.push(".lock");
    PathBuf::from(p)
}
