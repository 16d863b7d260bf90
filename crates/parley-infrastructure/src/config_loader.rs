//! Engine configuration loading.
//!
//! A missing configuration file is not an error (defaults apply); a
//! malformed one is, so that typos do not silently fall back to
//! defaults.

use crate::paths::ParleyPaths;
use parley_core::config::EngineConfig;
use parley_core::error::{ParleyError, Result};
use std::path::Path;
use tokio::fs;

/// Loads the engine configuration from the given file, or from
/// `~/.config/parley/config.toml` when `path` is `None`.
pub async fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => ParleyPaths::config_file()
            .map_err(|e| ParleyError::config(format!("Failed to resolve config path: {}", e)))?,
    };

    let raw = match fs::read_to_string(&path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(
                "[config] No config file at {}, using defaults",
                path.display()
            );
            return Ok(EngineConfig::default());
        }
        Err(e) => return Err(e.into()),
    };

    let config: EngineConfig = toml::from_str(&raw)?;
    tracing::info!("[config] Loaded configuration from {}", path.display());
    Ok(config)
}
