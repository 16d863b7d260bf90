//! Unified path management for parley's local files.
//!
//! All durable engine files (the snapshot, the optional configuration
//! file) live under the platform configuration directory:
//!
//! ```text
//! ~/.config/parley/
//! ├── config.toml     # Engine configuration (optional)
//! └── snapshot.json   # Durable session snapshot
//! ```

use std::path::PathBuf;

/// Errors that can occur during path resolution.
#[derive(Debug)]
pub enum PathError {
    /// Platform configuration directory could not be determined.
    ConfigDirNotFound,
}

impl std::fmt::Display for PathError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathError::ConfigDirNotFound => write!(f, "Cannot find configuration directory"),
        }
    }
}

impl std::error::Error for PathError {}

/// Unified path management for parley.
pub struct ParleyPaths;

impl ParleyPaths {
    /// Returns the parley configuration directory.
    ///
    /// # Returns
    ///
    /// - `Ok(PathBuf)`: Path to config directory (e.g. `~/.config/parley/`)
    /// - `Err(PathError::ConfigDirNotFound)`: Could not determine directory
    pub fn config_dir() -> Result<PathBuf, PathError> {
        dirs::config_dir()
            .map(|dir| dir.join("parley"))
            .ok_or(PathError::ConfigDirNotFound)
    }

    /// Returns the path to the engine configuration file.
    pub fn config_file() -> Result<PathBuf, PathError> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Returns the path to the durable snapshot file.
    pub fn snapshot_file() -> Result<PathBuf, PathError> {
        Ok(Self::config_dir()?.join("snapshot.json"))
    }
}
