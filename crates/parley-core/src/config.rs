//! Engine configuration.
//!
//! All knobs have working defaults; a configuration file only overrides
//! what it names. Loading from disk lives in `parley-infrastructure`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Override for the snapshot file location. Defaults to the
    /// platform config directory when unset.
    pub snapshot_path: Option<PathBuf>,
    /// Delay used to coalesce bursts of mutations into one snapshot
    /// write.
    pub debounce_ms: u64,
    /// Local bound on how long a send may stay pending before it is
    /// surfaced as failed.
    pub send_timeout_secs: u64,
    /// Health poll cadence.
    pub health_interval_secs: u64,
    /// Snapshots whose `saved_at` predates this window are loaded but
    /// flagged stale.
    pub freshness_window_hours: u64,
    /// Character budget for auto-generated session titles.
    pub title_max_chars: usize,
    /// Base URL of the backend API.
    pub backend_base_url: String,
    /// Optional bearer token for the backend API.
    pub api_token: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            snapshot_path: None,
            debounce_ms: 500,
            send_timeout_secs: 30,
            health_interval_secs: 15,
            freshness_window_hours: 24,
            title_max_chars: 48,
            backend_base_url: "http://localhost:8000".to_string(),
            api_token: None,
        }
    }
}

impl EngineConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_secs)
    }

    pub fn freshness_window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.freshness_window_hours as i64)
    }
}
