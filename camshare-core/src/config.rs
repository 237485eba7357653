//! Sharing configuration.
//!
//! Loaded from JSON; every field is optional and falls back to the
//! defaults below.
//!
//! ```json
//! { "capacity": 4, "grace_period_ms": 500, "refresh_interval_ms": 30, "keep_warm": false }
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShareConfig {
    /// Maximum simultaneous sharers; `<= 0` is unbounded.
    pub capacity: i64,
    /// Delay before the last holder releases, to absorb reconnects.
    pub grace_period_ms: u64,
    /// Cadence at which viewers (or the keep-warm driver) refresh.
    pub refresh_interval_ms: u64,
    /// Hold the resource open with no viewers attached.
    pub keep_warm: bool,
}

impl Default for ShareConfig {
    fn default() -> Self {
        Self {
            capacity: 4,
            grace_period_ms: 500,
            refresh_interval_ms: 30,
            keep_warm: false,
        }
    }
}

impl ShareConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Loading share config");
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn is_unbounded(&self) -> bool {
        self.capacity <= 0
    }
}
