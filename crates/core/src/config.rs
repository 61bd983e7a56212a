//! TOML-based configuration for the diff/merge engine.
//!
//! Everything has a sensible default, so an absent file section (or an
//! entirely default [`AppConfig`]) is always valid.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::ConfigError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level engine configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Entry-matching behaviour.
    #[serde(default)]
    pub scan: ScanConfig,

    /// Change-monitor channel sizing.
    #[serde(default)]
    pub watch: WatchConfig,
}

impl AppConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }
        let raw = std::fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&raw).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        info!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Validate all values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.scan.match_threshold) {
            return Err(ConfigError::InvalidValue {
                field: "scan.match_threshold".into(),
                detail: format!(
                    "must be between 0 and 1, got {}",
                    self.scan.match_threshold
                ),
            });
        }
        if self.watch.channel_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "watch.channel_capacity".into(),
                detail: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Scan
// ---------------------------------------------------------------------------

/// Entry-matching behaviour of the snapshot scanner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Minimum similarity score for the content-based matching fallback.
    ///
    /// Consulted only when neither the stable id nor the citation key links
    /// two entries; candidates must additionally relate as equal, subset, or
    /// superset. The 0.4 default is loose enough to follow an entry that
    /// gained fields, without conflating genuinely different records.
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f64,
}

fn default_match_threshold() -> f64 {
    0.4
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            match_threshold: default_match_threshold(),
        }
    }
}

// ---------------------------------------------------------------------------
// Watch
// ---------------------------------------------------------------------------

/// Sizing of the change monitor's signal and report channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Capacity of the file-changed signal and scan-report channels
    /// (default 16). Signals beyond capacity apply backpressure to the
    /// watcher; the monitor coalesces bursts anyway.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_channel_capacity() -> usize {
    16
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}
