//! Store limits and their loading.
//!
//! Read once at startup from `curvedit.json` in the config directory; a missing
//! file means defaults. `CURVEDIT_MAX_POINTS` overrides the per-curve limit.

use std::path::Path;

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::paths::{config_file, PathConfig};

pub const CONFIG_FILE: &str = "curvedit.json";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Upper bound on points accepted by one curve write
    pub max_points_per_curve: usize,
    /// Upper bound on distinct curves
    pub max_curves: usize,
    /// Total frame count before any image sequence is loaded
    pub default_total_frames: i32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_points_per_curve: 1_000_000,
            max_curves: 10_000,
            default_total_frames: 1,
        }
    }
}

impl StoreConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read store config: {}", path.display()))?;
        let config: StoreConfig = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse store config: {}", path.display()))?;
        Ok(config.sanitized())
    }

    pub fn to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize store config")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write store config: {}", path.display()))
    }

    /// Apply `CURVEDIT_MAX_POINTS` if it parses.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(raw) = std::env::var("CURVEDIT_MAX_POINTS") {
            match raw.parse::<usize>() {
                Ok(n) => self.max_points_per_curve = n,
                Err(_) => warn!("Ignoring CURVEDIT_MAX_POINTS={:?}: not a number", raw),
            }
        }
        self.sanitized()
    }

    fn sanitized(mut self) -> Self {
        self.default_total_frames = self.default_total_frames.max(1);
        self
    }
}

/// Load `curvedit.json` from the config dir, falling back to defaults if absent.
pub fn load_store_config(paths: &PathConfig) -> Result<StoreConfig> {
    let path = config_file(CONFIG_FILE, paths);
    let config = if path.exists() {
        info!("Loading store config from {}", path.display());
        StoreConfig::from_file(&path)?
    } else {
        info!("No store config at {}, using defaults", path.display());
        StoreConfig::default()
    };
    Ok(config.with_env_overrides())
}
