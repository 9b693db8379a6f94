//! View configuration for loopgrid
//!
//! Configuration is stored as YAML in the user's config directory.
//! Default location: ~/.config/loopgrid/config.yaml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    /// Display settings (grid geometry, waveform resolution)
    pub display: DisplayConfig,
    /// Engine synchronization settings (poll cadence, timeouts)
    pub sync: SyncConfig,
}

/// Display configuration section
///
/// The snap and fold behaviors are heuristics tuned against observed
/// engine timing jitter, so they are configuration rather than constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Visual width of one quantum in pixels
    pub base_quantum_width: f64,
    /// How close (in quantum fractions) an anchor must be to a grid line
    /// to snap onto it; boundary inclusive
    pub snap_tolerance: f64,
    /// How close a snapped ratio must be to the wrap boundary to fold
    /// back to the period start
    pub wrap_fold_epsilon: f64,
    /// Live-recording peak buckets per quantum
    pub live_resolution_per_quantum: usize,
    /// Peak count requested when fetching a finalized waveform
    pub waveform_resolution: usize,
    /// Hard ceiling on ghost repetitions per clip
    pub ghost_limit: usize,
    /// Pixel tolerance for grouping nodes into a stack column
    pub stack_tolerance: f64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            base_quantum_width: 200.0,
            // Engine jitter is a few samples out of ~175k per quantum;
            // 0.02 absorbs it without promoting 1.97Q into column 2
            snap_tolerance: 0.02,
            wrap_fold_epsilon: 1e-3,
            live_resolution_per_quantum: 16,
            waveform_resolution: 200,
            ghost_limit: 19,
            stack_tolerance: 50.0,
        }
    }
}

/// Engine synchronization section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Poll cadence in milliseconds
    pub poll_interval_ms: u64,
    /// Bounded window for any engine request
    pub request_timeout_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 50,      // 20Hz keeps live waveforms smooth
            request_timeout_ms: 1000,  // never hang the loop on a stalled engine
        }
    }
}

/// Get the default config file path
///
/// Returns: ~/.config/loopgrid/config.yaml
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join("loopgrid")
        .join("config.yaml")
}

/// Load configuration from a YAML file
///
/// If the file doesn't exist, returns default config.
/// If the file exists but is invalid, logs a warning and returns default config.
pub fn load_config(path: &Path) -> ViewConfig {
    if !path.exists() {
        log::info!("load_config: Config file doesn't exist, using defaults");
        return ViewConfig::default();
    }

    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_yaml::from_str::<ViewConfig>(&contents) {
            Ok(config) => {
                log::info!(
                    "load_config: Loaded config - quantum width: {:.0}px, poll interval: {}ms",
                    config.display.base_quantum_width,
                    config.sync.poll_interval_ms
                );
                config
            }
            Err(e) => {
                log::warn!("load_config: Failed to parse config: {}, using defaults", e);
                ViewConfig::default()
            }
        },
        Err(e) => {
            log::warn!(
                "load_config: Failed to read config file: {}, using defaults",
                e
            );
            ViewConfig::default()
        }
    }
}

/// Save configuration to a YAML file
///
/// Creates parent directories if they don't exist.
pub fn save_config(config: &ViewConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
    }

    let yaml = serde_yaml::to_string(config).context("Failed to serialize config to YAML")?;

    std::fs::write(path, yaml)
        .with_context(|| format!("Failed to write config file: {:?}", path))?;

    Ok(())
}
