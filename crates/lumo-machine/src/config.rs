//! Engine configuration via `lumo.toml`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{MachineError, MachineResult};

/// Name of the per-deployment config file.
pub const CONFIG_FILENAME: &str = "lumo.toml";

fn default_state() -> String {
    "off".to_string()
}

fn default_render_floor_ms() -> u64 {
    10
}

fn default_remote_floor_ms() -> u64 {
    2000
}

fn default_protected() -> Vec<String> {
    vec!["on".to_string(), "off".to_string()]
}

fn default_ema_alpha() -> f64 {
    0.3
}

/// Runtime settings for the engine and its collaborators.
///
/// Compiled-in defaults work without any file; a `lumo.toml` overrides
/// individual fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// State entered at startup and after reset.
    #[serde(default = "default_state")]
    pub default_state: String,

    /// Minimum milliseconds between render ticks, bounding device call rate.
    #[serde(default = "default_render_floor_ms")]
    pub render_floor_ms: u64,

    /// Minimum watcher interval for remote/LLM-backed detectors.
    #[serde(default = "default_remote_floor_ms")]
    pub remote_interval_floor_ms: u64,

    /// States the tool layer refuses to delete.
    #[serde(default = "default_protected")]
    pub protected_states: Vec<String>,

    /// Smoothing factor for continuous sensor signals (volume).
    #[serde(default = "default_ema_alpha")]
    pub ema_alpha: f64,

    /// Directory for the JSON file stores (memory, pipelines).
    #[serde(default)]
    pub store_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_state: default_state(),
            render_floor_ms: default_render_floor_ms(),
            remote_interval_floor_ms: default_remote_floor_ms(),
            protected_states: default_protected(),
            ema_alpha: default_ema_alpha(),
            store_dir: None,
        }
    }
}

impl EngineConfig {
    /// Load from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> MachineResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config: EngineConfig = toml::from_str(&content).map_err(|e| MachineError::Config {
            message: format!("invalid {}: {e}", path.display()),
        })?;
        info!(path = %path.display(), "engine_config_loaded");
        Ok(config)
    }

    /// Load from a TOML file, falling back to defaults when absent.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if path.exists() {
            match Self::load(path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "engine_config_invalid");
                }
            }
        } else {
            debug!(path = %path.display(), "engine_config_missing");
        }
        Self::default()
    }

    /// Whether a state name is protected from deletion.
    pub fn is_protected(&self, name: &str) -> bool {
        self.protected_states.iter().any(|s| s == name)
    }
}
