//! Persisted CLI settings

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rotel_client::DeviceConfig;
use serde::{Deserialize, Serialize};

/// Contents of `settings.json`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Amplifier to talk to when `--host` is not given
    #[serde(default)]
    pub amplifier: Option<DeviceConfig>,
    /// How long one-shot commands wait for the amplifier to answer
    #[serde(default = "default_reply_timeout_ms")]
    pub reply_timeout_ms: u64,
}

fn default_reply_timeout_ms() -> u64 {
    3000
}

impl Settings {
    /// Get the XDG config directory for rotelctl
    /// Uses $XDG_CONFIG_HOME/rotelctl, falls back to ~/.config/rotelctl
    pub fn config_dir() -> Option<PathBuf> {
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_config);
            if path.is_absolute() {
                return Some(path.join("rotelctl"));
            }
        }

        dirs::home_dir().map(|h| h.join(".config").join("rotelctl"))
    }

    /// Default settings file path
    pub fn default_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("settings.json"))
    }

    /// Load settings from `path`; a missing file yields the defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        let json = match std::fs::read_to_string(path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No settings at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()))
            }
        };

        serde_json::from_str(&json).with_context(|| format!("Invalid settings in {}", path.display()))
    }

    /// Save settings to `path`, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let json = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            amplifier: None,
            reply_timeout_ms: default_reply_timeout_ms(),
        }
    }
}
