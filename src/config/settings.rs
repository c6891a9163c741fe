#[cfg(test)]
#[path = "settings_test.rs"]
mod tests;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

use super::constants::AUTO_MODEL;
use super::defaults::*;
use super::utils::{init_parent_dir, resolve_path};

/// User preferences persisted between runs as a single JSON object.
///
/// Every field carries a serde default, so a file written by an older or
/// newer version still loads: missing keys fall back, unknown keys are
/// ignored.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Settings {
    #[serde(default = "default_model")]
    pub default_model: String,

    pub auto_speak: bool,

    #[serde(default = "speech_rate")]
    pub speech_rate: f32,

    #[serde(default = "speech_pitch")]
    pub speech_pitch: f32,

    #[serde(default = "language")]
    pub language: String,

    #[serde(default = "default_true")]
    pub show_metrics: bool,
}

impl Settings {
    /// Loads the settings stored at `path`. A missing or unreadable file and
    /// corrupt JSON all yield the defaults; corrupt content is discarded.
    pub fn load(path: &str) -> Settings {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) => {
                log::debug!("No settings loaded from {}: {}", path, err);
                return Settings::default();
            }
        };

        Settings::from_json(&raw).unwrap_or_else(|err| {
            log::warn!("Discarding corrupt settings at {}: {}", path, err);
            Settings::default()
        })
    }

    pub fn from_json(raw: &str) -> Result<Settings> {
        serde_json::from_str(raw).wrap_err("parsing settings")
    }

    pub fn save(&self, path: &str) -> Result<()> {
        init_parent_dir(path)?;
        let payload = serde_json::to_string_pretty(self).wrap_err("serializing settings")?;
        std::fs::write(path, payload).wrap_err(format!("writing settings to {}", path))?;
        Ok(())
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_model: AUTO_MODEL.to_string(),
            auto_speak: false,
            speech_rate: 1.0,
            speech_pitch: 1.0,
            language: "en-US".to_string(),
            show_metrics: true,
        }
    }
}

/// Expands `${VAR}` references in the configured settings location.
pub fn settings_path(configured: &str) -> Result<String> {
    resolve_path(configured).wrap_err(format!("resolving settings path {}", configured))
}
