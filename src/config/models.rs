use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::constants::*;
use super::defaults::*;

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct Configuration {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub log: LogConfig,

    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub voice: VoiceConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct GeneralConfig {
    #[serde(default = "settings_path")]
    pub settings_path: String,

    #[serde(default = "export_dir")]
    pub export_dir: String,

    #[serde(default)]
    pub verbose: bool,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct LogConfig {
    #[serde(default = "log_level")]
    pub level: Option<String>,

    #[serde(default)]
    pub filters: Option<Vec<LogFilter>>,

    #[serde(default)]
    pub file: LogFile,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct LogFilter {
    #[serde(default)]
    pub module: Option<String>,

    #[serde(default)]
    pub level: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct LogFile {
    #[serde(default = "log_file_path")]
    pub path: String,

    #[serde(default)]
    pub append: bool,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct BackendConfig {
    #[serde(default = "endpoint")]
    pub endpoint: String,

    #[serde(default = "timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "stream_idle_timeout_secs")]
    pub stream_idle_timeout_secs: u64,

    #[serde(default = "history_limit")]
    pub history_limit: usize,

    #[serde(default = "search_limit")]
    pub search_limit: usize,

    #[serde(default = "metrics_interval_secs")]
    pub metrics_interval_secs: u64,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct VoiceConfig {
    /// Program that reads text on stdin and speaks it, e.g. `espeak`.
    #[serde(default)]
    pub speak_command: Option<String>,

    #[serde(default)]
    pub speak_args: Vec<String>,
}

impl BackendConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    pub fn stream_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_idle_timeout_secs.max(1))
    }

    pub fn metrics_interval(&self) -> Duration {
        Duration::from_secs(self.metrics_interval_secs.max(1))
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            settings_path: SETTINGS_FILE_PATH.to_string(),
            export_dir: EXPORT_DIR.to_string(),
            verbose: false,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Some("info".to_string()),
            file: LogFile::default(),
            filters: None,
        }
    }
}

impl Default for LogFile {
    fn default() -> Self {
        Self {
            path: LOG_FILE_PATH.to_string(),
            append: false,
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout_secs: REQUEST_TIMEOUT_SECS,
            stream_idle_timeout_secs: STREAM_IDLE_TIMEOUT_SECS,
            history_limit: HISTORY_LIMIT,
            search_limit: SEARCH_LIMIT,
            metrics_interval_secs: METRICS_INTERVAL_SECS,
        }
    }
}
