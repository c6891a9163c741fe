use super::constants::*;

pub(crate) fn log_level() -> Option<String> {
    Some("info".to_string())
}

pub(crate) fn log_file_path() -> String {
    LOG_FILE_PATH.to_string()
}

pub(crate) fn settings_path() -> String {
    SETTINGS_FILE_PATH.to_string()
}

pub(crate) fn export_dir() -> String {
    EXPORT_DIR.to_string()
}

pub(crate) fn endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

pub(crate) fn timeout_secs() -> u64 {
    REQUEST_TIMEOUT_SECS
}

pub(crate) fn stream_idle_timeout_secs() -> u64 {
    STREAM_IDLE_TIMEOUT_SECS
}

pub(crate) fn history_limit() -> usize {
    HISTORY_LIMIT
}

pub(crate) fn search_limit() -> usize {
    SEARCH_LIMIT
}

pub(crate) fn metrics_interval_secs() -> u64 {
    METRICS_INTERVAL_SECS
}

pub(crate) fn default_model() -> String {
    AUTO_MODEL.to_string()
}

pub(crate) fn speech_rate() -> f32 {
    1.0
}

pub(crate) fn speech_pitch() -> f32 {
    1.0
}

pub(crate) fn language() -> String {
    "en-US".to_string()
}

pub(crate) fn default_true() -> bool {
    true
}
