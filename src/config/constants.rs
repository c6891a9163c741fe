/// Sentinel model name meaning "let the backend route the request".
pub const AUTO_MODEL: &str = "auto";

/// Auto-generated conversation titles keep this many characters.
pub const TITLE_MAX_CHARS: usize = 30;

pub const DEFAULT_ENDPOINT: &str = "http://localhost:8080";

pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Upper bound on the silence between two chunks of a chat stream.
pub const STREAM_IDLE_TIMEOUT_SECS: u64 = 120;

pub const HISTORY_LIMIT: usize = 50;

pub const SEARCH_LIMIT: usize = 20;

pub const METRICS_INTERVAL_SECS: u64 = 5;

pub const LOG_FILE_PATH: &str = "/tmp/nexus-chat.log";

pub const SETTINGS_FILE_PATH: &str = "${HOME}/.config/nexus-chat/settings.json";

pub const EXPORT_DIR: &str = ".";

pub const HELLO_MESSAGE: &str = "NEXUS is ready. Type a message, or /help for commands.";
