//! Configuration schema definitions.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tabrelay_protocols::{FilterMode, SelectionPolicy};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub relay: RelayConfig,

    #[serde(default)]
    pub privacy: PrivacyConfig,

    #[serde(default)]
    pub events: EventsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3025
}

/// Request broker and connection liveness settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Timeout applied when a caller does not name one.
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,

    /// Upper bound for caller-supplied timeouts.
    #[serde(default = "default_max_timeout_ms")]
    pub max_timeout_ms: u64,

    /// How the target connection is chosen.
    #[serde(default)]
    pub selection_policy: SelectionPolicy,

    /// How often the heartbeat sweep runs.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// Silence after which a connection is considered dead.
    #[serde(default = "default_heartbeat_timeout")]
    pub heartbeat_timeout_secs: u64,

    /// How long a draining connection may keep in-flight requests.
    #[serde(default = "default_drain_grace")]
    pub drain_grace_secs: u64,

    /// Outbound frames buffered per connection.
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,
}

impl RelayConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub fn max_timeout(&self) -> Duration {
        Duration::from_millis(self.max_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }

    pub fn drain_grace(&self) -> Duration {
        Duration::from_secs(self.drain_grace_secs)
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_timeout_ms(),
            max_timeout_ms: default_max_timeout_ms(),
            selection_policy: SelectionPolicy::default(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            heartbeat_timeout_secs: default_heartbeat_timeout(),
            drain_grace_secs: default_drain_grace(),
            outbound_queue: default_outbound_queue(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    15_000
}

fn default_max_timeout_ms() -> u64 {
    120_000
}

fn default_heartbeat_interval() -> u64 {
    5
}

fn default_heartbeat_timeout() -> u64 {
    30
}

fn default_drain_grace() -> u64 {
    5
}

fn default_outbound_queue() -> usize {
    64
}

/// Sensitive-data filtering settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivacyConfig {
    /// Process-wide filter mode at startup.
    #[serde(default)]
    pub mode: FilterMode,

    /// Normalized entropy above which a long token counts as random.
    #[serde(default = "default_entropy_threshold")]
    pub entropy_threshold: f64,

    /// Minimum token length considered by the entropy detector.
    #[serde(default = "default_entropy_min_length")]
    pub entropy_min_length: usize,

    /// Extra key-name regexes treated as sensitive.
    #[serde(default)]
    pub sensitive_keys: Vec<String>,

    /// Extra value regexes treated as sensitive.
    #[serde(default)]
    pub value_patterns: Vec<String>,

    /// Whether callers may choose a mode per request.
    #[serde(default = "default_true")]
    pub allow_mode_override: bool,
}

impl Default for PrivacyConfig {
    fn default() -> Self {
        Self {
            mode: FilterMode::default(),
            entropy_threshold: default_entropy_threshold(),
            entropy_min_length: default_entropy_min_length(),
            sensitive_keys: Vec::new(),
            value_patterns: Vec::new(),
            allow_mode_override: default_true(),
        }
    }
}

fn default_entropy_threshold() -> f64 {
    0.65
}

fn default_entropy_min_length() -> usize {
    24
}

fn default_true() -> bool {
    true
}

/// Event buffer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    #[serde(default = "default_capacity")]
    pub console_capacity: usize,

    #[serde(default = "default_capacity")]
    pub network_capacity: usize,

    #[serde(default = "default_capacity")]
    pub error_capacity: usize,

    /// String leaves longer than this are truncated before storage.
    #[serde(default = "default_string_size_limit")]
    pub string_size_limit: usize,

    #[serde(default)]
    pub include_request_headers: bool,

    #[serde(default)]
    pub include_response_headers: bool,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            console_capacity: default_capacity(),
            network_capacity: default_capacity(),
            error_capacity: default_capacity(),
            string_size_limit: default_string_size_limit(),
            include_request_headers: false,
            include_response_headers: false,
        }
    }
}

fn default_capacity() -> usize {
    50
}

fn default_string_size_limit() -> usize {
    500
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Directory for rolling log files (default: ~/.tabrelay/logs).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,

    /// Whether to write log files at all.
    #[serde(default = "default_true")]
    pub file: bool,
}

impl LoggingConfig {
    /// Directory log files are written to, with `~` expanded.
    pub fn resolved_directory(&self) -> PathBuf {
        match &self.directory {
            Some(dir) => PathBuf::from(shellexpand::tilde(&dir.to_string_lossy()).to_string()),
            None => dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".tabrelay")
                .join("logs"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: None,
            file: default_true(),
        }
    }
}

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;
