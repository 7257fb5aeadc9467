//! Configuration loader.

use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::ConfigError;
use crate::schema::Config;

static ENV_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("valid env var pattern"));

/// Configuration loader with environment variable substitution.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let content = fs::read_to_string(path)?;
        Self::load_str(&content)
    }

    /// Load configuration from a file, falling back to defaults when the
    /// file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Config, ConfigError> {
        match Self::load(path) {
            Err(ConfigError::NotFound(_)) => Ok(Config::default()),
            other => other,
        }
    }

    /// Load configuration from a string.
    pub fn load_str(content: &str) -> Result<Config, ConfigError> {
        let expanded = Self::expand_env_vars(content)?;
        let config: Config = toml::from_str(&expanded)?;
        Ok(config)
    }

    /// Expand environment variables in the format `${VAR}`.
    fn expand_env_vars(content: &str) -> Result<String, ConfigError> {
        let mut result = content.to_string();

        for cap in ENV_VAR.captures_iter(content) {
            let var_name = &cap[1];
            let var_value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotSet(var_name.to_string()))?;
            result = result.replace(&cap[0], &var_value);
        }

        Ok(result)
    }

    /// Expand shell-style paths (e.g., `~/.tabrelay`).
    pub fn expand_path(path: &str) -> String {
        shellexpand::tilde(path).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tabrelay_protocols::{FilterMode, SelectionPolicy};
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_empty_config() {
        let config = ConfigLoader::load_str("").unwrap();
        assert_eq!(config.server.port, 3025);
        assert_eq!(config.privacy.mode, FilterMode::RedactSensitive);
    }

    #[test]
    fn test_shipped_default_config_matches_defaults() {
        let config = ConfigLoader::load_str(include_str!("../../../config/default.toml")).unwrap();
        let defaults = Config::default();
        assert_eq!(config.server.port, defaults.server.port);
        assert_eq!(config.relay.default_timeout_ms, defaults.relay.default_timeout_ms);
        assert_eq!(config.relay.selection_policy, SelectionPolicy::MostRecentlyActive);
        assert_eq!(config.privacy.mode, FilterMode::RedactSensitive);
        assert_eq!(config.events.console_capacity, defaults.events.console_capacity);
        assert!(crate::ConfigValidator::validate(&config).is_valid());
    }

    #[test]
    fn test_load_basic_config() {
        let content = r#"
            [server]
            host = "0.0.0.0"
            port = 4000
        "#;
        let config = ConfigLoader::load_str(content).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 4000);
    }

    #[test]
    fn test_load_full_config() {
        let content = r#"
            [relay]
            default_timeout_ms = 5000
            max_timeout_ms = 60000
            selection_policy = "first-available"
            heartbeat_interval_secs = 2
            heartbeat_timeout_secs = 10

            [privacy]
            mode = "hide-all"
            entropy_threshold = 0.7
            sensitive_keys = ["^x-internal-"]

            [events]
            console_capacity = 200
            include_request_headers = true
        "#;
        let config = ConfigLoader::load_str(content).unwrap();
        assert_eq!(config.relay.default_timeout_ms, 5000);
        assert_eq!(config.relay.selection_policy, SelectionPolicy::FirstAvailable);
        assert_eq!(config.privacy.mode, FilterMode::RedactAll);
        assert_eq!(config.privacy.sensitive_keys, vec!["^x-internal-".to_string()]);
        assert_eq!(config.events.console_capacity, 200);
        assert_eq!(config.events.network_capacity, 50);
        assert!(config.events.include_request_headers);
        assert!(!config.events.include_response_headers);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[server]").unwrap();
        writeln!(file, "port = 5000").unwrap();

        let config = ConfigLoader::load(file.path()).unwrap();
        assert_eq!(config.server.port, 5000);
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = ConfigLoader::load(Path::new("/nonexistent/path/config.toml"));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = ConfigLoader::load_or_default(Path::new("/nonexistent/tabrelay.toml")).unwrap();
        assert_eq!(config.server.port, 3025);
    }

    #[test]
    fn test_load_invalid_toml() {
        let result = ConfigLoader::load_str("invalid = [unclosed");
        assert!(matches!(result, Err(ConfigError::TomlParse(_))));
    }

    #[test]
    fn test_load_unknown_mode_fails() {
        let result = ConfigLoader::load_str("[privacy]\nmode = \"paranoid\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_expand_env_vars() {
        // SAFETY: This test runs in isolation and sets a unique test-only env var
        unsafe {
            std::env::set_var("TABRELAY_TEST_CONFIG_VAR", "4321");
        }
        let config = ConfigLoader::load_str("[server]\nport = ${TABRELAY_TEST_CONFIG_VAR}").unwrap();
        assert_eq!(config.server.port, 4321);
        unsafe {
            std::env::remove_var("TABRELAY_TEST_CONFIG_VAR");
        }
    }

    #[test]
    fn test_expand_env_vars_not_set() {
        let content = "value = \"${TABRELAY_NONEXISTENT_VAR_12345}\"";
        let result = ConfigLoader::expand_env_vars(content);
        assert!(matches!(result, Err(ConfigError::EnvVarNotSet(_))));
    }

    #[test]
    fn test_expand_env_vars_no_vars() {
        let content = "value = \"no variables here\"";
        let expanded = ConfigLoader::expand_env_vars(content).unwrap();
        assert_eq!(expanded, content);
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let expanded = ConfigLoader::expand_path("~/logs");
        assert!(!expanded.starts_with('~'));
        assert!(expanded.ends_with("/logs"));
    }

    #[test]
    fn test_expand_path_no_tilde() {
        assert_eq!(ConfigLoader::expand_path("/var/log"), "/var/log");
    }
}
