//! Configuration validation.

use regex::Regex;

use crate::schema::Config;

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &Config) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_server(config, &mut result);
        Self::validate_relay(config, &mut result);
        Self::validate_privacy(config, &mut result);
        Self::validate_events(config, &mut result);

        result
    }

    fn validate_server(config: &Config, result: &mut ValidationResult) {
        if config.server.port == 0 {
            result.add_error(ValidationError::new("server.port", "Port cannot be 0"));
        }

        if config.server.host.is_empty() {
            result.add_error(ValidationError::new("server.host", "Host cannot be empty"));
        } else if config.server.host == "0.0.0.0" || config.server.host == "::" {
            result.add_warning(ValidationWarning::new(
                "server.host",
                "Relay is reachable from other hosts; browser payloads may leave this machine",
            ));
        }
    }

    fn validate_relay(config: &Config, result: &mut ValidationResult) {
        let relay = &config.relay;

        if relay.default_timeout_ms == 0 {
            result.add_error(ValidationError::new(
                "relay.default_timeout_ms",
                "Timeout must be greater than 0",
            ));
        }

        if relay.default_timeout_ms > relay.max_timeout_ms {
            result.add_error(ValidationError::new(
                "relay.default_timeout_ms",
                format!(
                    "Default timeout {}ms exceeds max_timeout_ms {}ms",
                    relay.default_timeout_ms, relay.max_timeout_ms
                ),
            ));
        }

        if relay.heartbeat_interval_secs == 0 {
            result.add_error(ValidationError::new(
                "relay.heartbeat_interval_secs",
                "Heartbeat interval must be greater than 0",
            ));
        }

        if relay.heartbeat_timeout_secs <= relay.heartbeat_interval_secs {
            result.add_error(ValidationError::new(
                "relay.heartbeat_timeout_secs",
                "Heartbeat timeout must be longer than the heartbeat interval",
            ));
        }

        if relay.outbound_queue == 0 {
            result.add_error(ValidationError::new(
                "relay.outbound_queue",
                "Outbound queue must hold at least one frame",
            ));
        }
    }

    fn validate_privacy(config: &Config, result: &mut ValidationResult) {
        let privacy = &config.privacy;

        if !(privacy.entropy_threshold > 0.0 && privacy.entropy_threshold <= 1.0) {
            result.add_error(ValidationError::new(
                "privacy.entropy_threshold",
                "Entropy threshold must be in (0, 1]",
            ));
        }

        if privacy.entropy_min_length < 8 {
            result.add_warning(ValidationWarning::new(
                "privacy.entropy_min_length",
                "Short minimum length makes redact-all mask ordinary words",
            ));
        }

        for (i, pattern) in privacy.sensitive_keys.iter().enumerate() {
            if let Err(e) = Regex::new(pattern) {
                result.add_error(ValidationError::new(
                    format!("privacy.sensitive_keys[{}]", i),
                    format!("Invalid regex: {}", e),
                ));
            }
        }

        for (i, pattern) in privacy.value_patterns.iter().enumerate() {
            if let Err(e) = Regex::new(pattern) {
                result.add_error(ValidationError::new(
                    format!("privacy.value_patterns[{}]", i),
                    format!("Invalid regex: {}", e),
                ));
            }
        }
    }

    fn validate_events(config: &Config, result: &mut ValidationResult) {
        let events = &config.events;
        let capacities = [
            ("events.console_capacity", events.console_capacity),
            ("events.network_capacity", events.network_capacity),
            ("events.error_capacity", events.error_capacity),
        ];

        for (path, capacity) in capacities {
            if capacity == 0 {
                result.add_error(ValidationError::new(path, "Capacity must be at least 1"));
            } else if capacity > 10_000 {
                result.add_warning(ValidationWarning::new(
                    path,
                    "Large buffers are returned whole on every read",
                ));
            }
        }

        if events.string_size_limit == 0 {
            result.add_error(ValidationError::new(
                "events.string_size_limit",
                "String size limit must be greater than 0",
            ));
        }
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
