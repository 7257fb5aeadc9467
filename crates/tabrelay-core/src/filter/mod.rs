//! Privacy filter.
//!
//! Every payload that leaves the relay, whether an operation result or a
//! buffered browser event, passes through [`FilterEngine::filter`]. The
//! function is pure: the same payload and mode always produce the same
//! output, and filtering an already-filtered payload is a no-op.

pub mod detectors;
pub mod entropy;

use std::borrow::Cow;

use parking_lot::RwLock;
use serde_json::Value;
use tabrelay_protocols::FilterMode;
use thiserror::Error;

use detectors::{
    BUILTIN_KEY_DETECTORS, BUILTIN_VALUE_DETECTORS, KeyDetector, ValueDetector,
    apply_outside_placeholders, normalize_key,
};
pub use entropy::{EntropyDetector, normalized_entropy};

/// Errors raised while building a filter engine.
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("Invalid sensitive key pattern '{pattern}': {source}")]
    InvalidKeyPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid value pattern '{pattern}': {source}")]
    InvalidValuePattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Tunables for a [`FilterEngine`].
#[derive(Debug, Clone, PartialEq)]
pub struct FilterSettings {
    pub entropy_threshold: f64,
    pub entropy_min_length: usize,
    /// Extra key regexes, matched case-insensitively against raw keys.
    pub sensitive_keys: Vec<String>,
    /// Extra value regexes, applied after the built-in detectors.
    pub value_patterns: Vec<String>,
}

impl Default for FilterSettings {
    fn default() -> Self {
        let entropy = EntropyDetector::default();
        Self {
            entropy_threshold: entropy.threshold,
            entropy_min_length: entropy.min_length,
            sensitive_keys: Vec::new(),
            value_patterns: Vec::new(),
        }
    }
}

/// Immutable set of detectors applied to JSON payloads.
#[derive(Debug, Clone)]
pub struct FilterEngine {
    custom_keys: Vec<KeyDetector>,
    custom_values: Vec<ValueDetector>,
    entropy: EntropyDetector,
}

impl FilterEngine {
    pub fn new(settings: &FilterSettings) -> Result<Self, FilterError> {
        let custom_keys = settings
            .sensitive_keys
            .iter()
            .map(|pattern| {
                KeyDetector::custom(pattern).map_err(|source| FilterError::InvalidKeyPattern {
                    pattern: pattern.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let custom_values = settings
            .value_patterns
            .iter()
            .map(|pattern| {
                ValueDetector::custom(pattern).map_err(|source| FilterError::InvalidValuePattern {
                    pattern: pattern.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            custom_keys,
            custom_values,
            entropy: EntropyDetector::new(settings.entropy_threshold, settings.entropy_min_length),
        })
    }

    /// Filter a JSON payload according to `mode`.
    ///
    /// Structure is preserved: only string and number leaves are ever
    /// replaced, and only by placeholder strings.
    pub fn filter(&self, payload: &Value, mode: FilterMode) -> Value {
        if mode == FilterMode::RedactNone {
            return payload.clone();
        }
        self.walk(payload, mode, None)
    }

    /// Filter a single free-text string.
    pub fn filter_text<'a>(&self, text: &'a str, mode: FilterMode) -> Cow<'a, str> {
        match mode {
            FilterMode::RedactNone => Cow::Borrowed(text),
            FilterMode::RedactSensitive => self.redact_patterns(text),
            FilterMode::RedactAll => {
                let patterned = self.redact_patterns(text);
                let replaced = match self.entropy.redact_tokens(&patterned) {
                    Cow::Owned(replaced) => Some(replaced),
                    Cow::Borrowed(_) => None,
                };
                match replaced {
                    Some(replaced) => Cow::Owned(replaced),
                    None => patterned,
                }
            }
        }
    }

    /// Placeholder to use for everything under `key`, if the key is sensitive.
    pub fn sensitive_key_placeholder(&self, key: &str) -> Option<&'static str> {
        let normalized = normalize_key(key);
        BUILTIN_KEY_DETECTORS
            .iter()
            .chain(self.custom_keys.iter())
            .find(|detector| detector.matches(key, &normalized))
            .map(KeyDetector::placeholder)
    }

    fn redact_patterns<'a>(&self, text: &'a str) -> Cow<'a, str> {
        let mut current = Cow::Borrowed(text);
        for detector in BUILTIN_VALUE_DETECTORS.iter().chain(self.custom_values.iter()) {
            if let Some(replaced) = apply_outside_placeholders(detector, &current) {
                current = Cow::Owned(replaced);
            }
        }
        current
    }

    fn walk(&self, value: &Value, mode: FilterMode, inherited: Option<&'static str>) -> Value {
        match value {
            Value::String(text) => match inherited {
                Some(placeholder) => Value::String(placeholder.to_string()),
                None => Value::String(self.filter_text(text, mode).into_owned()),
            },
            Value::Number(_) => match inherited {
                Some(placeholder) => Value::String(placeholder.to_string()),
                None => value.clone(),
            },
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.walk(item, mode, inherited))
                    .collect(),
            ),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(key, item)| {
                        let placeholder =
                            inherited.or_else(|| self.sensitive_key_placeholder(key));
                        (key.clone(), self.walk(item, mode, placeholder))
                    })
                    .collect(),
            ),
            Value::Bool(_) | Value::Null => value.clone(),
        }
    }
}

impl Default for FilterEngine {
    fn default() -> Self {
        Self {
            custom_keys: Vec::new(),
            custom_values: Vec::new(),
            entropy: EntropyDetector::default(),
        }
    }
}

/// Process-wide current filter mode.
#[derive(Debug, Default)]
pub struct ModeSwitch {
    current: RwLock<FilterMode>,
}

impl ModeSwitch {
    pub fn new(mode: FilterMode) -> Self {
        Self {
            current: RwLock::new(mode),
        }
    }

    pub fn get(&self) -> FilterMode {
        *self.current.read()
    }

    /// Replace the mode, returning the previous one.
    pub fn set(&self, mode: FilterMode) -> FilterMode {
        std::mem::replace(&mut *self.current.write(), mode)
    }
}

#[cfg(test)]
#[path = "filter_tests.rs"]
mod tests;
