//! Filter mode and target selection policy.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How much of a browser payload is masked before it leaves the relay.
///
/// The canonical names are `redact-all`, `redact-sensitive` and
/// `redact-none`. The labels the extension UI has historically used
/// (`hide-all`, `hide-sensitive`, `hide-nothing`, `show-all`) are accepted
/// on input and mapped onto the same three modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterMode {
    /// Pattern redaction plus the entropy fallback.
    #[serde(alias = "hide-all")]
    RedactAll,
    /// Pattern and sensitive-key redaction.
    #[default]
    #[serde(alias = "hide-sensitive")]
    RedactSensitive,
    /// Payloads pass through untouched.
    #[serde(alias = "hide-nothing", alias = "show-all")]
    RedactNone,
}

impl FilterMode {
    pub const ALL: [FilterMode; 3] = [Self::RedactAll, Self::RedactSensitive, Self::RedactNone];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RedactAll => "redact-all",
            Self::RedactSensitive => "redact-sensitive",
            Self::RedactNone => "redact-none",
        }
    }
}

impl fmt::Display for FilterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a filter mode string is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown filter mode: {0}")]
pub struct UnknownFilterMode(pub String);

impl FromStr for FilterMode {
    type Err = UnknownFilterMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "redact-all" | "hide-all" => Ok(Self::RedactAll),
            "redact-sensitive" | "hide-sensitive" => Ok(Self::RedactSensitive),
            "redact-none" | "hide-nothing" | "show-all" => Ok(Self::RedactNone),
            _ => Err(UnknownFilterMode(s.to_string())),
        }
    }
}

/// Which active connection receives the next operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionPolicy {
    /// The connection with the most recent inbound traffic.
    #[default]
    MostRecentlyActive,
    /// The longest-lived active connection.
    FirstAvailable,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_mode_canonical_serialization() {
        assert_eq!(serde_json::to_string(&FilterMode::RedactNone).unwrap(), "\"redact-none\"");
        assert_eq!(serde_json::to_string(&FilterMode::RedactAll).unwrap(), "\"redact-all\"");
    }

    #[test]
    fn test_filter_mode_accepts_legacy_labels() {
        let hide_nothing: FilterMode = serde_json::from_str("\"hide-nothing\"").unwrap();
        let show_all: FilterMode = serde_json::from_str("\"show-all\"").unwrap();
        let hide_all: FilterMode = serde_json::from_str("\"hide-all\"").unwrap();
        assert_eq!(hide_nothing, FilterMode::RedactNone);
        assert_eq!(show_all, FilterMode::RedactNone);
        assert_eq!(hide_all, FilterMode::RedactAll);
    }

    #[test]
    fn test_filter_mode_from_str() {
        assert_eq!("Redact_Sensitive".parse::<FilterMode>().unwrap(), FilterMode::RedactSensitive);
        assert_eq!("show-all".parse::<FilterMode>().unwrap(), FilterMode::RedactNone);
        assert!("everything".parse::<FilterMode>().is_err());
    }

    #[test]
    fn test_filter_mode_display_roundtrips_through_from_str() {
        for mode in FilterMode::ALL {
            assert_eq!(mode.to_string().parse::<FilterMode>().unwrap(), mode);
        }
    }

    #[test]
    fn test_selection_policy_serde() {
        let policy: SelectionPolicy = serde_json::from_str("\"first-available\"").unwrap();
        assert_eq!(policy, SelectionPolicy::FirstAvailable);
        assert_eq!(SelectionPolicy::default(), SelectionPolicy::MostRecentlyActive);
    }
}
