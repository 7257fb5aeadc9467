//! Categories of unsolicited extension events.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Bucket an unsolicited event is stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    Console,
    Network,
    Error,
}

impl EventCategory {
    pub const ALL: [EventCategory; 3] = [Self::Console, Self::Network, Self::Error];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Console => "console",
            Self::Network => "network",
            Self::Error => "error",
        }
    }

    /// Stable position used to index per-category storage.
    pub fn index(&self) -> usize {
        match self {
            Self::Console => 0,
            Self::Network => 1,
            Self::Error => 2,
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "console" => Ok(Self::Console),
            "network" => Ok(Self::Network),
            "error" | "errors" => Ok(Self::Error),
            other => Err(format!("Unknown event category: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_indices_are_distinct() {
        let mut seen = [false; 3];
        for category in EventCategory::ALL {
            assert!(!seen[category.index()]);
            seen[category.index()] = true;
        }
    }

    #[test]
    fn test_category_parse() {
        assert_eq!("network".parse::<EventCategory>().unwrap(), EventCategory::Network);
        assert_eq!("errors".parse::<EventCategory>().unwrap(), EventCategory::Error);
        assert!("dom".parse::<EventCategory>().is_err());
    }
}
