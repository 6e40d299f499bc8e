//! Client priority.
//!
//! Sheets express priority either as a level word (`High`, `Medium`, `Low`)
//! or as an integer 1-5. Anything else is kept verbatim so the validators can
//! report it.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::cell::parse_integer;

/// Lowest accepted numeric priority.
pub const MIN_PRIORITY: i64 = 1;
/// Highest accepted numeric priority.
pub const MAX_PRIORITY: i64 = 5;

/// Named priority level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PriorityLevel {
    High,
    Medium,
    Low,
}

impl PriorityLevel {
    /// Parses a level word case-insensitively.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }

    /// Ranking score: High 3, Medium 2, Low 1.
    pub fn score(self) -> i64 {
        match self {
            Self::High => 3,
            Self::Medium => 2,
            Self::Low => 1,
        }
    }

    /// Position on the numeric 1-5 scale (Low 1, Medium 3, High 5).
    pub fn as_numeric(self) -> i64 {
        match self {
            Self::High => 5,
            Self::Medium => 3,
            Self::Low => 1,
        }
    }
}

/// A client priority as read from the sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Priority {
    /// `High` / `Medium` / `Low`.
    Level(PriorityLevel),
    /// Integer priority (valid range 1-5).
    Numeric(i64),
    /// Text that is neither a level nor an integer.
    Unrecognized(String),
}

impl Priority {
    /// Parses a priority cell.
    pub fn parse(raw: &str) -> Self {
        if let Some(level) = PriorityLevel::parse(raw) {
            return Self::Level(level);
        }
        match parse_integer(raw) {
            Some(value) => Self::Numeric(value),
            None => Self::Unrecognized(raw.trim().to_string()),
        }
    }

    /// Whether the priority is a level or an integer in 1-5.
    pub fn is_valid(&self) -> bool {
        match self {
            Self::Level(_) => true,
            Self::Numeric(value) => (MIN_PRIORITY..=MAX_PRIORITY).contains(value),
            Self::Unrecognized(_) => false,
        }
    }

    /// Ranking score used by allocation ordering.
    ///
    /// Levels map to 3/2/1, integers are used directly, unrecognized text
    /// counts as 1.
    pub fn score(&self) -> f64 {
        match self {
            Self::Level(level) => level.score() as f64,
            Self::Numeric(value) => *value as f64,
            Self::Unrecognized(_) => 1.0,
        }
    }

    /// Value on the numeric 1-5 scale, if one exists.
    pub fn as_numeric(&self) -> Option<i64> {
        match self {
            Self::Level(level) => Some(level.as_numeric()),
            Self::Numeric(value) => Some(*value),
            Self::Unrecognized(_) => None,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::Level(PriorityLevel::Medium)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Level(level) => write!(f, "{level:?}"),
            Self::Numeric(value) => write!(f, "{value}"),
            Self::Unrecognized(raw) => f.write_str(raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_levels_case_insensitive() {
        assert_eq!(Priority::parse("high"), Priority::Level(PriorityLevel::High));
        assert_eq!(Priority::parse(" MEDIUM "), Priority::Level(PriorityLevel::Medium));
        assert_eq!(Priority::parse("Low"), Priority::Level(PriorityLevel::Low));
    }

    #[test]
    fn test_parse_numeric_and_unrecognized() {
        assert_eq!(Priority::parse("4"), Priority::Numeric(4));
        assert_eq!(Priority::parse("9"), Priority::Numeric(9));
        assert_eq!(Priority::parse("urgent"), Priority::Unrecognized("urgent".into()));
    }

    #[test]
    fn test_validity() {
        assert!(Priority::parse("High").is_valid());
        assert!(Priority::parse("1").is_valid());
        assert!(Priority::parse("5").is_valid());
        assert!(!Priority::parse("0").is_valid());
        assert!(!Priority::parse("6").is_valid());
        assert!(!Priority::parse("asap").is_valid());
    }

    #[test]
    fn test_score() {
        assert!((Priority::parse("High").score() - 3.0).abs() < 1e-10);
        assert!((Priority::parse("Low").score() - 1.0).abs() < 1e-10);
        assert!((Priority::parse("4").score() - 4.0).abs() < 1e-10);
        assert!((Priority::parse("??").score() - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_serde_round_trip() {
        for p in [
            Priority::Level(PriorityLevel::High),
            Priority::Numeric(2),
            Priority::Unrecognized("soon".into()),
        ] {
            let json = serde_json::to_string(&p).unwrap();
            let back: Priority = serde_json::from_str(&json).unwrap();
            assert_eq!(back, p);
        }
    }
}
