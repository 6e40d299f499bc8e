//! Phase lists and task durations.
//!
//! # Accepted phase notations
//!
//! | Text | Phases |
//! |------|--------|
//! | `[1, 2, 3]` | 1, 2, 3 |
//! | `['1','2']` | 1, 2 (single quotes normalized) |
//! | `1-3` | 1, 2, 3 (inclusive range) |
//! | `1,3` | 1, 3 |
//! | `2` | 2 |

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::LazyLock;

use super::cell::parse_integer;

static DURATION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(-?\d+(?:\.\d+)?)\s*(hours?|days?|weeks?|months?)?\s*$")
        .expect("duration pattern is valid")
});

/// Unit attached to a duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationUnit {
    Hour,
    Day,
    Week,
    Month,
}

impl DurationUnit {
    fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().trim_end_matches('s') {
            "hour" => Some(Self::Hour),
            "day" => Some(Self::Day),
            "week" => Some(Self::Week),
            "month" => Some(Self::Month),
            _ => None,
        }
    }
}

/// Task duration: an amount of phases, optionally with a calendar unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Duration {
    /// Number of units (used as phase demand).
    pub amount: f64,
    /// Unit, or `None` for a bare number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<DurationUnit>,
}

impl Duration {
    /// A bare duration of `amount` phases.
    pub fn phases(amount: f64) -> Self {
        Self { amount, unit: None }
    }

    /// Parses `<number> <unit>` or a bare number.
    pub fn parse(raw: &str) -> Option<Self> {
        let caps = DURATION_PATTERN.captures(raw)?;
        let amount: f64 = caps.get(1)?.as_str().parse().ok()?;
        let unit = match caps.get(2) {
            Some(m) => Some(DurationUnit::parse(m.as_str())?),
            None => None,
        };
        Some(Self { amount, unit })
    }

    /// Whether the duration has an accepted shape: a non-negative amount
    /// with a unit, or a positive bare number.
    pub fn is_well_formed(&self) -> bool {
        match self.unit {
            Some(_) => self.amount >= 0.0,
            None => self.amount > 0.0,
        }
    }
}

/// Longest `a-b` range accepted in a phase cell.
pub const MAX_PHASE_SPAN: i64 = 100;

/// Parses a task's preferred phases in any accepted notation.
///
/// A range `a-b` expands to every phase from `a` to `b`; ranges running
/// backwards or spanning more than [`MAX_PHASE_SPAN`] phases are rejected.
pub fn parse_phase_list(raw: &str) -> Option<Vec<i64>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.starts_with('[') {
        return parse_json_phases(trimmed, true);
    }
    if let Some((start, end)) = trimmed.split_once('-') {
        if !start.trim().is_empty() {
            let start = parse_integer(start)?;
            let end = parse_integer(end)?;
            let span = end.checked_sub(start)?;
            return (0..MAX_PHASE_SPAN).contains(&span).then(|| (start..=end).collect());
        }
    }
    trimmed.split(',').map(parse_integer).collect()
}

/// Parses worker availability: a JSON array of integers, single quotes
/// normalized to double quotes. Quoted numbers are rejected.
pub fn parse_slot_array(raw: &str) -> Option<Vec<i64>> {
    parse_json_phases(raw.trim(), false)
}

fn parse_json_phases(raw: &str, allow_quoted: bool) -> Option<Vec<i64>> {
    let normalized = raw.replace('\'', "\"");
    let items: Vec<Value> = serde_json::from_str(&normalized).ok()?;
    items
        .iter()
        .map(|item| match item {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
            Value::String(s) if allow_quoted => parse_integer(s),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_with_unit() {
        let d = Duration::parse("3 weeks").unwrap();
        assert!((d.amount - 3.0).abs() < 1e-10);
        assert_eq!(d.unit, Some(DurationUnit::Week));
        assert!(d.is_well_formed());

        let d = Duration::parse("1 Day").unwrap();
        assert_eq!(d.unit, Some(DurationUnit::Day));
    }

    #[test]
    fn test_duration_bare_number() {
        let d = Duration::parse("4").unwrap();
        assert_eq!(d.unit, None);
        assert!(d.is_well_formed());

        let zero = Duration::parse("0").unwrap();
        assert!(!zero.is_well_formed());
        let negative = Duration::parse("-2").unwrap();
        assert!(!negative.is_well_formed());
    }

    #[test]
    fn test_duration_rejects_garbage() {
        assert!(Duration::parse("soon").is_none());
        assert!(Duration::parse("3 fortnights").is_none());
        assert!(Duration::parse("").is_none());
    }

    #[test]
    fn test_phase_list_notations() {
        assert_eq!(parse_phase_list("[1,2,3]"), Some(vec![1, 2, 3]));
        assert_eq!(parse_phase_list("['1','2']"), Some(vec![1, 2]));
        assert_eq!(parse_phase_list("1-3"), Some(vec![1, 2, 3]));
        assert_eq!(parse_phase_list("2 - 4"), Some(vec![2, 3, 4]));
        assert_eq!(parse_phase_list("1,3"), Some(vec![1, 3]));
        assert_eq!(parse_phase_list("2"), Some(vec![2]));
    }

    #[test]
    fn test_phase_list_invalid() {
        assert_eq!(parse_phase_list(""), None);
        assert_eq!(parse_phase_list("3-1"), None);
        assert_eq!(parse_phase_list("[1, x]"), None);
        assert_eq!(parse_phase_list("early"), None);
    }

    #[test]
    fn test_phase_range_bounded() {
        assert_eq!(parse_phase_list("1-100").map(|p| p.len()), Some(100));
        assert_eq!(parse_phase_list("1-101"), None);
        assert_eq!(parse_phase_list("1-10000000000"), None);
        assert_eq!(parse_phase_list("1-9223372036854775807"), None);
        assert_eq!(parse_phase_list("-9223372036854775808-9223372036854775807"), None);
    }

    #[test]
    fn test_slot_array() {
        assert_eq!(parse_slot_array("[1, 2, 3]"), Some(vec![1, 2, 3]));
        assert_eq!(parse_slot_array("[1,'a']"), None);
        assert_eq!(parse_slot_array("['1']"), None);
        assert_eq!(parse_slot_array("1,2"), None);
        assert_eq!(parse_slot_array("[]"), Some(vec![]));
    }
}
