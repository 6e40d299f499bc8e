//! Lenient cell values.
//!
//! Spreadsheet cells arrive as text. Some fields are judged by the
//! cross-reference pass rather than the structural pass, so an admitted row
//! must still carry the original text when it does not parse.

use serde::{Deserialize, Serialize};

/// A parsed cell, or the original text when parsing failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue<T> {
    /// The cell parsed into the field's type.
    Parsed(T),
    /// The cell text did not parse.
    Unparsed(String),
}

impl<T> CellValue<T> {
    /// Builds a cell from an optional parse result.
    pub fn from_parse(parsed: Option<T>, raw: &str) -> Self {
        match parsed {
            Some(value) => Self::Parsed(value),
            None => Self::Unparsed(raw.to_string()),
        }
    }

    /// The parsed value, if any.
    pub fn parsed(&self) -> Option<&T> {
        match self {
            Self::Parsed(value) => Some(value),
            Self::Unparsed(_) => None,
        }
    }

    /// Whether the cell parsed.
    pub fn is_parsed(&self) -> bool {
        matches!(self, Self::Parsed(_))
    }

    /// The original text of an unparsed cell.
    pub fn unparsed(&self) -> Option<&str> {
        match self {
            Self::Parsed(_) => None,
            Self::Unparsed(raw) => Some(raw),
        }
    }
}

/// Parses an integer cell, accepting integral decimals such as `"3.0"`.
pub(crate) fn parse_integer(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if let Ok(value) = trimmed.parse::<i64>() {
        return Some(value);
    }
    let value = trimmed.parse::<f64>().ok()?;
    if value.is_finite() && value.fract() == 0.0 {
        Some(value as i64)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_parse() {
        let ok: CellValue<i64> = CellValue::from_parse(Some(3), "3");
        assert_eq!(ok.parsed(), Some(&3));
        assert!(ok.is_parsed());

        let bad: CellValue<i64> = CellValue::from_parse(None, "three");
        assert_eq!(bad.parsed(), None);
        assert_eq!(bad.unparsed(), Some("three"));
    }

    #[test]
    fn test_untagged_serde() {
        let bad: CellValue<Vec<i64>> = CellValue::Unparsed("[1, x]".into());
        let json = serde_json::to_string(&bad).unwrap();
        assert_eq!(json, "\"[1, x]\"");
        let back: CellValue<Vec<i64>> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, bad);

        let good: CellValue<Vec<i64>> = serde_json::from_str("[1,2]").unwrap();
        assert_eq!(good, CellValue::Parsed(vec![1, 2]));
    }

    #[test]
    fn test_parse_integer() {
        assert_eq!(parse_integer(" 4 "), Some(4));
        assert_eq!(parse_integer("3.0"), Some(3));
        assert_eq!(parse_integer("-2"), Some(-2));
        assert_eq!(parse_integer("2.5"), None);
        assert_eq!(parse_integer("abc"), None);
    }
}
