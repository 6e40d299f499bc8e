//! Validation error record.
//!
//! Every problem found by the validators becomes one [`ValidationError`],
//! attributed to a logical file, a 1-based row (0 = file-level) and a column.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How serious a validation finding is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Blocks the row or the export.
    Error,
    /// Row is retained with an annotation.
    Warning,
    /// Informational only.
    Info,
}

/// Machine-readable category tag (`error_type`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    /// A required cell is missing or blank.
    MissingRequiredField,
    /// A required column is absent from the header.
    MissingColumn,
    /// Email, priority, duration or phase text has the wrong shape.
    InvalidFormat,
    /// An ID occurs more than once in a collection.
    DuplicateId,
    /// A client requests a task that does not exist.
    UnknownReference,
    /// A list-valued cell does not parse.
    MalformedList,
    /// A JSON cell does not parse.
    InvalidJson,
    /// A value lies outside its accepted range.
    OutOfRange,
    /// A worker's max load exceeds its available slots.
    OverloadedWorker,
    /// Task demand exceeds worker supply in a phase.
    PhaseSaturation,
    /// No worker offers a required skill.
    SkillCoverage,
    /// Fewer qualified workers than a task's max concurrency.
    ConcurrencyInfeasible,
    /// Co-run references form a cycle.
    CircularDependency,
}

/// Error taxonomy the tags roll up into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    MissingRequiredField,
    InvalidFormat,
    DuplicateIdentifier,
    UnknownReference,
    CapacityViolation,
    SkillGapError,
    RuleApplicationSkipped,
}

impl ErrorType {
    /// The taxonomy category of this tag.
    pub fn category(self) -> ErrorCategory {
        match self {
            Self::MissingRequiredField | Self::MissingColumn => ErrorCategory::MissingRequiredField,
            Self::InvalidFormat | Self::MalformedList | Self::InvalidJson | Self::OutOfRange => {
                ErrorCategory::InvalidFormat
            }
            Self::DuplicateId => ErrorCategory::DuplicateIdentifier,
            Self::UnknownReference | Self::CircularDependency => ErrorCategory::UnknownReference,
            Self::OverloadedWorker | Self::PhaseSaturation | Self::ConcurrencyInfeasible => {
                ErrorCategory::CapacityViolation
            }
            Self::SkillCoverage => ErrorCategory::SkillGapError,
        }
    }

    /// Whether the tag is produced by the per-row structural pass.
    pub fn is_structural(self) -> bool {
        matches!(
            self,
            Self::MissingRequiredField | Self::MissingColumn | Self::InvalidFormat
        )
    }

    /// The snake_case tag string.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingRequiredField => "missing_required_field",
            Self::MissingColumn => "missing_column",
            Self::InvalidFormat => "invalid_format",
            Self::DuplicateId => "duplicate_id",
            Self::UnknownReference => "unknown_reference",
            Self::MalformedList => "malformed_list",
            Self::InvalidJson => "invalid_json",
            Self::OutOfRange => "out_of_range",
            Self::OverloadedWorker => "overloaded_worker",
            Self::PhaseSaturation => "phase_saturation",
            Self::SkillCoverage => "skill_coverage",
            Self::ConcurrencyInfeasible => "concurrency_infeasible",
            Self::CircularDependency => "circular_dependency",
        }
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single validation finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    /// Originating logical file name.
    pub file: String,
    /// 1-based row within the file; 0 for file-level findings.
    pub row: usize,
    /// Field implicated.
    pub column: String,
    /// Human-readable message.
    pub error: String,
    /// Severity.
    pub severity: Severity,
    /// Optional remediation hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Machine-readable category.
    pub error_type: ErrorType,
}

impl ValidationError {
    /// Creates a finding with the given severity.
    pub fn new(
        severity: Severity,
        error_type: ErrorType,
        file: impl Into<String>,
        row: usize,
        column: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            file: file.into(),
            row,
            column: column.into(),
            error: message.into(),
            severity,
            suggestion: None,
            error_type,
        }
    }

    /// Creates an `error`-severity finding.
    pub fn error(
        error_type: ErrorType,
        file: impl Into<String>,
        row: usize,
        column: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(Severity::Error, error_type, file, row, column, message)
    }

    /// Creates a `warning`-severity finding.
    pub fn warning(
        error_type: ErrorType,
        file: impl Into<String>,
        row: usize,
        column: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(Severity::Warning, error_type, file, row, column, message)
    }

    /// Attaches a remediation hint.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Whether the finding concerns the whole file rather than a row.
    pub fn is_file_level(&self) -> bool {
        self.row == 0
    }

    /// Whether the finding has `error` severity.
    pub fn is_blocking(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} [{}] {}: {}",
            self.file,
            self.row,
            self.error_type,
            self.column,
            self.error
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        let e = ValidationError::error(ErrorType::DuplicateId, "clients.csv", 3, "clientId", "dup")
            .with_suggestion("rename it");
        assert_eq!(e.severity, Severity::Error);
        assert_eq!(e.row, 3);
        assert!(e.is_blocking());
        assert!(!e.is_file_level());
        assert_eq!(e.suggestion.as_deref(), Some("rename it"));

        let w = ValidationError::warning(ErrorType::PhaseSaturation, "tasks.csv", 0, "phase", "x");
        assert!(w.is_file_level());
        assert!(!w.is_blocking());
    }

    #[test]
    fn test_serialized_tags() {
        let e = ValidationError::error(ErrorType::DuplicateId, "f", 1, "c", "m");
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["error_type"], "duplicate_id");
        assert_eq!(json["severity"], "error");
        assert!(json.get("suggestion").is_none());
    }

    #[test]
    fn test_categories() {
        assert_eq!(
            ErrorType::PhaseSaturation.category(),
            ErrorCategory::CapacityViolation
        );
        assert_eq!(ErrorType::SkillCoverage.category(), ErrorCategory::SkillGapError);
        assert_eq!(ErrorType::DuplicateId.category(), ErrorCategory::DuplicateIdentifier);
        assert!(ErrorType::InvalidFormat.is_structural());
        assert!(!ErrorType::MalformedList.is_structural());
    }

    #[test]
    fn test_display() {
        let e = ValidationError::error(ErrorType::InvalidJson, "clients.csv", 2, "attributesJSON", "bad");
        assert_eq!(e.to_string(), "clients.csv:2 [invalid_json] attributesJSON: bad");
    }
}
