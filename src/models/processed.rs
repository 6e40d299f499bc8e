//! Processed data snapshot.
//!
//! The unit exchanged between the validation core and its collaborators.
//! Snapshots are values: edits, corrections and rule materialization all
//! produce a new snapshot.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{Client, ErrorType, Severity, Task, ValidationError, Worker};
use crate::quality::DataQuality;
use crate::validation::FileNames;

/// Validated collections plus every finding and the quality rollup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedData {
    pub clients: Vec<Client>,
    pub workers: Vec<Worker>,
    pub tasks: Vec<Task>,
    pub validation_errors: Vec<ValidationError>,
    pub data_quality: DataQuality,
    /// File names findings are attributed to.
    #[serde(default)]
    pub source_files: FileNames,
}

/// Finding counts for dashboards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationSummary {
    pub errors: usize,
    pub warnings: usize,
    pub infos: usize,
    pub by_type: BTreeMap<ErrorType, usize>,
}

impl ProcessedData {
    /// Total number of admitted entities.
    pub fn entity_count(&self) -> usize {
        self.clients.len() + self.workers.len() + self.tasks.len()
    }

    /// Number of `error`-severity findings.
    pub fn error_count(&self) -> usize {
        self.count_severity(Severity::Error)
    }

    /// Number of `warning`-severity findings.
    pub fn warning_count(&self) -> usize {
        self.count_severity(Severity::Warning)
    }

    /// Whether any finding has `error` severity.
    pub fn has_blocking_errors(&self) -> bool {
        self.validation_errors.iter().any(ValidationError::is_blocking)
    }

    /// Findings attributed to one file.
    pub fn errors_for<'a>(&'a self, file: &'a str) -> impl Iterator<Item = &'a ValidationError> + 'a {
        self.validation_errors.iter().filter(move |e| e.file == file)
    }

    /// Groups findings by severity and tag.
    pub fn summary(&self) -> ValidationSummary {
        let mut summary = ValidationSummary::default();
        for e in &self.validation_errors {
            match e.severity {
                Severity::Error => summary.errors += 1,
                Severity::Warning => summary.warnings += 1,
                Severity::Info => summary.infos += 1,
            }
            *summary.by_type.entry(e.error_type).or_insert(0) += 1;
        }
        summary
    }

    /// Finds a client by ID.
    pub fn client(&self, id: &str) -> Option<&Client> {
        self.clients.iter().find(|c| c.client_id == id)
    }

    /// Finds a worker by ID.
    pub fn worker(&self, id: &str) -> Option<&Worker> {
        self.workers.iter().find(|w| w.worker_id == id)
    }

    /// Finds a task by ID.
    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.task_id == id)
    }

    fn count_severity(&self, severity: Severity) -> usize {
        self.validation_errors
            .iter()
            .filter(|e| e.severity == severity)
            .count()
    }
}
