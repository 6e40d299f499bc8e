//! Data validation.
//!
//! Two passes turn raw rows into typed collections plus findings:
//!
//! | Pass | Scope | Output |
//! |------|-------|--------|
//! | [`structural`] | one collection, row by row | admitted entities, missing-field errors, format warnings |
//! | [`cross_reference`] | all three collections | duplicates, broken references, capacity and skill checks |
//!
//! Neither pass fails: every problem is a
//! [`ValidationError`](crate::models::ValidationError) record.

pub mod corun;
pub mod cross_reference;
pub mod structural;

pub use cross_reference::{validate_all, validate_all_with};
pub use structural::{validate_clients, validate_tasks, validate_workers, ValidationResult};

/// Logical file names used to attribute findings.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct FileNames {
    pub clients: String,
    pub workers: String,
    pub tasks: String,
}

impl Default for FileNames {
    fn default() -> Self {
        Self {
            clients: "clients.csv".into(),
            workers: "workers.csv".into(),
            tasks: "tasks.csv".into(),
        }
    }
}

impl FileNames {
    /// Custom file names.
    pub fn new(
        clients: impl Into<String>,
        workers: impl Into<String>,
        tasks: impl Into<String>,
    ) -> Self {
        Self {
            clients: clients.into(),
            workers: workers.into(),
            tasks: tasks.into(),
        }
    }

    /// File name for one entity kind.
    pub fn for_kind(&self, kind: crate::models::EntityKind) -> &str {
        use crate::models::EntityKind;
        match kind {
            EntityKind::Client => &self.clients,
            EntityKind::Worker => &self.workers,
            EntityKind::Task => &self.tasks,
        }
    }
}
