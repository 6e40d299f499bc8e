//! Validation pipeline.
//!
//! raw rows → header aliasing → structural ×3 → cross-reference → quality
//! rollup → [`ProcessedData`].

use serde_json::Value;
use tracing::info;

use crate::config::CoreConfig;
use crate::error::{AllocationError, Result};
use crate::models::{EntityKind, ErrorType, ProcessedData, ValidationError};
use crate::quality::DataQuality;
use crate::rows::{rows_from_json, HeaderAliases, RawRow};
use crate::validation::structural::{client_format_warnings, task_format_warnings};
use crate::validation::{
    validate_all_with, validate_clients, validate_tasks, validate_workers, FileNames,
};

/// The three uploaded collections as raw rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatasetInput {
    pub clients: Vec<RawRow>,
    pub workers: Vec<RawRow>,
    pub tasks: Vec<RawRow>,
    pub files: FileNames,
}

impl DatasetInput {
    /// Creates an input with default file names.
    pub fn new(clients: Vec<RawRow>, workers: Vec<RawRow>, tasks: Vec<RawRow>) -> Self {
        Self {
            clients,
            workers,
            tasks,
            files: FileNames::default(),
        }
    }

    /// Sets the file names used for attribution.
    pub fn with_files(mut self, files: FileNames) -> Self {
        self.files = files;
        self
    }

    /// Builds an input from parser output shaped
    /// `{"clients": [...], "workers": [...], "tasks": [...]}`.
    ///
    /// A missing collection is empty; a collection that is not an array of
    /// objects is an input-shape error.
    pub fn from_json(value: &Value) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| AllocationError::shape("dataset", "object with clients, workers, tasks"))?;
        let collection = |kind: EntityKind| -> Result<Vec<RawRow>> {
            match object.get(kind.collection()) {
                Some(rows) => rows_from_json(rows, kind.collection()),
                None => Ok(Vec::new()),
            }
        };
        Ok(Self::new(
            collection(EntityKind::Client)?,
            collection(EntityKind::Worker)?,
            collection(EntityKind::Task)?,
        ))
    }

    /// Total number of raw rows.
    pub fn row_count(&self) -> usize {
        self.clients.len() + self.workers.len() + self.tasks.len()
    }

    /// Copy with every header mapped to its canonical field name.
    pub fn normalized(&self, aliases: &HeaderAliases) -> Self {
        Self {
            clients: aliases.normalize_rows(EntityKind::Client, &self.clients),
            workers: aliases.normalize_rows(EntityKind::Worker, &self.workers),
            tasks: aliases.normalize_rows(EntityKind::Task, &self.tasks),
            files: self.files.clone(),
        }
    }
}

/// Runs the full validation pipeline.
pub fn process(input: &DatasetInput, config: &CoreConfig) -> ProcessedData {
    let aliases = HeaderAliases::from_config(&config.header_aliases);
    let input = input.normalized(&aliases);
    let files = &input.files;

    let clients = validate_clients(&input.clients, &files.clients);
    let workers = validate_workers(&input.workers, &files.workers);
    let tasks = validate_tasks(&input.tasks, &files.tasks);

    let cross = validate_all_with(
        &clients.valid_data,
        &workers.valid_data,
        &tasks.valid_data,
        files,
        &config.validation,
    );

    let mut validation_errors = clients.errors;
    validation_errors.extend(workers.errors);
    validation_errors.extend(tasks.errors);
    validation_errors.extend(cross);

    let data = ProcessedData {
        clients: clients.valid_data,
        workers: workers.valid_data,
        tasks: tasks.valid_data,
        validation_errors,
        data_quality: DataQuality::default(),
        source_files: input.files.clone(),
    };
    let data_quality = DataQuality::calculate(input.row_count(), data.entity_count());

    info!(
        rows = data_quality.total_rows,
        clean = data_quality.clean_rows,
        errors = data.error_count(),
        warnings = data.warning_count(),
        quality = data_quality.quality_score,
        "dataset processed"
    );
    ProcessedData { data_quality, ..data }
}

impl ProcessedData {
    /// Re-validates the current collections, returning a new snapshot.
    ///
    /// Missing-field and missing-column findings concern rows that never
    /// became entities and are carried over; everything else is recomputed.
    /// Rows dropped earlier still count as error rows.
    pub fn revalidate(&self, config: &CoreConfig) -> ProcessedData {
        let files = &self.source_files;
        // Same order as `process`: per collection, then cross-reference.
        let mut validation_errors: Vec<_> =
            carried_row_errors(&self.validation_errors, &files.clients).collect();
        for client in &self.clients {
            validation_errors.extend(client_format_warnings(client, &files.clients));
        }
        validation_errors.extend(carried_row_errors(&self.validation_errors, &files.workers));
        validation_errors.extend(carried_row_errors(&self.validation_errors, &files.tasks));
        for task in &self.tasks {
            validation_errors.extend(task_format_warnings(task, &files.tasks));
        }
        validation_errors.extend(validate_all_with(
            &self.clients,
            &self.workers,
            &self.tasks,
            files,
            &config.validation,
        ));

        let entities = self.entity_count();
        ProcessedData {
            clients: self.clients.clone(),
            workers: self.workers.clone(),
            tasks: self.tasks.clone(),
            validation_errors,
            data_quality: DataQuality::calculate(self.data_quality.error_rows + entities, entities),
            source_files: files.clone(),
        }
    }
}

fn carried_row_errors<'a>(
    errors: &'a [ValidationError],
    file: &'a str,
) -> impl Iterator<Item = ValidationError> + 'a {
    errors
        .iter()
        .filter(move |e| {
            e.file == file
                && matches!(
                    e.error_type,
                    ErrorType::MissingRequiredField | ErrorType::MissingColumn
                )
        })
        .cloned()
}
