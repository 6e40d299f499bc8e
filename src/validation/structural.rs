//! Per-row structural validation.
//!
//! Checks run once per collection:
//! 1. Column presence on the first row's headers (one `row:0` error per
//!    absent required column).
//! 2. Required fields per row. A missing or blank required cell is an error
//!    and the whole row is dropped. Rows whose gap is already reported by the
//!    column check are dropped silently.
//! 3. Format checks on admitted rows. These are warnings; the row stays.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::debug;

use crate::models::fields::*;
use crate::models::{
    parse_integer, parse_phase_list, parse_slot_array, CellValue, Client, Duration, EntityKind,
    ErrorType, Priority, Task, ValidationError, Worker,
};
use crate::rows::RawRow;

static EMAIL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid"));

/// Admitted entities and findings of one structural pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult<T> {
    pub valid_data: Vec<T>,
    pub errors: Vec<ValidationError>,
}

/// Validates client rows.
pub fn validate_clients(rows: &[RawRow], filename: &str) -> ValidationResult<Client> {
    let mut errors = Vec::new();
    let valid_data: Vec<Client> = admit_rows(EntityKind::Client, rows, filename, &mut errors)
        .into_iter()
        .map(|(row, cells)| build_client(row, cells))
        .collect();
    for client in &valid_data {
        errors.extend(client_format_warnings(client, filename));
    }
    finish(EntityKind::Client, rows.len(), filename, valid_data, errors)
}

/// Validates worker rows.
pub fn validate_workers(rows: &[RawRow], filename: &str) -> ValidationResult<Worker> {
    let mut errors = Vec::new();
    let valid_data: Vec<Worker> = admit_rows(EntityKind::Worker, rows, filename, &mut errors)
        .into_iter()
        .map(|(row, cells)| build_worker(row, cells))
        .collect();
    finish(EntityKind::Worker, rows.len(), filename, valid_data, errors)
}

/// Validates task rows.
pub fn validate_tasks(rows: &[RawRow], filename: &str) -> ValidationResult<Task> {
    let mut errors = Vec::new();
    let valid_data: Vec<Task> = admit_rows(EntityKind::Task, rows, filename, &mut errors)
        .into_iter()
        .map(|(row, cells)| build_task(row, cells))
        .collect();
    for task in &valid_data {
        errors.extend(task_format_warnings(task, filename));
    }
    finish(EntityKind::Task, rows.len(), filename, valid_data, errors)
}

fn finish<T>(
    kind: EntityKind,
    rows: usize,
    filename: &str,
    valid_data: Vec<T>,
    errors: Vec<ValidationError>,
) -> ValidationResult<T> {
    debug!(
        kind = %kind,
        file = filename,
        rows,
        valid = valid_data.len(),
        errors = errors.len(),
        "structural validation"
    );
    ValidationResult { valid_data, errors }
}

/// Runs the column and required-field checks, yielding admitted rows with
/// their 1-based row numbers.
fn admit_rows(
    kind: EntityKind,
    rows: &[RawRow],
    filename: &str,
    errors: &mut Vec<ValidationError>,
) -> Vec<(usize, RowCells)> {
    let required = kind.required_fields();

    let missing_columns: HashSet<&str> = match rows.first() {
        Some(first) => required
            .iter()
            .copied()
            .filter(|field| !first.contains_key(*field))
            .collect(),
        None => HashSet::new(),
    };
    for field in required.iter().filter(|f| missing_columns.contains(*f)) {
        errors.push(
            ValidationError::error(
                ErrorType::MissingColumn,
                filename,
                0,
                *field,
                format!("Missing required column: {field}"),
            )
            .with_suggestion(format!("Add a '{field}' column to {filename}")),
        );
    }

    let mut admitted = Vec::new();
    for (index, row) in rows.iter().enumerate() {
        let row_number = index + 1;
        let mut complete = true;
        for field in required {
            if is_blank(row.get(*field)) {
                complete = false;
                if !missing_columns.contains(field) {
                    errors.push(ValidationError::error(
                        ErrorType::MissingRequiredField,
                        filename,
                        row_number,
                        *field,
                        format!("Missing required field: {field}"),
                    ));
                }
            }
        }
        if complete {
            admitted.push((row_number, RowCells(row.clone())));
        }
    }
    admitted
}

fn is_blank(value: Option<&String>) -> bool {
    value.is_none_or(|v| v.trim().is_empty())
}

/// Splits a comma-separated cell into trimmed, non-empty entries.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Consumes canonical cells from a row; what is left becomes `extra`.
struct RowCells(RawRow);

impl RowCells {
    fn take(&mut self, field: &str) -> Option<String> {
        self.0
            .remove(field)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn take_required(&mut self, field: &str) -> String {
        self.take(field).unwrap_or_default()
    }

    fn take_list(&mut self, field: &str) -> Vec<String> {
        self.take(field).map(|v| split_list(&v)).unwrap_or_default()
    }

    fn take_cell<T>(&mut self, field: &str, parse: impl Fn(&str) -> Option<T>) -> Option<CellValue<T>> {
        self.take(field)
            .map(|raw| CellValue::from_parse(parse(&raw), &raw))
    }

    fn into_extra(self) -> RawRow {
        self.0
    }
}

fn build_client(row: usize, mut cells: RowCells) -> Client {
    Client {
        row,
        client_id: cells.take_required(CLIENT_ID),
        name: cells.take_required(NAME),
        email: cells.take(EMAIL),
        priority: Priority::parse(&cells.take_required(PRIORITY)),
        requested_task_ids: cells.take_list(REQUESTED_TASK_IDS),
        group_tag: cells.take(GROUP_TAG),
        attributes_json: cells.take(ATTRIBUTES_JSON),
        extra: cells.into_extra(),
    }
}

fn build_worker(row: usize, mut cells: RowCells) -> Worker {
    Worker {
        row,
        worker_id: cells.take_required(WORKER_ID),
        name: cells.take_required(NAME),
        skills: cells.take_list(SKILLS),
        availability: cells.take_cell(AVAILABILITY, parse_slot_array),
        max_load: cells.take_cell(MAX_LOAD, parse_integer),
        department: cells.take(DEPARTMENT),
        worker_group: cells.take(WORKER_GROUP),
        qualification_level: cells.take(QUALIFICATION_LEVEL),
        extra: cells.into_extra(),
    }
}

fn build_task(row: usize, mut cells: RowCells) -> Task {
    Task {
        row,
        task_id: cells.take_required(TASK_ID),
        title: cells.take_required(TITLE),
        category: cells.take(CATEGORY),
        duration: cells.take_cell(DURATION, Duration::parse),
        preferred_phases: cells.take_cell(PREFERRED_PHASES, parse_phase_list),
        required_skills: cells.take_list(REQUIRED_SKILLS),
        priority: cells.take_cell(PRIORITY, parse_integer),
        max_concurrent: cells.take_cell(MAX_CONCURRENT, parse_integer),
        co_run_group: cells.take_list(CO_RUN_GROUP),
        extra: cells.into_extra(),
    }
}

/// Format warnings for an admitted client.
pub(crate) fn client_format_warnings(client: &Client, filename: &str) -> Vec<ValidationError> {
    let mut warnings = Vec::new();
    if let Some(email) = &client.email {
        if !EMAIL_PATTERN.is_match(email) {
            warnings.push(
                ValidationError::warning(
                    ErrorType::InvalidFormat,
                    filename,
                    client.row,
                    EMAIL,
                    format!("Invalid email format: '{email}'"),
                )
                .with_suggestion("Use the form name@domain.tld"),
            );
        }
    }
    if !client.priority.is_valid() {
        warnings.push(
            ValidationError::warning(
                ErrorType::InvalidFormat,
                filename,
                client.row,
                PRIORITY,
                format!("Invalid priority '{}'", client.priority),
            )
            .with_suggestion("Use High, Medium, Low or an integer 1-5"),
        );
    }
    warnings
}

/// Format warnings for an admitted task.
pub(crate) fn task_format_warnings(task: &Task, filename: &str) -> Vec<ValidationError> {
    let mut warnings = Vec::new();
    let mut warn = |column: &str, message: String, suggestion: &str| {
        warnings.push(
            ValidationError::warning(ErrorType::InvalidFormat, filename, task.row, column, message)
                .with_suggestion(suggestion),
        );
    };

    match &task.duration {
        Some(CellValue::Unparsed(raw)) => warn(
            DURATION,
            format!("Invalid duration format: '{raw}'"),
            "Use '<number> <unit>' (hours, days, weeks, months) or a positive number",
        ),
        Some(CellValue::Parsed(d)) if !d.is_well_formed() => warn(
            DURATION,
            format!("Duration must be positive, got {}", d.amount),
            "Use a positive number of phases",
        ),
        _ => {}
    }
    if let Some(raw) = task.preferred_phases.as_ref().and_then(CellValue::unparsed) {
        warn(
            PREFERRED_PHASES,
            format!("Invalid preferred phases: '{raw}'"),
            "Use a list like [1,2,3] or a range like 1-3",
        );
    }
    if let Some(raw) = task.priority.as_ref().and_then(CellValue::unparsed) {
        warn(PRIORITY, format!("Invalid task priority: '{raw}'"), "Use an integer");
    }
    if let Some(raw) = task.max_concurrent.as_ref().and_then(CellValue::unparsed) {
        warn(
            MAX_CONCURRENT,
            format!("Invalid max concurrency: '{raw}'"),
            "Use a positive integer",
        );
    }
    warnings
}
