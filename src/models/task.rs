//! Task model.
//!
//! A task occupies `duration` phases within its preferred phases and needs
//! workers holding all of its required skills.
//!
//! `priority` (ordering) and `max_concurrent` (how many workers may run the
//! task simultaneously) are separate fields.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::fields::{self, EntityKind, FieldAccess};
use super::{CellValue, Duration};

/// A task row admitted by the structural validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// 1-based row in the source file.
    #[serde(default)]
    pub row: usize,
    /// Unique task identifier.
    pub task_id: String,
    /// Human-readable title.
    pub title: String,
    /// Task category.
    #[serde(default)]
    pub category: Option<String>,
    /// Number of phases the task occupies.
    #[serde(default)]
    pub duration: Option<CellValue<Duration>>,
    /// Phases the task prefers to run in.
    #[serde(default)]
    pub preferred_phases: Option<CellValue<Vec<i64>>>,
    /// Skills a worker needs to run the task.
    #[serde(default)]
    pub required_skills: Vec<String>,
    /// Ordering priority (higher = more urgent).
    #[serde(default)]
    pub priority: Option<CellValue<i64>>,
    /// Maximum number of workers assigned simultaneously.
    #[serde(default)]
    pub max_concurrent: Option<CellValue<i64>>,
    /// Tasks this task must co-run with.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub co_run_group: Vec<String>,
    /// Columns with no canonical meaning, kept for export.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl Task {
    /// Creates a task with the given ID and title.
    pub fn new(task_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            row: 0,
            task_id: task_id.into(),
            title: title.into(),
            category: None,
            duration: None,
            preferred_phases: None,
            required_skills: Vec::new(),
            priority: None,
            max_concurrent: None,
            co_run_group: Vec::new(),
            extra: BTreeMap::new(),
        }
    }

    /// Sets the source row.
    pub fn at_row(mut self, row: usize) -> Self {
        self.row = row;
        self
    }

    /// Sets a bare duration in phases.
    pub fn with_duration(mut self, phases: f64) -> Self {
        self.duration = Some(CellValue::Parsed(Duration::phases(phases)));
        self
    }

    /// Sets the preferred phases.
    pub fn with_phases(mut self, phases: Vec<i64>) -> Self {
        self.preferred_phases = Some(CellValue::Parsed(phases));
        self
    }

    /// Adds a required skill.
    pub fn with_required_skill(mut self, skill: impl Into<String>) -> Self {
        self.required_skills.push(skill.into());
        self
    }

    /// Sets the ordering priority.
    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = Some(CellValue::Parsed(priority));
        self
    }

    /// Sets the maximum concurrency.
    pub fn with_max_concurrent(mut self, max_concurrent: i64) -> Self {
        self.max_concurrent = Some(CellValue::Parsed(max_concurrent));
        self
    }

    /// Sets the category.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Adds a co-run partner.
    pub fn with_co_run(mut self, task_id: impl Into<String>) -> Self {
        self.co_run_group.push(task_id.into());
        self
    }

    /// Parsed preferred phases (empty when absent or malformed).
    pub fn phases(&self) -> &[i64] {
        self.preferred_phases
            .as_ref()
            .and_then(CellValue::parsed)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Parsed duration amount (0 when absent or malformed).
    pub fn duration_amount(&self) -> f64 {
        self.duration
            .as_ref()
            .and_then(CellValue::parsed)
            .map(|d| d.amount)
            .unwrap_or(0.0)
    }

    /// Parsed priority, if any.
    pub fn priority_value(&self) -> Option<i64> {
        self.priority.as_ref().and_then(CellValue::parsed).copied()
    }

    /// Parsed max concurrency, if any.
    pub fn max_concurrent_value(&self) -> Option<i64> {
        self.max_concurrent.as_ref().and_then(CellValue::parsed).copied()
    }
}

impl FieldAccess for Task {
    const KIND: EntityKind = EntityKind::Task;

    fn id(&self) -> &str {
        &self.task_id
    }

    fn row(&self) -> usize {
        self.row
    }

    fn field(&self, name: &str) -> Option<Value> {
        match name {
            fields::TASK_ID => Some(Value::String(self.task_id.clone())),
            fields::TITLE => Some(Value::String(self.title.clone())),
            fields::CATEGORY => fields::opt_string(&self.category),
            fields::DURATION => self
                .duration
                .as_ref()
                .map(|d| match d {
                    CellValue::Parsed(d) => serde_json::json!(d.amount),
                    CellValue::Unparsed(raw) => Value::String(raw.clone()),
                }),
            fields::PREFERRED_PHASES => self
                .preferred_phases
                .as_ref()
                .and_then(|p| serde_json::to_value(p).ok()),
            fields::REQUIRED_SKILLS => Some(fields::string_list(&self.required_skills)),
            fields::PRIORITY => self
                .priority
                .as_ref()
                .and_then(|p| serde_json::to_value(p).ok()),
            fields::MAX_CONCURRENT => self
                .max_concurrent
                .as_ref()
                .and_then(|m| serde_json::to_value(m).ok()),
            fields::CO_RUN_GROUP => Some(fields::string_list(&self.co_run_group)),
            other => self.extra.get(other).cloned().map(Value::String),
        }
    }
}
