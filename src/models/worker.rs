//! Worker model.
//!
//! Workers supply capacity: `max_load` slots in every phase listed in
//! `availability`, for tasks whose required skills they hold.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::fields::{self, EntityKind, FieldAccess};
use super::CellValue;

/// A worker row admitted by the structural validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Worker {
    /// 1-based row in the source file.
    #[serde(default)]
    pub row: usize,
    /// Unique worker identifier.
    pub worker_id: String,
    /// Display name.
    pub name: String,
    /// Skills (matched case-insensitively).
    #[serde(default)]
    pub skills: Vec<String>,
    /// Available phase numbers.
    #[serde(default)]
    pub availability: Option<CellValue<Vec<i64>>>,
    /// Slots consumable per phase.
    #[serde(default)]
    pub max_load: Option<CellValue<i64>>,
    /// Department.
    #[serde(default)]
    pub department: Option<String>,
    /// Worker group (used by group-scoped rules).
    #[serde(default)]
    pub worker_group: Option<String>,
    /// Qualification level.
    #[serde(default)]
    pub qualification_level: Option<String>,
    /// Columns with no canonical meaning, kept for export.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl Worker {
    /// Creates a worker with the given ID and name.
    pub fn new(worker_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            row: 0,
            worker_id: worker_id.into(),
            name: name.into(),
            skills: Vec::new(),
            availability: None,
            max_load: None,
            department: None,
            worker_group: None,
            qualification_level: None,
            extra: BTreeMap::new(),
        }
    }

    /// Sets the source row.
    pub fn at_row(mut self, row: usize) -> Self {
        self.row = row;
        self
    }

    /// Adds a skill.
    pub fn with_skill(mut self, skill: impl Into<String>) -> Self {
        self.skills.push(skill.into());
        self
    }

    /// Sets the available phases.
    pub fn with_availability(mut self, phases: Vec<i64>) -> Self {
        self.availability = Some(CellValue::Parsed(phases));
        self
    }

    /// Sets the max load per phase.
    pub fn with_max_load(mut self, max_load: i64) -> Self {
        self.max_load = Some(CellValue::Parsed(max_load));
        self
    }

    /// Sets the worker group.
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.worker_group = Some(group.into());
        self
    }

    /// Whether the worker has a skill (case-insensitive, trimmed).
    pub fn has_skill(&self, skill: &str) -> bool {
        let wanted = normalize_skill(skill);
        self.skills.iter().any(|s| normalize_skill(s) == wanted)
    }

    /// Whether the worker has every listed skill.
    pub fn has_all_skills(&self, skills: &[String]) -> bool {
        skills.iter().all(|s| self.has_skill(s))
    }

    /// Parsed available phases (empty when absent or malformed).
    pub fn available_phases(&self) -> &[i64] {
        self.availability
            .as_ref()
            .and_then(CellValue::parsed)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Parsed max load, if present and numeric.
    pub fn max_load_value(&self) -> Option<i64> {
        self.max_load.as_ref().and_then(CellValue::parsed).copied()
    }

    /// Whether the worker belongs to one of the named groups, either by ID or
    /// by worker group.
    pub fn is_member_of(&self, group_ids: &[String]) -> bool {
        group_ids.iter().any(|g| {
            g == &self.worker_id || self.worker_group.as_deref() == Some(g.as_str())
        })
    }
}

/// Canonical skill form: trimmed and lower-cased.
pub fn normalize_skill(skill: &str) -> String {
    skill.trim().to_lowercase()
}

impl FieldAccess for Worker {
    const KIND: EntityKind = EntityKind::Worker;

    fn id(&self) -> &str {
        &self.worker_id
    }

    fn row(&self) -> usize {
        self.row
    }

    fn field(&self, name: &str) -> Option<Value> {
        match name {
            fields::WORKER_ID => Some(Value::String(self.worker_id.clone())),
            fields::NAME => Some(Value::String(self.name.clone())),
            fields::SKILLS => Some(fields::string_list(&self.skills)),
            fields::AVAILABILITY => self
                .availability
                .as_ref()
                .and_then(|a| serde_json::to_value(a).ok()),
            fields::MAX_LOAD => self
                .max_load
                .as_ref()
                .and_then(|m| serde_json::to_value(m).ok()),
            fields::DEPARTMENT => fields::opt_string(&self.department),
            fields::WORKER_GROUP => fields::opt_string(&self.worker_group),
            fields::QUALIFICATION_LEVEL => fields::opt_string(&self.qualification_level),
            other => self.extra.get(other).cloned().map(Value::String),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_builder() {
        let w = Worker::new("W1", "Ada")
            .with_skill("Rust")
            .with_skill(" SQL ")
            .with_availability(vec![1, 2, 3])
            .with_max_load(2)
            .with_group("GroupA");

        assert_eq!(w.available_phases(), &[1, 2, 3]);
        assert_eq!(w.max_load_value(), Some(2));
        assert!(w.is_member_of(&["GroupA".to_string()]));
        assert!(w.is_member_of(&["W1".to_string()]));
        assert!(!w.is_member_of(&["GroupB".to_string()]));
    }

    #[test]
    fn test_skill_matching_case_insensitive() {
        let w = Worker::new("W1", "Ada").with_skill("Rust").with_skill(" SQL ");
        assert!(w.has_skill("rust"));
        assert!(w.has_skill("sql"));
        assert!(!w.has_skill("go"));
        assert!(w.has_all_skills(&["RUST".into(), "Sql".into()]));
        assert!(!w.has_all_skills(&["rust".into(), "go".into()]));
        assert!(w.has_all_skills(&[]));
    }

    #[test]
    fn test_malformed_cells_read_as_empty() {
        let mut w = Worker::new("W1", "Ada");
        w.availability = Some(CellValue::Unparsed("[1, x]".into()));
        w.max_load = Some(CellValue::Unparsed("lots".into()));
        assert!(w.available_phases().is_empty());
        assert_eq!(w.max_load_value(), None);
    }
}
