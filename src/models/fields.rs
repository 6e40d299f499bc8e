//! Canonical field names and generic field access.
//!
//! Raw sheet headers are mapped onto these names at the parsing boundary
//! (see [`HeaderAliases`](crate::rows::HeaderAliases)); validators and rules
//! only ever see canonical names.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

pub const CLIENT_ID: &str = "clientId";
pub const NAME: &str = "name";
pub const EMAIL: &str = "email";
pub const PRIORITY: &str = "priority";
pub const REQUESTED_TASK_IDS: &str = "requestedTaskIds";
pub const GROUP_TAG: &str = "groupTag";
pub const ATTRIBUTES_JSON: &str = "attributesJSON";

pub const WORKER_ID: &str = "workerId";
pub const SKILLS: &str = "skills";
pub const AVAILABILITY: &str = "availability";
pub const MAX_LOAD: &str = "maxLoad";
pub const DEPARTMENT: &str = "department";
pub const WORKER_GROUP: &str = "workerGroup";
pub const QUALIFICATION_LEVEL: &str = "qualificationLevel";

pub const TASK_ID: &str = "taskId";
pub const TITLE: &str = "title";
pub const CATEGORY: &str = "category";
pub const DURATION: &str = "duration";
pub const PREFERRED_PHASES: &str = "preferredPhases";
pub const REQUIRED_SKILLS: &str = "requiredSkills";
pub const MAX_CONCURRENT: &str = "maxConcurrent";
pub const CO_RUN_GROUP: &str = "coRunGroup";

/// Prefix addressing a key inside a client's attributes JSON
/// (e.g. `attributes.budget`).
pub const ATTRIBUTES_PREFIX: &str = "attributes.";

/// The three entity collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Client,
    Worker,
    Task,
}

impl EntityKind {
    /// All kinds in pipeline order.
    pub const ALL: [EntityKind; 3] = [Self::Client, Self::Worker, Self::Task];

    /// Fields that must be present and non-blank for a row to be admitted.
    pub fn required_fields(self) -> &'static [&'static str] {
        match self {
            Self::Client => &[CLIENT_ID, NAME, PRIORITY],
            Self::Worker => &[WORKER_ID, NAME],
            Self::Task => &[TASK_ID, TITLE],
        }
    }

    /// Canonical ID field.
    pub fn id_field(self) -> &'static str {
        match self {
            Self::Client => CLIENT_ID,
            Self::Worker => WORKER_ID,
            Self::Task => TASK_ID,
        }
    }

    /// Plural collection name (`clients`, `workers`, `tasks`).
    pub fn collection(self) -> &'static str {
        match self {
            Self::Client => "clients",
            Self::Worker => "workers",
            Self::Task => "tasks",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Client => "client",
            Self::Worker => "worker",
            Self::Task => "task",
        })
    }
}

/// Read access to an entity's fields by canonical name.
///
/// Used by pattern and custom rules, whose field references are data.
pub trait FieldAccess {
    /// Which collection the entity belongs to.
    const KIND: EntityKind;

    /// The entity's unique key.
    fn id(&self) -> &str;

    /// 1-based source row.
    fn row(&self) -> usize;

    /// Field value by canonical name; `None` when absent or blank.
    fn field(&self, name: &str) -> Option<Value>;
}

pub(crate) fn string_list(values: &[String]) -> Value {
    Value::Array(values.iter().cloned().map(Value::String).collect())
}

pub(crate) fn opt_string(value: &Option<String>) -> Option<Value> {
    value.clone().map(Value::String)
}
