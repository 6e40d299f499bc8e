//! Client model.
//!
//! A client requests tasks and carries a priority used to rank allocations.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::fields::{self, EntityKind, FieldAccess};
use super::Priority;

/// A client row admitted by the structural validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    /// 1-based row in the source file.
    #[serde(default)]
    pub row: usize,
    /// Unique client identifier.
    pub client_id: String,
    /// Display name.
    pub name: String,
    /// Contact email.
    #[serde(default)]
    pub email: Option<String>,
    /// Priority (level or 1-5).
    #[serde(default)]
    pub priority: Priority,
    /// Requested task IDs, in sheet order.
    #[serde(default)]
    pub requested_task_ids: Vec<String>,
    /// Free-form group tag.
    #[serde(default)]
    pub group_tag: Option<String>,
    /// Opaque JSON attributes, as written in the sheet.
    #[serde(default, rename = "attributesJSON")]
    pub attributes_json: Option<String>,
    /// Columns with no canonical meaning, kept for export.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl Client {
    /// Creates a client with the given ID and name.
    pub fn new(client_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            row: 0,
            client_id: client_id.into(),
            name: name.into(),
            email: None,
            priority: Priority::default(),
            requested_task_ids: Vec::new(),
            group_tag: None,
            attributes_json: None,
            extra: BTreeMap::new(),
        }
    }

    /// Sets the source row.
    pub fn at_row(mut self, row: usize) -> Self {
        self.row = row;
        self
    }

    /// Sets the priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the email.
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Sets the requested task IDs.
    pub fn with_requested_tasks<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requested_task_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the group tag.
    pub fn with_group_tag(mut self, tag: impl Into<String>) -> Self {
        self.group_tag = Some(tag.into());
        self
    }

    /// Sets the raw attributes JSON.
    pub fn with_attributes_json(mut self, json: impl Into<String>) -> Self {
        self.attributes_json = Some(json.into());
        self
    }

    /// Whether the client requests the given task.
    pub fn requests(&self, task_id: &str) -> bool {
        self.requested_task_ids.iter().any(|id| id == task_id)
    }

    /// Parsed attributes, if present and valid JSON.
    pub fn attributes(&self) -> Option<Value> {
        self.attributes_json
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
    }
}

impl FieldAccess for Client {
    const KIND: EntityKind = EntityKind::Client;

    fn id(&self) -> &str {
        &self.client_id
    }

    fn row(&self) -> usize {
        self.row
    }

    fn field(&self, name: &str) -> Option<Value> {
        if let Some(key) = name.strip_prefix(fields::ATTRIBUTES_PREFIX) {
            return self.attributes()?.get(key).cloned();
        }
        match name {
            fields::CLIENT_ID => Some(Value::String(self.client_id.clone())),
            fields::NAME => Some(Value::String(self.name.clone())),
            fields::EMAIL => fields::opt_string(&self.email),
            fields::PRIORITY => serde_json::to_value(&self.priority).ok(),
            fields::REQUESTED_TASK_IDS => Some(fields::string_list(&self.requested_task_ids)),
            fields::GROUP_TAG => fields::opt_string(&self.group_tag),
            fields::ATTRIBUTES_JSON => fields::opt_string(&self.attributes_json),
            other => self.extra.get(other).cloned().map(Value::String),
        }
    }
}
