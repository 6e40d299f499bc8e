//! Raw rows and header aliasing.
//!
//! The file reader (CSV/Excel, outside this crate) produces one string map
//! per row. Before rows reach the validators their headers are mapped onto
//! canonical field names through a single alias table.

use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

use crate::config::HeaderAliasConfig;
use crate::error::{AllocationError, Result};
use crate::models::fields::*;
use crate::models::EntityKind;

/// One sheet row: header → cell text.
pub type RawRow = BTreeMap<String, String>;

const CLIENT_ALIASES: &[(&str, &str)] = &[
    ("clientid", CLIENT_ID),
    ("id", CLIENT_ID),
    ("clientname", NAME),
    ("name", NAME),
    ("email", EMAIL),
    ("clientemail", EMAIL),
    ("prioritylevel", PRIORITY),
    ("priority", PRIORITY),
    ("clientpriority", PRIORITY),
    ("requestedtaskids", REQUESTED_TASK_IDS),
    ("requestedtasks", REQUESTED_TASK_IDS),
    ("grouptag", GROUP_TAG),
    ("attributesjson", ATTRIBUTES_JSON),
    ("attributes", ATTRIBUTES_JSON),
];

const WORKER_ALIASES: &[(&str, &str)] = &[
    ("workerid", WORKER_ID),
    ("id", WORKER_ID),
    ("workername", NAME),
    ("name", NAME),
    ("skills", SKILLS),
    ("workerskills", SKILLS),
    ("availableslots", AVAILABILITY),
    ("availability", AVAILABILITY),
    ("maxloadperphase", MAX_LOAD),
    ("maxload", MAX_LOAD),
    ("department", DEPARTMENT),
    ("workergroup", WORKER_GROUP),
    ("qualificationlevel", QUALIFICATION_LEVEL),
];

const TASK_ALIASES: &[(&str, &str)] = &[
    ("taskid", TASK_ID),
    ("id", TASK_ID),
    ("taskname", TITLE),
    ("name", TITLE),
    ("title", TITLE),
    ("category", CATEGORY),
    ("duration", DURATION),
    ("requiredskills", REQUIRED_SKILLS),
    ("preferredphases", PREFERRED_PHASES),
    ("phases", PREFERRED_PHASES),
    ("phase", PREFERRED_PHASES),
    ("priority", PRIORITY),
    ("maxconcurrent", MAX_CONCURRENT),
    ("corungroup", CO_RUN_GROUP),
];

/// Header alias table, one map per entity kind.
///
/// Lookup is case-insensitive and ignores whitespace, `_` and `-`, so
/// `ClientID`, `client_id` and `Client Id` all resolve to `clientId`.
#[derive(Debug, Clone)]
pub struct HeaderAliases {
    tables: HashMap<EntityKind, HashMap<String, String>>,
}

impl HeaderAliases {
    /// The built-in table.
    pub fn new() -> Self {
        let mut tables = HashMap::new();
        for (kind, aliases) in [
            (EntityKind::Client, CLIENT_ALIASES),
            (EntityKind::Worker, WORKER_ALIASES),
            (EntityKind::Task, TASK_ALIASES),
        ] {
            let table = aliases
                .iter()
                .map(|(raw, canonical)| (raw.to_string(), canonical.to_string()))
                .collect();
            tables.insert(kind, table);
        }
        Self { tables }
    }

    /// Built-in table extended (and overridden) by configured aliases.
    pub fn from_config(config: &HeaderAliasConfig) -> Self {
        let mut aliases = Self::new();
        for (kind, extra) in [
            (EntityKind::Client, &config.clients),
            (EntityKind::Worker, &config.workers),
            (EntityKind::Task, &config.tasks),
        ] {
            for (raw, canonical) in extra {
                aliases = aliases.with_alias(kind, raw, canonical);
            }
        }
        aliases
    }

    /// Adds or replaces one alias.
    pub fn with_alias(mut self, kind: EntityKind, raw: &str, canonical: &str) -> Self {
        self.tables
            .entry(kind)
            .or_default()
            .insert(normalize_header(raw), canonical.to_string());
        self
    }

    /// Canonical name for a raw header; unknown headers pass through trimmed.
    pub fn resolve(&self, kind: EntityKind, header: &str) -> String {
        self.tables
            .get(&kind)
            .and_then(|table| table.get(&normalize_header(header)))
            .cloned()
            .unwrap_or_else(|| header.trim().to_string())
    }

    /// Rewrites every row's headers to canonical names.
    ///
    /// When two raw headers resolve to the same field, the first non-blank
    /// cell wins.
    pub fn normalize_rows(&self, kind: EntityKind, rows: &[RawRow]) -> Vec<RawRow> {
        rows.iter()
            .map(|row| {
                let mut normalized = RawRow::new();
                for (header, value) in row {
                    let key = self.resolve(kind, header);
                    match normalized.get(&key) {
                        Some(existing) if !existing.trim().is_empty() => {}
                        _ => {
                            normalized.insert(key, value.clone());
                        }
                    }
                }
                normalized
            })
            .collect()
    }
}

impl Default for HeaderAliases {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize_header(header: &str) -> String {
    header
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Converts parser output (a JSON array of objects) into raw rows.
///
/// Scalar cells are stringified, `null` becomes an empty cell and arrays
/// are joined with commas. Anything other than an array of objects is an
/// [`AllocationError::InvalidInputShape`].
pub fn rows_from_json(value: &Value, context: &str) -> Result<Vec<RawRow>> {
    let items = value
        .as_array()
        .ok_or_else(|| AllocationError::shape(context, "array of row objects"))?;

    items
        .iter()
        .map(|item| {
            let object = item
                .as_object()
                .ok_or_else(|| AllocationError::shape(context, "row object"))?;
            object
                .iter()
                .map(|(key, cell)| Ok((key.clone(), cell_text(cell, context)?)))
                .collect()
        })
        .collect()
}

fn cell_text(cell: &Value, context: &str) -> Result<String> {
    match cell {
        Value::Null => Ok(String::new()),
        Value::String(s) => Ok(s.clone()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        // Phase lists stay JSON so the strict slot parser accepts them.
        Value::Array(items) if !items.is_empty() && items.iter().all(Value::is_number) => Ok(cell.to_string()),
        Value::Array(items) => items
            .iter()
            .map(|item| cell_text(item, context))
            .collect::<Result<Vec<_>>>()
            .map(|parts| parts.join(",")),
        Value::Object(_) => Ok(cell.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(pairs: &[(&str, &str)]) -> RawRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_resolve_variants() {
        let aliases = HeaderAliases::new();
        assert_eq!(aliases.resolve(EntityKind::Client, "ClientID"), "clientId");
        assert_eq!(aliases.resolve(EntityKind::Client, "client_id"), "clientId");
        assert_eq!(aliases.resolve(EntityKind::Client, "Client Id"), "clientId");
        assert_eq!(aliases.resolve(EntityKind::Worker, "MaxLoadPerPhase"), "maxLoad");
        assert_eq!(aliases.resolve(EntityKind::Worker, "AvailableSlots"), "availability");
        assert_eq!(aliases.resolve(EntityKind::Task, "TaskName"), "title");
        assert_eq!(aliases.resolve(EntityKind::Task, "PreferredPhases"), "preferredPhases");
        assert_eq!(aliases.resolve(EntityKind::Task, "Notes "), "Notes");
    }

    #[test]
    fn test_kind_specific_id() {
        let aliases = HeaderAliases::new();
        assert_eq!(aliases.resolve(EntityKind::Client, "id"), "clientId");
        assert_eq!(aliases.resolve(EntityKind::Worker, "id"), "workerId");
        assert_eq!(aliases.resolve(EntityKind::Task, "id"), "taskId");
    }

    #[test]
    fn test_configured_alias_overrides() {
        let mut config = HeaderAliasConfig::default();
        config.tasks.insert("Job Ref".into(), "taskId".into());
        let aliases = HeaderAliases::from_config(&config);
        assert_eq!(aliases.resolve(EntityKind::Task, "job_ref"), "taskId");
        assert_eq!(aliases.resolve(EntityKind::Task, "TaskID"), "taskId");
    }

    #[test]
    fn test_normalize_rows_first_nonblank_wins() {
        let aliases = HeaderAliases::new();
        let rows = vec![row(&[("ClientID", "C1"), ("id", ""), ("ClientName", "Acme")])];
        let out = aliases.normalize_rows(EntityKind::Client, &rows);
        assert_eq!(out[0]["clientId"], "C1");
        assert_eq!(out[0]["name"], "Acme");
    }

    #[test]
    fn test_rows_from_json() {
        let value = json!([
            {"ClientID": "C1", "PriorityLevel": 3, "RequestedTaskIDs": ["T1", "T2"], "GroupTag": null},
        ]);
        let rows = rows_from_json(&value, "clients").unwrap();
        assert_eq!(rows[0]["PriorityLevel"], "3");
        assert_eq!(rows[0]["RequestedTaskIDs"], "T1,T2");
        assert_eq!(rows[0]["GroupTag"], "");
    }

    #[test]
    fn test_rows_from_json_numeric_array_kept_as_json() {
        let value = json!([{"AvailableSlots": [1, 2], "Skills": ["rust", "sql"]}]);
        let rows = rows_from_json(&value, "workers").unwrap();
        assert_eq!(rows[0]["AvailableSlots"], "[1,2]");
        assert_eq!(rows[0]["Skills"], "rust,sql");
    }

    #[test]
    fn test_rows_from_json_rejects_non_array() {
        let err = rows_from_json(&json!({"ClientID": "C1"}), "clients").unwrap_err();
        assert!(matches!(err, AllocationError::InvalidInputShape { .. }));

        let err = rows_from_json(&json!(["C1"]), "clients").unwrap_err();
        assert!(matches!(err, AllocationError::InvalidInputShape { .. }));
    }
}
