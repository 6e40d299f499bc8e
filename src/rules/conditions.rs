//! Custom rule conditions and actions.
//!
//! Conditions are AND-ed; actions run in sequence against a working copy
//! of the entity, so `setPriority` followed by `boostPriority` boosts the
//! value just set.
//!
//! # Operators
//!
//! | Op | Aliases | Semantics |
//! |----|---------|-----------|
//! | `eq` | `==` | numeric equality, else case-insensitive text equality |
//! | `ne` | `!=` | negation of `eq`; true when the field is absent |
//! | `gt` `ge` `lt` `le` | `>` `>=` `<` `<=` | numeric only |
//! | `contains` | | list membership or substring (case-insensitive) |
//! | `matches` | | regex on the field text |
//! | `in` | | field equals one of the listed values |

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::fields::{self, ATTRIBUTES_PREFIX, PRIORITY};
use crate::models::{EntityKind, FieldAccess, Priority, MAX_PRIORITY, MIN_PRIORITY};

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConditionOp {
    #[serde(alias = "==")]
    Eq,
    #[serde(alias = "!=")]
    Ne,
    #[serde(alias = ">")]
    Gt,
    #[serde(alias = ">=")]
    Ge,
    #[serde(alias = "<")]
    Lt,
    #[serde(alias = "<=")]
    Le,
    Contains,
    Matches,
    In,
}

/// One predicate over an entity field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Entity kind the field belongs to.
    #[serde(default = "default_entity")]
    pub entity: EntityKind,
    /// Canonical field name, or `attributes.<key>` for client attributes.
    pub field: String,
    #[serde(alias = "operator")]
    pub op: ConditionOp,
    pub value: Value,
}

fn default_entity() -> EntityKind {
    EntityKind::Task
}

impl Condition {
    /// Creates a condition.
    pub fn new(entity: EntityKind, field: impl Into<String>, op: ConditionOp, value: Value) -> Self {
        Self {
            entity,
            field: field.into(),
            op,
            value,
        }
    }

    /// Structural check: `matches` needs a valid regex, `in` needs a list.
    pub fn check(&self) -> Result<(), String> {
        if self.field.trim().is_empty() {
            return Err("condition has an empty field".into());
        }
        match self.op {
            ConditionOp::Matches => {
                let pattern = self
                    .value
                    .as_str()
                    .ok_or("'matches' expects a string pattern")?;
                Regex::new(pattern).map_err(|e| format!("invalid pattern: {e}"))?;
            }
            ConditionOp::In if !self.value.is_array() => {
                return Err("'in' expects a list of values".into());
            }
            _ => {}
        }
        Ok(())
    }

    /// Evaluates the condition against an entity.
    pub fn holds<T: FieldAccess>(&self, entity: &T) -> bool {
        if T::KIND != self.entity {
            return false;
        }
        let Some(actual) = entity.field(&self.field) else {
            return self.op == ConditionOp::Ne;
        };
        match self.op {
            ConditionOp::Eq => loosely_equal(&actual, &self.value),
            ConditionOp::Ne => !loosely_equal(&actual, &self.value),
            ConditionOp::Gt => compare(&actual, &self.value, |a, b| a > b),
            ConditionOp::Ge => compare(&actual, &self.value, |a, b| a >= b),
            ConditionOp::Lt => compare(&actual, &self.value, |a, b| a < b),
            ConditionOp::Le => compare(&actual, &self.value, |a, b| a <= b),
            ConditionOp::Contains => contains(&actual, &self.value),
            ConditionOp::Matches => self
                .value
                .as_str()
                .and_then(|p| Regex::new(p).ok())
                .is_some_and(|re| re.is_match(&text(&actual))),
            ConditionOp::In => self
                .value
                .as_array()
                .is_some_and(|options| options.iter().any(|o| loosely_equal(&actual, o))),
        }
    }
}

/// Whether every condition holds (vacuously true for none).
pub fn all_hold<T: FieldAccess>(conditions: &[Condition], entity: &T) -> bool {
    conditions.iter().all(|c| c.holds(entity))
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(text).collect::<Vec<_>>().join(","),
        other => other.to_string(),
    }
}

fn loosely_equal(actual: &Value, expected: &Value) -> bool {
    if let (Some(a), Some(b)) = (number(actual), number(expected)) {
        return (a - b).abs() < 1e-9;
    }
    if actual.is_array() || expected.is_array() {
        return actual == expected;
    }
    text(actual).eq_ignore_ascii_case(&text(expected))
}

fn compare(actual: &Value, expected: &Value, cmp: impl Fn(f64, f64) -> bool) -> bool {
    match (number(actual), number(expected)) {
        (Some(a), Some(b)) => cmp(a, b),
        _ => false,
    }
}

fn contains(actual: &Value, needle: &Value) -> bool {
    match actual {
        Value::Array(items) => items.iter().any(|item| loosely_equal(item, needle)),
        other => text(other)
            .to_lowercase()
            .contains(&text(needle).to_lowercase()),
    }
}

/// A step applied to each entity matching a custom rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Action {
    /// Sets priority to a fixed value (clamped to 1-5).
    SetPriority { value: i64 },
    /// Raises priority (clamped to 1-5).
    BoostPriority {
        #[serde(default = "one")]
        by: i64,
    },
    /// Lowers priority (clamped to 1-5).
    LowerPriority {
        #[serde(default = "one")]
        by: i64,
    },
    /// Writes a field or attribute.
    SetAttribute { attribute: String, value: Value },
    /// Reports the entity as a violation.
    Flag { message: String },
    /// Attaches a free-text recommendation.
    Recommend { message: String },
}

fn one() -> i64 {
    1
}

/// A field change proposed by a rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposedChange {
    pub entity: EntityKind,
    pub entity_id: String,
    pub field: String,
    pub from: Option<Value>,
    pub to: Value,
}

/// What a sequence of actions does to one entity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionEffects {
    pub changes: Vec<ProposedChange>,
    pub flags: Vec<String>,
    pub notes: Vec<String>,
}

/// Runs `actions` in order against a working copy of `entity`.
///
/// Priority actions do not apply to workers and are ignored for them.
pub fn plan_actions<T: FieldAccess>(entity: &T, actions: &[Action]) -> ActionEffects {
    let mut effects = ActionEffects::default();
    let mut working: Map<String, Value> = Map::new();
    let current = |working: &Map<String, Value>, field: &str| {
        working.get(field).cloned().or_else(|| entity.field(field))
    };

    for action in actions {
        let (field, to) = match action {
            Action::SetPriority { value } => (PRIORITY.to_string(), *value),
            Action::BoostPriority { by } | Action::LowerPriority { by } => {
                let Some(base) = numeric_priority(T::KIND, current(&working, PRIORITY).as_ref())
                else {
                    continue;
                };
                let delta = if matches!(action, Action::LowerPriority { .. }) { -by } else { *by };
                (PRIORITY.to_string(), base.saturating_add(delta))
            }
            Action::SetAttribute { attribute, value } => {
                let field = attribute_field(T::KIND, attribute);
                let from = current(&working, &field);
                if from.as_ref() != Some(value) {
                    effects.changes.push(change(entity, &field, from, value.clone()));
                    working.insert(field, value.clone());
                }
                continue;
            }
            Action::Flag { message } => {
                effects.flags.push(message.clone());
                continue;
            }
            Action::Recommend { message } => {
                effects.notes.push(message.clone());
                continue;
            }
        };

        if T::KIND == EntityKind::Worker {
            continue;
        }
        let to = Value::from(to.clamp(MIN_PRIORITY, MAX_PRIORITY));
        let from = current(&working, &field);
        if numeric_priority(T::KIND, from.as_ref()) != to.as_i64() {
            effects.changes.push(change(entity, &field, from, to.clone()));
        }
        working.insert(field, to);
    }
    effects
}

fn change<T: FieldAccess>(entity: &T, field: &str, from: Option<Value>, to: Value) -> ProposedChange {
    ProposedChange {
        entity: T::KIND,
        entity_id: entity.id().to_string(),
        field: field.to_string(),
        from,
        to,
    }
}

/// Numeric 1-5 priority of a field value. Missing task priority counts as
/// the lowest; workers have none.
fn numeric_priority(kind: EntityKind, value: Option<&Value>) -> Option<i64> {
    match (kind, value) {
        (EntityKind::Worker, _) => None,
        (_, Some(Value::Number(n))) => n.as_i64(),
        (_, Some(Value::String(s))) => Priority::parse(s).as_numeric(),
        (_, _) => Some(MIN_PRIORITY),
    }
}

/// Target field for `setAttribute`: unknown client fields live in the
/// attributes JSON.
fn attribute_field(kind: EntityKind, attribute: &str) -> String {
    let attribute = attribute.trim();
    let known_client_field = matches!(attribute, fields::NAME | fields::EMAIL | fields::GROUP_TAG);
    if kind == EntityKind::Client
        && !known_client_field
        && !attribute.starts_with(ATTRIBUTES_PREFIX)
    {
        format!("{ATTRIBUTES_PREFIX}{attribute}")
    } else {
        attribute.to_string()
    }
}
