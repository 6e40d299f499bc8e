//! Pattern-match rule instantiation.
//!
//! A pattern rule names an entity kind (`parameters.entity`, default
//! `task`) and a field (`parameters.field`, default the ID field). Its regex
//! is run against the text of that field on every entity of the kind; the
//! matches instantiate the template:
//!
//! | Template | Entity | Parameters | Produces |
//! |----------|--------|------------|----------|
//! | `phaseWindow` | task | `allowedPhases` | one phase window per task |
//! | `loadLimit` | worker | `maxSlotsPerPhase`, `phases`? | one load limit over all matches |
//! | `coRunGroup` | task | | one co-run group of all matches |
//! | `flag` | any | `message`? | one custom rule flagging each match |
//!
//! Instantiated rules carry the pattern's header, ID included.

use regex::Regex;
use serde_json::{Map, Value};

use super::conditions::{Action, Condition, ConditionOp};
use super::model::{CoRunGroup, CustomRule, LoadLimit, PatternMatch, PhaseWindow, Rule};
use crate::models::{Client, EntityKind, FieldAccess, Task, Worker};

/// Custom-rule type given to instantiated `flag` templates.
pub const PATTERN_RULE_KIND: &str = "patternMatch";

/// Rule template a pattern instantiates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    PhaseWindow,
    LoadLimit,
    CoRunGroup,
    Flag,
}

impl Template {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim() {
            "phaseWindow" => Some(Self::PhaseWindow),
            "loadLimit" => Some(Self::LoadLimit),
            "coRunGroup" => Some(Self::CoRunGroup),
            "flag" => Some(Self::Flag),
            _ => None,
        }
    }

    fn entity(self) -> Option<EntityKind> {
        match self {
            Self::PhaseWindow | Self::CoRunGroup => Some(EntityKind::Task),
            Self::LoadLimit => Some(EntityKind::Worker),
            Self::Flag => None,
        }
    }
}

/// Expands a pattern into concrete rules. No match yields no rules.
pub fn instantiate(
    pattern: &PatternMatch,
    clients: &[Client],
    workers: &[Worker],
    tasks: &[Task],
) -> Result<Vec<Rule>, String> {
    let template = Template::parse(&pattern.rule_template)
        .ok_or_else(|| format!("unknown rule template '{}'", pattern.rule_template))?;
    let regex = Regex::new(&pattern.pattern).map_err(|e| format!("invalid pattern: {e}"))?;
    let params = &pattern.parameters;

    let entity = match params.get("entity") {
        None => template.entity().unwrap_or(EntityKind::Task),
        Some(v) => serde_json::from_value(v.clone())
            .map_err(|_| format!("unknown entity kind {v}"))?,
    };
    if let Some(required) = template.entity() {
        if entity != required {
            return Err(format!("template '{}' applies to {required} entities", pattern.rule_template));
        }
    }
    let field = params
        .get("field")
        .and_then(Value::as_str)
        .unwrap_or(entity.id_field());

    let matched = match entity {
        EntityKind::Client => matching_ids(clients, &regex, field),
        EntityKind::Worker => matching_ids(workers, &regex, field),
        EntityKind::Task => matching_ids(tasks, &regex, field),
    };
    if matched.is_empty() {
        return Ok(Vec::new());
    }

    let meta = pattern.meta.clone();
    let rules = match template {
        Template::PhaseWindow => {
            let allowed = phase_list(params, "allowedPhases")?
                .ok_or("phaseWindow template needs allowedPhases")?;
            matched
                .into_iter()
                .map(|task_id| {
                    Rule::from(PhaseWindow {
                        meta: meta.clone(),
                        task_id,
                        allowed_phases: allowed.clone(),
                    })
                })
                .collect()
        }
        Template::LoadLimit => {
            let max_slots_per_phase = params
                .get("maxSlotsPerPhase")
                .and_then(Value::as_i64)
                .ok_or("loadLimit template needs an integer maxSlotsPerPhase")?;
            vec![Rule::from(LoadLimit {
                meta,
                worker_group_ids: matched,
                max_slots_per_phase,
                phases: phase_list(params, "phases")?.unwrap_or_default(),
            })]
        }
        Template::CoRunGroup => vec![Rule::from(CoRunGroup { meta, task_ids: matched })],
        Template::Flag => {
            let message = params
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("Matches pattern '{}'", pattern.pattern));
            let condition = Condition::new(
                entity,
                entity.id_field(),
                ConditionOp::In,
                Value::from(matched),
            );
            vec![Rule::from(CustomRule {
                meta,
                kind: PATTERN_RULE_KIND.to_string(),
                conditions: vec![condition],
                actions: vec![Action::Flag { message }],
                ai_generated: false,
            })]
        }
    };
    Ok(rules)
}

fn matching_ids<T: FieldAccess>(items: &[T], regex: &Regex, field: &str) -> Vec<String> {
    items
        .iter()
        .filter(|item| item.field(field).is_some_and(|v| regex.is_match(&field_text(&v))))
        .map(|item| item.id().to_string())
        .collect()
}

fn field_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(field_text).collect::<Vec<_>>().join(","),
        other => other.to_string(),
    }
}

fn phase_list(params: &Map<String, Value>, key: &str) -> Result<Option<Vec<i64>>, String> {
    match params.get(key) {
        None => Ok(None),
        Some(v) => serde_json::from_value(v.clone())
            .map(Some)
            .map_err(|_| format!("{key} must be a list of phase numbers")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tasks() -> Vec<Task> {
        vec![
            Task::new("T1", "Build API").with_category("backend"),
            Task::new("T2", "Design UI").with_category("frontend"),
            Task::new("T3", "API docs").with_category("backend"),
        ]
    }

    fn pattern(template: &str, params: Value) -> PatternMatch {
        let Value::Object(params) = params else {
            panic!("parameters must be an object");
        };
        PatternMatch::new("pm1", "^back", template, params)
    }

    #[test]
    fn test_phase_window_per_task() {
        let p = pattern("phaseWindow", json!({"field": "category", "allowedPhases": [1, 2]}));
        let rules = instantiate(&p, &[], &[], &tasks()).unwrap();
        assert_eq!(rules.len(), 2);
        assert!(rules.iter().all(|r| r.id() == "pm1"));
        let Rule::PhaseWindow(w) = &rules[1] else {
            panic!("wrong variant");
        };
        assert_eq!(w.task_id, "T3");
        assert_eq!(w.allowed_phases, vec![1, 2]);
    }

    #[test]
    fn test_co_run_group_of_matches() {
        let p = pattern("coRunGroup", json!({"field": "category"}));
        let rules = instantiate(&p, &[], &[], &tasks()).unwrap();
        assert_eq!(rules, vec![Rule::from(CoRunGroup { meta: p.meta.clone(), task_ids: vec!["T1".into(), "T3".into()] })]);
    }

    #[test]
    fn test_load_limit_over_workers() {
        let workers = vec![
            Worker::new("W1", "Ada").with_group("backend"),
            Worker::new("W2", "Bob").with_group("frontend"),
        ];
        let p = pattern(
            "loadLimit",
            json!({"entity": "worker", "field": "workerGroup", "maxSlotsPerPhase": 1}),
        );
        let rules = instantiate(&p, &[], &workers, &[]).unwrap();
        let Rule::LoadLimit(l) = &rules[0] else {
            panic!("wrong variant");
        };
        assert_eq!(l.worker_group_ids, vec!["W1"]);
        assert!(l.phases.is_empty());
    }

    #[test]
    fn test_flag_any_entity() {
        let clients = vec![Client::new("C1", "Backend Corp"), Client::new("C2", "Other")];
        let mut p = pattern("flag", json!({"entity": "client", "field": "name"}));
        p.pattern = "(?i)backend".into();
        let rules = instantiate(&p, &clients, &[], &[]).unwrap();
        let Rule::CustomRule(c) = &rules[0] else {
            panic!("wrong variant");
        };
        assert_eq!(c.kind, PATTERN_RULE_KIND);
        assert!(c.conditions[0].holds(&clients[0]));
        assert!(!c.conditions[0].holds(&clients[1]));
    }

    #[test]
    fn test_bad_parameters() {
        let missing = pattern("phaseWindow", json!({"field": "category"}));
        assert!(instantiate(&missing, &[], &[], &tasks()).is_err());
        let wrong_entity = pattern("coRunGroup", json!({"entity": "worker"}));
        assert!(instantiate(&wrong_entity, &[], &[], &tasks()).is_err());
        let unknown = pattern("teleport", json!({}));
        assert!(instantiate(&unknown, &[], &[], &tasks()).is_err());
    }

    #[test]
    fn test_no_match_is_empty() {
        let p = pattern("coRunGroup", json!({}));
        // default field is taskId, which never starts with "back"
        assert!(instantiate(&p, &[], &[], &tasks()).unwrap().is_empty());
    }
}
