//! Writes rule effects into a new data snapshot.
//!
//! | Rule | Effect on the snapshot |
//! |------|------------------------|
//! | phase window | preferred phases narrowed to the window |
//! | load limit | worker `maxLoad` capped at `maxSlotsPerPhase` |
//! | custom rule | priority and attribute actions written |
//!
//! Conflicts are resolved exactly as the engine resolves them. Custom rules
//! run in order against the snapshot as modified so far. The result is
//! re-validated; the input snapshot is never touched.

use serde_json::{Map, Value};
use tracing::debug;

use super::conditions::{all_hold, plan_actions, ProposedChange};
use super::engine::ResolvedRules;
use super::model::{CustomRule, Rule};
use super::precedence::PrecedenceDecision;
use super::rule_set::{RuleConfig, SkippedRule};
use crate::config::CoreConfig;
use crate::models::fields::{self, ATTRIBUTES_PREFIX};
use crate::models::{CellValue, Client, EntityKind, FieldAccess, Priority, ProcessedData, Task, Worker};

/// A materialized snapshot and what changed.
#[derive(Debug, Clone, PartialEq)]
pub struct Materialized {
    pub data: ProcessedData,
    pub changes: Vec<ProposedChange>,
    pub skipped: Vec<SkippedRule>,
    pub overrides: Vec<PrecedenceDecision>,
}

/// Applies `rules` to a copy of `data`.
pub fn materialize(data: &ProcessedData, rules: &RuleConfig, config: &CoreConfig) -> Materialized {
    let resolved = ResolvedRules::resolve(&data.clients, &data.workers, &data.tasks, rules);
    let mut working = data.clone();
    let mut changes = Vec::new();

    for task in &mut working.tasks {
        let Some(Rule::PhaseWindow(window)) = resolved
            .phase_windows
            .get(&task.task_id)
            .and_then(|&i| resolved.rules.get(i))
        else {
            continue;
        };
        let current = task.phases().to_vec();
        let mut narrowed: Vec<i64> = current
            .iter()
            .copied()
            .filter(|p| window.allowed_phases.contains(p))
            .collect();
        if narrowed.is_empty() {
            narrowed = window.allowed_phases.clone();
        }
        let already = matches!(&task.preferred_phases, Some(CellValue::Parsed(p)) if *p == narrowed);
        if !already {
            let from = task.field(fields::PREFERRED_PHASES);
            task.preferred_phases = Some(CellValue::Parsed(narrowed.clone()));
            changes.push(change(&*task, fields::PREFERRED_PHASES, from, Value::from(narrowed)));
        }
    }

    for worker in &mut working.workers {
        let Some(Rule::LoadLimit(limit)) = resolved
            .load_limits
            .get(&worker.worker_id)
            .and_then(|&i| resolved.rules.get(i))
        else {
            continue;
        };
        let cap = limit.max_slots_per_phase;
        let exceeds = match &worker.max_load {
            None => true,
            Some(CellValue::Parsed(v)) => *v > cap,
            Some(CellValue::Unparsed(_)) => false,
        };
        if exceeds {
            let from = worker.field(fields::MAX_LOAD);
            worker.max_load = Some(CellValue::Parsed(cap));
            changes.push(change(&*worker, fields::MAX_LOAD, from, Value::from(cap)));
        }
    }

    for rule in &resolved.rules {
        let Rule::CustomRule(custom) = rule else {
            continue;
        };
        match custom.conditions.first().map(|c| c.entity) {
            Some(EntityKind::Client) => {
                apply_custom(&mut working.clients, custom, write_client, &mut changes)
            }
            Some(EntityKind::Worker) => {
                apply_custom(&mut working.workers, custom, write_worker, &mut changes)
            }
            Some(EntityKind::Task) => apply_custom(&mut working.tasks, custom, write_task, &mut changes),
            None => {}
        }
    }

    debug!(changes = changes.len(), skipped = resolved.skipped.len(), "rules materialized");
    Materialized {
        data: working.revalidate(config),
        changes,
        skipped: resolved.skipped,
        overrides: resolved.overrides,
    }
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

fn apply_custom<T: FieldAccess>(
    entities: &mut [T],
    custom: &CustomRule,
    write: fn(&mut T, &str, &Value) -> bool,
    changes: &mut Vec<ProposedChange>,
) {
    for entity in entities.iter_mut() {
        if !all_hold(&custom.conditions, &*entity) {
            continue;
        }
        for proposed in plan_actions(&*entity, &custom.actions).changes {
            if write(entity, &proposed.field, &proposed.to) {
                changes.push(proposed);
            }
        }
    }
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn write_client(client: &mut Client, field: &str, value: &Value) -> bool {
    if let Some(key) = field.strip_prefix(ATTRIBUTES_PREFIX) {
        let mut attributes = match client.attributes_json.as_deref() {
            None => Map::new(),
            Some(raw) if raw.trim().is_empty() => Map::new(),
            Some(raw) => match serde_json::from_str::<Value>(raw) {
                Ok(Value::Object(map)) => map,
                // broken JSON is left for validation to report
                _ => return false,
            },
        };
        attributes.insert(key.to_string(), value.clone());
        client.attributes_json = Some(Value::Object(attributes).to_string());
        return true;
    }
    match field {
        fields::PRIORITY => {
            client.priority = match value.as_i64() {
                Some(v) => Priority::Numeric(v),
                None => Priority::parse(&text(value)),
            };
        }
        fields::NAME => client.name = text(value),
        fields::EMAIL => client.email = Some(text(value)),
        fields::GROUP_TAG => client.group_tag = Some(text(value)),
        other => {
            client.extra.insert(other.to_string(), text(value));
        }
    }
    true
}

fn write_worker(worker: &mut Worker, field: &str, value: &Value) -> bool {
    match field {
        fields::NAME => worker.name = text(value),
        fields::DEPARTMENT => worker.department = Some(text(value)),
        fields::WORKER_GROUP => worker.worker_group = Some(text(value)),
        fields::QUALIFICATION_LEVEL => worker.qualification_level = Some(text(value)),
        fields::WORKER_ID | fields::SKILLS | fields::AVAILABILITY | fields::MAX_LOAD => return false,
        other => {
            worker.extra.insert(other.to_string(), text(value));
        }
    }
    true
}

fn write_task(task: &mut Task, field: &str, value: &Value) -> bool {
    match field {
        fields::PRIORITY => match value.as_i64() {
            Some(v) => task.priority = Some(CellValue::Parsed(v)),
            None => return false,
        },
        fields::TITLE => task.title = text(value),
        fields::CATEGORY => task.category = Some(text(value)),
        fields::TASK_ID
        | fields::DURATION
        | fields::PREFERRED_PHASES
        | fields::REQUIRED_SKILLS
        | fields::MAX_CONCURRENT
        | fields::CO_RUN_GROUP => return false,
        other => {
            task.extra.insert(other.to_string(), text(value));
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ErrorType, PriorityLevel};
    use crate::quality::DataQuality;
    use crate::rules::conditions::{Action, Condition, ConditionOp};
    use crate::rules::model::{LoadLimit, PhaseWindow};
    use crate::validation::FileNames;
    use serde_json::json;

    fn snapshot() -> ProcessedData {
        let data = ProcessedData {
            clients: vec![Client::new("C1", "Acme")
                .with_priority(Priority::Level(PriorityLevel::Low))
                .with_requested_tasks(["T1"])],
            workers: vec![Worker::new("W1", "Ada")
                .with_skill("rust")
                .with_availability(vec![1, 2, 3])
                .with_max_load(3)],
            tasks: vec![Task::new("T1", "Build")
                .with_duration(1.0)
                .with_phases(vec![1, 2])
                .with_required_skill("rust")],
            validation_errors: Vec::new(),
            data_quality: DataQuality::calculate(3, 3),
            source_files: FileNames::default(),
        };
        data.revalidate(&CoreConfig::default())
    }

    #[test]
    fn test_phase_window_narrows() {
        let rules = RuleConfig::new().with_rule(PhaseWindow::new("p1", "T1", vec![2, 3]));
        let out = materialize(&snapshot(), &rules, &CoreConfig::default());
        assert_eq!(out.data.tasks[0].phases(), &[2]);
        assert_eq!(out.changes.len(), 1);
        assert_eq!(out.changes[0].from, Some(json!([1, 2])));
    }

    #[test]
    fn test_phase_window_disjoint_replaces() {
        let rules = RuleConfig::new().with_rule(PhaseWindow::new("p1", "T1", vec![4]));
        let out = materialize(&snapshot(), &rules, &CoreConfig::default());
        assert_eq!(out.data.tasks[0].phases(), &[4]);
        // the worker is not available in phase 4
        assert!(out
            .data
            .validation_errors
            .iter()
            .any(|e| e.error_type == ErrorType::PhaseSaturation));
    }

    #[test]
    fn test_load_limit_caps() {
        let rules = RuleConfig::new().with_rule(LoadLimit::new("l1", ["W1"], 1));
        let out = materialize(&snapshot(), &rules, &CoreConfig::default());
        assert_eq!(out.data.workers[0].max_load_value(), Some(1));
        let looser = RuleConfig::new().with_rule(LoadLimit::new("l1", ["W1"], 5));
        assert!(materialize(&snapshot(), &looser, &CoreConfig::default()).changes.is_empty());
    }

    #[test]
    fn test_custom_rule_written() {
        let rules = RuleConfig::new().with_rule(CustomRule::new(
            "x1",
            "vip",
            vec![Condition::new(EntityKind::Client, "clientId", ConditionOp::Eq, json!("C1"))],
            vec![
                Action::BoostPriority { by: 2 },
                Action::SetAttribute { attribute: "tier".into(), value: json!("gold") },
            ],
        ));
        let data = snapshot();
        let out = materialize(&data, &rules, &CoreConfig::default());
        let client = &out.data.clients[0];
        assert_eq!(client.priority, Priority::Numeric(3));
        assert_eq!(client.field("attributes.tier"), Some(json!("gold")));
        assert_eq!(out.changes.len(), 2);
        // input untouched
        assert_eq!(data.clients[0].priority, Priority::Level(PriorityLevel::Low));
    }

    #[test]
    fn test_broken_attributes_not_overwritten() {
        let mut data = snapshot();
        data.clients[0].attributes_json = Some("{broken".into());
        let rules = RuleConfig::new().with_rule(CustomRule::new(
            "x1",
            "tag",
            vec![Condition::new(EntityKind::Client, "clientId", ConditionOp::Eq, json!("C1"))],
            vec![Action::SetAttribute { attribute: "tier".into(), value: json!("gold") }],
        ));
        let out = materialize(&data, &rules, &CoreConfig::default());
        assert!(out.changes.is_empty());
        assert_eq!(out.data.clients[0].attributes_json.as_deref(), Some("{broken"));
    }
}
