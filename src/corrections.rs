//! Automatic corrections.
//!
//! Repairs the common problems the validators report and returns a new,
//! re-validated snapshot together with one [`Fix`] per change. Passes run in
//! this order:
//!
//! 1. duplicate IDs dropped (workers: the copy covering most required skills stays)
//! 2. requests for unknown tasks removed
//! 3. numeric ranges clamped (client priority, duration, maxConcurrent)
//! 4. attributes JSON repaired, or reset to `{}`
//! 5. availability limited to the phase range
//! 6. missing optional fields defaulted
//!
//! Workers never gain skills: that would invent data.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;
use tracing::debug;

use crate::config::CoreConfig;
use crate::models::fields::*;
use crate::models::{
    normalize_skill, CellValue, Duration, EntityKind, FieldAccess, Priority, ProcessedData, Worker,
    MAX_PRIORITY, MIN_PRIORITY,
};

static INTEGER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-?\d+").expect("integer pattern is valid"));

/// What a fix did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixKind {
    DroppedDuplicate,
    RemovedReference,
    Clamped,
    RepairedJson,
    ResetJson,
    RepairedAvailability,
    FilledDefault,
}

/// One applied correction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fix {
    pub kind: FixKind,
    pub entity: EntityKind,
    pub entity_id: String,
    pub row: usize,
    pub field: String,
    pub detail: String,
}

/// Corrected snapshot and the fixes that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionOutcome {
    pub data: ProcessedData,
    pub fixes: Vec<Fix>,
}

impl CorrectionOutcome {
    /// Fixes of one kind.
    pub fn count(&self, kind: FixKind) -> usize {
        self.fixes.iter().filter(|f| f.kind == kind).count()
    }
}

struct Fixes(Vec<Fix>);

impl Fixes {
    fn record<T: FieldAccess>(&mut self, kind: FixKind, entity: &T, field: &str, detail: impl Into<String>) {
        let fix = Fix {
            kind,
            entity: T::KIND,
            entity_id: entity.id().to_string(),
            row: entity.row(),
            field: field.to_string(),
            detail: detail.into(),
        };
        debug!(kind = ?fix.kind, entity = %fix.entity_id, field = %fix.field, "{}", fix.detail);
        self.0.push(fix);
    }
}

/// Applies every automatic correction to a copy of `data`.
pub fn apply_automatic_fixes(data: &ProcessedData, config: &CoreConfig) -> CorrectionOutcome {
    let mut working = data.clone();
    let mut fixes = Fixes(Vec::new());

    drop_duplicates(&mut working, &mut fixes);
    remove_unknown_requests(&mut working, &mut fixes);
    clamp_ranges(&mut working, &mut fixes);
    repair_attributes(&mut working, &mut fixes);
    repair_availability(&mut working, config, &mut fixes);
    fill_defaults(&mut working, &mut fixes);

    // dropped duplicates stay counted as bad rows
    let dropped = fixes.0.iter().filter(|f| f.kind == FixKind::DroppedDuplicate).count();
    working.data_quality.error_rows += dropped;

    CorrectionOutcome {
        data: working.revalidate(config),
        fixes: fixes.0,
    }
}

fn drop_duplicates(data: &mut ProcessedData, fixes: &mut Fixes) {
    let mut seen = HashSet::new();
    data.clients.retain(|c| {
        let first = seen.insert(c.client_id.clone());
        if !first {
            fixes.record(FixKind::DroppedDuplicate, c, CLIENT_ID, "removed duplicate client");
        }
        first
    });

    let mut seen = HashSet::new();
    data.tasks.retain(|t| {
        let first = seen.insert(t.task_id.clone());
        if !first {
            fixes.record(FixKind::DroppedDuplicate, t, TASK_ID, "removed duplicate task");
        }
        first
    });

    let required: HashSet<String> = data
        .tasks
        .iter()
        .flat_map(|t| t.required_skills.iter().map(|s| normalize_skill(s)))
        .collect();
    let coverage = |w: &Worker| {
        let covered = w
            .skills
            .iter()
            .map(|s| normalize_skill(s))
            .filter(|s| required.contains(s))
            .collect::<HashSet<_>>()
            .len();
        (covered, w.skills.len())
    };
    // best copy per ID: most coverage, then most skills, then earliest
    let mut best: HashMap<&str, usize> = HashMap::new();
    for (i, worker) in data.workers.iter().enumerate() {
        best.entry(worker.worker_id.as_str())
            .and_modify(|kept| {
                if coverage(worker) > coverage(&data.workers[*kept]) {
                    *kept = i;
                }
            })
            .or_insert(i);
    }
    let keep: HashSet<usize> = best.into_values().collect();
    let mut index = 0;
    data.workers.retain(|w| {
        let kept = keep.contains(&index);
        index += 1;
        if !kept {
            fixes.record(FixKind::DroppedDuplicate, w, WORKER_ID, "removed duplicate worker with fewer required skills");
        }
        kept
    });
}

fn remove_unknown_requests(data: &mut ProcessedData, fixes: &mut Fixes) {
    let known: HashSet<&str> = data.tasks.iter().map(|t| t.task_id.as_str()).collect();
    for client in &mut data.clients {
        let unknown: Vec<String> = client
            .requested_task_ids
            .iter()
            .filter(|id| !known.contains(id.as_str()))
            .cloned()
            .collect();
        if unknown.is_empty() {
            continue;
        }
        client.requested_task_ids.retain(|id| known.contains(id.as_str()));
        fixes.record(
            FixKind::RemovedReference,
            &*client,
            REQUESTED_TASK_IDS,
            format!("removed unknown task(s) {}", unknown.join(", ")),
        );
    }
}

fn clamp_ranges(data: &mut ProcessedData, fixes: &mut Fixes) {
    for client in &mut data.clients {
        if let Priority::Numeric(value) = client.priority {
            let clamped = value.clamp(MIN_PRIORITY, MAX_PRIORITY);
            if clamped != value {
                client.priority = Priority::Numeric(clamped);
                fixes.record(FixKind::Clamped, &*client, PRIORITY, format!("priority {value} -> {clamped}"));
            }
        }
    }
    for task in &mut data.tasks {
        if let Some(CellValue::Parsed(duration)) = &task.duration {
            if duration.amount < 1.0 {
                let amount = duration.amount;
                task.duration = Some(CellValue::Parsed(Duration { amount: 1.0, ..*duration }));
                fixes.record(FixKind::Clamped, &*task, DURATION, format!("duration {amount} -> 1"));
            }
        }
        if let Some(CellValue::Parsed(value)) = task.max_concurrent {
            if value < 1 {
                task.max_concurrent = Some(CellValue::Parsed(1));
                fixes.record(FixKind::Clamped, &*task, MAX_CONCURRENT, format!("maxConcurrent {value} -> 1"));
            }
        }
    }
}

fn repair_attributes(data: &mut ProcessedData, fixes: &mut Fixes) {
    for client in &mut data.clients {
        let Some(raw) = client.attributes_json.clone() else {
            continue;
        };
        if raw.trim().is_empty() || serde_json::from_str::<serde_json::Value>(&raw).is_ok() {
            continue;
        }
        let quoted = raw.replace('\'', "\"");
        if serde_json::from_str::<serde_json::Value>(&quoted).is_ok() {
            client.attributes_json = Some(quoted);
            fixes.record(FixKind::RepairedJson, &*client, ATTRIBUTES_JSON, "replaced single quotes");
        } else {
            client.attributes_json = Some("{}".into());
            fixes.record(FixKind::ResetJson, &*client, ATTRIBUTES_JSON, "reset unparseable attributes to {}");
        }
    }
}

fn repair_availability(data: &mut ProcessedData, config: &CoreConfig, fixes: &mut Fixes) {
    let settings = &config.validation;
    for worker in &mut data.workers {
        let candidates: Vec<i64> = match &worker.availability {
            Some(CellValue::Parsed(phases)) if phases.iter().all(|&p| settings.phase_in_range(p)) => {
                continue;
            }
            Some(CellValue::Parsed(phases)) => phases.clone(),
            Some(CellValue::Unparsed(raw)) => INTEGER
                .find_iter(raw)
                .filter_map(|m| m.as_str().parse().ok())
                .collect(),
            None => continue,
        };
        let mut repaired: Vec<i64> = Vec::new();
        for phase in candidates {
            if settings.phase_in_range(phase) && !repaired.contains(&phase) {
                repaired.push(phase);
            }
        }
        if repaired.is_empty() {
            repaired.push(settings.min_phase);
        }
        let detail = format!("availability -> {repaired:?}");
        worker.availability = Some(CellValue::Parsed(repaired));
        fixes.record(FixKind::RepairedAvailability, &*worker, AVAILABILITY, detail);
    }
}

fn fill_defaults(data: &mut ProcessedData, fixes: &mut Fixes) {
    for client in &mut data.clients {
        if client.group_tag.is_none() {
            client.group_tag = Some("default".into());
            fixes.record(FixKind::FilledDefault, &*client, GROUP_TAG, "groupTag = default");
        }
    }
    for worker in &mut data.workers {
        if worker.worker_group.is_none() {
            worker.worker_group = Some("default".into());
            fixes.record(FixKind::FilledDefault, &*worker, WORKER_GROUP, "workerGroup = default");
        }
    }
    for task in &mut data.tasks {
        if task.category.is_none() {
            task.category = Some("general".into());
            fixes.record(FixKind::FilledDefault, &*task, CATEGORY, "category = general");
        }
        if !matches!(task.preferred_phases, Some(CellValue::Parsed(_))) {
            task.preferred_phases = Some(CellValue::Parsed(vec![1]));
            fixes.record(FixKind::FilledDefault, &*task, PREFERRED_PHASES, "preferredPhases = [1]");
        }
        if !matches!(task.max_concurrent, Some(CellValue::Parsed(_))) {
            task.max_concurrent = Some(CellValue::Parsed(1));
            fixes.record(FixKind::FilledDefault, &*task, MAX_CONCURRENT, "maxConcurrent = 1");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Client, ErrorType, Task};
    use crate::quality::DataQuality;
    use crate::validation::FileNames;

    fn snapshot() -> ProcessedData {
        let mut broken_worker = Worker::new("W2", "Bob").with_skill("sql").with_max_load(1);
        broken_worker.availability = Some(CellValue::Unparsed("1, 9, x".into()));
        let data = ProcessedData {
            clients: vec![
                Client::new("C1", "Acme")
                    .with_priority(Priority::Numeric(9))
                    .with_requested_tasks(["T1", "T9"])
                    .with_attributes_json("{'tier': 'gold'}"),
                Client::new("C1", "Acme again"),
            ],
            workers: vec![
                Worker::new("W1", "Ada").with_skill("sql").with_availability(vec![1]).with_max_load(1),
                Worker::new("W1", "Ada").with_skill("rust").with_availability(vec![1]).with_max_load(1),
                broken_worker,
            ],
            tasks: vec![Task::new("T1", "Build")
                .with_duration(0.5)
                .with_required_skill("rust")
                .with_max_concurrent(0)],
            validation_errors: Vec::new(),
            data_quality: DataQuality::calculate(6, 6),
            source_files: FileNames::default(),
        };
        data.revalidate(&CoreConfig::default())
    }

    #[test]
    fn test_fixes_reported_in_pass_order() {
        let out = apply_automatic_fixes(&snapshot(), &CoreConfig::default());
        let kinds: Vec<FixKind> = out.fixes.iter().map(|f| f.kind).collect();
        let first_clamp = kinds.iter().position(|k| *k == FixKind::Clamped).unwrap();
        let last_duplicate = kinds.iter().rposition(|k| *k == FixKind::DroppedDuplicate).unwrap();
        assert!(last_duplicate < first_clamp);
        assert_eq!(out.count(FixKind::DroppedDuplicate), 2);
        assert_eq!(out.count(FixKind::RemovedReference), 1);
        assert_eq!(out.count(FixKind::Clamped), 3);
        assert_eq!(out.count(FixKind::RepairedJson), 1);
        assert_eq!(out.count(FixKind::RepairedAvailability), 1);
    }

    #[test]
    fn test_worker_with_required_skill_kept() {
        let out = apply_automatic_fixes(&snapshot(), &CoreConfig::default());
        let w1: Vec<&Worker> = out.data.workers.iter().filter(|w| w.worker_id == "W1").collect();
        assert_eq!(w1.len(), 1);
        assert!(w1[0].has_skill("rust"));
    }

    #[test]
    fn test_repaired_values() {
        let out = apply_automatic_fixes(&snapshot(), &CoreConfig::default());
        let c1 = &out.data.clients[0];
        assert_eq!(c1.priority, Priority::Numeric(5));
        assert_eq!(c1.requested_task_ids, vec!["T1"]);
        assert_eq!(c1.field("attributes.tier"), Some(serde_json::json!("gold")));
        assert_eq!(out.data.workers[1].available_phases(), &[1]);
        let t1 = &out.data.tasks[0];
        assert!((t1.duration_amount() - 1.0).abs() < 1e-10);
        assert_eq!(t1.max_concurrent_value(), Some(1));
        assert_eq!(t1.phases(), &[1]);
        assert_eq!(t1.category.as_deref(), Some("general"));
    }

    #[test]
    fn test_fixed_data_is_cleaner() {
        let before = snapshot();
        let out = apply_automatic_fixes(&before, &CoreConfig::default());
        assert!(out.data.error_count() < before.error_count());
        assert!(!out
            .data
            .validation_errors
            .iter()
            .any(|e| e.error_type == ErrorType::DuplicateId || e.error_type == ErrorType::UnknownReference));
        // dropped duplicates still count against quality
        assert_eq!(out.data.data_quality.error_rows, 2);
    }

    #[test]
    fn test_input_untouched_and_clean_data_stable() {
        let before = snapshot();
        let out = apply_automatic_fixes(&before, &CoreConfig::default());
        assert_eq!(before.clients.len(), 2);
        let again = apply_automatic_fixes(&out.data, &CoreConfig::default());
        assert!(again.fixes.is_empty());
    }
}
