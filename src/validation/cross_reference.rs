//! Cross-collection consistency checks.
//!
//! Every check is independent and additive; findings are concatenated in
//! the order below.
//!
//! | # | Check | Severity | Tag |
//! |---|-------|----------|-----|
//! | 1 | Duplicate IDs (later rows only) | error | `duplicate_id` |
//! | 2 | Requested task exists | error | `unknown_reference` |
//! | 3 | Availability / maxLoad parse and range | error | `malformed_list`, `out_of_range` |
//! | 4 | attributesJSON parses | error | `invalid_json` |
//! | 5 | Client priority, task duration and concurrency ranges | error | `out_of_range` |
//! | 6 | maxLoad ≤ available slots | warning | `overloaded_worker` |
//! | 7 | Per-phase demand ≤ supply | warning (row 0) | `phase_saturation` |
//! | 8 | Required skills offered by some worker | error | `skill_coverage` |
//! | 9 | maxConcurrent ≤ qualified workers | warning | `concurrency_infeasible` |
//! | 10 | Co-run cycles (opt-in) | error | `circular_dependency` |

use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

use super::corun::detect_corun_cycles;
use super::FileNames;
use crate::config::ValidationSettings;
use crate::models::fields::*;
use crate::models::{
    normalize_skill, CellValue, Client, ErrorType, FieldAccess, Task, ValidationError, Worker,
};

/// Runs all cross-reference checks with default settings.
pub fn validate_all(
    clients: &[Client],
    workers: &[Worker],
    tasks: &[Task],
    files: &FileNames,
) -> Vec<ValidationError> {
    validate_all_with(clients, workers, tasks, files, &ValidationSettings::default())
}

/// Runs all cross-reference checks.
pub fn validate_all_with(
    clients: &[Client],
    workers: &[Worker],
    tasks: &[Task],
    files: &FileNames,
    settings: &ValidationSettings,
) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    errors.extend(duplicate_ids(clients, &files.clients));
    errors.extend(duplicate_ids(workers, &files.workers));
    errors.extend(duplicate_ids(tasks, &files.tasks));
    errors.extend(unknown_references(clients, tasks, &files.clients));
    errors.extend(worker_capacity_cells(workers, &files.workers, settings));
    errors.extend(broken_attributes(clients, &files.clients));
    errors.extend(out_of_range(clients, tasks, files));
    errors.extend(overloaded_workers(workers, &files.workers));
    errors.extend(phase_saturation(workers, tasks, &files.tasks));
    errors.extend(skill_coverage(workers, tasks, &files.tasks));
    errors.extend(concurrency_feasibility(workers, tasks, &files.tasks));
    if settings.detect_corun_cycles {
        errors.extend(detect_corun_cycles(tasks, &files.tasks));
    }

    debug!(
        clients = clients.len(),
        workers = workers.len(),
        tasks = tasks.len(),
        findings = errors.len(),
        "cross-reference validation"
    );
    errors
}

/// Flags the second and later occurrence of each ID.
pub fn duplicate_ids<T: FieldAccess>(items: &[T], filename: &str) -> Vec<ValidationError> {
    let mut first_seen: HashMap<&str, usize> = HashMap::new();
    let mut errors = Vec::new();
    for item in items {
        match first_seen.get(item.id()) {
            Some(&first_row) => errors.push(
                ValidationError::error(
                    ErrorType::DuplicateId,
                    filename,
                    item.row(),
                    T::KIND.id_field(),
                    format!(
                        "Duplicate {} ID '{}' (first seen at row {first_row})",
                        T::KIND,
                        item.id()
                    ),
                )
                .with_suggestion("Give each row a unique ID or remove the duplicate"),
            ),
            None => {
                first_seen.insert(item.id(), item.row());
            }
        }
    }
    errors
}

fn unknown_references(clients: &[Client], tasks: &[Task], filename: &str) -> Vec<ValidationError> {
    let task_ids: HashSet<&str> = tasks.iter().map(|t| t.task_id.as_str()).collect();
    let mut errors = Vec::new();
    for client in clients {
        let mut reported = HashSet::new();
        for id in &client.requested_task_ids {
            if !task_ids.contains(id.as_str()) && reported.insert(id.as_str()) {
                errors.push(ValidationError::error(
                    ErrorType::UnknownReference,
                    filename,
                    client.row,
                    REQUESTED_TASK_IDS,
                    format!("Client '{}' requests unknown task '{id}'", client.client_id),
                ));
            }
        }
    }
    errors
}

fn worker_capacity_cells(
    workers: &[Worker],
    filename: &str,
    settings: &ValidationSettings,
) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    for worker in workers {
        match &worker.availability {
            Some(CellValue::Unparsed(raw)) => errors.push(
                ValidationError::error(
                    ErrorType::MalformedList,
                    filename,
                    worker.row,
                    AVAILABILITY,
                    format!("Availability '{raw}' is not a list of phase numbers"),
                )
                .with_suggestion(format!(
                    "Use a JSON array such as [{}, {}]",
                    settings.min_phase,
                    settings.min_phase + 1
                )),
            ),
            Some(CellValue::Parsed(phases)) => {
                let outside: Vec<String> = phases
                    .iter()
                    .filter(|p| !settings.phase_in_range(**p))
                    .map(i64::to_string)
                    .collect();
                if !outside.is_empty() {
                    errors.push(ValidationError::error(
                        ErrorType::MalformedList,
                        filename,
                        worker.row,
                        AVAILABILITY,
                        format!(
                            "Availability phase(s) {} outside {}-{}",
                            outside.join(", "),
                            settings.min_phase,
                            settings.max_phase
                        ),
                    ));
                }
            }
            None => {}
        }

        match &worker.max_load {
            Some(CellValue::Unparsed(raw)) => errors.push(
                ValidationError::error(
                    ErrorType::MalformedList,
                    filename,
                    worker.row,
                    MAX_LOAD,
                    format!("Max load '{raw}' is not a whole number of slots"),
                )
                .with_suggestion("Use an integer of at least 1"),
            ),
            Some(CellValue::Parsed(load)) if *load < 1 => errors.push(ValidationError::error(
                ErrorType::OutOfRange,
                filename,
                worker.row,
                MAX_LOAD,
                format!("Max load must be at least 1, got {load}"),
            )),
            _ => {}
        }
    }
    errors
}

fn broken_attributes(clients: &[Client], filename: &str) -> Vec<ValidationError> {
    clients
        .iter()
        .filter_map(|client| {
            let raw = client.attributes_json.as_deref()?;
            let err = serde_json::from_str::<serde_json::Value>(raw).err()?;
            Some(
                ValidationError::error(
                    ErrorType::InvalidJson,
                    filename,
                    client.row,
                    ATTRIBUTES_JSON,
                    format!("Invalid JSON in attributes: {err}"),
                )
                .with_suggestion("Use double-quoted keys, e.g. {\"budget\": 1000}"),
            )
        })
        .collect()
}

fn out_of_range(clients: &[Client], tasks: &[Task], files: &FileNames) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    for client in clients.iter().filter(|c| !c.priority.is_valid()) {
        errors.push(ValidationError::error(
            ErrorType::OutOfRange,
            &files.clients,
            client.row,
            PRIORITY,
            format!("Priority '{}' is outside 1-5 / High, Medium, Low", client.priority),
        ));
    }
    for task in tasks {
        if let Some(d) = task.duration.as_ref().and_then(CellValue::parsed) {
            if d.amount < 1.0 {
                errors.push(ValidationError::error(
                    ErrorType::OutOfRange,
                    &files.tasks,
                    task.row,
                    DURATION,
                    format!("Duration must be at least 1, got {}", d.amount),
                ));
            }
        }
        if let Some(n) = task.max_concurrent_value().filter(|n| *n < 1) {
            errors.push(ValidationError::error(
                ErrorType::OutOfRange,
                &files.tasks,
                task.row,
                MAX_CONCURRENT,
                format!("Max concurrency must be at least 1, got {n}"),
            ));
        }
    }
    errors
}

fn overloaded_workers(workers: &[Worker], filename: &str) -> Vec<ValidationError> {
    workers
        .iter()
        .filter_map(|worker| {
            let load = worker.max_load_value()?;
            let slots = worker.availability.as_ref()?.parsed()?.len();
            (load > slots as i64).then(|| {
                ValidationError::warning(
                    ErrorType::OverloadedWorker,
                    filename,
                    worker.row,
                    MAX_LOAD,
                    format!(
                        "Worker '{}' max load {load} exceeds {slots} available slot(s)",
                        worker.worker_id
                    ),
                )
                .with_suggestion(format!("Lower max load to {slots} or add availability"))
            })
        })
        .collect()
}

/// Per-phase capacity: Σ maxLoad over workers available in the phase.
pub fn phase_supply(workers: &[Worker]) -> BTreeMap<i64, f64> {
    let mut supply = BTreeMap::new();
    for worker in workers {
        let Some(load) = worker.max_load_value() else {
            continue;
        };
        for &phase in worker.available_phases() {
            *supply.entry(phase).or_insert(0.0) += load as f64;
        }
    }
    supply
}

/// Per-phase demand: Σ duration over tasks preferring the phase.
pub fn phase_demand(tasks: &[Task]) -> BTreeMap<i64, f64> {
    let mut demand = BTreeMap::new();
    for task in tasks {
        let amount = task.duration_amount();
        for &phase in task.phases() {
            *demand.entry(phase).or_insert(0.0) += amount;
        }
    }
    demand
}

fn phase_saturation(workers: &[Worker], tasks: &[Task], filename: &str) -> Vec<ValidationError> {
    let supply = phase_supply(workers);
    phase_demand(tasks)
        .into_iter()
        .filter_map(|(phase, demand)| {
            let available = supply.get(&phase).copied().unwrap_or(0.0);
            (demand > available).then(|| {
                ValidationError::warning(
                    ErrorType::PhaseSaturation,
                    filename,
                    0,
                    PREFERRED_PHASES,
                    format!(
                        "Phase {phase} is oversaturated: demand {demand} exceeds supply {available}"
                    ),
                )
                .with_suggestion("Move tasks to other phases or add worker capacity")
            })
        })
        .collect()
}

fn skill_coverage(workers: &[Worker], tasks: &[Task], filename: &str) -> Vec<ValidationError> {
    let offered: HashSet<String> = workers
        .iter()
        .flat_map(|w| w.skills.iter().map(|s| normalize_skill(s)))
        .collect();

    let mut errors = Vec::new();
    for task in tasks {
        let mut reported = HashSet::new();
        for skill in &task.required_skills {
            let key = normalize_skill(skill);
            if !offered.contains(&key) && reported.insert(key) {
                errors.push(
                    ValidationError::error(
                        ErrorType::SkillCoverage,
                        filename,
                        task.row,
                        REQUIRED_SKILLS,
                        format!(
                            "No worker has required skill '{}' for task '{}'",
                            skill.trim(),
                            task.task_id
                        ),
                    )
                    .with_suggestion(format!("Add a worker with skill '{}'", skill.trim())),
                );
            }
        }
    }
    errors
}

fn concurrency_feasibility(
    workers: &[Worker],
    tasks: &[Task],
    filename: &str,
) -> Vec<ValidationError> {
    tasks
        .iter()
        .filter_map(|task| {
            let wanted = task.max_concurrent_value()?;
            let qualified = workers
                .iter()
                .filter(|w| w.has_all_skills(&task.required_skills))
                .count();
            (wanted > qualified as i64).then(|| {
                ValidationError::warning(
                    ErrorType::ConcurrencyInfeasible,
                    filename,
                    task.row,
                    MAX_CONCURRENT,
                    format!(
                        "Task '{}' allows {wanted} concurrent worker(s) but only {qualified} qualify",
                        task.task_id
                    ),
                )
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Priority, Severity};

    fn files() -> FileNames {
        FileNames::default()
    }

    fn of_type(errors: &[ValidationError], t: ErrorType) -> Vec<&ValidationError> {
        errors.iter().filter(|e| e.error_type == t).collect()
    }

    #[test]
    fn test_clean_data_has_no_findings() {
        let clients = vec![Client::new("C1", "Acme").at_row(1).with_requested_tasks(["T1"])];
        let workers = vec![Worker::new("W1", "Ada")
            .at_row(1)
            .with_skill("Rust")
            .with_availability(vec![1, 2])
            .with_max_load(2)];
        let tasks = vec![Task::new("T1", "Build")
            .at_row(1)
            .with_duration(1.0)
            .with_phases(vec![1])
            .with_required_skill("rust")
            .with_max_concurrent(1)];
        assert!(validate_all(&clients, &workers, &tasks, &files()).is_empty());
    }

    #[test]
    fn test_duplicate_flagged_at_later_row() {
        let clients = vec![
            Client::new("C1", "a").at_row(1),
            Client::new("C2", "b").at_row(2),
            Client::new("C1", "c").at_row(3),
        ];
        let errors = validate_all(&clients, &[], &[], &files());
        let dups = of_type(&errors, ErrorType::DuplicateId);
        assert_eq!(dups.len(), 1);
        assert_eq!(dups[0].row, 3);
        assert_eq!(dups[0].column, "clientId");
        assert!(dups[0].error.contains("first seen at row 1"));
    }

    #[test]
    fn test_unknown_references() {
        let clients = vec![Client::new("C1", "Acme")
            .at_row(4)
            .with_requested_tasks(["T1", "T9", "T8", "T9"])];
        let tasks = vec![Task::new("T1", "Build")];
        let errors = validate_all(&clients, &[], &tasks, &files());
        let unknown = of_type(&errors, ErrorType::UnknownReference);
        assert_eq!(unknown.len(), 2);
        assert!(unknown.iter().all(|e| e.row == 4 && e.severity == Severity::Error));
    }

    #[test]
    fn test_malformed_worker_cells() {
        let mut bad_list = Worker::new("W1", "a").at_row(1);
        bad_list.availability = Some(CellValue::Unparsed("[1, x]".into()));
        bad_list.max_load = Some(CellValue::Unparsed("lots".into()));
        let out_of_range = Worker::new("W2", "b")
            .at_row(2)
            .with_availability(vec![0, 3, 7])
            .with_max_load(0);
        let errors = validate_all(&[], &[bad_list, out_of_range], &[], &files());

        let malformed = of_type(&errors, ErrorType::MalformedList);
        assert_eq!(malformed.len(), 3);
        assert!(malformed[2].error.contains("0, 7"));
        let range = of_type(&errors, ErrorType::OutOfRange);
        assert_eq!(range.len(), 1);
        assert_eq!(range[0].row, 2);
    }

    #[test]
    fn test_fractional_max_load() {
        let mut worker = Worker::new("W1", "a").at_row(3).with_availability(vec![1, 2]);
        worker.max_load = Some(CellValue::Unparsed("2.5".into()));
        let errors = validate_all(&[], &[worker], &[], &files());
        let malformed = of_type(&errors, ErrorType::MalformedList);
        assert_eq!(malformed.len(), 1);
        assert_eq!(malformed[0].row, 3);
        assert!(malformed[0].error.contains("'2.5' is not a whole number"));
    }

    #[test]
    fn test_custom_phase_range() {
        let workers = vec![Worker::new("W1", "a").with_availability(vec![6]).with_max_load(1)];
        let settings = ValidationSettings {
            max_phase: 8,
            ..ValidationSettings::default()
        };
        let errors = validate_all_with(&[], &workers, &[], &files(), &settings);
        assert!(of_type(&errors, ErrorType::MalformedList).is_empty());
    }

    #[test]
    fn test_broken_json() {
        let clients = vec![
            Client::new("C1", "a").at_row(1).with_attributes_json("{'budget': 1}"),
            Client::new("C2", "b").at_row(2).with_attributes_json("{\"budget\": 1}"),
        ];
        let errors = validate_all(&clients, &[], &[], &files());
        let json = of_type(&errors, ErrorType::InvalidJson);
        assert_eq!(json.len(), 1);
        assert_eq!(json[0].row, 1);
    }

    #[test]
    fn test_out_of_range_values() {
        let clients = vec![Client::new("C1", "a").at_row(1).with_priority(Priority::Numeric(7))];
        let tasks = vec![Task::new("T1", "t").at_row(1).with_duration(0.5)];
        let errors = validate_all(&clients, &[], &tasks, &files());
        let range = of_type(&errors, ErrorType::OutOfRange);
        assert_eq!(range.len(), 2);
        assert_eq!(range[0].file, "clients.csv");
        assert_eq!(range[1].column, "duration");
    }

    #[test]
    fn test_overloaded_worker() {
        let workers = vec![
            Worker::new("W1", "a").at_row(1).with_availability(vec![1]).with_max_load(3),
            Worker::new("W2", "b").at_row(2).with_availability(vec![1, 2]).with_max_load(2),
        ];
        let errors = validate_all(&[], &workers, &[], &files());
        let overloaded = of_type(&errors, ErrorType::OverloadedWorker);
        assert_eq!(overloaded.len(), 1);
        assert_eq!(overloaded[0].severity, Severity::Warning);
        assert_eq!(overloaded[0].row, 1);
    }

    #[test]
    fn test_phase_saturation_example() {
        // supply: phase1=2, phase2=4, phase3=2
        let workers = vec![
            Worker::new("W1", "a").with_availability(vec![1, 2]).with_max_load(2),
            Worker::new("W2", "b").with_availability(vec![2, 3]).with_max_load(2),
        ];
        let tasks = vec![Task::new("T1", "t").at_row(1).with_duration(5.0).with_phases(vec![1])];

        let supply = phase_supply(&workers);
        assert!((supply[&1] - 2.0).abs() < 1e-10);
        assert!((supply[&2] - 4.0).abs() < 1e-10);
        assert!((supply[&3] - 2.0).abs() < 1e-10);

        let errors = validate_all(&[], &workers, &tasks, &files());
        let sat = of_type(&errors, ErrorType::PhaseSaturation);
        assert_eq!(sat.len(), 1);
        assert_eq!(sat[0].row, 0);
        assert_eq!(sat[0].severity, Severity::Warning);
        assert!(sat[0].error.contains("Phase 1"));
    }

    #[test]
    fn test_phase_without_supply_saturates() {
        let tasks = vec![Task::new("T1", "t").with_duration(1.0).with_phases(vec![4])];
        let errors = validate_all(&[], &[], &tasks, &files());
        assert_eq!(of_type(&errors, ErrorType::PhaseSaturation).len(), 1);
    }

    #[test]
    fn test_skill_coverage() {
        let workers = vec![Worker::new("W1", "a").with_skill("python")];
        let tasks = vec![Task::new("T1", "t")
            .at_row(3)
            .with_required_skill("Rust")
            .with_required_skill("Python")];
        let errors = validate_all(&[], &workers, &tasks, &files());
        let gaps = of_type(&errors, ErrorType::SkillCoverage);
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].row, 3);
        assert!(gaps[0].error.contains("Rust"));
    }

    #[test]
    fn test_concurrency_feasibility() {
        let workers = vec![
            Worker::new("W1", "a").with_skill("rust").with_skill("sql"),
            Worker::new("W2", "b").with_skill("rust"),
        ];
        let tasks = vec![
            Task::new("T1", "t").with_required_skill("Rust").with_max_concurrent(2),
            Task::new("T2", "t").with_required_skill("Rust").with_required_skill("SQL").with_max_concurrent(2),
        ];
        let errors = validate_all(&[], &workers, &tasks, &files());
        let infeasible = of_type(&errors, ErrorType::ConcurrencyInfeasible);
        assert_eq!(infeasible.len(), 1);
        assert!(infeasible[0].error.contains("'T2'"));
    }

    #[test]
    fn test_corun_cycles_opt_in() {
        let tasks = vec![
            Task::new("T1", "a").with_co_run("T2"),
            Task::new("T2", "b").with_co_run("T3"),
            Task::new("T3", "c").with_co_run("T1"),
        ];
        let off = validate_all(&[], &[], &tasks, &files());
        assert!(of_type(&off, ErrorType::CircularDependency).is_empty());

        let settings = ValidationSettings {
            detect_corun_cycles: true,
            ..ValidationSettings::default()
        };
        let on = validate_all_with(&[], &[], &tasks, &files(), &settings);
        assert_eq!(of_type(&on, ErrorType::CircularDependency).len(), 1);
    }
}
