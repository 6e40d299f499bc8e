//! Baseline allocation and weighted re-ordering.
//!
//! # Algorithm
//! Tasks are dealt to workers round-robin in input order (`task i` goes to
//! `worker i mod m`). Each task is paired with the first client requesting
//! it, else the first client.
//!
//! Re-ordering sorts by a weighted score, highest first:
//!
//! ```text
//! score = client_priority_score × w_priority + task_priority × w_urgency
//! ```
//!
//! where High/Medium/Low score 3/2/1 and numeric priorities count directly.
//! A missing priority on either side counts as 1. The sort is stable.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::{Client, Priority, Task, Worker};

/// One task assigned to one worker on behalf of a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Allocation {
    pub task_id: String,
    pub task_title: String,
    pub worker_id: String,
    pub worker_name: String,
    pub client_id: Option<String>,
    pub client_name: Option<String>,
    /// Phases the task runs in (its preferred phases).
    pub phases: Vec<i64>,
    pub client_priority: Option<Priority>,
    pub task_priority: Option<i64>,
}

impl Allocation {
    /// Weighted ordering score.
    pub fn score(&self, weights: &PriorityWeights) -> f64 {
        let client = self.client_priority.as_ref().map_or(1.0, Priority::score);
        let task = self.task_priority.unwrap_or(1) as f64;
        client * weights.priority_level + task * weights.task_urgency
    }
}

/// Round-robin baseline. Empty when there are no workers.
pub fn baseline_allocations(clients: &[Client], workers: &[Worker], tasks: &[Task]) -> Vec<Allocation> {
    if workers.is_empty() {
        if !tasks.is_empty() {
            warn!(tasks = tasks.len(), "no workers to allocate tasks to");
        }
        return Vec::new();
    }

    tasks
        .iter()
        .enumerate()
        .map(|(i, task)| {
            let worker = &workers[i % workers.len()];
            let client = clients
                .iter()
                .find(|c| c.requests(&task.task_id))
                .or_else(|| clients.first());
            Allocation {
                task_id: task.task_id.clone(),
                task_title: task.title.clone(),
                worker_id: worker.worker_id.clone(),
                worker_name: worker.name.clone(),
                client_id: client.map(|c| c.client_id.clone()),
                client_name: client.map(|c| c.name.clone()),
                phases: task.phases().to_vec(),
                client_priority: client.map(|c| c.priority.clone()),
                task_priority: task.priority_value(),
            }
        })
        .collect()
}

/// Relative importance of allocation criteria.
///
/// Only `priority_level` and `task_urgency` enter the ordering score; the
/// other two are carried for callers that balance load themselves.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PriorityWeights {
    pub priority_level: f64,
    pub requested_tasks: f64,
    pub fair_distribution: f64,
    pub task_urgency: f64,
}

impl Default for PriorityWeights {
    fn default() -> Self {
        Self {
            priority_level: 0.7,
            requested_tasks: 0.6,
            fair_distribution: 0.5,
            task_urgency: 0.8,
        }
    }
}

impl PriorityWeights {
    fn total(&self) -> f64 {
        self.priority_level + self.requested_tasks + self.fair_distribution + self.task_urgency
    }

    /// Weights scaled to sum to 1. Unchanged when the total is zero.
    pub fn normalized(&self) -> Self {
        let total = self.total();
        if total <= 0.0 {
            return *self;
        }
        Self {
            priority_level: self.priority_level / total,
            requested_tasks: self.requested_tasks / total,
            fair_distribution: self.fair_distribution / total,
            task_urgency: self.task_urgency / total,
        }
    }

    /// Every weight finite and non-negative.
    pub fn is_valid(&self) -> bool {
        [
            self.priority_level,
            self.requested_tasks,
            self.fair_distribution,
            self.task_urgency,
        ]
        .iter()
        .all(|w| w.is_finite() && *w >= 0.0)
    }
}

/// Returns the allocations sorted by descending weighted score.
///
/// Equal scores keep their input order, so the result is deterministic.
/// Undefined scores (NaN from infinite weights) sort last.
pub fn optimize_allocations(allocations: &[Allocation], weights: &PriorityWeights) -> Vec<Allocation> {
    let scores: Vec<f64> = allocations
        .iter()
        .map(|a| a.score(weights))
        .map(|s| if s.is_nan() { f64::NEG_INFINITY } else { s })
        .collect();
    let mut indices: Vec<usize> = (0..allocations.len()).collect();
    indices.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));
    indices.into_iter().map(|i| allocations[i].clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PriorityLevel;

    fn workers() -> Vec<Worker> {
        vec![Worker::new("W1", "Ada"), Worker::new("W2", "Bob")]
    }

    #[test]
    fn test_round_robin() {
        let tasks = vec![
            Task::new("T1", "a"),
            Task::new("T2", "b"),
            Task::new("T3", "c"),
        ];
        let allocs = baseline_allocations(&[], &workers(), &tasks);
        let assigned: Vec<&str> = allocs.iter().map(|a| a.worker_id.as_str()).collect();
        assert_eq!(assigned, vec!["W1", "W2", "W1"]);
        assert!(allocs.iter().all(|a| a.client_id.is_none()));
    }

    #[test]
    fn test_client_pairing() {
        let clients = vec![
            Client::new("C1", "Acme"),
            Client::new("C2", "Beta").with_requested_tasks(["T2"]),
        ];
        let tasks = vec![Task::new("T1", "a"), Task::new("T2", "b")];
        let allocs = baseline_allocations(&clients, &workers(), &tasks);
        assert_eq!(allocs[0].client_id.as_deref(), Some("C1"));
        assert_eq!(allocs[1].client_id.as_deref(), Some("C2"));
    }

    #[test]
    fn test_no_workers() {
        let tasks = vec![Task::new("T1", "a")];
        assert!(baseline_allocations(&[], &[], &tasks).is_empty());
    }

    #[test]
    fn test_optimize_orders_by_score() {
        let clients = vec![
            Client::new("C1", "Low").with_priority(Priority::Level(PriorityLevel::Low)).with_requested_tasks(["T1"]),
            Client::new("C2", "High").with_priority(Priority::Level(PriorityLevel::High)).with_requested_tasks(["T2"]),
        ];
        let tasks = vec![Task::new("T1", "a").with_priority(1), Task::new("T2", "b").with_priority(1)];
        let allocs = baseline_allocations(&clients, &workers(), &tasks);
        let sorted = optimize_allocations(&allocs, &PriorityWeights::default());
        assert_eq!(sorted[0].task_id, "T2");
        // 3 × 0.7 + 1 × 0.8
        assert!((sorted[0].score(&PriorityWeights::default()) - 2.9).abs() < 1e-10);
    }

    #[test]
    fn test_optimize_is_stable() {
        let tasks: Vec<Task> = (0..6).map(|i| Task::new(format!("T{i}"), "x")).collect();
        let allocs = baseline_allocations(&[], &workers(), &tasks);
        let sorted = optimize_allocations(&allocs, &PriorityWeights::default());
        assert_eq!(sorted, allocs);
        assert_eq!(optimize_allocations(&sorted, &PriorityWeights::default()), sorted);
    }

    #[test]
    fn test_optimize_undefined_scores_last() {
        let tasks = vec![
            Task::new("T0", "a").with_priority(0),
            Task::new("T1", "b").with_priority(2),
            Task::new("T2", "c").with_priority(0),
        ];
        let allocs = baseline_allocations(&[], &workers(), &tasks);
        // 0 × inf is NaN
        let weights = PriorityWeights {
            priority_level: 1.0,
            task_urgency: f64::INFINITY,
            ..PriorityWeights::default()
        };
        let sorted = optimize_allocations(&allocs, &weights);
        let order: Vec<&str> = sorted.iter().map(|a| a.task_id.as_str()).collect();
        assert_eq!(order, vec!["T1", "T0", "T2"]);

        let nan = PriorityWeights { priority_level: f64::NAN, ..PriorityWeights::default() };
        assert_eq!(optimize_allocations(&allocs, &nan), allocs);
    }

    #[test]
    fn test_weights_normalized() {
        let w = PriorityWeights::default().normalized();
        let sum = w.priority_level + w.requested_tasks + w.fair_distribution + w.task_urgency;
        assert!((sum - 1.0).abs() < 1e-10);

        let zero = PriorityWeights {
            priority_level: 0.0,
            requested_tasks: 0.0,
            fair_distribution: 0.0,
            task_urgency: 0.0,
        };
        assert_eq!(zero.normalized(), zero);
        assert!(zero.is_valid());
        assert!(!PriorityWeights { task_urgency: -1.0, ..zero }.is_valid());
    }
}
