//! Circular co-run detection.
//!
//! Each task's `coRunGroup` lists tasks it must share a worker with. The
//! references form a directed graph `task → partner`; a cycle of length
//! three or more means a chain of "must run with" declarations loops back on
//! itself. Mutual pairs (`A → B`, `B → A`) are the normal way to declare a
//! group and are not reported.
//!
//! # Algorithm
//! Tarjan's strongly connected components. A component holds a cycle of
//! length three or more unless every edge inside it is mutual and the
//! mutual pairs form a tree. One error is reported per such component, at
//! the row of its earliest task.
//!
//! # Reference
//! Tarjan (1972), "Depth-First Search and Linear Graph Algorithms",
//! SIAM J. Computing 1(2)

use std::collections::{HashMap, HashSet};

use crate::models::fields::CO_RUN_GROUP;
use crate::models::{ErrorType, Task, ValidationError};

type Graph<'a> = HashMap<&'a str, Vec<&'a str>>;

/// Reports every co-run component containing a cycle as a
/// `circular_dependency` error at the row of the component's first task.
pub fn detect_corun_cycles(tasks: &[Task], filename: &str) -> Vec<ValidationError> {
    let known: HashSet<&str> = tasks.iter().map(|t| t.task_id.as_str()).collect();
    let mut adj: Graph = HashMap::new();
    let mut order: HashMap<&str, usize> = HashMap::new();
    let mut rows: HashMap<&str, usize> = HashMap::new();

    for (position, task) in tasks.iter().enumerate() {
        let id = task.task_id.as_str();
        order.entry(id).or_insert(position);
        rows.entry(id).or_insert(task.row);
        let edges = adj.entry(id).or_default();
        for partner in &task.co_run_group {
            let partner = partner.as_str();
            if partner != id && known.contains(partner) && !edges.contains(&partner) {
                edges.push(partner);
            }
        }
    }

    let mut tarjan = Tarjan::new(&adj);
    for task in tasks {
        if !tarjan.index.contains_key(task.task_id.as_str()) {
            tarjan.visit(task.task_id.as_str());
        }
    }

    let mut cyclic: Vec<Vec<&str>> = tarjan
        .components
        .into_iter()
        .filter(|c| c.len() >= 3 && has_long_cycle(c, &adj))
        .collect();
    for component in &mut cyclic {
        component.sort_by_key(|id| order[id]);
    }
    cyclic.sort_by_key(|c| order[c[0]]);

    cyclic
        .into_iter()
        .map(|component| {
            let head = component[0];
            ValidationError::error(
                ErrorType::CircularDependency,
                filename,
                rows.get(head).copied().unwrap_or(0),
                CO_RUN_GROUP,
                format!("Circular co-run dependency among {}", component.join(", ")),
            )
            .with_suggestion("Declare the group once as a co-run rule instead")
        })
        .collect()
}

/// Whether a strongly connected component contains a cycle longer than a
/// mutual pair.
fn has_long_cycle(component: &[&str], adj: &Graph) -> bool {
    let members: HashSet<&str> = component.iter().copied().collect();
    let mut pairs = HashSet::new();
    for &from in component {
        for &to in adj.get(from).into_iter().flatten() {
            if !members.contains(to) {
                continue;
            }
            if !adj.get(to).is_some_and(|back| back.contains(&from)) {
                return true;
            }
            pairs.insert(if from < to { (from, to) } else { (to, from) });
        }
    }
    // Connected through mutual pairs only: a tree has exactly n - 1 of them.
    pairs.len() >= component.len()
}

struct Tarjan<'g, 'a> {
    adj: &'g Graph<'a>,
    index: HashMap<&'a str, usize>,
    low: HashMap<&'a str, usize>,
    stack: Vec<&'a str>,
    on_stack: HashSet<&'a str>,
    components: Vec<Vec<&'a str>>,
}

impl<'g, 'a> Tarjan<'g, 'a> {
    fn new(adj: &'g Graph<'a>) -> Self {
        Self {
            adj,
            index: HashMap::new(),
            low: HashMap::new(),
            stack: Vec::new(),
            on_stack: HashSet::new(),
            components: Vec::new(),
        }
    }

    fn visit(&mut self, node: &'a str) {
        let index = self.index.len();
        self.index.insert(node, index);
        self.low.insert(node, index);
        self.stack.push(node);
        self.on_stack.insert(node);

        let adj = self.adj;
        for &next in adj.get(node).into_iter().flatten() {
            if !self.index.contains_key(next) {
                self.visit(next);
                let low = self.low[node].min(self.low[next]);
                self.low.insert(node, low);
            } else if self.on_stack.contains(next) {
                let low = self.low[node].min(self.index[next]);
                self.low.insert(node, low);
            }
        }

        if self.low[node] == index {
            let mut component = Vec::new();
            while let Some(top) = self.stack.pop() {
                self.on_stack.remove(top);
                component.push(top);
                if top == node {
                    break;
                }
            }
            self.components.push(component);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_cycle_in_chain() {
        let tasks = vec![
            Task::new("T1", "a").at_row(1).with_co_run("T2"),
            Task::new("T2", "b").at_row(2).with_co_run("T3"),
            Task::new("T3", "c").at_row(3),
        ];
        assert!(detect_corun_cycles(&tasks, "tasks.csv").is_empty());
    }

    #[test]
    fn test_mutual_pair_not_reported() {
        let tasks = vec![
            Task::new("T1", "a").with_co_run("T2"),
            Task::new("T2", "b").with_co_run("T1"),
        ];
        assert!(detect_corun_cycles(&tasks, "tasks.csv").is_empty());
    }

    #[test]
    fn test_mutual_star_not_reported() {
        // T1 ↔ T2, T1 ↔ T3
        let tasks = vec![
            Task::new("T1", "a").with_co_run("T2").with_co_run("T3"),
            Task::new("T2", "b").with_co_run("T1"),
            Task::new("T3", "c").with_co_run("T1"),
        ];
        assert!(detect_corun_cycles(&tasks, "tasks.csv").is_empty());
    }

    #[test]
    fn test_three_cycle() {
        // T1 → T2 → T3 → T1
        let tasks = vec![
            Task::new("T1", "a").at_row(1).with_co_run("T2"),
            Task::new("T2", "b").at_row(2).with_co_run("T3"),
            Task::new("T3", "c").at_row(3).with_co_run("T1"),
        ];
        let errors = detect_corun_cycles(&tasks, "tasks.csv");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].error_type, ErrorType::CircularDependency);
        assert_eq!(errors[0].row, 1);
        assert!(errors[0].error.contains("T1, T2, T3"));
    }

    #[test]
    fn test_cycle_through_mutual_pair() {
        // A ↔ B, A → C → B: the loop A → C → B → A passes through the pair.
        let tasks = vec![
            Task::new("A", "a").at_row(1).with_co_run("B").with_co_run("C"),
            Task::new("B", "b").at_row(2).with_co_run("A"),
            Task::new("C", "c").at_row(3).with_co_run("B"),
        ];
        let errors = detect_corun_cycles(&tasks, "tasks.csv");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].row, 1);
        assert!(errors[0].error.contains("A, B, C"));
    }

    #[test]
    fn test_mutual_triangle_reported() {
        let tasks = vec![
            Task::new("T1", "a").with_co_run("T2").with_co_run("T3"),
            Task::new("T2", "b").with_co_run("T1").with_co_run("T3"),
            Task::new("T3", "c").with_co_run("T1").with_co_run("T2"),
        ];
        assert_eq!(detect_corun_cycles(&tasks, "tasks.csv").len(), 1);
    }

    #[test]
    fn test_separate_components_reported_in_input_order() {
        let tasks = vec![
            Task::new("X1", "a").at_row(1).with_co_run("X2"),
            Task::new("Y1", "b").at_row(2).with_co_run("Y2"),
            Task::new("Y2", "c").at_row(3).with_co_run("Y3"),
            Task::new("Y3", "d").at_row(4).with_co_run("Y1"),
            Task::new("X2", "e").at_row(5).with_co_run("X3"),
            Task::new("X3", "f").at_row(6).with_co_run("X1"),
        ];
        let errors = detect_corun_cycles(&tasks, "tasks.csv");
        let rows: Vec<usize> = errors.iter().map(|e| e.row).collect();
        assert_eq!(rows, vec![1, 2]);
    }

    #[test]
    fn test_self_and_unknown_references_ignored() {
        let tasks = vec![
            Task::new("T1", "a").with_co_run("T1").with_co_run("T9"),
        ];
        assert!(detect_corun_cycles(&tasks, "tasks.csv").is_empty());
    }
}
