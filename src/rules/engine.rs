//! Rule engine.
//!
//! Evaluates a [`RuleConfig`] against a round-robin baseline allocation.
//! Rules never mutate state: each is evaluated against the same baseline,
//! in category order then list order, so the order of findings is
//! deterministic.
//!
//! # Evaluation
//!
//! | Rule | Finding |
//! |------|---------|
//! | co-run group | recommendation when two or more of its tasks exist |
//! | slot restriction | violation when a group overflows `maxSlots` or shares too few phases |
//! | load limit | violation when `tasks × unit weight` in a phase exceeds the cap |
//! | phase window | violation when a task's phases leave the window |
//! | pattern match | instantiated template, evaluated like the rules above |
//! | precedence override | decides between conflicting windows and limits |
//! | custom rule | recommendation with proposed changes; `flag` actions are violations |
//!
//! Malformed rules are skipped and reported, never fatal.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, warn};

use super::allocation::{baseline_allocations, optimize_allocations, Allocation};
use super::conditions::{all_hold, plan_actions, ProposedChange};
use super::model::{CoRunGroup, CustomRule, GroupType, LoadLimit, PhaseWindow, Rule, SlotRestriction};
use super::pattern::{instantiate, PATTERN_RULE_KIND};
use super::precedence::{Precedence, PrecedenceDecision};
use super::rule_set::{RuleConfig, SkippedRule};
use crate::config::{CoreConfig, EngineSettings};
use crate::models::{Client, EntityKind, FieldAccess, Task, Worker};

/// Kind of rule violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ViolationKind {
    SlotRestriction,
    LoadLimit,
    PhaseWindow,
    PatternMatch,
    /// Flag raised by a custom rule of the given type.
    Custom(String),
}

/// A rule the data breaks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleViolation {
    pub kind: ViolationKind,
    pub rule_id: String,
    pub entity_id: Option<String>,
    pub message: String,
    /// Entities the violation names.
    pub affected: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_load: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_load: Option<i64>,
}

impl RuleViolation {
    fn new(kind: ViolationKind, rule: &Rule, message: impl Into<String>) -> Self {
        Self {
            kind,
            rule_id: rule.id().to_string(),
            entity_id: None,
            message: message.into(),
            affected: Vec::new(),
            current_load: None,
            max_load: None,
        }
    }

    fn on(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    fn affecting(mut self, affected: Vec<String>) -> Self {
        self.affected = affected;
        self
    }
}

/// Kind of recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecommendationKind {
    CoRun,
    Custom,
}

/// Advice the engine does not enforce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub kind: RecommendationKind,
    pub rule_id: String,
    pub message: String,
    pub tasks: Vec<String>,
    pub workers: Vec<String>,
    pub clients: Vec<String>,
    pub changes: Vec<ProposedChange>,
}

/// Everything one engine run produces.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleOutcome {
    pub allocations: Vec<Allocation>,
    pub violations: Vec<RuleViolation>,
    pub recommendations: Vec<Recommendation>,
    pub skipped: Vec<SkippedRule>,
    pub overrides: Vec<PrecedenceDecision>,
}

/// Rules ready for evaluation: checked, patterns expanded, conflicts
/// decided.
#[derive(Debug, Clone, Default)]
pub(crate) struct ResolvedRules {
    pub rules: Vec<Rule>,
    /// Task ID → index of the winning phase window.
    pub phase_windows: HashMap<String, usize>,
    /// Worker ID → index of the winning load limit.
    pub load_limits: HashMap<String, usize>,
    pub skipped: Vec<SkippedRule>,
    pub overrides: Vec<PrecedenceDecision>,
}

impl ResolvedRules {
    pub fn resolve(clients: &[Client], workers: &[Worker], tasks: &[Task], config: &RuleConfig) -> Self {
        let mut resolved = Self::default();
        let mut overrides = Vec::new();

        for rule in config.iter() {
            if let Err(reason) = rule.check() {
                resolved.skip(rule, reason);
                continue;
            }
            match rule {
                Rule::PatternMatch(p) => match instantiate(p, clients, workers, tasks) {
                    Ok(expanded) => resolved.rules.extend(expanded),
                    Err(reason) => resolved.skip(rule, reason),
                },
                Rule::PrecedenceOverride(o) => overrides.push(o),
                other => resolved.rules.push(other.clone()),
            }
        }

        let precedence = Precedence::from_overrides(overrides);
        resolved.pick_phase_windows(&precedence, tasks);
        resolved.pick_load_limits(&precedence, workers);
        resolved
    }

    fn skip(&mut self, rule: &Rule, reason: impl Into<String>) {
        let skipped = SkippedRule::new(Some(rule.id().to_string()), rule.category().key(), reason);
        warn!(rule = %rule.id(), reason = %skipped.reason, "rule skipped");
        self.skipped.push(skipped);
    }

    fn pick_phase_windows(&mut self, precedence: &Precedence, tasks: &[Task]) {
        for task in tasks {
            let candidates: Vec<(usize, &Rule)> = self
                .rules
                .iter()
                .enumerate()
                .filter(|(_, r)| matches!(r, Rule::PhaseWindow(w) if w.task_id == task.task_id))
                .collect();
            let refs: Vec<&Rule> = candidates.iter().map(|(_, r)| *r).collect();
            let (winner, decisions) = precedence.resolve(&task.task_id, &refs, |a, b| {
                match (a, b) {
                    (Rule::PhaseWindow(a), Rule::PhaseWindow(b)) => a.allowed_phases != b.allowed_phases,
                    _ => true,
                }
            });
            if let Some(winner) = winner {
                if let Some(&(index, _)) = candidates.iter().find(|(_, r)| std::ptr::eq(*r, winner)) {
                    self.phase_windows.insert(task.task_id.clone(), index);
                }
            }
            self.overrides.extend(decisions);
        }
    }

    fn pick_load_limits(&mut self, precedence: &Precedence, workers: &[Worker]) {
        for worker in workers {
            let candidates: Vec<(usize, &Rule)> = self
                .rules
                .iter()
                .enumerate()
                .filter(|(_, r)| matches!(r, Rule::LoadLimit(l) if worker.is_member_of(&l.worker_group_ids)))
                .collect();
            let refs: Vec<&Rule> = candidates.iter().map(|(_, r)| *r).collect();
            let (winner, decisions) = precedence.resolve(&worker.worker_id, &refs, |a, b| {
                match (a, b) {
                    (Rule::LoadLimit(a), Rule::LoadLimit(b)) => {
                        a.max_slots_per_phase != b.max_slots_per_phase || a.phases != b.phases
                    }
                    _ => true,
                }
            });
            if let Some(winner) = winner {
                if let Some(&(index, _)) = candidates.iter().find(|(_, r)| std::ptr::eq(*r, winner)) {
                    self.load_limits.insert(worker.worker_id.clone(), index);
                }
            }
            self.overrides.extend(decisions);
        }
    }

    /// Whether rule `index` is the phase window applied to `task_id`.
    pub fn applies_to_task(&self, index: usize, task_id: &str) -> bool {
        self.phase_windows.get(task_id) == Some(&index)
    }

    /// Whether rule `index` is the load limit applied to `worker_id`.
    pub fn applies_to_worker(&self, index: usize, worker_id: &str) -> bool {
        self.load_limits.get(worker_id) == Some(&index)
    }
}

/// Evaluates rule sets against entity data.
#[derive(Debug, Clone, Default)]
pub struct RuleEngine {
    settings: EngineSettings,
}

impl RuleEngine {
    /// Engine with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn from_config(config: &CoreConfig) -> Self {
        Self::new().with_settings(config.engine.clone())
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Builds the baseline allocation and evaluates every rule against it.
    pub fn apply_rules(
        &self,
        clients: &[Client],
        workers: &[Worker],
        tasks: &[Task],
        rules: &RuleConfig,
    ) -> RuleOutcome {
        let allocations = baseline_allocations(clients, workers, tasks);
        let resolved = ResolvedRules::resolve(clients, workers, tasks, rules);
        let ctx = Context {
            clients,
            workers,
            tasks,
            allocations: &allocations,
            unit_weight: self.settings.load_unit_weight,
        };

        let mut violations = Vec::new();
        let mut recommendations = Vec::new();
        for (index, rule) in resolved.rules.iter().enumerate() {
            match rule {
                Rule::CoRunGroup(r) => recommendations.extend(ctx.co_run(rule, r)),
                Rule::SlotRestriction(r) => violations.extend(ctx.slot_restriction(rule, r)),
                Rule::LoadLimit(r) => violations.extend(ctx.load_limit(rule, r, |w| {
                    resolved.applies_to_worker(index, w)
                })),
                Rule::PhaseWindow(r) => {
                    if resolved.applies_to_task(index, &r.task_id) {
                        violations.extend(ctx.phase_window(rule, r));
                    }
                }
                Rule::CustomRule(r) => ctx.custom(rule, r, &mut violations, &mut recommendations),
                // expanded or consumed during resolution
                Rule::PatternMatch(_) | Rule::PrecedenceOverride(_) => {}
            }
        }

        debug!(
            rules = rules.len(),
            allocations = allocations.len(),
            violations = violations.len(),
            recommendations = recommendations.len(),
            skipped = resolved.skipped.len(),
            "rules applied"
        );
        RuleOutcome {
            allocations,
            violations,
            recommendations,
            skipped: resolved.skipped,
            overrides: resolved.overrides,
        }
    }

    /// Re-orders allocations with the configured weights.
    pub fn optimize(&self, allocations: &[Allocation]) -> Vec<Allocation> {
        optimize_allocations(allocations, &self.settings.priority_weights)
    }
}

/// Applies a rule set with default engine settings.
pub fn apply_rules(clients: &[Client], workers: &[Worker], tasks: &[Task], rules: &RuleConfig) -> RuleOutcome {
    RuleEngine::new().apply_rules(clients, workers, tasks, rules)
}

struct Context<'a> {
    clients: &'a [Client],
    workers: &'a [Worker],
    tasks: &'a [Task],
    allocations: &'a [Allocation],
    unit_weight: i64,
}

impl Context<'_> {
    fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.task_id == id)
    }

    fn co_run(&self, rule: &Rule, group: &CoRunGroup) -> Option<Recommendation> {
        let mut seen = HashSet::new();
        let present: Vec<&Task> = group
            .task_ids
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .filter_map(|id| self.task(id))
            .collect();
        if present.len() < 2 {
            return None;
        }

        let task_ids: Vec<String> = present.iter().map(|t| t.task_id.clone()).collect();
        let qualified: Vec<String> = self
            .workers
            .iter()
            .filter(|w| present.iter().all(|t| w.has_all_skills(&t.required_skills)))
            .map(|w| w.worker_id.clone())
            .collect();
        let assigned: BTreeSet<&str> = self
            .allocations
            .iter()
            .filter(|a| task_ids.contains(&a.task_id))
            .map(|a| a.worker_id.as_str())
            .collect();

        let mut message = format!("Tasks {} should be assigned to the same worker", task_ids.join(", "));
        if assigned.len() > 1 {
            message.push_str(&format!(
                " (currently split across {})",
                assigned.into_iter().collect::<Vec<_>>().join(", ")
            ));
        }
        if qualified.is_empty() {
            message.push_str("; no worker has every required skill");
        }
        Some(Recommendation {
            kind: RecommendationKind::CoRun,
            rule_id: rule.id().to_string(),
            message,
            tasks: task_ids,
            workers: qualified,
            clients: Vec::new(),
            changes: Vec::new(),
        })
    }

    fn slot_restriction(&self, rule: &Rule, r: &SlotRestriction) -> Vec<RuleViolation> {
        let (members, common) = match r.group_type {
            GroupType::Worker => {
                let members: Vec<&Worker> =
                    self.workers.iter().filter(|w| w.is_member_of(&r.group_ids)).collect();
                let common = intersect(members.iter().map(|w| w.available_phases().iter().copied().collect()));
                (members.iter().map(|w| w.worker_id.clone()).collect::<Vec<_>>(), common)
            }
            GroupType::Client => {
                let members: Vec<&Client> = self
                    .clients
                    .iter()
                    .filter(|c| {
                        r.group_ids.iter().any(|g| {
                            g == &c.client_id || c.group_tag.as_deref() == Some(g.as_str())
                        })
                    })
                    .collect();
                let common = intersect(members.iter().map(|c| {
                    c.requested_task_ids
                        .iter()
                        .filter_map(|id| self.task(id))
                        .flat_map(|t| t.phases().iter().copied())
                        .collect()
                }));
                (members.iter().map(|c| c.client_id.clone()).collect::<Vec<_>>(), common)
            }
        };

        let group = r.group_ids.join(", ");
        let mut violations = Vec::new();
        if let Some(max) = r.max_slots {
            let max = usize::try_from(max).unwrap_or(0);
            if members.len() > max {
                violations.push(
                    RuleViolation::new(
                        ViolationKind::SlotRestriction,
                        rule,
                        format!(
                            "Group {group} has {} members, exceeding maxSlots {max}",
                            members.len()
                        ),
                    )
                    .affecting(members[max..].to_vec()),
                );
            }
        }
        let needed = usize::try_from(r.min_common_slots).unwrap_or(0);
        if members.len() >= 2 && common.len() < needed {
            violations.push(
                RuleViolation::new(
                    ViolationKind::SlotRestriction,
                    rule,
                    format!(
                        "Group {group} shares {} common slot(s), needs {needed}",
                        common.len()
                    ),
                )
                .affecting(members),
            );
        }
        violations
    }

    fn load_limit(
        &self,
        rule: &Rule,
        limit: &LoadLimit,
        applies: impl Fn(&str) -> bool,
    ) -> Vec<RuleViolation> {
        let mut violations = Vec::new();
        for worker in self.workers.iter().filter(|w| applies(&w.worker_id)) {
            let assigned: Vec<&Allocation> = self
                .allocations
                .iter()
                .filter(|a| a.worker_id == worker.worker_id)
                .collect();
            let phases: BTreeSet<i64> = if limit.phases.is_empty() {
                assigned.iter().flat_map(|a| a.phases.iter().copied()).collect()
            } else {
                limit.phases.iter().copied().collect()
            };
            for phase in phases {
                let count = assigned.iter().filter(|a| a.phases.contains(&phase)).count() as i64;
                let load = count.saturating_mul(self.unit_weight);
                if load > limit.max_slots_per_phase {
                    let mut violation = RuleViolation::new(
                        ViolationKind::LoadLimit,
                        rule,
                        format!(
                            "Worker {} has load {load} in phase {phase}, exceeding {}",
                            worker.worker_id, limit.max_slots_per_phase
                        ),
                    )
                    .on(worker.worker_id.clone())
                    .affecting(
                        assigned
                            .iter()
                            .filter(|a| a.phases.contains(&phase))
                            .map(|a| a.task_id.clone())
                            .collect(),
                    );
                    violation.current_load = Some(load);
                    violation.max_load = Some(limit.max_slots_per_phase);
                    violations.push(violation);
                }
            }
        }
        violations
    }

    fn phase_window(&self, rule: &Rule, window: &PhaseWindow) -> Option<RuleViolation> {
        let task = self.task(&window.task_id)?;
        let outside: Vec<i64> = task
            .phases()
            .iter()
            .copied()
            .filter(|p| !window.allowed_phases.contains(p))
            .collect();
        if outside.is_empty() {
            return None;
        }
        Some(
            RuleViolation::new(
                ViolationKind::PhaseWindow,
                rule,
                format!(
                    "Task {} runs in phases {:?}, allowed {:?}",
                    task.task_id,
                    task.phases(),
                    window.allowed_phases
                ),
            )
            .on(task.task_id.clone())
            .affecting(outside.iter().map(i64::to_string).collect()),
        )
    }

    fn custom(
        &self,
        rule: &Rule,
        custom: &CustomRule,
        violations: &mut Vec<RuleViolation>,
        recommendations: &mut Vec<Recommendation>,
    ) {
        let Some(entity) = custom.conditions.first().map(|c| c.entity) else {
            return;
        };
        match entity {
            EntityKind::Client => evaluate_custom(rule, custom, self.clients, violations, recommendations),
            EntityKind::Worker => evaluate_custom(rule, custom, self.workers, violations, recommendations),
            EntityKind::Task => evaluate_custom(rule, custom, self.tasks, violations, recommendations),
        }
    }
}

fn evaluate_custom<T: FieldAccess>(
    rule: &Rule,
    custom: &CustomRule,
    entities: &[T],
    violations: &mut Vec<RuleViolation>,
    recommendations: &mut Vec<Recommendation>,
) {
    let kind = if custom.kind == PATTERN_RULE_KIND {
        ViolationKind::PatternMatch
    } else {
        ViolationKind::Custom(custom.kind.clone())
    };

    for entity in entities.iter().filter(|e| all_hold(&custom.conditions, *e)) {
        let id = entity.id().to_string();
        let effects = plan_actions(entity, &custom.actions);
        for flag in effects.flags {
            violations.push(
                RuleViolation::new(kind.clone(), rule, flag)
                    .on(id.clone())
                    .affecting(vec![id.clone()]),
            );
        }
        if effects.changes.is_empty() && effects.notes.is_empty() {
            continue;
        }
        let message = if effects.notes.is_empty() {
            format!("Apply {} change(s) to {id}", effects.changes.len())
        } else {
            effects.notes.join("; ")
        };
        let mut recommendation = Recommendation {
            kind: RecommendationKind::Custom,
            rule_id: rule.id().to_string(),
            message,
            tasks: Vec::new(),
            workers: Vec::new(),
            clients: Vec::new(),
            changes: effects.changes,
        };
        match T::KIND {
            EntityKind::Client => recommendation.clients.push(id),
            EntityKind::Worker => recommendation.workers.push(id),
            EntityKind::Task => recommendation.tasks.push(id),
        }
        recommendations.push(recommendation);
    }
}

/// Intersection of phase sets; empty for no sets.
fn intersect(sets: impl Iterator<Item = BTreeSet<i64>>) -> BTreeSet<i64> {
    sets.reduce(|acc, set| acc.intersection(&set).copied().collect())
        .unwrap_or_default()
}
