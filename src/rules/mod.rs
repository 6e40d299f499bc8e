//! Declarative allocation rules.
//!
//! # Modules
//!
//! - **`model`**: the seven rule variants and their shared header
//! - **`conditions`**: custom-rule predicates and actions
//! - **`rule_set`**: immutable, copy-on-write [`RuleConfig`]
//! - **`allocation`**: round-robin baseline and weighted re-ordering
//! - **`precedence`**: conflict resolution between rules on one entity
//! - **`pattern`**: pattern-rule template instantiation
//! - **`engine`**: [`RuleEngine`] producing allocations, violations and
//!   recommendations
//! - **`materialize`**: rule effects written into a new snapshot
//!
//! # Reference
//! Haupt (1989), "A Survey of Priority Rule-Based Scheduling"

pub mod allocation;
pub mod conditions;
pub mod engine;
pub mod materialize;
pub mod model;
pub mod pattern;
pub mod precedence;
pub mod rule_set;

pub use allocation::{baseline_allocations, optimize_allocations, Allocation, PriorityWeights};
pub use conditions::{Action, Condition, ConditionOp, ProposedChange};
pub use engine::{
    apply_rules, Recommendation, RecommendationKind, RuleEngine, RuleOutcome, RuleViolation,
    ViolationKind,
};
pub use materialize::{materialize, Materialized};
pub use model::{
    generate_rule_id, CoRunGroup, CustomRule, GroupType, LoadLimit, PatternMatch, PhaseWindow,
    PrecedenceOverride, Rule, RuleCategory, RuleMeta, SlotRestriction,
};
pub use precedence::{PrecedenceDecision, PrecedenceReason};
pub use rule_set::{RuleConfig, RuleSetLoad, SkippedRule};
