//! Conflict resolution between rules targeting the same entity.
//!
//! When several phase windows name one task, or several load limits cover
//! one worker, exactly one rule applies. Candidates are ranked by:
//!
//! | Key | Winner |
//! |-----|--------|
//! | position in a `priorityOrder` | earlier; listed beats unlisted |
//! | scope | `specificRules` over unscoped over `globalRules` |
//! | own `priority` | higher |
//! | declaration position | earlier |
//!
//! Several overrides merge in declaration order; the first mention of a rule
//! fixes its position.

use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use tracing::warn;

use super::model::{PrecedenceOverride, Rule};

/// Which ranking key decided a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PrecedenceReason {
    PriorityOrder,
    Specificity,
    RulePriority,
    DeclarationOrder,
}

/// A rule set aside for one entity because another won.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrecedenceDecision {
    pub entity_id: String,
    pub winner: String,
    pub overridden: String,
    pub reason: PrecedenceReason,
}

/// Merged precedence overrides.
#[derive(Debug, Clone, Default)]
pub struct Precedence {
    order: HashMap<String, usize>,
    specific: HashSet<String>,
    global: HashSet<String>,
}

type RankKey = (usize, u8, Reverse<i64>, usize);

impl Precedence {
    pub fn from_overrides<'a>(overrides: impl IntoIterator<Item = &'a PrecedenceOverride>) -> Self {
        let mut precedence = Self::default();
        for o in overrides {
            for id in &o.priority_order {
                let next = precedence.order.len();
                precedence.order.entry(id.clone()).or_insert(next);
            }
            precedence.specific.extend(o.specific_rules.iter().cloned());
            precedence.global.extend(o.global_rules.iter().cloned());
        }
        precedence
    }

    fn rank(&self, rule: &Rule, position: usize) -> RankKey {
        let id = rule.id();
        let order = self.order.get(id).copied().unwrap_or(usize::MAX);
        let scope = if self.specific.contains(id) {
            0
        } else if self.global.contains(id) {
            2
        } else {
            1
        };
        (order, scope, Reverse(rule.meta().priority), position)
    }

    /// Picks the winner among `candidates` (declaration order) for one
    /// entity. Losers whose parameters differ from the winner's, per
    /// `differs`, are reported.
    pub fn resolve<'a>(
        &self,
        entity_id: &str,
        candidates: &[&'a Rule],
        differs: impl Fn(&Rule, &Rule) -> bool,
    ) -> (Option<&'a Rule>, Vec<PrecedenceDecision>) {
        let ranked: Vec<(RankKey, &'a Rule)> = candidates
            .iter()
            .enumerate()
            .map(|(i, rule)| (self.rank(rule, i), *rule))
            .collect();
        let Some(&(best_key, winner)) = ranked.iter().min_by_key(|(key, _)| *key) else {
            return (None, Vec::new());
        };

        let decisions = ranked
            .iter()
            .filter(|(key, rule)| *key != best_key && differs(winner, *rule))
            .map(|(key, loser)| {
                let decision = PrecedenceDecision {
                    entity_id: entity_id.to_string(),
                    winner: winner.id().to_string(),
                    overridden: loser.id().to_string(),
                    reason: deciding_key(&best_key, key),
                };
                warn!(
                    entity = %decision.entity_id,
                    winner = %decision.winner,
                    overridden = %decision.overridden,
                    reason = ?decision.reason,
                    "rule overridden"
                );
                decision
            })
            .collect();
        (Some(winner), decisions)
    }
}

fn deciding_key(winner: &RankKey, loser: &RankKey) -> PrecedenceReason {
    if winner.0 != loser.0 {
        PrecedenceReason::PriorityOrder
    } else if winner.1 != loser.1 {
        PrecedenceReason::Specificity
    } else if winner.2 != loser.2 {
        PrecedenceReason::RulePriority
    } else {
        PrecedenceReason::DeclarationOrder
    }
}
