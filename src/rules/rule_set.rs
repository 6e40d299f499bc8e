//! Immutable rule sets.
//!
//! Every edit returns a new [`RuleConfig`]; rule lists are `Arc`-shared, so
//! categories an edit does not touch are never copied.

use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;

use super::model::{Rule, RuleCategory};
use crate::error::{AllocationError, Result};

/// Rules grouped by category, in first-declared category order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleConfig {
    categories: Vec<(RuleCategory, Arc<Vec<Rule>>)>,
}

/// A rule dropped while loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedRule {
    pub rule_id: Option<String>,
    pub category: String,
    pub reason: String,
}

impl SkippedRule {
    pub fn new(rule_id: Option<String>, category: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            rule_id,
            category: category.into(),
            reason: reason.into(),
        }
    }
}

/// Result of a lenient load.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleSetLoad {
    pub config: RuleConfig,
    pub skipped: Vec<SkippedRule>,
}

impl RuleConfig {
    /// Creates an empty rule set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy with `rule` appended to its category.
    pub fn with_rule(&self, rule: impl Into<Rule>) -> Self {
        let rule = rule.into();
        let category = rule.category();
        let mut categories = self.categories.clone();
        match categories.iter_mut().find(|(c, _)| *c == category) {
            Some((_, rules)) => Arc::make_mut(rules).push(rule),
            None => categories.push((category, Arc::new(vec![rule]))),
        }
        Self { categories }
    }

    /// Copy with every rule appended.
    pub fn with_rules<I, R>(&self, rules: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<Rule>,
    {
        rules.into_iter().fold(self.clone(), |config, rule| config.with_rule(rule))
    }

    /// Copy without the rule `id`. Emptied categories keep their position.
    pub fn without_rule(&self, id: &str) -> Self {
        let categories = self
            .categories
            .iter()
            .map(|(category, rules)| {
                if rules.iter().any(|r| r.id() == id) {
                    let kept = rules.iter().filter(|r| r.id() != id).cloned().collect();
                    (*category, Arc::new(kept))
                } else {
                    (*category, Arc::clone(rules))
                }
            })
            .collect();
        Self { categories }
    }

    /// Rules of one category.
    pub fn rules(&self, category: RuleCategory) -> &[Rule] {
        self.categories
            .iter()
            .find(|(c, _)| *c == category)
            .map(|(_, rules)| rules.as_slice())
            .unwrap_or(&[])
    }

    /// Every rule, category order then list order.
    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.categories.iter().flat_map(|(_, rules)| rules.iter())
    }

    /// Categories in evaluation order.
    pub fn categories(&self) -> impl Iterator<Item = RuleCategory> + '_ {
        self.categories.iter().map(|(c, _)| *c)
    }

    pub fn get(&self, id: &str) -> Option<&Rule> {
        self.iter().find(|r| r.id() == id)
    }

    pub fn len(&self) -> usize {
        self.categories.iter().map(|(_, rules)| rules.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Loads a rule set object keyed by category.
    ///
    /// Unknown categories, malformed or ill-formed rules and duplicate IDs are
    /// skipped and reported; only a non-object input is an error.
    pub fn from_json(value: &Value) -> Result<RuleSetLoad> {
        let object = value
            .as_object()
            .ok_or_else(|| AllocationError::shape("rule set", "object keyed by rule category"))?;

        let mut load = RuleSetLoad::default();
        let mut seen: HashSet<String> = HashSet::new();

        for (key, entries) in object {
            let Some(category) = RuleCategory::from_key(key) else {
                skip(&mut load, None, key, "unknown rule category");
                continue;
            };
            let Some(entries) = entries.as_array() else {
                skip(&mut load, None, key, "category is not a list");
                continue;
            };
            for entry in entries {
                let declared_id = entry.get("id").and_then(Value::as_str).map(str::to_string);
                let rule = match category.parse_rule(entry) {
                    Ok(rule) => rule,
                    Err(e) => {
                        skip(&mut load, declared_id, key, e.to_string());
                        continue;
                    }
                };
                if let Err(reason) = rule.check() {
                    skip(&mut load, declared_id, key, reason);
                    continue;
                }
                if !seen.insert(rule.id().to_string()) {
                    skip(&mut load, declared_id, key, "duplicate rule id");
                    continue;
                }
                load.config = load.config.with_rule(rule);
            }
        }
        Ok(load)
    }
}

fn skip(load: &mut RuleSetLoad, rule_id: Option<String>, category: &str, reason: impl Into<String>) {
    let skipped = SkippedRule::new(rule_id, category, reason);
    warn!(
        rule = skipped.rule_id.as_deref().unwrap_or("-"),
        category = %skipped.category,
        reason = %skipped.reason,
        "rule skipped"
    );
    load.skipped.push(skipped);
}

impl Serialize for RuleConfig {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.categories.len()))?;
        for (category, rules) in &self.categories {
            map.serialize_entry(category.key(), rules.as_slice())?;
        }
        map.end()
    }
}

/// Strict counterpart of [`RuleConfig::from_json`]: any skipped rule fails.
impl<'de> Deserialize<'de> for RuleConfig {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let load = RuleConfig::from_json(&value).map_err(serde::de::Error::custom)?;
        match load.skipped.first() {
            Some(skipped) => Err(serde::de::Error::custom(format!(
                "invalid rule in {}: {}",
                skipped.category, skipped.reason
            ))),
            None => Ok(load.config),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::model::{CoRunGroup, LoadLimit, PhaseWindow};
    use serde_json::json;

    #[test]
    fn test_with_rule_is_copy_on_write() {
        let base = RuleConfig::new().with_rule(CoRunGroup::new("c1", ["T1", "T2"]));
        let extended = base.with_rule(PhaseWindow::new("p1", "T1", vec![1]));
        assert_eq!(base.len(), 1);
        assert_eq!(extended.len(), 2);
        // untouched category shares storage
        assert!(Arc::ptr_eq(&base.categories[0].1, &extended.categories[0].1));
    }

    #[test]
    fn test_without_rule() {
        let config = RuleConfig::new().with_rules([
            Rule::from(CoRunGroup::new("c1", ["T1", "T2"])),
            Rule::from(LoadLimit::new("l1", ["W1"], 2)),
        ]);
        let trimmed = config.without_rule("c1");
        assert_eq!(trimmed.len(), 1);
        assert!(trimmed.get("c1").is_none());
        assert!(config.get("c1").is_some());
        assert_eq!(trimmed.rules(RuleCategory::CoRunGroups).len(), 0);
    }

    #[test]
    fn test_from_json_lenient() {
        let load = RuleConfig::from_json(&json!({
            "coRunGroups": [
                {"id": "c1", "taskIds": ["T1", "T2"]},
                {"id": "c2", "taskIds": []},
                {"id": "c1", "taskIds": ["T3"]},
                {"name": "no id"}
            ],
            "phaseWindows": [{"id": "p1", "taskId": "T1", "allowedPhases": [1, 2]}],
            "teleports": [],
            "loadLimits": {"id": "l1"}
        }))
        .unwrap();

        assert_eq!(load.config.len(), 2);
        assert_eq!(load.skipped.len(), 5);
        assert_eq!(load.skipped[0].rule_id.as_deref(), Some("c2"));
        assert_eq!(load.skipped[1].reason, "duplicate rule id");
        assert_eq!(load.skipped[2].rule_id, None);
        assert_eq!(load.skipped[3].category, "teleports");
        let order: Vec<RuleCategory> = load.config.categories().collect();
        assert_eq!(order, vec![RuleCategory::CoRunGroups, RuleCategory::PhaseWindows]);
    }

    #[test]
    fn test_from_json_shape() {
        assert!(RuleConfig::from_json(&json!([])).is_err());
        assert!(RuleConfig::from_json(&json!({})).unwrap().config.is_empty());
    }

    #[test]
    fn test_serde_round_trip() {
        let config = RuleConfig::new()
            .with_rule(CoRunGroup::new("c1", ["T1", "T2"]))
            .with_rule(LoadLimit::new("l1", ["GroupA"], 2).with_phases(vec![1]));
        let json = serde_json::to_string(&config).unwrap();
        let back: RuleConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_strict_deserialize_rejects_bad_rule() {
        let result: std::result::Result<RuleConfig, _> =
            serde_json::from_value(json!({"coRunGroups": [{"id": "c", "taskIds": []}]}));
        assert!(result.is_err());
    }
}
