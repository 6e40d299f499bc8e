//! Rule model.
//!
//! Seven rule variants share a common header ([`RuleMeta`]). Rules travel
//! as camelCase JSON objects grouped by category key.
//!
//! | Category key | Variant | Effect |
//! |--------------|---------|--------|
//! | `coRunGroups` | [`CoRunGroup`] | recommendation |
//! | `slotRestrictions` | [`SlotRestriction`] | violation |
//! | `loadLimits` | [`LoadLimit`] | violation |
//! | `phaseWindows` | [`PhaseWindow`] | violation |
//! | `patternMatches` | [`PatternMatch`] | instantiates a template rule |
//! | `precedenceOverrides` | [`PrecedenceOverride`] | resolves conflicts |
//! | `customRules` | [`CustomRule`] | recommendation / violation |

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use super::conditions::{Action, Condition};
use super::pattern::Template;

static RULE_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Fields shared by every rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleMeta {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Higher wins when rules conflict.
    #[serde(default = "default_priority")]
    pub priority: i64,
    #[serde(default = "Utc::now", deserialize_with = "lenient_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_priority() -> i64 {
    1
}

fn default_min_common_slots() -> i64 {
    1
}

/// Accepts RFC 3339, a naive ISO date-time (taken as UTC) or a bare date.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{raw}'")))
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

impl RuleMeta {
    /// Header with an explicit ID, priority 1, created now.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            priority: default_priority(),
            created_at: Utc::now(),
            description: None,
        }
    }

    /// Header with a generated ID.
    pub fn generated(category: RuleCategory, name: impl Into<String>) -> Self {
        Self::new(generate_rule_id(category), name)
    }
}

/// Generates `<prefix>_<unix-millis>_<sequence>`, unique within a process.
pub fn generate_rule_id(category: RuleCategory) -> String {
    let seq = RULE_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!(
        "{}_{}_{}",
        category.id_prefix(),
        Utc::now().timestamp_millis(),
        seq
    )
}

/// Tasks that must share a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoRunGroup {
    #[serde(flatten)]
    pub meta: RuleMeta,
    pub task_ids: Vec<String>,
}

/// Which collection a slot restriction's group IDs refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupType {
    Client,
    Worker,
}

/// Bounds a group's size and requires shared phases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotRestriction {
    #[serde(flatten)]
    pub meta: RuleMeta,
    pub group_type: GroupType,
    /// Entity IDs or group tags.
    pub group_ids: Vec<String>,
    #[serde(default = "default_min_common_slots")]
    pub min_common_slots: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_slots: Option<i64>,
}

/// Caps assigned load per phase for a worker group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadLimit {
    #[serde(flatten)]
    pub meta: RuleMeta,
    /// Worker IDs or worker groups.
    pub worker_group_ids: Vec<String>,
    pub max_slots_per_phase: i64,
    /// Phases the cap applies to; empty means every phase.
    #[serde(default)]
    pub phases: Vec<i64>,
}

/// Restricts the phases a task may run in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseWindow {
    #[serde(flatten)]
    pub meta: RuleMeta,
    pub task_id: String,
    pub allowed_phases: Vec<i64>,
}

/// A template instantiated for every entity whose field matches `pattern`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternMatch {
    #[serde(flatten)]
    pub meta: RuleMeta,
    pub pattern: String,
    pub rule_template: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

/// Explicit ordering between conflicting rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrecedenceOverride {
    #[serde(flatten)]
    pub meta: RuleMeta,
    #[serde(default)]
    pub global_rules: Vec<String>,
    #[serde(default)]
    pub specific_rules: Vec<String>,
    /// Rule IDs, strongest first.
    #[serde(default)]
    pub priority_order: Vec<String>,
}

/// Free-form conditions and actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomRule {
    #[serde(flatten)]
    pub meta: RuleMeta,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub ai_generated: bool,
}

impl CoRunGroup {
    pub fn new<I, S>(id: impl Into<String>, task_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let meta = RuleMeta::new(id, "Co-run group");
        Self {
            meta,
            task_ids: task_ids.into_iter().map(Into::into).collect(),
        }
    }
}

impl SlotRestriction {
    pub fn new<I, S>(id: impl Into<String>, group_type: GroupType, group_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            meta: RuleMeta::new(id, "Slot restriction"),
            group_type,
            group_ids: group_ids.into_iter().map(Into::into).collect(),
            min_common_slots: default_min_common_slots(),
            max_slots: None,
        }
    }

    pub fn with_max_slots(mut self, max_slots: i64) -> Self {
        self.max_slots = Some(max_slots);
        self
    }

    pub fn with_min_common_slots(mut self, min_common_slots: i64) -> Self {
        self.min_common_slots = min_common_slots;
        self
    }
}

impl LoadLimit {
    pub fn new<I, S>(id: impl Into<String>, worker_group_ids: I, max_slots_per_phase: i64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            meta: RuleMeta::new(id, "Load limit"),
            worker_group_ids: worker_group_ids.into_iter().map(Into::into).collect(),
            max_slots_per_phase,
            phases: Vec::new(),
        }
    }

    pub fn with_phases(mut self, phases: Vec<i64>) -> Self {
        self.phases = phases;
        self
    }
}

impl PhaseWindow {
    pub fn new(id: impl Into<String>, task_id: impl Into<String>, allowed_phases: Vec<i64>) -> Self {
        Self {
            meta: RuleMeta::new(id, "Phase window"),
            task_id: task_id.into(),
            allowed_phases,
        }
    }
}

impl PatternMatch {
    pub fn new(
        id: impl Into<String>,
        pattern: impl Into<String>,
        rule_template: impl Into<String>,
        parameters: Map<String, Value>,
    ) -> Self {
        Self {
            meta: RuleMeta::new(id, "Pattern match"),
            pattern: pattern.into(),
            rule_template: rule_template.into(),
            parameters,
        }
    }
}

impl PrecedenceOverride {
    pub fn new<I, S>(id: impl Into<String>, priority_order: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            meta: RuleMeta::new(id, "Precedence override"),
            global_rules: Vec::new(),
            specific_rules: Vec::new(),
            priority_order: priority_order.into_iter().map(Into::into).collect(),
        }
    }

    pub fn with_scopes(mut self, global_rules: Vec<String>, specific_rules: Vec<String>) -> Self {
        self.global_rules = global_rules;
        self.specific_rules = specific_rules;
        self
    }
}

impl CustomRule {
    pub fn new(
        id: impl Into<String>,
        kind: impl Into<String>,
        conditions: Vec<Condition>,
        actions: Vec<Action>,
    ) -> Self {
        Self {
            meta: RuleMeta::new(id, "Custom rule"),
            kind: kind.into(),
            conditions,
            actions,
            ai_generated: false,
        }
    }
}

/// Rule category, in canonical declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleCategory {
    CoRunGroups,
    SlotRestrictions,
    LoadLimits,
    PhaseWindows,
    PatternMatches,
    PrecedenceOverrides,
    CustomRules,
}

impl RuleCategory {
    pub const ALL: [RuleCategory; 7] = [
        Self::CoRunGroups,
        Self::SlotRestrictions,
        Self::LoadLimits,
        Self::PhaseWindows,
        Self::PatternMatches,
        Self::PrecedenceOverrides,
        Self::CustomRules,
    ];

    /// JSON key of the category.
    pub fn key(self) -> &'static str {
        match self {
            Self::CoRunGroups => "coRunGroups",
            Self::SlotRestrictions => "slotRestrictions",
            Self::LoadLimits => "loadLimits",
            Self::PhaseWindows => "phaseWindows",
            Self::PatternMatches => "patternMatches",
            Self::PrecedenceOverrides => "precedenceOverrides",
            Self::CustomRules => "customRules",
        }
    }

    /// Category for a JSON key.
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.key() == key)
    }

    /// Prefix of generated rule IDs.
    pub fn id_prefix(self) -> &'static str {
        match self {
            Self::CoRunGroups => "corun",
            Self::SlotRestrictions => "slot",
            Self::LoadLimits => "load",
            Self::PhaseWindows => "phase",
            Self::PatternMatches => "pattern",
            Self::PrecedenceOverrides => "precedence",
            Self::CustomRules => "custom",
        }
    }

    /// Parses one rule object of this category.
    pub fn parse_rule(self, value: &Value) -> serde_json::Result<Rule> {
        let value = value.clone();
        Ok(match self {
            Self::CoRunGroups => Rule::CoRunGroup(serde_json::from_value(value)?),
            Self::SlotRestrictions => Rule::SlotRestriction(serde_json::from_value(value)?),
            Self::LoadLimits => Rule::LoadLimit(serde_json::from_value(value)?),
            Self::PhaseWindows => Rule::PhaseWindow(serde_json::from_value(value)?),
            Self::PatternMatches => Rule::PatternMatch(serde_json::from_value(value)?),
            Self::PrecedenceOverrides => Rule::PrecedenceOverride(serde_json::from_value(value)?),
            Self::CustomRules => Rule::CustomRule(serde_json::from_value(value)?),
        })
    }
}

impl fmt::Display for RuleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Any rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Rule {
    CoRunGroup(CoRunGroup),
    SlotRestriction(SlotRestriction),
    LoadLimit(LoadLimit),
    PhaseWindow(PhaseWindow),
    PatternMatch(PatternMatch),
    PrecedenceOverride(PrecedenceOverride),
    CustomRule(CustomRule),
}

impl Rule {
    pub fn meta(&self) -> &RuleMeta {
        match self {
            Self::CoRunGroup(r) => &r.meta,
            Self::SlotRestriction(r) => &r.meta,
            Self::LoadLimit(r) => &r.meta,
            Self::PhaseWindow(r) => &r.meta,
            Self::PatternMatch(r) => &r.meta,
            Self::PrecedenceOverride(r) => &r.meta,
            Self::CustomRule(r) => &r.meta,
        }
    }

    pub fn meta_mut(&mut self) -> &mut RuleMeta {
        match self {
            Self::CoRunGroup(r) => &mut r.meta,
            Self::SlotRestriction(r) => &mut r.meta,
            Self::LoadLimit(r) => &mut r.meta,
            Self::PhaseWindow(r) => &mut r.meta,
            Self::PatternMatch(r) => &mut r.meta,
            Self::PrecedenceOverride(r) => &mut r.meta,
            Self::CustomRule(r) => &mut r.meta,
        }
    }

    pub fn id(&self) -> &str {
        &self.meta().id
    }

    /// Sets the rule's own priority.
    pub fn with_priority(mut self, priority: i64) -> Self {
        self.meta_mut().priority = priority;
        self
    }

    pub fn category(&self) -> RuleCategory {
        match self {
            Self::CoRunGroup(_) => RuleCategory::CoRunGroups,
            Self::SlotRestriction(_) => RuleCategory::SlotRestrictions,
            Self::LoadLimit(_) => RuleCategory::LoadLimits,
            Self::PhaseWindow(_) => RuleCategory::PhaseWindows,
            Self::PatternMatch(_) => RuleCategory::PatternMatches,
            Self::PrecedenceOverride(_) => RuleCategory::PrecedenceOverrides,
            Self::CustomRule(_) => RuleCategory::CustomRules,
        }
    }

    /// Well-formedness check. A rule failing it is skipped, never applied.
    pub fn check(&self) -> Result<(), String> {
        if self.id().trim().is_empty() {
            return Err("missing rule id".into());
        }
        match self {
            Self::CoRunGroup(r) => non_empty(&r.task_ids, "taskIds"),
            Self::SlotRestriction(r) => {
                non_empty(&r.group_ids, "groupIds")?;
                if r.min_common_slots < 0 {
                    return Err("minCommonSlots must not be negative".into());
                }
                match r.max_slots {
                    Some(max) if max < 0 => Err("maxSlots must not be negative".into()),
                    _ => Ok(()),
                }
            }
            Self::LoadLimit(r) => {
                non_empty(&r.worker_group_ids, "workerGroupIds")?;
                if r.max_slots_per_phase < 0 {
                    return Err("maxSlotsPerPhase must not be negative".into());
                }
                Ok(())
            }
            Self::PhaseWindow(r) => {
                if r.task_id.trim().is_empty() {
                    return Err("missing taskId".into());
                }
                non_empty(&r.allowed_phases, "allowedPhases")
            }
            Self::PatternMatch(r) => {
                Regex::new(&r.pattern).map_err(|e| format!("invalid pattern: {e}"))?;
                Template::parse(&r.rule_template)
                    .map(|_| ())
                    .ok_or_else(|| format!("unknown rule template '{}'", r.rule_template))
            }
            Self::PrecedenceOverride(r) => {
                if r.priority_order.is_empty() && r.global_rules.is_empty() && r.specific_rules.is_empty() {
                    return Err("precedence override names no rules".into());
                }
                Ok(())
            }
            Self::CustomRule(r) => {
                non_empty(&r.conditions, "conditions")?;
                non_empty(&r.actions, "actions")?;
                let entity = r.conditions[0].entity;
                if r.conditions.iter().any(|c| c.entity != entity) {
                    return Err("conditions must all target the same entity kind".into());
                }
                r.conditions.iter().try_for_each(Condition::check)
            }
        }
    }
}

fn non_empty<T>(items: &[T], field: &str) -> Result<(), String> {
    if items.is_empty() {
        Err(format!("{field} is empty"))
    } else {
        Ok(())
    }
}

impl From<CoRunGroup> for Rule {
    fn from(rule: CoRunGroup) -> Self {
        Self::CoRunGroup(rule)
    }
}

impl From<SlotRestriction> for Rule {
    fn from(rule: SlotRestriction) -> Self {
        Self::SlotRestriction(rule)
    }
}

impl From<LoadLimit> for Rule {
    fn from(rule: LoadLimit) -> Self {
        Self::LoadLimit(rule)
    }
}

impl From<PhaseWindow> for Rule {
    fn from(rule: PhaseWindow) -> Self {
        Self::PhaseWindow(rule)
    }
}

impl From<PatternMatch> for Rule {
    fn from(rule: PatternMatch) -> Self {
        Self::PatternMatch(rule)
    }
}

impl From<PrecedenceOverride> for Rule {
    fn from(rule: PrecedenceOverride) -> Self {
        Self::PrecedenceOverride(rule)
    }
}

impl From<CustomRule> for Rule {
    fn from(rule: CustomRule) -> Self {
        Self::CustomRule(rule)
    }
}
