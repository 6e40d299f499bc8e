//! Core configuration.
//!
//! Loaded from TOML; every section and field is optional.
//!
//! ```toml
//! [header_aliases.tasks]
//! "Job Ref" = "taskId"
//!
//! [validation]
//! min_phase = 1
//! max_phase = 6
//! detect_corun_cycles = true
//!
//! [engine]
//! load_unit_weight = 1
//!
//! [engine.priority_weights]
//! priorityLevel = 0.5
//! taskUrgency = 0.5
//!
//! [service]
//! attempts = 2
//! timeout_ms = 5000
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{AllocationError, Result};
use crate::rules::PriorityWeights;
use crate::service::RetryPolicy;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub header_aliases: HeaderAliasConfig,
    pub validation: ValidationSettings,
    pub engine: EngineSettings,
    pub service: RetryPolicy,
}

/// Extra header aliases per entity kind: raw header → canonical field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderAliasConfig {
    pub clients: BTreeMap<String, String>,
    pub workers: BTreeMap<String, String>,
    pub tasks: BTreeMap<String, String>,
}

/// Cross-reference validator settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationSettings {
    /// Lowest phase a worker may be available in.
    pub min_phase: i64,
    /// Highest phase a worker may be available in.
    pub max_phase: i64,
    /// Report cycles among co-run references.
    pub detect_corun_cycles: bool,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            min_phase: 1,
            max_phase: 5,
            detect_corun_cycles: false,
        }
    }
}

impl ValidationSettings {
    /// Whether a phase lies in the configured range.
    pub fn phase_in_range(&self, phase: i64) -> bool {
        (self.min_phase..=self.max_phase).contains(&phase)
    }
}

/// Rule engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Synthetic load contributed by one assigned task.
    pub load_unit_weight: i64,
    /// Default weights for allocation ordering.
    pub priority_weights: PriorityWeights,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            load_unit_weight: 1,
            priority_weights: PriorityWeights::default(),
        }
    }
}

impl CoreConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| AllocationError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| AllocationError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// Checks cross-field consistency.
    pub fn validate(&self) -> Result<()> {
        let v = &self.validation;
        if v.min_phase < 1 {
            return Err(AllocationError::Config(format!(
                "validation.min_phase must be >= 1, got {}",
                v.min_phase
            )));
        }
        if v.min_phase > v.max_phase {
            return Err(AllocationError::Config(format!(
                "validation.min_phase ({}) exceeds max_phase ({})",
                v.min_phase, v.max_phase
            )));
        }
        if self.engine.load_unit_weight < 1 {
            return Err(AllocationError::Config(format!(
                "engine.load_unit_weight must be >= 1, got {}",
                self.engine.load_unit_weight
            )));
        }
        if !self.engine.priority_weights.is_valid() {
            return Err(AllocationError::Config(
                "engine.priority_weights must be finite and non-negative".into(),
            ));
        }
        if self.service.attempts == 0 {
            return Err(AllocationError::Config(
                "service.attempts must be at least 1".into(),
            ));
        }
        for (kind, table) in [
            ("clients", &self.header_aliases.clients),
            ("workers", &self.header_aliases.workers),
            ("tasks", &self.header_aliases.tasks),
        ] {
            if let Some((raw, _)) = table.iter().find(|(_, canonical)| canonical.trim().is_empty()) {
                return Err(AllocationError::Config(format!(
                    "header_aliases.{kind}: alias '{raw}' maps to an empty field name"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CoreConfig::default();
        assert_eq!(config.validation.min_phase, 1);
        assert_eq!(config.validation.max_phase, 5);
        assert!(!config.validation.detect_corun_cycles);
        assert_eq!(config.engine.load_unit_weight, 1);
        assert_eq!(config.service.attempts, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_toml_is_default() {
        let config = CoreConfig::from_toml_str("").unwrap();
        assert_eq!(config, CoreConfig::default());
    }

    #[test]
    fn test_partial_toml() {
        let config = CoreConfig::from_toml_str(
            r#"
            [header_aliases.tasks]
            "Job Ref" = "taskId"

            [validation]
            max_phase = 8
            detect_corun_cycles = true

            [engine.priority_weights]
            priorityLevel = 0.7
            taskUrgency = 0.3
            "#,
        )
        .unwrap();
        assert_eq!(config.header_aliases.tasks["Job Ref"], "taskId");
        assert_eq!(config.validation.min_phase, 1);
        assert_eq!(config.validation.max_phase, 8);
        assert!(config.validation.detect_corun_cycles);
        assert!((config.engine.priority_weights.priority_level - 0.7).abs() < 1e-10);
        assert_eq!(config.engine.load_unit_weight, 1);
    }

    #[test]
    fn test_invalid_phase_range() {
        let err = CoreConfig::from_toml_str("[validation]\nmin_phase = 4\nmax_phase = 2\n")
            .unwrap_err();
        assert!(matches!(err, AllocationError::Config(_)));
    }

    #[test]
    fn test_bad_toml() {
        let err = CoreConfig::from_toml_str("[validation\n").unwrap_err();
        assert!(matches!(err, AllocationError::Config(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = CoreConfig::from_file("/nonexistent/u-allocation.toml").unwrap_err();
        assert!(matches!(err, AllocationError::ConfigIo { .. }));
    }

    #[test]
    fn test_phase_in_range() {
        let v = ValidationSettings::default();
        assert!(v.phase_in_range(1));
        assert!(v.phase_in_range(5));
        assert!(!v.phase_in_range(0));
        assert!(!v.phase_in_range(6));
    }
}
