//! External rule-generation boundary.
//!
//! Natural-language rule generation lives outside the core. The core only
//! bounds how long it waits and how often it asks, then feeds the returned
//! JSON through [`RuleConfig::from_json`] like any other rule set.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::warn;

use crate::error::{AllocationError, Result};
use crate::rules::{RuleConfig, RuleSetLoad};

/// How the core calls an external service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, first call included.
    pub attempts: u32,
    /// Per-attempt timeout handed to the service.
    pub timeout_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 2,
            timeout_ms: 5_000,
        }
    }
}

impl RetryPolicy {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// A rule-generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleRequest {
    /// What the user asked for, in their words.
    pub prompt: String,
    /// Optional data summary for the service to ground the rules in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
    /// Deadline for one attempt; set from the retry policy.
    #[serde(skip)]
    pub timeout: Duration,
}

impl RuleRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            context: None,
            timeout: RetryPolicy::default().timeout(),
        }
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }
}

/// A service that turns a request into a rule set object.
pub trait ExternalRuleSource {
    /// Service name used in errors and logs.
    fn name(&self) -> &str {
        "rule-generator"
    }

    /// One attempt. Implementations must give up after `request.timeout`.
    fn generate(&self, request: &RuleRequest) -> Result<Value>;
}

/// Asks `source` for rules, retrying per `policy`.
///
/// Exhausted attempts surface as [`AllocationError::ServiceUnavailable`].
/// A response that is not a rule set object is an input-shape error and is
/// not retried.
pub fn fetch_rules_with_retry(
    source: &dyn ExternalRuleSource,
    request: &RuleRequest,
    policy: &RetryPolicy,
) -> Result<RuleSetLoad> {
    let request = RuleRequest {
        timeout: policy.timeout(),
        ..request.clone()
    };
    let attempts = policy.attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        match source.generate(&request) {
            Ok(value) => return RuleConfig::from_json(&value),
            Err(e) => {
                warn!(service = source.name(), attempt, error = %e, "rule generation failed");
                last_error = e.to_string();
            }
        }
    }
    Err(AllocationError::ServiceUnavailable {
        service: source.name().to_string(),
        attempts,
        last_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::Cell;

    struct Flaky {
        failures: u32,
        calls: Cell<u32>,
        response: Value,
    }

    impl ExternalRuleSource for Flaky {
        fn generate(&self, request: &RuleRequest) -> Result<Value> {
            assert_eq!(request.timeout, Duration::from_millis(250));
            self.calls.set(self.calls.get() + 1);
            if self.calls.get() <= self.failures {
                return Err(AllocationError::Config("timed out".into()));
            }
            Ok(self.response.clone())
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            attempts: 2,
            timeout_ms: 250,
        }
    }

    fn rules() -> Value {
        json!({"coRunGroups": [{"id": "c1", "taskIds": ["T1", "T2"]}]})
    }

    #[test]
    fn test_single_retry_recovers() {
        let source = Flaky { failures: 1, calls: Cell::new(0), response: rules() };
        let load = fetch_rules_with_retry(&source, &RuleRequest::new("pair T1 and T2"), &policy()).unwrap();
        assert_eq!(load.config.len(), 1);
        assert_eq!(source.calls.get(), 2);
    }

    #[test]
    fn test_exhaustion_is_service_unavailable() {
        let source = Flaky { failures: 5, calls: Cell::new(0), response: rules() };
        let err = fetch_rules_with_retry(&source, &RuleRequest::new("x"), &policy()).unwrap_err();
        match err {
            AllocationError::ServiceUnavailable { service, attempts, last_error } => {
                assert_eq!(service, "rule-generator");
                assert_eq!(attempts, 2);
                assert!(last_error.contains("timed out"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(source.calls.get(), 2);
    }

    #[test]
    fn test_bad_shape_not_retried() {
        let source = Flaky { failures: 0, calls: Cell::new(0), response: json!(["not", "rules"]) };
        let err = fetch_rules_with_retry(&source, &RuleRequest::new("x"), &policy()).unwrap_err();
        assert!(matches!(err, AllocationError::InvalidInputShape { .. }));
        assert_eq!(source.calls.get(), 1);
    }
}
