use std::fmt;

use serde::Serialize;
use thiserror::Error;

use super::rule::Severity;
use super::Value;

/// Why a rule evaluation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    /// The expression evaluator returned an error.
    Evaluation,
    /// The evaluation exceeded the chain's per-rule timeout.
    Timeout,
}

/// A failed evaluation, tagged with the rule it came from.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(rename_all = "kebab-case")]
#[error("rule '{rule_id}' failed ({kind}, {severity}): {message}")]
pub struct RuleError {
    pub rule_id: String,
    pub severity: Severity,
    pub kind: FailureKind,
    pub message: String,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Evaluation => write!(f, "evaluation error"),
            FailureKind::Timeout => write!(f, "timeout"),
        }
    }
}

/// The classified result of evaluating one rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleOutcome {
    Matched(Value),
    NotMatched,
    Errored(RuleError),
}

impl RuleOutcome {
    #[must_use]
    pub fn is_matched(&self) -> bool {
        matches!(self, RuleOutcome::Matched(_))
    }

    /// An `Errored` outcome at `Critical` severity: terminal for the chain.
    #[must_use]
    pub fn is_critical(&self) -> bool {
        matches!(self, RuleOutcome::Errored(e) if e.severity == Severity::Critical)
    }

    #[must_use]
    pub fn error(&self) -> Option<&RuleError> {
        match self {
            RuleOutcome::Errored(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for RuleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleOutcome::Matched(v) => write!(f, "MATCHED({v})"),
            RuleOutcome::NotMatched => write!(f, "NOT_MATCHED"),
            RuleOutcome::Errored(e) => write!(f, "ERRORED({}, {})", e.severity, e.message),
        }
    }
}

/// One audit entry of the execution path.
///
/// `outcome` is the effective outcome after error recovery; when a failure was
/// recovered, the original error is kept in `recovered` so its message stays
/// available for audit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct RuleRecord {
    pub rule_id: String,
    pub message: String,
    pub outcome: RuleOutcome,
    pub recovered: Option<RuleError>,
}

impl RuleRecord {
    #[must_use]
    pub fn is_matched(&self) -> bool {
        self.outcome.is_matched()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn error(severity: Severity) -> RuleError {
        RuleError {
            rule_id: "limit".into(),
            severity,
            kind: FailureKind::Evaluation,
            message: "unknown operator".into(),
        }
    }

    #[test]
    fn classification_helpers() {
        assert!(RuleOutcome::Matched(Value::Bool(true)).is_matched());
        assert!(!RuleOutcome::NotMatched.is_matched());
        assert!(RuleOutcome::Errored(error(Severity::Critical)).is_critical());
        assert!(!RuleOutcome::Errored(error(Severity::Warning)).is_critical());
    }

    #[test]
    fn rule_error_message() {
        let err = RuleError {
            kind: FailureKind::Timeout,
            ..error(Severity::Critical)
        };
        assert_eq!(
            err.to_string(),
            "rule 'limit' failed (timeout, CRITICAL): unknown operator"
        );
    }

    #[test]
    fn outcome_display() {
        assert_eq!(RuleOutcome::Matched(Value::Int(25)).to_string(), "MATCHED(25)");
        assert_eq!(RuleOutcome::NotMatched.to_string(), "NOT_MATCHED");
        assert_eq!(
            RuleOutcome::Errored(error(Severity::Error)).to_string(),
            "ERRORED(ERROR, unknown operator)"
        );
    }
}
