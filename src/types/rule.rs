use std::fmt;

use serde::{Deserialize, Serialize};

/// How an evaluation failure of a rule is handled.
///
/// `Critical` failures abort the whole chain run; every other severity is
/// recovered as a non-match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Critical,
    #[default]
    Error,
    Warning,
    Default,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Critical => write!(f, "CRITICAL"),
            Severity::Error => write!(f, "ERROR"),
            Severity::Warning => write!(f, "WARNING"),
            Severity::Default => write!(f, "DEFAULT"),
        }
    }
}

/// Coarse priority tier consumed by the priority-based selection strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PriorityTier {
    #[default]
    Low,
    Medium,
    High,
}

/// A single rule: a condition expression plus the metadata the engine needs
/// to classify, select and audit it. Immutable once loaded.
///
/// # Example
///
/// ```
/// use rulechain::{Rule, Severity};
///
/// let rule = Rule::new("income-check", "income >= 25000")
///     .message("Income above minimum")
///     .severity(Severity::Warning)
///     .weight(1.0);
/// assert_eq!(rule.id, "income-check");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Rule {
    pub id: String,
    pub condition: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// Lower values run earlier where a pattern orders by priority.
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub tier: PriorityTier,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_weight() -> f64 {
    1.0
}

fn default_enabled() -> bool {
    true
}

impl Rule {
    #[must_use]
    pub fn new(id: &str, condition: &str) -> Self {
        Self {
            id: id.to_owned(),
            condition: condition.to_owned(),
            message: String::new(),
            severity: Severity::default(),
            weight: default_weight(),
            priority: 0,
            tier: PriorityTier::default(),
            enabled: true,
        }
    }

    #[must_use]
    pub fn message(mut self, message: &str) -> Self {
        self.message = message.to_owned();
        self
    }

    #[must_use]
    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    #[must_use]
    pub fn weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    #[must_use]
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn tier(mut self, tier: PriorityTier) -> Self {
        self.tier = tier;
        self
    }

    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}
