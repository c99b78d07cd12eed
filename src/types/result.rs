use std::fmt;
use std::time::Duration;

use serde::{Serialize, Serializer};
use thiserror::Error;

use super::chain::Pattern;
use super::outcome::{RuleError, RuleRecord};
use super::Value;

/// Status of a complex-workflow stage after a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageStatus {
    Completed,
    Failed,
    /// Not executed because a dependency did not complete.
    Skipped,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageStatus::Completed => write!(f, "COMPLETED"),
            StageStatus::Failed => write!(f, "FAILED"),
            StageStatus::Skipped => write!(f, "SKIPPED"),
        }
    }
}

/// Why a chain run was unsuccessful.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "reason", rename_all = "kebab-case")]
pub enum ChainFailure {
    /// A CRITICAL evaluation error or a timeout.
    #[error("{0}")]
    Aborted(RuleError),

    #[error("no route for key '{key}' and no default route configured")]
    Routing { key: String },

    #[error("workflow terminated at stage '{stage}'")]
    StageTerminated { stage: String },

    #[error("rule chain '{chain}' is disabled")]
    Disabled { chain: String },
}

/// The outcome of one chain run. Immutable once assembled.
///
/// Serializes as a report: stage results and statuses become objects in
/// first-write order and the duration is reported in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
#[must_use]
pub struct RuleChainResult {
    chain_id: String,
    pattern: Pattern,
    final_outcome: Value,
    failure: Option<ChainFailure>,
    records: Vec<RuleRecord>,
    #[serde(serialize_with = "ordered_map")]
    stage_results: Vec<(String, Value)>,
    #[serde(serialize_with = "ordered_map")]
    stage_statuses: Vec<(String, StageStatus)>,
    #[serde(rename = "rules-executed")]
    executed: usize,
    #[serde(rename = "rules-triggered")]
    triggered: usize,
    #[serde(rename = "duration-ms", serialize_with = "millis")]
    duration: Duration,
}

fn ordered_map<S: Serializer, V: Serialize>(
    entries: &[(String, V)],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_map(entries.iter().map(|(name, value)| (name, value)))
}

fn millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}

impl RuleChainResult {
    pub(crate) fn new(
        chain_id: &str,
        pattern: Pattern,
        outcome: Result<Value, ChainFailure>,
        records: Vec<RuleRecord>,
        stage_results: Vec<(String, Value)>,
        stage_statuses: Vec<(String, StageStatus)>,
        duration: Duration,
    ) -> Self {
        let (final_outcome, failure) = match outcome {
            Ok(value) => (value, None),
            Err(failure) => (Value::Null, Some(failure)),
        };
        let triggered = records.iter().filter(|r| r.is_matched()).count();
        Self {
            chain_id: chain_id.to_owned(),
            pattern,
            final_outcome,
            failure,
            executed: records.len(),
            triggered,
            records,
            stage_results,
            stage_statuses,
            duration,
        }
    }

    #[must_use]
    pub fn is_successful(&self) -> bool {
        self.failure.is_none()
    }

    /// Pattern-dependent payload: a decision, a score, a route key, ...
    /// `Value::Null` for unsuccessful runs.
    #[must_use]
    pub fn final_outcome(&self) -> &Value {
        &self.final_outcome
    }

    /// Ids of the rules actually evaluated, in order.
    #[must_use]
    pub fn execution_path(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.rule_id.as_str()).collect()
    }

    /// Full audit entries, one per evaluated rule.
    #[must_use]
    pub fn records(&self) -> &[RuleRecord] {
        &self.records
    }

    #[must_use]
    pub fn stage_result(&self, name: &str) -> Option<&Value> {
        self.stage_results
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Named outputs in the order they were first written.
    #[must_use]
    pub fn stage_results(&self) -> &[(String, Value)] {
        &self.stage_results
    }

    #[must_use]
    pub fn stage_status(&self, stage: &str) -> Option<StageStatus> {
        self.stage_statuses
            .iter()
            .find(|(s, _)| s == stage)
            .map(|(_, status)| *status)
    }

    #[must_use]
    pub fn stage_statuses(&self) -> &[(String, StageStatus)] {
        &self.stage_statuses
    }

    /// Wall-clock duration of the run.
    #[must_use]
    pub fn execution_time(&self) -> Duration {
        self.duration
    }

    #[must_use]
    pub fn execution_time_millis(&self) -> u64 {
        u64::try_from(self.duration.as_millis()).unwrap_or(u64::MAX)
    }

    #[must_use]
    pub fn executed_rules_count(&self) -> usize {
        self.executed
    }

    /// Number of evaluated rules whose effective outcome was a match.
    #[must_use]
    pub fn triggered_rules_count(&self) -> usize {
        self.triggered
    }

    #[must_use]
    pub fn failure(&self) -> Option<&ChainFailure> {
        self.failure.as_ref()
    }

    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        self.failure.as_ref().map(ToString::to_string)
    }

    #[must_use]
    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    #[must_use]
    pub fn pattern(&self) -> Pattern {
        self.pattern
    }
}

impl fmt::Display for RuleChainResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): ", self.chain_id, self.pattern)?;
        match &self.failure {
            None => write!(f, "success, outcome: {}", self.final_outcome)?,
            Some(failure) => write!(f, "failed, error: {failure}")?,
        }
        write!(f, ", path: [{}]", self.execution_path().join(", "))?;
        write!(f, ", triggered: {}/{}", self.triggered, self.executed)?;
        write!(f, ", duration: {:?}", self.duration)?;
        Ok(())
    }
}
