use serde::{Deserialize, Serialize};

use crate::{
    ExecutionContext, ExpressionEvaluator, FailureKind, PriorityTier, Rule, RuleError, Severity,
    Value,
};

/// Threshold used when a dynamic threshold expression evaluates to `null`.
const DEFAULT_DYNAMIC_THRESHOLD: f64 = 0.5;

/// Names a dynamic threshold expression in errors.
pub(crate) const THRESHOLD_SOURCE: &str = "dynamic-threshold";

/// Chooses which accumulation rules execute.
///
/// Selected rules keep their declaration order; unselected rules never run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "kebab-case")]
pub enum RuleSelection {
    /// Every enabled rule.
    #[default]
    All,
    /// Rules with `weight >= threshold`.
    WeightThreshold {
        #[serde(rename = "weight-threshold")]
        threshold: f64,
    },
    /// The `max_rules` highest-weight rules, ties broken by declaration order.
    TopWeighted {
        #[serde(rename = "max-rules")]
        max_rules: usize,
    },
    /// Rules whose tier is at least `min_priority`.
    PriorityBased {
        #[serde(rename = "min-priority")]
        min_priority: PriorityTier,
    },
    /// Evaluate `threshold_expression` against the context, then select as
    /// [`WeightThreshold`](Self::WeightThreshold).
    DynamicThreshold {
        #[serde(rename = "threshold-expression")]
        threshold_expression: String,
    },
}

impl RuleSelection {
    /// Filter `rules` down to the subset that should execute.
    ///
    /// Disabled rules are never selected. A dynamic threshold that cannot be
    /// evaluated to a number falls back to selecting every rule.
    pub fn select<'r>(
        &self,
        rules: &'r [Rule],
        ctx: &ExecutionContext,
        evaluator: &dyn ExpressionEvaluator,
    ) -> Vec<&'r Rule> {
        let threshold = |expression: &str| {
            crate::unit::guarded(evaluator, expression, ctx).map_err(|e| RuleError {
                rule_id: THRESHOLD_SOURCE.to_owned(),
                severity: Severity::default(),
                kind: FailureKind::Evaluation,
                message: e.message().to_owned(),
            })
        };
        match self.select_with(rules, threshold) {
            Ok(selected) => selected,
            Err(_) => rules.iter().filter(|r| r.enabled).collect(),
        }
    }

    /// [`select`](Self::select) with the threshold expression evaluated by
    /// the caller. A timed-out threshold is returned as the run's failure.
    pub(crate) fn select_with<'r>(
        &self,
        rules: &'r [Rule],
        threshold: impl FnOnce(&str) -> Result<Value, RuleError>,
    ) -> Result<Vec<&'r Rule>, RuleError> {
        let enabled = rules.iter().filter(|r| r.enabled);
        Ok(match self {
            RuleSelection::All => enabled.collect(),
            RuleSelection::WeightThreshold { threshold } => above(enabled, *threshold),
            RuleSelection::TopWeighted { max_rules } => {
                let mut ranked: Vec<(usize, &Rule)> = enabled.enumerate().collect();
                // Stable sort keeps declaration order among equal weights.
                ranked.sort_by(|(_, a), (_, b)| b.weight.total_cmp(&a.weight));
                ranked.truncate(*max_rules);
                ranked.sort_by_key(|(idx, _)| *idx);
                ranked.into_iter().map(|(_, rule)| rule).collect()
            }
            RuleSelection::PriorityBased { min_priority } => {
                enabled.filter(|r| r.tier >= *min_priority).collect()
            }
            RuleSelection::DynamicThreshold {
                threshold_expression,
            } => match threshold(threshold_expression) {
                Ok(Value::Null) => above(enabled, DEFAULT_DYNAMIC_THRESHOLD),
                Ok(value) => match value.as_f64() {
                    Some(threshold) => above(enabled, threshold),
                    None => {
                        tracing::warn!(
                            expression = %threshold_expression,
                            %value,
                            "dynamic threshold is not numeric, selecting all rules"
                        );
                        enabled.collect()
                    }
                },
                Err(e) if e.kind == FailureKind::Timeout => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        expression = %threshold_expression,
                        error = %e.message,
                        "dynamic threshold failed, selecting all rules"
                    );
                    enabled.collect()
                }
            },
        })
    }
}

fn above<'r>(rules: impl Iterator<Item = &'r Rule>, threshold: f64) -> Vec<&'r Rule> {
    rules.filter(|r| r.weight >= threshold).collect()
}
