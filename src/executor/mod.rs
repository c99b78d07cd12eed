mod accumulative;
mod conditional;
mod decision_tree;
mod routing;
mod sequential;
mod workflow;

use std::sync::Arc;

use tracing::Level;

use crate::recovery::recover;
use crate::unit;
use crate::{
    ChainConfiguration, ChainFailure, ExecutionContext, ExecutionOptions, ExpressionEvaluator,
    Rule, RuleError, RuleOutcome, RuleRecord, Severity, StageStatus, Value,
};

/// Control-flow semantics of one pattern. Executors read their configuration
/// and drive a [`Run`]; they never build results themselves.
pub(crate) trait PatternExecutor {
    /// Execute the pattern and return its final outcome.
    fn execute(&self, run: &mut Run<'_>) -> Result<Value, ChainFailure>;
}

/// The executor for a configuration. Adding a pattern means one new variant
/// and one new arm here.
pub(crate) fn executor_for(configuration: &ChainConfiguration) -> &dyn PatternExecutor {
    match configuration {
        ChainConfiguration::ConditionalChaining(c) => c,
        ChainConfiguration::SequentialDependency(c) => c,
        ChainConfiguration::ResultBasedRouting(c) => c,
        ChainConfiguration::AccumulativeChaining(c) => c,
        ChainConfiguration::ComplexWorkflow(c) => c,
        ChainConfiguration::FluentBuilder(c) => c,
    }
}

/// Mutable state of one chain run: the context, the audit trail and any
/// stage statuses. Owned by a single run and never shared between runs.
pub(crate) struct Run<'a> {
    evaluator: &'a Arc<dyn ExpressionEvaluator>,
    options: &'a ExecutionOptions,
    pub(crate) ctx: ExecutionContext,
    records: Vec<RuleRecord>,
    statuses: Vec<(String, StageStatus)>,
}

/// Whether a raw evaluation result counts as a match.
pub(crate) fn is_match(value: &Option<Value>) -> bool {
    value.as_ref().is_some_and(Value::is_truthy)
}

impl<'a> Run<'a> {
    pub(crate) fn new(
        evaluator: &'a Arc<dyn ExpressionEvaluator>,
        options: &'a ExecutionOptions,
        ctx: ExecutionContext,
    ) -> Self {
        Self {
            evaluator,
            options,
            ctx,
            records: Vec::new(),
            statuses: Vec::new(),
        }
    }

    /// A run over a snapshot of this one's context, for work merged back later.
    pub(crate) fn fork(&self) -> Run<'a> {
        Run::new(self.evaluator, self.options, self.ctx.clone())
    }

    pub(crate) fn options(&self) -> &ExecutionOptions {
        self.options
    }

    /// Evaluate a bare expression (not a rule) against the live context,
    /// under the chain's rule timeout. `source` names it in errors.
    pub(crate) fn evaluate_expression(
        &self,
        source: &str,
        expression: &str,
    ) -> Result<Value, RuleError> {
        unit::evaluate_bounded(
            self.evaluator,
            source,
            Severity::default(),
            expression,
            &self.ctx,
            self.options.rule_timeout(),
        )
    }

    pub(crate) fn into_parts(self) -> (ExecutionContext, Vec<RuleRecord>, Vec<(String, StageStatus)>) {
        (self.ctx, self.records, self.statuses)
    }

    /// Append another run's records and statuses after this run's own.
    pub(crate) fn merge_audit(&mut self, records: Vec<RuleRecord>, statuses: Vec<(String, StageStatus)>) {
        self.records.extend(records);
        self.statuses.extend(statuses);
    }

    pub(crate) fn set_status(&mut self, stage: &str, status: StageStatus) {
        self.statuses.push((stage.to_owned(), status));
    }

    pub(crate) fn status(&self, stage: &str) -> Option<StageStatus> {
        self.statuses
            .iter()
            .find(|(s, _)| s == stage)
            .map(|(_, status)| *status)
    }

    /// Evaluate one single-slot rule against the live context.
    ///
    /// Returns the raw value (even a falsy one), `None` when the rule is
    /// disabled or its failure was recovered, or the run's failure when the
    /// rule errored critically. Disabled rules leave no record.
    pub(crate) fn apply(&mut self, rule: &Rule) -> Result<Option<Value>, ChainFailure> {
        if !rule.enabled {
            tracing::debug!(rule = %rule.id, "rule disabled, skipped");
            return Ok(None);
        }
        let result = unit::evaluate_raw(self.evaluator, rule, &self.ctx, self.options.rule_timeout());
        self.absorb(rule, result)
    }

    /// Evaluate a rule list in declaration order.
    ///
    /// List rules never write the context, so under `parallel-execution` they
    /// are evaluated concurrently against the current context and merged in
    /// declaration order; the audit trail is the same either way. Evaluation
    /// stops after a critical failure (returned as `Err`) or, when
    /// `stop_on_non_match` is set, after the first rule that did not match.
    ///
    /// Returns one raw value per executed rule, as [`apply`](Self::apply).
    pub(crate) fn apply_all<'r>(
        &mut self,
        rules: impl IntoIterator<Item = &'r Rule>,
        stop_on_non_match: bool,
    ) -> Result<Vec<Option<Value>>, ChainFailure> {
        let enabled: Vec<&Rule> = rules.into_iter().filter(|r| r.enabled).collect();
        let timeout = self.options.rule_timeout();
        let mut buffered = (self.options.parallel_execution && enabled.len() > 1).then(|| {
            unit::evaluate_concurrently(self.evaluator, &enabled, &self.ctx, timeout, stop_on_non_match)
        });

        let mut values = Vec::with_capacity(enabled.len());
        for (idx, rule) in enabled.iter().enumerate() {
            let result = match buffered.as_mut() {
                Some(slots) => match slots[idx].take() {
                    Some(result) => result,
                    None => break,
                },
                None => unit::evaluate_raw(self.evaluator, rule, &self.ctx, timeout),
            };
            let value = self.absorb(rule, result)?;
            let matched = is_match(&value);
            values.push(value);
            if stop_on_non_match && !matched {
                break;
            }
        }
        Ok(values)
    }

    /// Classify a result, apply the recovery policy, log and record it.
    fn absorb(
        &mut self,
        rule: &Rule,
        result: Result<Value, RuleError>,
    ) -> Result<Option<Value>, ChainFailure> {
        let original = unit::classify(result.clone());
        let error = original.error().cloned();
        let (outcome, level) = recover(original);
        log_outcome(level, rule, &outcome, error.as_ref());

        let failure = match &outcome {
            RuleOutcome::Errored(e) => Some(ChainFailure::Aborted(e.clone())),
            _ => None,
        };
        let recovered = if failure.is_none() { error } else { None };
        self.records.push(RuleRecord {
            rule_id: rule.id.clone(),
            message: rule.message.clone(),
            outcome,
            recovered,
        });

        match failure {
            Some(failure) => Err(failure),
            None => Ok(result.ok()),
        }
    }
}

fn log_outcome(level: Level, rule: &Rule, outcome: &RuleOutcome, error: Option<&RuleError>) {
    if level == Level::ERROR {
        tracing::error!(rule = %rule.id, %outcome, "critical rule failure, aborting chain");
    } else if level == Level::INFO {
        let message = error.map(|e| e.message.as_str()).unwrap_or_default();
        tracing::info!(
            rule = %rule.id,
            severity = %rule.severity,
            error = message,
            "rule failure recovered as no match"
        );
    } else {
        tracing::debug!(rule = %rule.id, %outcome, "rule evaluated");
    }
}
