use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::executor::{executor_for, Run};
use crate::{
    ChainFailure, ConfigurationError, ExecutionContext, ExprEvaluator, ExpressionEvaluator, Facts,
    RuleChain, RuleChainResult, Value,
};

/// Executes rule chains against caller-supplied facts.
///
/// The runner holds only the expression evaluator, so one runner can be
/// shared across threads and every run gets its own fresh
/// [`ExecutionContext`].
///
/// # Example
///
/// ```
/// use rulechain::{Facts, Rule, RuleChain, RuleChainRunner, SequentialDependency, Value};
///
/// let chain = RuleChain::new(
///     "discount",
///     SequentialDependency::new()
///         .stage("base", Rule::new("base", "#tier == 'GOLD' ? 10 : 5"))
///         .stage("total", Rule::new("total", "#base + 2")),
/// );
/// let facts = Facts::new().set("tier", "GOLD");
/// let result = RuleChainRunner::default().run(&chain, &facts).unwrap();
/// assert!(result.is_successful());
/// assert_eq!(result.final_outcome(), &Value::Int(12));
/// ```
#[derive(Clone)]
pub struct RuleChainRunner {
    evaluator: Arc<dyn ExpressionEvaluator>,
}

impl RuleChainRunner {
    #[must_use]
    pub fn new(evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        Self { evaluator }
    }

    #[must_use]
    pub fn with_evaluator(evaluator: impl ExpressionEvaluator + 'static) -> Self {
        Self::new(Arc::new(evaluator))
    }

    /// Validate and execute one chain.
    ///
    /// Evaluation failures never escape: a critical failure, a routing miss or
    /// a terminated workflow come back as an unsuccessful result.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError`] if the chain is invalid. Nothing is
    /// evaluated in that case.
    pub fn run(&self, chain: &RuleChain, facts: &Facts) -> Result<RuleChainResult, ConfigurationError> {
        chain.validate()?;
        let pattern = chain.pattern();
        let span = tracing::info_span!("rule_chain", chain = %chain.id, %pattern);
        let _entered = span.enter();
        let start = Instant::now();

        if !chain.enabled {
            tracing::info!("chain disabled, not executed");
            return Ok(RuleChainResult::new(
                &chain.id,
                pattern,
                Err(ChainFailure::Disabled {
                    chain: chain.id.clone(),
                }),
                Vec::new(),
                Vec::new(),
                Vec::new(),
                start.elapsed(),
            ));
        }

        let mut run = Run::new(&self.evaluator, &chain.options, ExecutionContext::seeded(facts));
        let outcome = executor_for(&chain.configuration).execute(&mut run);
        let (ctx, records, statuses) = run.into_parts();
        let result = RuleChainResult::new(
            &chain.id,
            pattern,
            outcome,
            records,
            ctx.stage_results(),
            statuses,
            start.elapsed(),
        );

        match result.failure() {
            None => tracing::info!(
                outcome = %result.final_outcome(),
                executed = result.executed_rules_count(),
                triggered = result.triggered_rules_count(),
                duration_us = result.execution_time().as_micros(),
                "chain completed"
            ),
            Some(failure) => tracing::info!(
                %failure,
                executed = result.executed_rules_count(),
                duration_us = result.execution_time().as_micros(),
                "chain unsuccessful"
            ),
        }
        Ok(result)
    }

    /// Run every enabled chain in ascending priority, declaration order on ties.
    ///
    /// Each chain gets its own context; outputs of one chain are not visible
    /// to the next.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigurationError`] encountered. Chains before it
    /// have already run.
    pub fn run_all(
        &self,
        chains: &[RuleChain],
        facts: &Facts,
    ) -> Result<Vec<(String, RuleChainResult)>, ConfigurationError> {
        let mut ordered: Vec<&RuleChain> = chains.iter().filter(|c| c.enabled).collect();
        ordered.sort_by_key(|c| c.priority);
        ordered
            .into_iter()
            .map(|chain| self.run(chain, facts).map(|result| (chain.id.clone(), result)))
            .collect()
    }

    /// Evaluate a bare expression with this runner's evaluator.
    ///
    /// # Errors
    ///
    /// Returns the evaluator's [`EvaluationError`](crate::EvaluationError).
    pub fn evaluate_expression(
        &self,
        expression: &str,
        facts: &Facts,
    ) -> Result<Value, crate::EvaluationError> {
        crate::unit::guarded(self.evaluator.as_ref(), expression, &ExecutionContext::seeded(facts))
    }
}

impl Default for RuleChainRunner {
    /// A runner backed by the built-in [`ExprEvaluator`].
    fn default() -> Self {
        Self::with_evaluator(ExprEvaluator::new())
    }
}

impl fmt::Debug for RuleChainRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleChainRunner").finish_non_exhaustive()
    }
}
