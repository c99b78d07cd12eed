use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use crate::{
    EvaluationError, ExecutionContext, ExpressionEvaluator, FailureKind, Rule, RuleError,
    RuleOutcome, Severity, Value,
};

/// Evaluate one rule against a context and classify the result.
///
/// Evaluator errors (and panics) become `Errored` at the rule's severity; a
/// falsy value (`false`, `null`, `0`) is `NotMatched`; anything else is
/// `Matched` with the value. The context is never modified.
///
/// # Example
///
/// ```
/// use rulechain::{evaluate, ExecutionContext, ExprEvaluator, Facts, Rule, RuleOutcome, Value};
///
/// let ctx = ExecutionContext::seeded(&Facts::new().set("income", 30_000_i64));
/// let rule = Rule::new("income", "#income >= 25000 ? 25 : 0");
/// assert_eq!(
///     evaluate(&ExprEvaluator::new(), &rule, &ctx),
///     RuleOutcome::Matched(Value::Int(25))
/// );
/// ```
pub fn evaluate(
    evaluator: &dyn ExpressionEvaluator,
    rule: &Rule,
    ctx: &ExecutionContext,
) -> RuleOutcome {
    classify(guarded(evaluator, &rule.condition, ctx).map_err(|e| evaluation_error(rule, &e)))
}

pub(crate) fn classify(result: Result<Value, RuleError>) -> RuleOutcome {
    match result {
        Ok(value) if value.is_truthy() => RuleOutcome::Matched(value),
        Ok(_) => RuleOutcome::NotMatched,
        Err(e) => RuleOutcome::Errored(e),
    }
}

fn evaluation_error(rule: &Rule, e: &EvaluationError) -> RuleError {
    RuleError {
        rule_id: rule.id.clone(),
        severity: rule.severity,
        kind: FailureKind::Evaluation,
        message: e.message().to_owned(),
    }
}

/// Invoke the evaluator, turning a panic into an ordinary evaluation error.
pub(crate) fn guarded(
    evaluator: &dyn ExpressionEvaluator,
    condition: &str,
    ctx: &ExecutionContext,
) -> Result<Value, EvaluationError> {
    panic::catch_unwind(AssertUnwindSafe(|| evaluator.evaluate(condition, ctx)))
        .unwrap_or_else(|payload| Err(EvaluationError::new(panic_message(payload.as_ref()))))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_owned());
    format!("evaluator panicked: {detail}")
}

/// Evaluate a rule's condition, bounded by `timeout` when one is configured.
///
/// The raw value is returned even when falsy: executors that store results
/// (sequential outputs, decision values) need it. A timeout is always a
/// `Critical` failure, whatever the rule declares.
pub(crate) fn evaluate_raw(
    evaluator: &Arc<dyn ExpressionEvaluator>,
    rule: &Rule,
    ctx: &ExecutionContext,
    timeout: Option<Duration>,
) -> Result<Value, RuleError> {
    evaluate_bounded(evaluator, &rule.id, rule.severity, &rule.condition, ctx, timeout)
}

/// Evaluate any expression on behalf of `source` (a rule id, or a label for
/// stage conditions and threshold expressions), bounded by `timeout`.
///
/// Evaluation failures carry `severity`; a timeout is `Critical`. The
/// evaluation thread of a timed-out call is detached and its eventual result
/// dropped.
pub(crate) fn evaluate_bounded(
    evaluator: &Arc<dyn ExpressionEvaluator>,
    source: &str,
    severity: Severity,
    expression: &str,
    ctx: &ExecutionContext,
    timeout: Option<Duration>,
) -> Result<Value, RuleError> {
    let failed = |e: EvaluationError| RuleError {
        rule_id: source.to_owned(),
        severity,
        kind: FailureKind::Evaluation,
        message: e.message().to_owned(),
    };
    let Some(timeout) = timeout else {
        return guarded(evaluator.as_ref(), expression, ctx).map_err(&failed);
    };

    let (tx, rx) = mpsc::channel();
    let worker_evaluator = Arc::clone(evaluator);
    let condition = expression.to_owned();
    let snapshot = ctx.clone();
    let spawned = thread::Builder::new()
        .name(format!("rule-{source}"))
        .spawn(move || {
            // The receiver is gone if the caller already timed out.
            let _ = tx.send(guarded(worker_evaluator.as_ref(), &condition, &snapshot));
        });
    if let Err(e) = spawned {
        return Err(failed(EvaluationError::new(format!(
            "cannot spawn evaluation thread: {e}"
        ))));
    }

    match rx.recv_timeout(timeout) {
        Ok(result) => result.map_err(&failed),
        Err(mpsc::RecvTimeoutError::Timeout) => Err(RuleError {
            rule_id: source.to_owned(),
            severity: Severity::Critical,
            kind: FailureKind::Timeout,
            message: format!("evaluation exceeded {}ms", timeout.as_millis()),
        }),
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(failed(EvaluationError::new(
            "evaluation thread exited without a result",
        ))),
    }
}

/// Whether a buffered result ends a rule list: a critical failure always
/// does; a non-match does when the list stops on first failure.
fn ends_list(result: &Result<Value, RuleError>, stop_on_non_match: bool) -> bool {
    match result {
        Err(e) => e.severity == Severity::Critical || stop_on_non_match,
        Ok(value) => stop_on_non_match && !value.is_truthy(),
    }
}

/// Evaluate sibling rules concurrently against one read-only snapshot.
///
/// Results come back indexed by declaration position. Workers claim indices in
/// increasing order and stop claiming once a result ends the list, so every
/// slot before the first list-ending result is filled; later slots may be
/// `None` (never started) or filled (in flight when cancelled). Callers merge
/// in declaration order and discard everything after the cut.
pub(crate) fn evaluate_concurrently(
    evaluator: &Arc<dyn ExpressionEvaluator>,
    rules: &[&Rule],
    ctx: &ExecutionContext,
    timeout: Option<Duration>,
    stop_on_non_match: bool,
) -> Vec<Option<Result<Value, RuleError>>> {
    let next = AtomicUsize::new(0);
    let cancel = AtomicBool::new(false);
    let workers = thread::available_parallelism()
        .map_or(1, usize::from)
        .min(rules.len());

    let mut slots: Vec<Option<Result<Value, RuleError>>> = vec![None; rules.len()];
    thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                scope.spawn(|| {
                    let mut done = Vec::new();
                    while !cancel.load(Ordering::Acquire) {
                        let idx = next.fetch_add(1, Ordering::AcqRel);
                        let Some(rule) = rules.get(idx) else {
                            break;
                        };
                        let result = evaluate_raw(evaluator, rule, ctx, timeout);
                        if ends_list(&result, stop_on_non_match) {
                            cancel.store(true, Ordering::Release);
                        }
                        done.push((idx, result));
                    }
                    done
                })
            })
            .collect();
        for handle in handles {
            for (idx, result) in handle.join().unwrap_or_default() {
                slots[idx] = Some(result);
            }
        }
    });
    slots
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ExprEvaluator, Facts};

    fn shared(evaluator: impl ExpressionEvaluator + 'static) -> Arc<dyn ExpressionEvaluator> {
        Arc::new(evaluator)
    }

    #[test]
    fn classify_values() {
        let ctx = ExecutionContext::seeded(&Facts::new().set("age", 16_i64));
        let evaluator = ExprEvaluator::new();
        assert_eq!(
            evaluate(&evaluator, &Rule::new("adult", "#age >= 18"), &ctx),
            RuleOutcome::NotMatched
        );
        assert_eq!(
            evaluate(&evaluator, &Rule::new("score", "#age * 2"), &ctx),
            RuleOutcome::Matched(Value::Int(32))
        );
        assert_eq!(
            evaluate(&evaluator, &Rule::new("zero", "#age - 16"), &ctx),
            RuleOutcome::NotMatched
        );
        assert_eq!(
            evaluate(&evaluator, &Rule::new("null", "#missing"), &ctx),
            RuleOutcome::NotMatched
        );
    }

    #[test]
    fn errors_carry_rule_severity() {
        let rule = Rule::new("bad", "1 / 0").severity(Severity::Warning);
        match evaluate(&ExprEvaluator::new(), &rule, &ExecutionContext::new()) {
            RuleOutcome::Errored(e) => {
                assert_eq!(e.rule_id, "bad");
                assert_eq!(e.severity, Severity::Warning);
                assert_eq!(e.kind, FailureKind::Evaluation);
                assert_eq!(e.message, "division by zero");
            }
            other => panic!("expected Errored, got {other}"),
        }
    }

    #[test]
    fn panicking_evaluator_is_an_error() {
        let evaluator = |_: &str, _: &ExecutionContext| -> Result<Value, EvaluationError> {
            panic!("evaluator bug")
        };
        let outcome = evaluate(&evaluator, &Rule::new("p", "x"), &ExecutionContext::new());
        assert_eq!(
            outcome.error().map(|e| e.message.as_str()),
            Some("evaluator panicked: evaluator bug")
        );
    }

    #[test]
    fn timeout_is_critical() {
        let slow = shared(|_: &str, _: &ExecutionContext| -> Result<Value, EvaluationError> {
            thread::sleep(Duration::from_millis(200));
            Ok(Value::Bool(true))
        });
        let rule = Rule::new("slow", "x").severity(Severity::Warning);
        let err = evaluate_raw(
            &slow,
            &rule,
            &ExecutionContext::new(),
            Some(Duration::from_millis(10)),
        )
        .unwrap_err();
        assert_eq!(err.kind, FailureKind::Timeout);
        assert_eq!(err.severity, Severity::Critical);
    }

    #[test]
    fn fast_evaluation_within_timeout() {
        let evaluator = shared(ExprEvaluator::new());
        let result = evaluate_raw(
            &evaluator,
            &Rule::new("r", "false"),
            &ExecutionContext::new(),
            Some(Duration::from_secs(5)),
        );
        assert_eq!(result, Ok(Value::Bool(false)));
    }

    #[test]
    fn concurrent_results_are_indexed_by_declaration() {
        let evaluator = shared(ExprEvaluator::new());
        let rules: Vec<Rule> = (0..20)
            .map(|i| Rule::new(&format!("r{i}"), &format!("{i} * 2")))
            .collect();
        let refs: Vec<&Rule> = rules.iter().collect();
        let slots =
            evaluate_concurrently(&evaluator, &refs, &ExecutionContext::new(), None, false);
        for (i, slot) in slots.into_iter().enumerate() {
            assert_eq!(slot, Some(Ok(Value::Int(i as i64 * 2))));
        }
    }

    #[test]
    fn concurrent_prefix_is_complete_before_cut() {
        let evaluator = shared(ExprEvaluator::new());
        let rules: Vec<Rule> = (0..50)
            .map(|i| {
                let condition = if i == 10 { "false" } else { "true" };
                Rule::new(&format!("r{i}"), condition)
            })
            .collect();
        let refs: Vec<&Rule> = rules.iter().collect();
        let slots =
            evaluate_concurrently(&evaluator, &refs, &ExecutionContext::new(), None, true);
        assert!(slots[..=10].iter().all(Option::is_some));
        assert_eq!(slots[10], Some(Ok(Value::Bool(false))));
    }
}
