use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rulechain::{
    AccumulativeChaining, ChainFailure, ComplexWorkflow, ConditionalChaining, EvaluationError,
    ExecutionContext, ExprEvaluator, ExpressionEvaluator, Facts, FailureKind, Rule, RuleChain,
    RuleChainRunner, RuleSelection, Severity, StageStatus, Value,
};

fn transaction_chain() -> RuleChain {
    RuleChain::new(
        "high-value",
        ConditionalChaining::new(Rule::new("trigger", "#amount > 100000"))
            .on_trigger(Rule::new("edd", "#accountAge >= 3"))
            .on_trigger(Rule::new("kyc", "#kycComplete"))
            .on_no_trigger(Rule::new("standard", "true")),
    )
}

#[test]
fn run_across_threads() {
    let runner = Arc::new(RuleChainRunner::default());
    let chain = Arc::new(transaction_chain());

    let mut handles = vec![];

    // Thread 1: high value, established account -> both on-trigger rules match
    let (r, c) = (Arc::clone(&runner), Arc::clone(&chain));
    handles.push(thread::spawn(move || {
        let facts = Facts::new()
            .set("amount", 250_000_i64)
            .set("accountAge", 5_i64)
            .set("kycComplete", true);
        r.run(&c, &facts).unwrap()
    }));

    // Thread 2: low value -> standard branch
    let (r, c) = (Arc::clone(&runner), Arc::clone(&chain));
    handles.push(thread::spawn(move || {
        let facts = Facts::new().set("amount", 50_i64);
        r.run(&c, &facts).unwrap()
    }));

    // Thread 3: high value, new account -> edd fails
    let (r, c) = (Arc::clone(&runner), Arc::clone(&chain));
    handles.push(thread::spawn(move || {
        let facts = Facts::new()
            .set("amount", 250_000_i64)
            .set("accountAge", 1_i64)
            .set("kycComplete", true);
        r.run(&c, &facts).unwrap()
    }));

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(results[0].execution_path(), vec!["trigger", "edd", "kyc"]);
    assert_eq!(results[0].triggered_rules_count(), 3);
    assert_eq!(results[1].execution_path(), vec!["trigger", "standard"]);
    assert_eq!(results[2].execution_path(), vec!["trigger", "edd", "kyc"]);
    assert_eq!(results[2].triggered_rules_count(), 2);
}

#[test]
fn many_threads_same_facts_agree() {
    let runner = Arc::new(RuleChainRunner::default());
    let chain = Arc::new(transaction_chain().parallel(true));
    let facts = Arc::new(
        Facts::new()
            .set("amount", 250_000_i64)
            .set("accountAge", 5_i64)
            .set("kycComplete", false),
    );
    let expected = runner.run(&chain, &facts).unwrap();

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let (r, c, f) = (Arc::clone(&runner), Arc::clone(&chain), Arc::clone(&facts));
            thread::spawn(move || r.run(&c, &f).unwrap())
        })
        .collect();

    for handle in handles {
        let result = handle.join().unwrap();
        assert_eq!(result.records(), expected.records());
        assert_eq!(result.final_outcome(), expected.final_outcome());
    }
}

/// Sleeps for a duration encoded in the expression, so later rules finish first.
fn staggered() -> Arc<dyn ExpressionEvaluator> {
    Arc::new(
        |expression: &str, ctx: &ExecutionContext| -> Result<Value, EvaluationError> {
            if let Some(millis) = expression
                .strip_prefix("sleep ")
                .and_then(|rest| rest.split_whitespace().next())
                .and_then(|n| n.parse::<u64>().ok())
            {
                thread::sleep(Duration::from_millis(millis));
                return Ok(Value::Int(i64::try_from(millis).unwrap_or(0)));
            }
            ExprEvaluator::new().evaluate(expression, ctx)
        },
    )
}

#[test]
fn parallel_path_keeps_declaration_order() {
    let config = (0..6).fold(AccumulativeChaining::new("total"), |config, i| {
        config.rule(Rule::new(&format!("r{i}"), &format!("sleep {}", 60 - i * 10)))
    });
    let chain = RuleChain::new("staggered", config).parallel(true);
    let runner = RuleChainRunner::new(staggered());
    let result = runner.run(&chain, &Facts::new()).unwrap();

    assert_eq!(
        result.execution_path(),
        vec!["r0", "r1", "r2", "r3", "r4", "r5"]
    );
    assert_eq!(result.final_outcome(), &Value::Float(210.0));
}

#[test]
fn slow_rule_times_out_as_critical() {
    let chain = RuleChain::new(
        "slow",
        ConditionalChaining::new(Rule::new("trigger", "true"))
            .on_trigger(Rule::new("fast", "true"))
            .on_trigger(Rule::new("slow", "sleep 500")),
    )
    .rule_timeout(Duration::from_millis(20));
    let runner = RuleChainRunner::new(staggered());
    let result = runner.run(&chain, &Facts::new()).unwrap();

    assert!(!result.is_successful());
    match result.failure() {
        Some(ChainFailure::Aborted(e)) => {
            assert_eq!(e.rule_id, "slow");
            assert_eq!(e.kind, FailureKind::Timeout);
        }
        other => panic!("expected a timeout abort, got {other:?}"),
    }
    assert_eq!(result.execution_path(), vec!["trigger", "fast", "slow"]);
}

#[test]
fn parallel_timeout_matches_sequential() {
    let chain = RuleChain::new(
        "slow",
        AccumulativeChaining::new("total")
            .rule(Rule::new("a", "sleep 1"))
            .rule(Rule::new("b", "sleep 400"))
            .rule(Rule::new("c", "sleep 1")),
    )
    .rule_timeout(Duration::from_millis(50));
    let runner = RuleChainRunner::new(staggered());
    let sequential = runner.run(&chain, &Facts::new()).unwrap();
    let parallel = runner.run(&chain.clone().parallel(true), &Facts::new()).unwrap();

    assert!(!sequential.is_successful());
    assert_eq!(sequential.execution_path(), vec!["a", "b"]);
    assert_eq!(parallel.execution_path(), sequential.execution_path());
    assert_eq!(parallel.failure(), sequential.failure());
}

fn expect_timeout(result: &rulechain::RuleChainResult, source: &str) {
    assert!(!result.is_successful());
    match result.failure() {
        Some(ChainFailure::Aborted(e)) => {
            assert_eq!(e.rule_id, source);
            assert_eq!(e.kind, FailureKind::Timeout);
            assert_eq!(e.severity, Severity::Critical);
        }
        other => panic!("expected a timeout abort, got {other:?}"),
    }
}

#[test]
fn slow_stage_condition_times_out() {
    let workflow = ComplexWorkflow::new()
        .stage("gate", |s| {
            s.conditional("sleep 500", vec![Rule::new("never", "true")], Vec::new())
        })
        .stage("after", |s| s.depends_on("gate").rule(Rule::new("later", "true")));
    let chain = RuleChain::new("gated", workflow).rule_timeout(Duration::from_millis(20));
    let result = RuleChainRunner::new(staggered())
        .run(&chain, &Facts::new())
        .unwrap();

    expect_timeout(&result, "gate");
    assert!(result.execution_path().is_empty());
    assert_eq!(result.stage_status("gate"), Some(StageStatus::Failed));
    assert_eq!(result.stage_status("after"), None);
}

#[test]
fn slow_dynamic_threshold_times_out() {
    let config = AccumulativeChaining::new("total")
        .rule(Rule::new("a", "1"))
        .selection(RuleSelection::DynamicThreshold {
            threshold_expression: "sleep 500".into(),
        });
    let chain = RuleChain::new("slow-threshold", config).rule_timeout(Duration::from_millis(20));
    let result = RuleChainRunner::new(staggered())
        .run(&chain, &Facts::new())
        .unwrap();

    expect_timeout(&result, "dynamic-threshold");
    assert!(result.execution_path().is_empty());
}
