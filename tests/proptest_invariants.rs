
use proptest::prelude::*;
use rulechain::{
    evaluate, ChainConfiguration, ExecutionContext, ExprEvaluator, Facts, RuleChain,
    RuleChainResult, RuleChainRunner, RuleOutcome, Value,
};
use strategies::{
    arb_accumulative, arb_chain, arb_conditional, arb_facts, ANY_SEVERITY, RECOVERABLE,
};

fn run(chain: &RuleChain, facts: &Facts) -> RuleChainResult {
    RuleChainRunner::default()
        .run(chain, facts)
        .expect("generated chains are valid")
}

/// Helper: everything observable about a result except its duration.
fn observable(
    result: &RuleChainResult,
) -> (
    bool,
    Value,
    Vec<rulechain::RuleRecord>,
    Vec<(String, Value)>,
    Vec<(String, rulechain::StageStatus)>,
) {
    (
        result.is_successful(),
        result.final_outcome().clone(),
        result.records().to_vec(),
        result.stage_results().to_vec(),
        result.stage_statuses().to_vec(),
    )
}

// ---------------------------------------------------------------------------
// Invariant 1: Path bound
//
// Only configured rules can appear in the execution path, and never more of
// them than the configuration references.
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(400))]

    #[test]
    fn execution_path_is_bounded(chain in arb_chain(ANY_SEVERITY), facts in arb_facts()) {
        let result = run(&chain, &facts);
        let configured: Vec<&str> = chain
            .configuration
            .rules()
            .iter()
            .map(|r| r.id.as_str())
            .collect();
        prop_assert!(result.executed_rules_count() <= configured.len());
        for id in result.execution_path() {
            prop_assert!(configured.contains(&id), "unexpected rule '{}' in path", id);
        }
        prop_assert!(result.triggered_rules_count() <= result.executed_rules_count());
    }
}

// ---------------------------------------------------------------------------
// Invariant 2: Determinism
//
// The same chain and facts always produce the same result, and opting into
// parallel execution does not change it.
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    #[test]
    fn determinism_repeated_runs(chain in arb_chain(ANY_SEVERITY), facts in arb_facts()) {
        let first = observable(&run(&chain, &facts));
        for _ in 0..3 {
            let again = observable(&run(&chain, &facts));
            prop_assert_eq!(&first, &again, "determinism violated on repeated run");
        }
    }

    #[test]
    fn determinism_parallel(chain in arb_chain(ANY_SEVERITY), facts in arb_facts()) {
        let sequential = observable(&run(&chain, &facts));
        let parallel = observable(&run(&chain.clone().parallel(true), &facts));
        prop_assert_eq!(sequential, parallel, "parallel run diverged from sequential run");
    }
}

// ---------------------------------------------------------------------------
// Invariant 3: Branch exclusivity
//
// A matched trigger runs only on-trigger rules; anything else runs only
// on-no-trigger rules.
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(400))]

    #[test]
    fn conditional_branches_are_exclusive(
        chain in arb_conditional(ANY_SEVERITY),
        facts in arb_facts(),
    ) {
        let result = run(&chain, &facts);
        let path = result.execution_path();
        prop_assert_eq!(path[0], "trigger");
        let prefix = if result.records()[0].is_matched() { "on" } else { "off" };
        for id in &path[1..] {
            prop_assert!(id.starts_with(prefix), "rule '{}' ran on the wrong branch", id);
        }
    }
}

// ---------------------------------------------------------------------------
// Invariant 4: Accumulator sum
//
// The final accumulator equals the initial value plus each selected rule's
// contribution, and only selected rules run.
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(400))]

    #[test]
    fn accumulator_is_initial_plus_contributions(
        chain in arb_accumulative(RECOVERABLE),
        facts in arb_facts(),
    ) {
        let ChainConfiguration::AccumulativeChaining(config) = &chain.configuration else {
            panic!("expected an accumulative chain");
        };
        let evaluator = ExprEvaluator::new();
        let ctx = ExecutionContext::seeded(&facts);
        let selected = config
            .rule_selection
            .select(&config.accumulation_rules, &ctx, &evaluator);
        let expected = selected.iter().fold(config.initial_value, |acc, rule| {
            acc + match evaluate(&evaluator, rule, &ctx) {
                RuleOutcome::Matched(value) => value.as_f64().unwrap_or(0.0),
                _ => 0.0,
            }
        });

        let result = run(&chain, &facts);
        prop_assert!(result.is_successful());
        prop_assert_eq!(result.final_outcome(), &Value::Float(expected));
        prop_assert_eq!(result.stage_result("total"), Some(&Value::Float(expected)));
        let selected_ids: Vec<&str> = selected.iter().map(|r| r.id.as_str()).collect();
        prop_assert_eq!(result.execution_path(), selected_ids);
    }
}
