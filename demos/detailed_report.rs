use rulechain::{
    AccumulativeChaining, Facts, PriorityTier, Rule, RuleChain, RuleChainRunner, RuleSelection,
};

fn main() {
    let chain = RuleChain::new(
        "credit-score",
        AccumulativeChaining::new("creditScore")
            .rule(Rule::new("age", "#age >= 18 ? 20 : 0").tier(PriorityTier::High))
            .rule(Rule::new("income", "#income >= 50000 ? 25 : 10").tier(PriorityTier::High))
            .rule(Rule::new("history", "#missedPayments == 0 ? 15 : -10"))
            .rule(Rule::new("bonus", "#loyaltyYears * 2").tier(PriorityTier::Low))
            .selection(RuleSelection::PriorityBased {
                min_priority: PriorityTier::Medium,
            })
            .threshold("approval", 50.0)
            .final_decision(Rule::new(
                "decision",
                "#creditScore >= #approval ? 'APPROVED' : 'REJECTED'",
            )),
    );

    let facts = Facts::new()
        .set("age", 34_i64)
        .set("income", 72_000_i64)
        .set("missedPayments", 0_i64)
        .set("loyaltyYears", 6_i64);

    let result = RuleChainRunner::default()
        .run(&chain, &facts)
        .expect("chain is valid");

    println!("{result}");
    println!();
    for record in result.records() {
        println!("  {:<10} {:?}", record.rule_id, record.outcome);
    }
    println!("Stage results: {:?}", result.stage_results());
    println!("Duration: {:?}", result.execution_time());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&result).expect("results serialize")
    );
}
