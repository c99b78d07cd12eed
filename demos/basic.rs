use rulechain::{ConditionalChaining, Facts, Rule, RuleChain, RuleChainRunner, Severity};

fn main() {
    // Define a chain
    let chain = RuleChain::new(
        "high-value-transaction",
        ConditionalChaining::new(Rule::new("trigger", "#amount > 100000"))
            .on_trigger(Rule::new("edd", "#accountAge >= 3").severity(Severity::Critical))
            .on_trigger(Rule::new("kyc", "#kycComplete"))
            .on_no_trigger(Rule::new("standard", "true")),
    )
    .name("High-Value Transaction Processing");

    // Run it against a set of facts
    let facts = Facts::new()
        .set("amount", 250_000_i64)
        .set("accountAge", 5_i64)
        .set("kycComplete", true);

    match RuleChainRunner::default().run(&chain, &facts) {
        Ok(result) => println!("Result: {result}"),
        Err(e) => println!("Invalid chain: {e}"),
    }
}
