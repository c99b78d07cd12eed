use rulechain::{DecisionNode, DecisionTree, Facts, Rule, RuleChain, RuleChainRunner};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let tree = DecisionTree::new(
        DecisionNode::new(Rule::new("adult", "#age >= 18"))
            .on_success(
                DecisionNode::new(Rule::new("income", "#income >= 40000"))
                    .on_success(DecisionNode::new(Rule::new("premium", "'PREMIUM'")))
                    .on_failure(DecisionNode::new(Rule::new("standard", "'STANDARD'"))),
            )
            .on_failure(DecisionNode::new(Rule::new("minor", "'DECLINED'"))),
    );
    let chain = RuleChain::new("product-offer", tree);
    let runner = RuleChainRunner::default();

    for (age, income) in [(30_i64, 85_000_i64), (30, 20_000), (15, 0)] {
        let facts = Facts::new().set("age", age).set("income", income);
        match runner.run(&chain, &facts) {
            Ok(result) => println!(
                "age {age}, income {income}: {} via {:?}",
                result.final_outcome(),
                result.execution_path()
            ),
            Err(e) => println!("Invalid chain: {e}"),
        }
    }
}
