use std::sync::Arc;
use std::thread;

use rulechain::{Facts, ResultBasedRouting, Rule, RuleChain, RuleChainRunner};

fn main() {
    let runner = Arc::new(RuleChainRunner::default());
    let chain = Arc::new(RuleChain::new(
        "risk-routing",
        ResultBasedRouting::new(Rule::new(
            "router",
            "#riskScore > 70 ? 'HIGH' : #riskScore > 30 ? 'MEDIUM' : 'LOW'",
        ))
        .route("HIGH", vec![Rule::new("manual-review", "true")])
        .route("MEDIUM", vec![Rule::new("extra-checks", "#verified")])
        .route("LOW", vec![Rule::new("auto-approve", "true")]),
    ));

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let (runner, chain) = (Arc::clone(&runner), Arc::clone(&chain));
            thread::spawn(move || {
                let facts = Facts::new()
                    .set("riskScore", 10_i64 + 25 * i64::from(i))
                    .set("verified", i % 2 == 0);

                match runner.run(&chain, &facts) {
                    Ok(result) => println!(
                        "Thread {i}: route {} via {:?}",
                        result.final_outcome(),
                        result.execution_path()
                    ),
                    Err(e) => println!("Thread {i}: {e}"),
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }
}
