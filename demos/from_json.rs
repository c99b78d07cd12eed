use std::env;
use std::process::ExitCode;

use rulechain::{Facts, RuleChain, RuleChainRunner};
use tracing_subscriber::EnvFilter;

const DEFAULT_CHAIN: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/demos/chains/onboarding.json");

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let path = env::args().nth(1).unwrap_or_else(|| DEFAULT_CHAIN.to_owned());
    let chain = match RuleChain::from_file(&path) {
        Ok(chain) => chain,
        Err(e) => {
            eprintln!("failed to load {path}: {e}");
            return ExitCode::FAILURE;
        }
    };

    let facts = Facts::new()
        .set("emailVerified", true)
        .set("phoneVerified", true)
        .set("country", "US")
        .set("ssnVerified", true)
        .set("riskScore", 35_i64);

    match RuleChainRunner::default().run(&chain, &facts) {
        Ok(result) => {
            println!("{result}");
            for (stage, status) in result.stage_statuses() {
                println!("  {stage:<12} {status:?}");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("invalid chain: {e}");
            ExitCode::FAILURE
        }
    }
}
