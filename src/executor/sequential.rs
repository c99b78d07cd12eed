use super::{PatternExecutor, Run};
use crate::{ChainFailure, SequentialDependency, Value};

impl PatternExecutor for SequentialDependency {
    fn execute(&self, run: &mut Run<'_>) -> Result<Value, ChainFailure> {
        let mut last = Value::Null;
        for stage in &self.stages {
            match run.apply(&stage.rule)? {
                Some(value) => {
                    tracing::debug!(
                        stage = stage.label(),
                        output = %stage.output_variable,
                        %value,
                        "stage output written"
                    );
                    run.ctx.set_output(&stage.output_variable, value.clone());
                    last = value;
                }
                None => {
                    tracing::debug!(stage = stage.label(), "stage produced no output");
                }
            }
        }
        Ok(last)
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        Facts, Rule, RuleChain, RuleChainRunner, SequentialDependency, Severity, Value,
    };

    fn discount_chain(middle: Rule) -> RuleChain {
        RuleChain::new(
            "discount",
            SequentialDependency::new()
                .stage("baseDiscount", Rule::new("base", "#tier == 'GOLD' ? 10 : 5"))
                .stage("bonus", middle)
                .stage(
                    "finalDiscount",
                    Rule::new("final", "#bonus == null ? #baseDiscount : #baseDiscount + #bonus"),
                ),
        )
    }

    #[test]
    fn outputs_flow_to_later_stages() {
        let chain = discount_chain(Rule::new("bonus", "#years > 5 ? 3 : 0"));
        let facts = Facts::new().set("tier", "GOLD").set("years", 7_i64);
        let result = RuleChainRunner::default().run(&chain, &facts).unwrap();
        assert!(result.is_successful());
        assert_eq!(result.stage_result("baseDiscount"), Some(&Value::Int(10)));
        assert_eq!(result.stage_result("bonus"), Some(&Value::Int(3)));
        assert_eq!(result.final_outcome(), &Value::Int(13));
        assert_eq!(result.execution_path(), vec!["base", "bonus", "final"]);
    }

    #[test]
    fn falsy_output_is_still_written() {
        let chain = discount_chain(Rule::new("bonus", "#years > 5 ? 3 : 0"));
        let facts = Facts::new().set("tier", "SILVER").set("years", 1_i64);
        let result = RuleChainRunner::default().run(&chain, &facts).unwrap();
        assert_eq!(result.stage_result("bonus"), Some(&Value::Int(0)));
        assert_eq!(result.final_outcome(), &Value::Int(5));
        assert_eq!(result.triggered_rules_count(), 2);
    }

    #[test]
    fn recovered_stage_leaves_output_unset() {
        let chain = discount_chain(Rule::new("bonus", "#years / 0").severity(Severity::Warning));
        let facts = Facts::new().set("tier", "GOLD").set("years", 7_i64);
        let result = RuleChainRunner::default().run(&chain, &facts).unwrap();
        assert!(result.is_successful());
        assert_eq!(result.stage_result("bonus"), None);
        assert_eq!(result.final_outcome(), &Value::Int(10));
        assert_eq!(result.execution_path(), vec!["base", "bonus", "final"]);
    }

    #[test]
    fn critical_stage_aborts_remaining() {
        let chain = discount_chain(Rule::new("bonus", "#years / 0").severity(Severity::Critical));
        let facts = Facts::new().set("tier", "GOLD").set("years", 7_i64);
        let result = RuleChainRunner::default().run(&chain, &facts).unwrap();
        assert!(!result.is_successful());
        assert_eq!(result.execution_path(), vec!["base", "bonus"]);
        assert_eq!(result.stage_result("baseDiscount"), Some(&Value::Int(10)));
        assert!(result.error_message().unwrap().contains("'bonus'"));
    }
}
