use super::{PatternExecutor, Run};
use crate::selection::THRESHOLD_SOURCE;
use crate::{AccumulativeChaining, ChainFailure, Rule, Value};

/// Stage result holding the final decision rule's value.
pub(crate) const FINAL_DECISION: &str = "finalDecision";
/// Stage result holding how many rules the selection strategy kept.
pub(crate) const RULES_SELECTED: &str = "rulesSelected";
/// Stage result holding how many accumulation rules are configured.
pub(crate) const RULES_AVAILABLE: &str = "rulesAvailable";

impl PatternExecutor for AccumulativeChaining {
    fn execute(&self, run: &mut Run<'_>) -> Result<Value, ChainFailure> {
        let selected = self
            .rule_selection
            .select_with(&self.accumulation_rules, |expression| {
                run.evaluate_expression(THRESHOLD_SOURCE, expression)
            })
            .map_err(ChainFailure::Aborted)?;
        tracing::debug!(
            selected = selected.len(),
            available = self.accumulation_rules.len(),
            "accumulation rules selected"
        );

        let stop = run.options().stop_on_first_failure;
        let values = run.apply_all(selected.iter().copied(), stop)?;
        let total = selected
            .iter()
            .zip(&values)
            .fold(self.initial_value, |acc, (rule, value)| {
                acc + contribution(rule, value.as_ref())
            });

        run.ctx
            .set_output(&self.accumulator_variable, Value::Float(total));
        run.ctx.set_output(RULES_SELECTED, count(selected.len()));
        run.ctx
            .set_output(RULES_AVAILABLE, count(self.accumulation_rules.len()));
        for (name, threshold) in &self.thresholds {
            run.ctx.set(name, Value::Float(*threshold));
        }
        tracing::debug!(accumulator = %self.accumulator_variable, total, "accumulation finished");

        let Some(decision_rule) = &self.final_decision_rule else {
            return Ok(Value::Float(total));
        };
        let decision = run.apply(decision_rule)?.unwrap_or_default();
        run.ctx.set_output(FINAL_DECISION, decision.clone());
        Ok(decision)
    }
}

/// A rule's score: the numeric reading of its value. Recovered failures and
/// `null` contribute nothing.
fn contribution(rule: &Rule, value: Option<&Value>) -> f64 {
    match value {
        None | Some(Value::Null) => 0.0,
        Some(value) => value.as_f64().unwrap_or_else(|| {
            tracing::warn!(rule = %rule.id, %value, "non-numeric contribution counted as 0");
            0.0
        }),
    }
}

fn count(n: usize) -> Value {
    Value::Int(i64::try_from(n).unwrap_or(i64::MAX))
}

#[cfg(test)]
mod tests {
    use crate::{
        AccumulativeChaining, Facts, PriorityTier, Rule, RuleChain, RuleChainRunner,
        RuleSelection, Severity, Value,
    };

    fn credit() -> AccumulativeChaining {
        AccumulativeChaining::new("creditScore")
            .rule(Rule::new("age", "#age >= 18 ? 30 : 0").weight(0.0))
            .rule(Rule::new("income", "#income >= 25000 ? 25 : 10").weight(1.0))
            .rule(Rule::new("history", "#defaults == 0 ? 20 : 0").weight(0.8))
            .selection(RuleSelection::WeightThreshold { threshold: 0.5 })
            .threshold("approvalThreshold", 40.0)
            .final_decision(Rule::new(
                "decision",
                "#creditScore >= #approvalThreshold ? 'APPROVED' : 'REJECTED'",
            ))
    }

    fn facts() -> Facts {
        Facts::new()
            .set("age", 16_i64)
            .set("income", 30_000_i64)
            .set("defaults", 0_i64)
    }

    #[test]
    fn selected_contributions_are_summed() {
        let chain = RuleChain::new("credit", credit());
        let result = RuleChainRunner::default().run(&chain, &facts()).unwrap();
        assert!(result.is_successful());
        assert_eq!(result.stage_result("creditScore"), Some(&Value::Float(45.0)));
        assert_eq!(result.execution_path(), vec!["income", "history", "decision"]);
        assert_eq!(result.final_outcome(), &Value::from("APPROVED"));
        assert_eq!(result.stage_result("finalDecision"), Some(&Value::from("APPROVED")));
        assert_eq!(result.stage_result("rulesSelected"), Some(&Value::Int(2)));
        assert_eq!(result.stage_result("rulesAvailable"), Some(&Value::Int(3)));
    }

    #[test]
    fn initial_value_seeds_accumulator() {
        let chain = RuleChain::new("credit", credit().initial_value(-10.0));
        let result = RuleChainRunner::default().run(&chain, &facts()).unwrap();
        assert_eq!(result.stage_result("creditScore"), Some(&Value::Float(35.0)));
        assert_eq!(result.final_outcome(), &Value::from("REJECTED"));
    }

    #[test]
    fn without_decision_rule_accumulator_is_outcome() {
        let config = AccumulativeChaining::new("score")
            .rule(Rule::new("a", "true"))
            .rule(Rule::new("b", "'2.5'"))
            .rule(Rule::new("c", "false"));
        let result = RuleChainRunner::default()
            .run(&RuleChain::new("s", config), &Facts::new())
            .unwrap();
        assert_eq!(result.final_outcome(), &Value::Float(3.5));
        assert_eq!(result.stage_result("finalDecision"), None);
    }

    #[test]
    fn non_numeric_and_recovered_contribute_nothing() {
        let config = AccumulativeChaining::new("score")
            .rule(Rule::new("word", "'high'"))
            .rule(Rule::new("broken", "1 / 0").severity(Severity::Warning))
            .rule(Rule::new("ten", "10"));
        let result = RuleChainRunner::default()
            .run(&RuleChain::new("s", config), &Facts::new())
            .unwrap();
        assert!(result.is_successful());
        assert_eq!(result.final_outcome(), &Value::Float(10.0));
        assert_eq!(result.execution_path(), vec!["word", "broken", "ten"]);
    }

    #[test]
    fn priority_selection_skips_low_tier() {
        let config = AccumulativeChaining::new("score")
            .rule(Rule::new("low", "5").tier(PriorityTier::Low))
            .rule(Rule::new("high", "7").tier(PriorityTier::High))
            .selection(RuleSelection::PriorityBased {
                min_priority: PriorityTier::Medium,
            });
        let result = RuleChainRunner::default()
            .run(&RuleChain::new("s", config), &Facts::new())
            .unwrap();
        assert_eq!(result.execution_path(), vec!["high"]);
        assert_eq!(result.final_outcome(), &Value::Float(7.0));
    }

    #[test]
    fn rules_do_not_see_accumulator() {
        let config = AccumulativeChaining::new("score")
            .rule(Rule::new("first", "5"))
            .rule(Rule::new("second", "#score == null ? 1 : 100"));
        let result = RuleChainRunner::default()
            .run(&RuleChain::new("s", config), &Facts::new())
            .unwrap();
        assert_eq!(result.final_outcome(), &Value::Float(6.0));
    }

    #[test]
    fn disabled_decision_rule_yields_null() {
        let config = AccumulativeChaining::new("score")
            .rule(Rule::new("a", "5"))
            .final_decision(Rule::new("decision", "'YES'").enabled(false));
        let result = RuleChainRunner::default()
            .run(&RuleChain::new("s", config), &Facts::new())
            .unwrap();
        assert_eq!(result.final_outcome(), &Value::Null);
        assert_eq!(result.execution_path(), vec!["a"]);
    }
}
