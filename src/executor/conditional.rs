use super::{is_match, PatternExecutor, Run};
use crate::{ChainFailure, ConditionalChaining, Value};

impl PatternExecutor for ConditionalChaining {
    fn execute(&self, run: &mut Run<'_>) -> Result<Value, ChainFailure> {
        let triggered = is_match(&run.apply(&self.trigger_rule)?);
        let branch = if triggered {
            &self.conditional_rules.on_trigger
        } else {
            &self.conditional_rules.on_no_trigger
        };
        tracing::debug!(
            trigger = %self.trigger_rule.id,
            triggered,
            rules = branch.len(),
            "conditional branch selected"
        );

        let stop = run.options().stop_on_first_failure;
        let values = run.apply_all(branch, stop)?;
        let all_matched = values.iter().all(is_match);
        Ok(Value::Bool(!run.options().require_all || all_matched))
    }
}
