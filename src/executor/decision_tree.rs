use super::{is_match, PatternExecutor, Run};
use crate::{ChainFailure, DecisionTree, Value};

impl PatternExecutor for DecisionTree {
    fn execute(&self, run: &mut Run<'_>) -> Result<Value, ChainFailure> {
        let mut node = &self.root_rule;
        loop {
            let value = run.apply(&node.rule)?;
            let next = if is_match(&value) {
                node.on_success.as_deref()
            } else {
                node.on_failure.as_deref()
            };
            match next {
                Some(branch) => node = &branch.rule,
                None => {
                    tracing::debug!(leaf = %node.rule.id, "decision tree walk finished");
                    return Ok(value.unwrap_or_default());
                }
            }
        }
    }
}
