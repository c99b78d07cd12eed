use super::{PatternExecutor, Run};
use crate::{ChainFailure, ResultBasedRouting, Value};

/// Stage result holding the router's raw value.
pub(crate) const ROUTE_KEY: &str = "routeKey";

impl PatternExecutor for ResultBasedRouting {
    fn execute(&self, run: &mut Run<'_>) -> Result<Value, ChainFailure> {
        let routed = run.apply(&self.router_rule)?;
        run.ctx
            .set_output(ROUTE_KEY, routed.clone().unwrap_or_default());
        let key = routed.as_ref().and_then(Value::route_key);

        let configured = key
            .as_deref()
            .and_then(|k| self.routes.get_key_value(k));
        let (route_key, route) = match configured {
            Some(found) => found,
            None => {
                let missing = key.unwrap_or_else(|| "null".to_owned());
                let fallback = self
                    .default_route
                    .as_deref()
                    .and_then(|d| self.routes.get_key_value(d));
                match fallback {
                    Some(found) => {
                        tracing::warn!(key = %missing, default = %found.0, "no route for key, using default");
                        found
                    }
                    None => {
                        tracing::warn!(key = %missing, "no route for key and no default");
                        return Err(ChainFailure::Routing { key: missing });
                    }
                }
            }
        };

        tracing::debug!(route = %route_key, rules = route.rules.len(), "route selected");
        let stop = run.options().stop_on_first_failure;
        run.apply_all(&route.rules, stop)?;
        Ok(Value::String(route_key.clone()))
    }
}
