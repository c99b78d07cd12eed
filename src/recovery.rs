use tracing::Level;

use crate::{RuleOutcome, Severity};

/// Decide the effective outcome of an evaluation and the level it is logged at.
///
/// Pure function of the outcome: the severity it acts on is the one carried by
/// an `Errored` outcome (the rule's declared severity, or `Critical` for a
/// timeout).
///
/// * `Errored` at `Critical` stays `Errored` and logs at `ERROR`. The
///   enclosing executor ends the run.
/// * `Errored` at any other severity becomes `NotMatched` and logs at `INFO`.
/// * `Matched` and `NotMatched` pass through and log at `DEBUG`.
#[must_use]
pub fn recover(outcome: RuleOutcome) -> (RuleOutcome, Level) {
    match outcome {
        RuleOutcome::Errored(e) if e.severity == Severity::Critical => {
            (RuleOutcome::Errored(e), Level::ERROR)
        }
        RuleOutcome::Errored(_) => (RuleOutcome::NotMatched, Level::INFO),
        other => (other, Level::DEBUG),
    }
}
