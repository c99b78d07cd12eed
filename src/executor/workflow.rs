use std::thread;

use super::{is_match, PatternExecutor, Run};
use crate::validate::workflow_waves;
use crate::{
    ChainFailure, ComplexWorkflow, FailureAction, FailureKind, Rule, RuleRecord, StageStatus,
    Value, WorkflowStage,
};

/// What one stage did, before it is merged into the run.
struct StageReport {
    status: StageStatus,
    output: Option<Value>,
    abort: Option<ChainFailure>,
}

impl StageReport {
    fn failed() -> Self {
        Self {
            status: StageStatus::Failed,
            output: None,
            abort: None,
        }
    }
}

impl PatternExecutor for ComplexWorkflow {
    /// Stages run wave by wave. Every stage of a wave reads the context as it
    /// stood when the wave began, and stage results are merged in wave order,
    /// so sequential and parallel runs produce the same result.
    fn execute(&self, run: &mut Run<'_>) -> Result<Value, ChainFailure> {
        let parallel = run.options().parallel_execution;
        let mut any_failed = false;

        for wave in workflow_waves(self) {
            let plan: Vec<(&WorkflowStage, bool)> = wave
                .iter()
                .map(|&idx| {
                    let stage = &self.stages[idx];
                    let ready = stage
                        .depends_on
                        .iter()
                        .all(|dep| run.status(dep) == Some(StageStatus::Completed));
                    (stage, ready)
                })
                .collect();
            let runnable = plan.iter().filter(|(_, ready)| *ready).count();
            let base = run.fork();

            if parallel && runnable > 1 {
                let shared: &Run<'_> = &base;
                let reports: Vec<Option<(Vec<RuleRecord>, StageReport)>> = thread::scope(|scope| {
                    let handles: Vec<_> = plan
                        .iter()
                        .map(|&(stage, ready)| {
                            ready.then(|| scope.spawn(move || run_forked(shared, stage)))
                        })
                        .collect();
                    handles
                        .into_iter()
                        .zip(&plan)
                        .map(|(handle, (stage, _))| {
                            handle.map(|h| {
                                h.join().unwrap_or_else(|_| {
                                    tracing::error!(stage = %stage.stage, "stage worker panicked");
                                    (Vec::new(), StageReport::failed())
                                })
                            })
                        })
                        .collect()
                });
                for ((stage, _), report) in plan.iter().zip(reports) {
                    match report {
                        Some((records, report)) => {
                            run.merge_audit(records, Vec::new());
                            any_failed |= settle(run, stage, report)?;
                        }
                        None => skip(run, stage),
                    }
                }
            } else {
                for (stage, ready) in plan {
                    if ready {
                        let (records, report) = run_forked(&base, stage);
                        run.merge_audit(records, Vec::new());
                        any_failed |= settle(run, stage, report)?;
                    } else {
                        skip(run, stage);
                    }
                }
            }
        }
        Ok(Value::Bool(!any_failed))
    }
}

fn run_forked(run: &Run<'_>, stage: &WorkflowStage) -> (Vec<RuleRecord>, StageReport) {
    let mut fork = run.fork();
    let report = run_stage(stage, &mut fork);
    let (_, records, _) = fork.into_parts();
    (records, report)
}

fn run_stage(stage: &WorkflowStage, run: &mut Run<'_>) -> StageReport {
    let stop =
        stage.failure_action == FailureAction::Terminate || run.options().stop_on_first_failure;
    let rules: &[Rule] = match &stage.conditional_execution {
        None => &stage.rules,
        Some(branch) => match run.evaluate_expression(&stage.stage, &branch.condition) {
            Ok(value) => {
                let chosen = if value.is_truthy() {
                    &branch.on_true
                } else {
                    &branch.on_false
                };
                chosen.as_ref().map_or(&[][..], |list| list.rules.as_slice())
            }
            Err(e) if e.kind == FailureKind::Timeout => {
                tracing::error!(stage = %stage.stage, error = %e.message, "stage condition timed out");
                return StageReport {
                    abort: Some(ChainFailure::Aborted(e)),
                    ..StageReport::failed()
                };
            }
            Err(e) => {
                tracing::warn!(stage = %stage.stage, error = %e.message, "stage condition failed");
                return StageReport::failed();
            }
        },
    };

    match run.apply_all(rules, stop) {
        Err(abort) => StageReport {
            status: StageStatus::Failed,
            output: None,
            abort: Some(abort),
        },
        Ok(values) => {
            let failed = values.iter().any(|v| !is_match(v));
            let status = if failed {
                StageStatus::Failed
            } else {
                StageStatus::Completed
            };
            let output = values.into_iter().filter(|v| is_match(v)).last().flatten();
            StageReport {
                status,
                output,
                abort: None,
            }
        }
    }
}

/// Record a stage's status and output. Returns whether the stage failed, or
/// the run's failure when the stage aborts the workflow.
fn settle(run: &mut Run<'_>, stage: &WorkflowStage, report: StageReport) -> Result<bool, ChainFailure> {
    run.set_status(&stage.stage, report.status);
    if let Some(abort) = report.abort {
        return Err(abort);
    }
    if report.status == StageStatus::Completed {
        tracing::debug!(stage = %stage.stage, "stage completed");
        if let (Some(name), Some(value)) = (&stage.output_variable, report.output) {
            run.ctx.set_output(name, value);
        }
        return Ok(false);
    }
    match stage.failure_action {
        FailureAction::Terminate => {
            tracing::warn!(stage = %stage.stage, "stage failed, terminating workflow");
            Err(ChainFailure::StageTerminated {
                stage: stage.stage.clone(),
            })
        }
        FailureAction::Continue => {
            tracing::info!(stage = %stage.stage, "stage failed, continuing");
            Ok(true)
        }
    }
}

fn skip(run: &mut Run<'_>, stage: &WorkflowStage) {
    tracing::debug!(stage = %stage.stage, "dependency not completed, stage skipped");
    run.set_status(&stage.stage, StageStatus::Skipped);
}
