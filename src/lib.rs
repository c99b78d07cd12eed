mod error;
mod evaluate;
mod executor;
pub mod parse;
mod recovery;
mod runner;
mod selection;
mod types;
mod unit;
mod validate;

pub use error::ChainError;
pub use evaluate::{eval_expr, EvaluationError, ExprEvaluator, ExpressionEvaluator};
pub use parse::ParseError;
pub use recovery::recover;
pub use runner::RuleChainRunner;
pub use selection::RuleSelection;
pub use types::{
    AccumulativeChaining, ArithOp, ChainConfiguration, ChainFailure, CompareOp, ComplexWorkflow,
    ConditionalChaining, ConditionalExecution, ConditionalRules, ConfigurationError,
    DecisionBranch, DecisionNode, DecisionTree, ExecutionContext, ExecutionOptions, Expr, Facts,
    FailureAction, FailureKind, Pattern, PriorityTier, ResultBasedRouting, Rule, RuleChain,
    RuleChainResult, RuleError, RuleList, RuleOutcome, RuleRecord, SequentialDependency,
    SequentialStage, Severity, StageStatus, Value, WorkflowStage,
};
pub use unit::evaluate;
