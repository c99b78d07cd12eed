mod chain;
mod context;
mod error;
mod expr;
mod outcome;
mod result;
mod rule;
mod value;

pub use chain::{
    AccumulativeChaining, ChainConfiguration, ComplexWorkflow, ConditionalChaining,
    ConditionalExecution, ConditionalRules, DecisionBranch, DecisionNode, DecisionTree,
    ExecutionOptions, FailureAction, Pattern, ResultBasedRouting, RuleChain, RuleList,
    SequentialDependency, SequentialStage, WorkflowStage,
};
pub use context::{ExecutionContext, Facts};
pub use error::ConfigurationError;
pub use expr::{ArithOp, CompareOp, Expr};
pub use outcome::{FailureKind, RuleError, RuleOutcome, RuleRecord};
pub use result::{ChainFailure, RuleChainResult, StageStatus};
pub use rule::{PriorityTier, Rule, Severity};
pub use value::Value;
