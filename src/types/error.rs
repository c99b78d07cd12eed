use thiserror::Error;

use super::chain::Pattern;

/// Fatal configuration problems. Always detected before any rule executes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("chain declares pattern '{declared}' but its configuration is for '{actual}'")]
    PatternMismatch { declared: Pattern, actual: Pattern },

    #[error("invalid '{pattern}' configuration: {reason}")]
    InvalidConfiguration { pattern: Pattern, reason: String },

    #[error("duplicate rule id '{id}'")]
    DuplicateRule { id: String },

    #[error("duplicate stage '{stage}'")]
    DuplicateStage { stage: String },

    #[error("output variable '{name}' is written by more than one stage")]
    DuplicateOutput { name: String },

    #[error("stage '{stage}' references '{reference}' before any earlier stage writes it")]
    UnresolvedDependency { stage: String, reference: String },

    #[error("stage '{stage}' depends on undefined stage '{dependency}'")]
    UndefinedStage { stage: String, dependency: String },

    #[error("cyclic dependency detected: {}", path.join(" -> "))]
    CyclicDependency { path: Vec<String> },

    #[error("default route '{route}' is not a configured route")]
    UnknownDefaultRoute { route: String },

    #[error("'{pattern}' configuration requires a non-empty '{field}'")]
    EmptyConfiguration { pattern: Pattern, field: String },

    #[error("accumulator variable name must not be empty")]
    EmptyAccumulator,

    #[error("rule timeout must be greater than zero")]
    InvalidTimeout,
}
