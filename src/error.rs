use thiserror::Error;

use crate::ConfigurationError;

/// Unified error type covering JSON decoding, chain validation, and I/O.
///
/// Returned by convenience loaders like [`RuleChain::from_json()`](crate::RuleChain::from_json)
/// and [`RuleChain::from_file()`](crate::RuleChain::from_file).
#[derive(Debug, Error)]
pub enum ChainError {
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
