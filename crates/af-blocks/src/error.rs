//! Failures raised by built-in blocks

use thiserror::Error;

/// Built-in block errors
#[derive(Debug, Error)]
pub enum BlockFailure {
    #[error("invalid data for '{block}': {message}")]
    InvalidData { block: String, message: String },

    #[error("invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// Raised on purpose by the `fail` action
    #[error("{0}")]
    Failed(String),
}

impl BlockFailure {
    pub(crate) fn invalid_data(block: &str, err: impl std::fmt::Display) -> Self {
        BlockFailure::InvalidData {
            block: block.to_string(),
            message: err.to_string(),
        }
    }
}
