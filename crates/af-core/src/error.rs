//! Construction-time validation errors

use thiserror::Error;

use crate::Phase;

/// Raised when an event context or phase context is built from invalid input
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("event type must not be empty")]
    EmptyEventType,

    #[error("{phase} entry requires a type tag")]
    MissingTypeTag { phase: Phase },

    #[error("{phase} entry '{type_tag}' requires an alias")]
    MissingAlias { phase: Phase, type_tag: String },

    #[error("metadata key must not be empty")]
    EmptyKey,
}
