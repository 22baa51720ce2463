//! Engine error taxonomy

use af_core::{ContextError, Phase};
use indexmap::IndexMap;
use serde_json::Value;
use thiserror::Error;

/// Error raised by a block implementation
///
/// Blocks report their own error types; the engine carries them unchanged so
/// callers can `downcast_ref` to the original kind.
pub type BlockError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Engine errors
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no {phase} block registered for type '{type_tag}'")]
    BlockNotFound { phase: Phase, type_tag: String },

    #[error("invalid context: {0}")]
    InvalidContext(#[from] ContextError),

    #[error("invalid automation definition: {0}")]
    InvalidDefinition(String),

    #[error("an automation with id '{0}' is already registered")]
    DuplicateAutomation(String),

    #[error(transparent)]
    Block(BlockError),

    /// A failure carrying extra data attached on its way out of the pipeline
    ///
    /// Displays as the wrapped error. The fields end up in the
    /// [`AutomationResult`](crate::AutomationResult) when the failure is
    /// reported as a value.
    #[error("{source}")]
    Annotated {
        source: Box<EngineError>,
        fields: IndexMap<String, Value>,
    },
}

impl EngineError {
    /// Wrap an implementation error
    pub fn block(err: impl Into<BlockError>) -> Self {
        EngineError::Block(err.into())
    }

    /// Borrow the implementation error as `E`, if that is what this is
    pub fn downcast_ref<E: std::error::Error + 'static>(&self) -> Option<&E> {
        match self.root() {
            EngineError::Block(source) => source.downcast_ref::<E>(),
            _ => None,
        }
    }

    /// Attach a field, wrapping the error if it carries none yet
    pub fn with_field(self, key: impl Into<String>, value: Value) -> Self {
        match self {
            EngineError::Annotated { source, mut fields } => {
                fields.insert(key.into(), value);
                EngineError::Annotated { source, fields }
            }
            other => {
                let mut fields = IndexMap::new();
                fields.insert(key.into(), value);
                EngineError::Annotated {
                    source: Box::new(other),
                    fields,
                }
            }
        }
    }

    /// Fields attached with [`Self::with_field`]
    pub fn fields(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            EngineError::Annotated { fields, .. } => Some(fields),
            _ => None,
        }
    }

    /// The error underneath any attached fields
    pub fn root(&self) -> &EngineError {
        match self {
            EngineError::Annotated { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("relay jammed")]
    struct RelayJammed;

    #[test]
    fn test_block_error_keeps_original_kind() {
        let err = EngineError::block(RelayJammed);
        assert!(err.downcast_ref::<RelayJammed>().is_some());
        assert_eq!(err.to_string(), "relay jammed");
    }

    #[test]
    fn test_string_errors_become_block_errors() {
        let err = EngineError::block("plain message");
        assert_eq!(err.to_string(), "plain message");
        assert!(err.downcast_ref::<RelayJammed>().is_none());
    }

    #[test]
    fn test_fields_keep_message_and_kind() {
        let err = EngineError::block(RelayJammed)
            .with_field("trace", serde_json::json!({"steps": 1}))
            .with_field("attempt", serde_json::json!(2));

        assert_eq!(err.to_string(), "relay jammed");
        assert!(err.downcast_ref::<RelayJammed>().is_some());
        assert!(matches!(err.root(), EngineError::Block(_)));

        let fields = err.fields().unwrap();
        assert_eq!(fields.keys().collect::<Vec<_>>(), vec!["trace", "attempt"]);
    }

    #[test]
    fn test_block_not_found_message() {
        let err = EngineError::BlockNotFound {
            phase: Phase::Trigger,
            type_tag: "mqtt".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "no trigger block registered for type 'mqtt'"
        );
    }
}
