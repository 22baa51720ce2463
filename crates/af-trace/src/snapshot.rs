//! Before/after state captured around a block invocation

use af_core::{is_private_key, EventContext};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// Public event data plus the entry payload at one point in time
///
/// Engine-private keys are stripped at every nesting level.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub event: Map<String, Value>,
    #[serde(default)]
    pub data: Value,
}

impl Snapshot {
    /// Capture the event's public data and `data`
    ///
    /// A payload that cannot be serialized yields an empty snapshot; tracing
    /// never fails the block it observes.
    pub fn capture<T: Serialize + ?Sized>(event: &EventContext, data: &T) -> Self {
        let data = match serde_json::to_value(data) {
            Ok(value) => strip_private(value),
            Err(err) => {
                warn!(error = %err, context_id = %event.id(), "Failed to snapshot trace data");
                return Self::default();
            }
        };

        Self {
            event: event.public_event_data(),
            data,
        }
    }

    /// Capture only the event's public data
    pub fn event_only(event: &EventContext) -> Self {
        Self {
            event: event.public_event_data(),
            data: Value::Null,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.event.is_empty() && self.data.is_null()
    }
}

fn strip_private(value: Value) -> Value {
    match value {
        Value::Object(fields) => Value::Object(
            fields
                .into_iter()
                .filter(|(key, _)| !is_private_key(key))
                .map(|(key, value)| (key, strip_private(value)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(strip_private).collect()),
        other => other,
    }
}
