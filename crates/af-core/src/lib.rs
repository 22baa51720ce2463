//! Core types for the autoflow automation engine
//!
//! This crate provides the value types that flow through a single dispatch:
//! the [`Event`] being processed, the [`EventContext`] that wraps it together
//! with mutable metadata, and the per-block [`PhaseContext`] entries that
//! describe one configured variable, trigger, condition, action or result.

mod context;
mod error;
mod event;
mod event_context;
mod phase;

pub use context::Context;
pub use error::ContextError;
pub use event::{Event, EventData, EventOrigin, EventType};
pub use event_context::EventContext;
pub use phase::{
    ActionContext, ActionPhase, ConditionContext, ConditionPhase, Outcome, Phase, PhaseContext,
    PhaseKind, ResultContext, ResultPhase, TriggerContext, TriggerPhase, VariableContext,
    VariablePhase,
};

/// Metadata keys starting with this marker are engine bookkeeping and are
/// never exposed in trace snapshots or templates.
pub const PRIVATE_KEY_PREFIX: &str = "__";

/// Returns true if `key` is an engine-private metadata key
pub fn is_private_key(key: &str) -> bool {
    key.starts_with(PRIVATE_KEY_PREFIX)
}

/// Engine-private metadata keys
pub mod keys {
    /// Id of the automation currently executing against the event
    pub const AUTOMATION_ID: &str = "__automation_id";

    /// Id of the trace attached to the event, if tracing is active
    pub const TRACE_ID: &str = "__trace_id";
}

/// Lifecycle notifications published by the orchestrator
pub mod events {
    use serde::{Deserialize, Serialize};

    use super::*;

    /// An automation was added to the registered set
    pub const AUTOMATION_REGISTERED: &str = "automation_registered";

    /// An automation was removed from the registered set
    pub const AUTOMATION_REMOVED: &str = "automation_removed";

    /// The registered set was cleared
    pub const AUTOMATIONS_REMOVED: &str = "automations_removed";

    /// An event context entered dispatch
    pub const EVENT_RECEIVED: &str = "event_received";

    /// An automation finished processing an event
    pub const AUTOMATION_PROCESSED: &str = "automation_processed";

    /// Data for AUTOMATION_REGISTERED and AUTOMATION_REMOVED events
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct AutomationRef {
        pub automation_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub alias: Option<String>,
    }

    /// Data for AUTOMATION_REGISTERED events
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct AutomationRegisteredData(pub AutomationRef);

    impl EventData for AutomationRegisteredData {
        fn event_type() -> &'static str {
            AUTOMATION_REGISTERED
        }
    }

    /// Data for AUTOMATION_REMOVED events
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct AutomationRemovedData(pub AutomationRef);

    impl EventData for AutomationRemovedData {
        fn event_type() -> &'static str {
            AUTOMATION_REMOVED
        }
    }

    /// Data for AUTOMATIONS_REMOVED events
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct AutomationsRemovedData {
        pub count: usize,
    }

    impl EventData for AutomationsRemovedData {
        fn event_type() -> &'static str {
            AUTOMATIONS_REMOVED
        }
    }

    /// Data for EVENT_RECEIVED events
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct EventReceivedData {
        pub event_type: EventType,
        pub context_id: String,
        pub data: serde_json::Map<String, serde_json::Value>,
    }

    impl EventData for EventReceivedData {
        fn event_type() -> &'static str {
            EVENT_RECEIVED
        }
    }

    /// Data for AUTOMATION_PROCESSED events
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct AutomationProcessedData {
        pub automation_id: String,
        pub context_id: String,
        pub executed: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub result: Option<serde_json::Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub error: Option<String>,
    }

    impl EventData for AutomationProcessedData {
        fn event_type() -> &'static str {
            AUTOMATION_PROCESSED
        }
    }
}
