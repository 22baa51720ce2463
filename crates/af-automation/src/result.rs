//! Outcome of running one automation against one event

use std::sync::Arc;

use af_core::EventContext;
use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::automation::Automation;
use crate::error::EngineError;

/// What happened when an automation processed an event
///
/// `additional_fields` is open for interceptors: tracing stores the
/// execution trace under `trace`, other interceptors may add their own keys.
#[derive(Debug, Clone, Serialize)]
pub struct AutomationResult {
    /// The automation that ran
    #[serde(serialize_with = "serialize_automation")]
    pub automation: Arc<Automation>,

    /// The event it ran against
    #[serde(rename = "context_id", serialize_with = "serialize_event")]
    pub event: EventContext,

    /// True only when a trigger activated and every condition held
    pub executed: bool,

    /// Value computed by the result entry, if the automation has one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    /// Error message for runs that failed and were reported instead of raised
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Extra data attached by interceptors, in insertion order
    #[serde(flatten)]
    pub additional_fields: IndexMap<String, Value>,
}

impl AutomationResult {
    /// Create a result
    pub fn new(automation: Arc<Automation>, event: EventContext, executed: bool) -> Self {
        Self {
            automation,
            event,
            executed,
            result: None,
            error: None,
            additional_fields: IndexMap::new(),
        }
    }

    /// A non-executed result carrying an error message
    pub fn failed(automation: Arc<Automation>, event: EventContext, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(automation, event, false)
        }
    }

    /// A failed result built from `err`, keeping the fields attached to it
    pub fn from_error(automation: Arc<Automation>, event: EventContext, err: &EngineError) -> Self {
        let mut result = Self::failed(automation, event, err.to_string());
        if let Some(fields) = err.fields() {
            result.additional_fields.extend(fields.clone());
        }
        result
    }

    /// Set the computed result value
    pub fn with_result(mut self, result: Option<Value>) -> Self {
        self.result = result;
        self
    }

    /// Attach an additional field, replacing any previous value
    pub fn insert_field(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.additional_fields.insert(key.into(), value)
    }

    /// Get an additional field
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.additional_fields.get(key)
    }

    /// Whether this run failed and was reported as a value
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

fn serialize_automation<S: Serializer>(
    automation: &Arc<Automation>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    automation.reference().serialize(serializer)
}

fn serialize_event<S: Serializer>(event: &EventContext, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(event.id())
}
