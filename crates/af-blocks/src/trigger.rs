//! Built-in triggers

use af_automation::{EngineResult, Pipeline, TriggerBlock};
use af_core::{EventContext, TriggerContext};
use serde_json::Value;

use crate::data::{parse, OneOrMany};

/// `always`: activated unless `data` is `false`
pub struct AlwaysTrigger;

impl TriggerBlock for AlwaysTrigger {
    fn is_activated(
        &self,
        _: &EventContext,
        trigger: &TriggerContext,
        _: &Pipeline,
    ) -> EngineResult<bool> {
        match trigger.data() {
            Value::Null => Ok(true),
            data => parse::<bool>(trigger.type_tag(), data),
        }
    }
}

/// `event_type`: activated when the event type is one of `data`
pub struct EventTypeTrigger;

impl TriggerBlock for EventTypeTrigger {
    fn is_activated(
        &self,
        event: &EventContext,
        trigger: &TriggerContext,
        _: &Pipeline,
    ) -> EngineResult<bool> {
        let accepted: OneOrMany<String> = parse(trigger.type_tag(), trigger.data())?;
        let event_type = event.event_type().as_str();
        Ok(accepted.into_vec().iter().any(|t| t == event_type))
    }
}
