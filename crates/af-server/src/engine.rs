//! Engine bootstrap
//!
//! Wires the block registry, the interceptor pipeline and the orchestrator
//! together from an [`EngineConfig`].

use std::sync::Arc;

use af_automation::{
    AutomationDefinition, AutomationOrchestrator, AutomationResult, BlockRegistry, Pipeline,
    PipelineBuilder, OPTION_TRACE,
};
use af_config::EngineConfig;
use af_core::{Event, EventContext};
use af_event_bus::{EventBus, SharedEventBus};
use af_template::TemplateEngine;
use anyhow::{Context as _, Result};
use serde_json::Value;
use tracing::{debug, info};

/// A configured engine instance
pub struct Engine {
    /// Lifecycle notifications and republished events
    pub bus: SharedEventBus,
    /// Registered automations and dispatch
    pub orchestrator: AutomationOrchestrator,
}

impl Engine {
    /// Build an engine and register the configured automations
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let registry = Arc::new(BlockRegistry::new());
        af_blocks::register_builtin(&registry);

        let pipeline = build_pipeline(registry, config);
        let bus: SharedEventBus = Arc::new(EventBus::new());
        let orchestrator = AutomationOrchestrator::new(Arc::new(pipeline), bus.clone())
            .with_mode(config.dispatch.mode);

        for definition in &config.automations {
            let label = definition
                .alias
                .clone()
                .or_else(|| definition.id.clone())
                .unwrap_or_default();
            orchestrator
                .register_definition(definition.clone())
                .with_context(|| format!("invalid automation '{}'", label))?;
        }

        info!(
            automations = orchestrator.count(),
            mode = ?orchestrator.mode(),
            templating = config.templating.enabled,
            trace_all = config.tracing.enabled,
            "Engine ready"
        );

        Ok(Self { bus, orchestrator })
    }

    /// Dispatch one event to every registered automation
    pub fn dispatch(&self, event: Event) -> Result<Vec<AutomationResult>> {
        let event = EventContext::new(event)?;
        Ok(self.orchestrator.dispatch(&event)?)
    }

    /// Run a definition once without registering it
    pub fn playground(
        &self,
        mut definition: AutomationDefinition,
        event: Event,
        trace: bool,
    ) -> Result<AutomationResult> {
        if trace {
            definition.options.insert(OPTION_TRACE.to_string(), Value::Bool(true));
        }

        let event = EventContext::new(event)?;
        Ok(self.orchestrator.execute_definition_once(definition, &event)?)
    }
}

/// Install the configured interceptors on a fresh pipeline
pub fn build_pipeline(registry: Arc<BlockRegistry>, config: &EngineConfig) -> Pipeline {
    let mut builder = PipelineBuilder::new(registry);

    if config.templating.enabled {
        builder = af_template::install(builder, TemplateEngine::new());
    } else {
        debug!("Templating disabled");
    }

    af_trace::install(builder, config.tracing).build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use af_automation::DispatchMode;
    use af_core::Context;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn config(yaml: &str) -> EngineConfig {
        let value = af_config::load_yaml_string(".", yaml, "engine.yaml").unwrap();
        EngineConfig::from_yaml(&value).unwrap()
    }

    fn event(event_type: &str, data: Value) -> Event {
        Event::new(event_type, data, Context::new())
    }

    #[test]
    fn test_from_config_registers_automations() {
        let engine = Engine::from_config(&config(
            r#"
automations:
  - id: greeter
    triggers:
      - type: event_type
        data: hello
    result:
      type: value
      data: "hi {{ name }}"
"#,
        ))
        .unwrap();

        assert_eq!(engine.orchestrator.count(), 1);

        let results = engine.dispatch(event("hello", json!({"name": "sam"}))).unwrap();
        assert!(results[0].executed);
        assert_eq!(results[0].result, Some(json!("hi sam")));
    }

    #[test]
    fn test_templating_can_be_disabled() {
        let engine = Engine::from_config(&config(
            r#"
templating:
  enabled: false
automations:
  - triggers: [{type: always}]
    result: {type: value, data: "{{ name }}"}
"#,
        ))
        .unwrap();

        let results = engine.dispatch(event("hello", json!({"name": "sam"}))).unwrap();
        assert_eq!(results[0].result, Some(json!("{{ name }}")));
    }

    #[test]
    fn test_invalid_automation_is_rejected() {
        let result = Engine::from_config(&config(
            r#"
automations:
  - alias: Broken
    variables:
      - type: constant
        data: 1
"#,
        ));

        let err = result.err().unwrap();
        assert!(err.to_string().contains("invalid automation 'Broken'"));
    }

    #[test]
    fn test_resilient_mode_reports_failures() {
        let engine = Engine::from_config(&config(
            r#"
dispatch:
  mode: resilient
automations:
  - id: broken
    triggers: [{type: always}]
    actions: [{type: fail, data: nope}]
  - id: fine
    triggers: [{type: always}]
"#,
        ))
        .unwrap();
        assert_eq!(engine.orchestrator.mode(), DispatchMode::Resilient);

        let results = engine.dispatch(event("tick", json!({}))).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].error.as_deref(), Some("nope"));
        assert!(results[1].executed);
    }

    #[test]
    fn test_playground_attaches_trace() {
        let engine = Engine::from_config(&EngineConfig::default()).unwrap();
        let definition: AutomationDefinition = serde_json::from_value(json!({
            "triggers": [{"type": "always"}],
            "actions": [{"type": "logger", "data": "checked"}]
        }))
        .unwrap();

        let result = engine
            .playground(definition, event("tick", json!({})), true)
            .unwrap();
        assert!(result.executed);
        assert!(result.field(af_trace::TRACE_FIELD).is_some());
        assert_eq!(engine.orchestrator.count(), 0);
    }

    #[test]
    fn test_config_file_with_included_automations() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("automations")).unwrap();
        fs::write(
            dir.path().join("automations/doors.yaml"),
            r#"
- id: door_watch
  triggers: [{type: event_type, data: door}]
  actions: [{type: set, data: {seen: "{{ door }}"}}]
  result: {type: variables, data: seen}
"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("engine.yaml"),
            "automations: !include automations/doors.yaml\n",
        )
        .unwrap();

        let config = EngineConfig::load(dir.path().join("engine.yaml")).unwrap();
        let engine = Engine::from_config(&config).unwrap();

        let results = engine.dispatch(event("door", json!({"door": "front"}))).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].result, Some(json!({"seen": "front"})));
    }

    #[test]
    fn test_failed_playground_run_keeps_trace() {
        let engine = Engine::from_config(&EngineConfig::default()).unwrap();
        let definition: AutomationDefinition = serde_json::from_value(json!({
            "triggers": [{"type": "always"}],
            "actions": [{"type": "fail", "data": "no power"}]
        }))
        .unwrap();

        let result = engine
            .playground(definition, event("tick", json!({})), true)
            .unwrap();

        assert_eq!(result.error.as_deref(), Some("no power"));
        let trace = af_trace::ExecutionTrace::from_result(&result).unwrap();
        assert_eq!(trace.steps.actions[0].error.as_deref(), Some("no power"));
    }
}
