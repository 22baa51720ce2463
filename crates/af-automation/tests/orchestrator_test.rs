//! End-to-end dispatch tests through the orchestrator and pipeline

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use af_automation::{
    AutomationDefinition, AutomationOrchestrator, BlockRegistry, EngineResult, Interceptor, Next,
    Pipeline, PipelineBuilder, Stage,
};
use af_core::{
    ActionContext, ConditionContext, EventContext, TriggerContext, TriggerPhase,
};
use af_event_bus::NoopPublisher;
use proptest::prelude::*;
use serde_json::json;

/// Registry with boolean trigger/condition blocks and a counting action
fn registry(counter: Arc<AtomicUsize>) -> Arc<BlockRegistry> {
    let registry = Arc::new(BlockRegistry::new());
    registry.register_trigger_fn("always_true", |_, _, _| Ok(true));
    registry.register_trigger_fn("always_false", |_, _, _| Ok(false));
    registry.register_trigger_fn("flag", |_, trigger, _| {
        Ok(trigger.data().as_bool().unwrap_or(false))
    });
    registry.register_condition_fn("always_true", |_, _, _| Ok(true));
    registry.register_condition_fn("flag", |_, condition, _| {
        Ok(condition.data().as_bool().unwrap_or(false))
    });
    registry.register_action_fn("increment", move |_, _, _| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    registry
}

fn orchestrator(pipeline: Pipeline) -> AutomationOrchestrator {
    AutomationOrchestrator::new(Arc::new(pipeline), Arc::new(NoopPublisher))
}

fn counting_automation(trigger: &str) -> AutomationDefinition {
    AutomationDefinition::new(format!("{trigger} counter"))
        .trigger(TriggerContext::new(trigger).unwrap())
        .condition(ConditionContext::new("always_true").unwrap())
        .action(ActionContext::new("increment").unwrap())
}

#[test]
fn test_always_true_executes_actions_once() {
    let counter = Arc::new(AtomicUsize::new(0));
    let orchestrator = orchestrator(PipelineBuilder::new(registry(counter.clone())).build());
    orchestrator
        .register_definition(counting_automation("always_true"))
        .unwrap();

    let event = EventContext::from_data("test", json!({})).unwrap();
    let results = orchestrator.dispatch(&event).unwrap();

    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert_eq!(results.len(), 1);
    assert!(results[0].executed);
}

#[test]
fn test_always_false_executes_nothing() {
    let counter = Arc::new(AtomicUsize::new(0));
    let orchestrator = orchestrator(PipelineBuilder::new(registry(counter.clone())).build());
    orchestrator
        .register_definition(counting_automation("always_false"))
        .unwrap();

    let event = EventContext::from_data("test", json!({})).unwrap();
    let results = orchestrator.dispatch(&event).unwrap();

    assert_eq!(counter.load(Ordering::SeqCst), 0);
    assert!(!results[0].executed);
}

#[test]
fn test_failed_condition_blocks_actions() {
    let counter = Arc::new(AtomicUsize::new(0));
    let orchestrator = orchestrator(PipelineBuilder::new(registry(counter.clone())).build());
    orchestrator
        .register_definition(
            AutomationDefinition::new("gated")
                .trigger(TriggerContext::new("always_true").unwrap())
                .condition(ConditionContext::new("flag").unwrap().with_data(json!(false)))
                .action(ActionContext::new("increment").unwrap()),
        )
        .unwrap();

    let event = EventContext::from_data("test", json!({})).unwrap();
    let results = orchestrator.dispatch(&event).unwrap();

    assert_eq!(counter.load(Ordering::SeqCst), 0);
    assert!(!results[0].executed);
}

/// Records enter/exit of every stage it wraps
struct Recording {
    name: &'static str,
    log: Arc<Mutex<Vec<String>>>,
}

impl<S: Stage> Interceptor<S> for Recording {
    fn intercept(
        &self,
        event: &EventContext,
        input: S::Input,
        next: Next<'_, S>,
    ) -> EngineResult<S::Output> {
        self.log
            .lock()
            .unwrap()
            .push(format!("{}>{}", self.name, S::NAME));
        let output = next.run(event, input);
        self.log
            .lock()
            .unwrap()
            .push(format!("{}<{}", self.name, S::NAME));
        output
    }
}

#[test]
fn test_chain_order_is_deterministic() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let recording = |name| Recording {
        name,
        log: log.clone(),
    };

    let pipeline = PipelineBuilder::new(registry(Arc::new(AtomicUsize::new(0))))
        .phase_interceptor(20, recording("inner"))
        .phase_interceptor(10, recording("outer"))
        .phase_interceptor(10, recording("outer2"))
        .execution_interceptor(0, recording("exec"))
        .build();
    let orchestrator = orchestrator(pipeline);
    orchestrator
        .register_definition(counting_automation("always_true"))
        .unwrap();

    let event = EventContext::from_data("test", json!({})).unwrap();
    orchestrator.dispatch(&event).unwrap();
    let first: Vec<String> = log.lock().unwrap().drain(..).collect();

    let event = EventContext::from_data("test", json!({})).unwrap();
    orchestrator.dispatch(&event).unwrap();
    let second: Vec<String> = log.lock().unwrap().drain(..).collect();

    assert_eq!(first, second);
    assert_eq!(
        &first[..5],
        &[
            "exec>automation",
            "outer>trigger",
            "outer2>trigger",
            "inner>trigger",
            "inner<trigger",
        ]
    );
    assert_eq!(first.last().map(String::as_str), Some("exec<automation"));
    let actions = first.iter().filter(|entry| entry.ends_with(">action")).count();
    assert_eq!(actions, 3);
}

/// Short-circuits every trigger to false without reaching the registry
struct Veto;

impl Interceptor<TriggerPhase> for Veto {
    fn intercept(
        &self,
        _: &EventContext,
        _: TriggerContext,
        _: Next<'_, TriggerPhase>,
    ) -> EngineResult<bool> {
        Ok(false)
    }
}

#[test]
fn test_interceptor_can_short_circuit() {
    let counter = Arc::new(AtomicUsize::new(0));
    let pipeline = PipelineBuilder::new(registry(counter.clone()))
        .trigger_interceptor(0, Veto)
        .build();
    let orchestrator = orchestrator(pipeline);
    orchestrator
        .register_definition(counting_automation("always_true"))
        .unwrap();

    let event = EventContext::from_data("test", json!({})).unwrap();
    let results = orchestrator.dispatch(&event).unwrap();

    assert!(!results[0].executed);
    assert_eq!(counter.load(Ordering::SeqCst), 0);
}

#[test]
fn test_concurrent_registration() {
    let orchestrator = Arc::new(orchestrator(
        PipelineBuilder::new(registry(Arc::new(AtomicUsize::new(0)))).build(),
    ));

    std::thread::scope(|scope| {
        for thread in 0..10 {
            let orchestrator = orchestrator.clone();
            scope.spawn(move || {
                for i in 0..100 {
                    orchestrator
                        .register_definition(AutomationDefinition::new(format!("t{thread}-{i}")))
                        .unwrap();
                }
            });
        }
    });

    assert_eq!(orchestrator.automations().len(), 1000);
}

#[test]
fn test_registration_during_dispatch_uses_snapshot() {
    let counter = Arc::new(AtomicUsize::new(0));
    let registry = registry(counter.clone());
    let orchestrator = Arc::new(orchestrator(PipelineBuilder::new(registry.clone()).build()));

    let weak = Arc::downgrade(&orchestrator);
    registry.register_action_fn("register_another", move |_, _, _| {
        if let Some(orchestrator) = weak.upgrade() {
            orchestrator.register_definition(counting_automation("always_true"))?;
        }
        Ok(())
    });
    orchestrator
        .register_definition(
            AutomationDefinition::new("spawner")
                .trigger(TriggerContext::new("always_true").unwrap())
                .action(ActionContext::new("register_another").unwrap()),
        )
        .unwrap();

    let event = EventContext::from_data("test", json!({})).unwrap();
    let results = orchestrator.dispatch(&event).unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(orchestrator.count(), 2);
    assert_eq!(counter.load(Ordering::SeqCst), 0);
}

proptest! {
    #[test]
    fn prop_triggers_use_or(flags in prop::collection::vec(any::<bool>(), 1..8)) {
        let pipeline = PipelineBuilder::new(registry(Arc::new(AtomicUsize::new(0)))).build();
        let event = EventContext::from_data("test", json!({})).unwrap();
        let triggers: Vec<_> = flags
            .iter()
            .map(|flag| TriggerContext::new("flag").unwrap().with_data(json!(flag)))
            .collect();

        let activated = pipeline.any_activated(&event, &triggers).unwrap();
        prop_assert_eq!(activated, flags.iter().any(|flag| *flag));
    }

    #[test]
    fn prop_conditions_use_and(flags in prop::collection::vec(any::<bool>(), 0..8)) {
        let pipeline = PipelineBuilder::new(registry(Arc::new(AtomicUsize::new(0)))).build();
        let event = EventContext::from_data("test", json!({})).unwrap();
        let conditions: Vec<_> = flags
            .iter()
            .map(|flag| ConditionContext::new("flag").unwrap().with_data(json!(flag)))
            .collect();

        let satisfied = pipeline.all_satisfied(&event, &conditions).unwrap();
        prop_assert_eq!(satisfied, flags.iter().all(|flag| *flag));
    }
}
