//! The set of interceptor chains automations are evaluated through
//!
//! A [`Pipeline`] owns one chain per phase plus the execution chain that
//! wraps a whole automation run. The orchestrator, playground runs and
//! composite blocks all evaluate entries through the same pipeline, so every
//! interceptor sees nested entries exactly like top-level ones.

use std::sync::Arc;

use af_core::{
    keys, ActionContext, ActionPhase, ConditionContext, ConditionPhase, ContextError,
    EventContext, Phase, ResultContext, ResultPhase, TriggerContext, TriggerPhase,
    VariableContext, VariablePhase,
};
use serde_json::Value;
use tracing::{debug, trace};

use crate::automation::Automation;
use crate::block::SharedBlockRegistry;
use crate::chain::{Chain, ChainBuilder, ExecutionStage, Interceptor, Terminal};
use crate::error::EngineResult;
use crate::result::AutomationResult;

/// All chains of one engine instance
pub struct Pipeline {
    registry: SharedBlockRegistry,
    variables: Chain<VariablePhase>,
    triggers: Chain<TriggerPhase>,
    conditions: Chain<ConditionPhase>,
    actions: Chain<ActionPhase>,
    results: Chain<ResultPhase>,
    execution: Chain<ExecutionStage>,
}

impl Pipeline {
    /// The block registry terminal links resolve against
    pub fn registry(&self) -> &SharedBlockRegistry {
        &self.registry
    }

    /// Resolve a variable and store its value under the variable's alias
    pub fn resolve_variable(
        &self,
        event: &EventContext,
        variable: VariableContext,
    ) -> EngineResult<()> {
        self.variables.invoke(self, event, variable)
    }

    /// Evaluate one trigger
    pub fn is_activated(&self, event: &EventContext, trigger: TriggerContext) -> EngineResult<bool> {
        self.triggers.invoke(self, event, trigger)
    }

    /// Evaluate one condition
    pub fn is_satisfied(
        &self,
        event: &EventContext,
        condition: ConditionContext,
    ) -> EngineResult<bool> {
        self.conditions.invoke(self, event, condition)
    }

    /// Execute one action
    pub fn execute_action(&self, event: &EventContext, action: ActionContext) -> EngineResult<()> {
        self.actions.invoke(self, event, action)
    }

    /// Compute a result value
    pub fn summarize(&self, event: &EventContext, result: ResultContext) -> EngineResult<Value> {
        self.results.invoke(self, event, result)
    }

    /// Run a whole automation against an event through the execution chain
    pub fn execute(
        &self,
        event: &EventContext,
        automation: Arc<Automation>,
    ) -> EngineResult<AutomationResult> {
        self.execution.invoke(self, event, automation)
    }

    /// Resolve variables in order
    pub fn resolve_variables(
        &self,
        event: &EventContext,
        variables: &[VariableContext],
    ) -> EngineResult<()> {
        for variable in variables {
            self.resolve_variable(event, variable.clone())?;
        }
        Ok(())
    }

    /// OR over `triggers`, stopping at the first activated one
    ///
    /// An empty list is not activated; whether an automation without triggers
    /// runs is decided by the automation, not here.
    pub fn any_activated(
        &self,
        event: &EventContext,
        triggers: &[TriggerContext],
    ) -> EngineResult<bool> {
        for trigger in triggers {
            if self.is_activated(event, trigger.clone())? {
                trace!(trigger = %trigger.label(), "Trigger activated");
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// AND over `conditions`, stopping at the first unsatisfied one
    ///
    /// An empty list is satisfied.
    pub fn all_satisfied(
        &self,
        event: &EventContext,
        conditions: &[ConditionContext],
    ) -> EngineResult<bool> {
        for condition in conditions {
            if !self.is_satisfied(event, condition.clone())? {
                trace!(condition = %condition.label(), "Condition not satisfied");
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Execute actions strictly in order; the first failure aborts the rest
    pub fn execute_actions(&self, event: &EventContext, actions: &[ActionContext]) -> EngineResult<()> {
        for action in actions {
            self.execute_action(event, action.clone())?;
        }
        Ok(())
    }
}

/// Builds a [`Pipeline`] from a registry and prioritized interceptors
pub struct PipelineBuilder {
    registry: SharedBlockRegistry,
    variables: ChainBuilder<VariablePhase>,
    triggers: ChainBuilder<TriggerPhase>,
    conditions: ChainBuilder<ConditionPhase>,
    actions: ChainBuilder<ActionPhase>,
    results: ChainBuilder<ResultPhase>,
    execution: ChainBuilder<ExecutionStage>,
}

impl PipelineBuilder {
    pub fn new(registry: SharedBlockRegistry) -> Self {
        Self {
            registry,
            variables: ChainBuilder::new(),
            triggers: ChainBuilder::new(),
            conditions: ChainBuilder::new(),
            actions: ChainBuilder::new(),
            results: ChainBuilder::new(),
            execution: ChainBuilder::new(),
        }
    }

    pub fn variable_interceptor(
        mut self,
        priority: i32,
        interceptor: impl Interceptor<VariablePhase> + 'static,
    ) -> Self {
        self.variables.push(priority, Arc::new(interceptor));
        self
    }

    pub fn trigger_interceptor(
        mut self,
        priority: i32,
        interceptor: impl Interceptor<TriggerPhase> + 'static,
    ) -> Self {
        self.triggers.push(priority, Arc::new(interceptor));
        self
    }

    pub fn condition_interceptor(
        mut self,
        priority: i32,
        interceptor: impl Interceptor<ConditionPhase> + 'static,
    ) -> Self {
        self.conditions.push(priority, Arc::new(interceptor));
        self
    }

    pub fn action_interceptor(
        mut self,
        priority: i32,
        interceptor: impl Interceptor<ActionPhase> + 'static,
    ) -> Self {
        self.actions.push(priority, Arc::new(interceptor));
        self
    }

    pub fn result_interceptor(
        mut self,
        priority: i32,
        interceptor: impl Interceptor<ResultPhase> + 'static,
    ) -> Self {
        self.results.push(priority, Arc::new(interceptor));
        self
    }

    pub fn execution_interceptor(
        mut self,
        priority: i32,
        interceptor: impl Interceptor<ExecutionStage> + 'static,
    ) -> Self {
        self.execution.push(priority, Arc::new(interceptor));
        self
    }

    /// Install one interceptor instance on all five phase chains
    pub fn phase_interceptor<I>(mut self, priority: i32, interceptor: I) -> Self
    where
        I: Interceptor<VariablePhase>
            + Interceptor<TriggerPhase>
            + Interceptor<ConditionPhase>
            + Interceptor<ActionPhase>
            + Interceptor<ResultPhase>
            + 'static,
    {
        let shared = Arc::new(interceptor);
        self.variables.push(priority, shared.clone());
        self.triggers.push(priority, shared.clone());
        self.conditions.push(priority, shared.clone());
        self.actions.push(priority, shared.clone());
        self.results.push(priority, shared);
        self
    }

    pub fn build(self) -> Pipeline {
        let terminal = Arc::new(RegistryTerminal);

        Pipeline {
            registry: self.registry,
            variables: self.variables.build(terminal.clone()),
            triggers: self.triggers.build(terminal.clone()),
            conditions: self.conditions.build(terminal.clone()),
            actions: self.actions.build(terminal.clone()),
            results: self.results.build(terminal),
            execution: self.execution.build(Arc::new(AutomationTerminal)),
        }
    }
}

/// Terminal link of the phase chains: resolve the type tag and run the block
struct RegistryTerminal;

impl Terminal<VariablePhase> for RegistryTerminal {
    fn invoke(
        &self,
        pipeline: &Pipeline,
        event: &EventContext,
        variable: VariableContext,
    ) -> EngineResult<()> {
        let alias = variable
            .alias()
            .ok_or_else(|| ContextError::MissingAlias {
                phase: Phase::Variable,
                type_tag: variable.type_tag().to_string(),
            })?
            .to_string();

        let value = pipeline
            .registry()
            .variable(variable.type_tag())?
            .resolve(event, &variable, pipeline)?;

        trace!(alias = %alias, type_tag = %variable.type_tag(), "Resolved variable");
        event.put(alias, value)?;
        Ok(())
    }
}

impl Terminal<TriggerPhase> for RegistryTerminal {
    fn invoke(
        &self,
        pipeline: &Pipeline,
        event: &EventContext,
        trigger: TriggerContext,
    ) -> EngineResult<bool> {
        pipeline
            .registry()
            .trigger(trigger.type_tag())?
            .is_activated(event, &trigger, pipeline)
    }
}

impl Terminal<ConditionPhase> for RegistryTerminal {
    fn invoke(
        &self,
        pipeline: &Pipeline,
        event: &EventContext,
        condition: ConditionContext,
    ) -> EngineResult<bool> {
        pipeline
            .registry()
            .condition(condition.type_tag())?
            .is_satisfied(event, &condition, pipeline)
    }
}

impl Terminal<ActionPhase> for RegistryTerminal {
    fn invoke(
        &self,
        pipeline: &Pipeline,
        event: &EventContext,
        action: ActionContext,
    ) -> EngineResult<()> {
        trace!(action = %action.label(), "Executing action");
        pipeline
            .registry()
            .action(action.type_tag())?
            .execute(event, &action, pipeline)
    }
}

impl Terminal<ResultPhase> for RegistryTerminal {
    fn invoke(
        &self,
        pipeline: &Pipeline,
        event: &EventContext,
        result: ResultContext,
    ) -> EngineResult<Value> {
        pipeline
            .registry()
            .result(result.type_tag())?
            .summarize(event, &result, pipeline)
    }
}

/// Terminal link of the execution chain: the evaluate, execute, summarize cycle
struct AutomationTerminal;

impl Terminal<ExecutionStage> for AutomationTerminal {
    fn invoke(
        &self,
        pipeline: &Pipeline,
        event: &EventContext,
        automation: Arc<Automation>,
    ) -> EngineResult<AutomationResult> {
        // Nested dispatches on the same event restore the outer automation id
        let previous = event.put(keys::AUTOMATION_ID, Value::from(automation.id()))?;
        let outcome = run_automation(pipeline, event, automation);
        match previous {
            Some(outer) => {
                event.put(keys::AUTOMATION_ID, outer)?;
            }
            None => {
                event.remove(keys::AUTOMATION_ID);
            }
        }
        outcome
    }
}

fn run_automation(
    pipeline: &Pipeline,
    event: &EventContext,
    automation: Arc<Automation>,
) -> EngineResult<AutomationResult> {
    pipeline.resolve_variables(event, automation.variables())?;

    let activated = if automation.triggers().is_empty() {
        automation.allows_empty_triggers()
    } else {
        pipeline.any_activated(event, automation.triggers())?
    };

    let executed = activated && pipeline.all_satisfied(event, automation.conditions())?;

    if executed {
        debug!(automation_id = %automation.id(), "Executing automation actions");
        pipeline.execute_actions(event, automation.actions())?;
    } else {
        debug!(
            automation_id = %automation.id(),
            activated,
            "Automation not executed"
        );
    }

    let result = match automation.result() {
        Some(result) => Some(pipeline.summarize(event, result.clone())?),
        None => None,
    };

    Ok(AutomationResult::new(automation, event.clone(), executed).with_result(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::AutomationDefinition;
    use crate::block::BlockRegistry;
    use crate::chain::Next;
    use crate::error::EngineError;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn registry() -> Arc<BlockRegistry> {
        let registry = Arc::new(BlockRegistry::new());
        registry.register_trigger_fn("always", |_, trigger, _| {
            Ok(trigger.data().as_bool().unwrap_or(true))
        });
        registry.register_condition_fn("always", |_, condition, _| {
            Ok(condition.data().as_bool().unwrap_or(true))
        });
        registry.register_variable_fn("constant", |_, variable, _| Ok(variable.data().clone()));
        registry.register_result_fn("lookup", |event, result, _| {
            let key = result.data().as_str().unwrap_or_default();
            Ok(event.get(key).unwrap_or(Value::Null))
        });
        registry
    }

    fn automation(definition: AutomationDefinition) -> Arc<Automation> {
        Arc::new(Automation::from_definition(definition).unwrap())
    }

    #[test]
    fn test_variables_are_stored_under_alias() {
        let pipeline = PipelineBuilder::new(registry()).build();
        let event = EventContext::from_data("tick", json!({})).unwrap();

        let automation = automation(
            AutomationDefinition::new("vars")
                .variable(
                    VariableContext::new("constant")
                        .unwrap()
                        .with_alias("level")
                        .with_data(json!(3)),
                )
                .trigger(TriggerContext::new("always").unwrap())
                .result(ResultContext::new("lookup").unwrap().with_data(json!("level"))),
        );

        let result = pipeline.execute(&event, automation).unwrap();
        assert!(result.executed);
        assert_eq!(result.result, Some(json!(3)));
        assert_eq!(event.get("level"), Some(json!(3)));
    }

    #[test]
    fn test_automation_id_is_scoped_to_execution() {
        let registry = registry();
        registry.register_result_fn("current_id", |event, _, _| {
            Ok(event.get(keys::AUTOMATION_ID).unwrap_or(Value::Null))
        });
        let pipeline = PipelineBuilder::new(registry).build();
        let event = EventContext::from_data("tick", json!({})).unwrap();

        let automation = automation(
            AutomationDefinition::new("scoped")
                .with_id("scoped")
                .result(ResultContext::new("current_id").unwrap()),
        );

        let result = pipeline.execute(&event, automation).unwrap();
        assert_eq!(result.result, Some(json!("scoped")));
        assert!(!event.contains_key(keys::AUTOMATION_ID));
    }

    #[test]
    fn test_empty_triggers_follow_automation_policy() {
        let pipeline = PipelineBuilder::new(registry()).build();
        let event = EventContext::from_data("tick", json!({})).unwrap();

        let strict = automation(AutomationDefinition::new("strict"));
        assert!(!pipeline.execute(&event, strict).unwrap().executed);

        let vacuous = automation(
            AutomationDefinition::new("vacuous").option("allow_empty_triggers", json!(true)),
        );
        assert!(pipeline.execute(&event, vacuous).unwrap().executed);
    }

    #[test]
    fn test_triggers_short_circuit() {
        let registry = registry();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        registry.register_trigger_fn("counted", move |_, _, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(false)
        });
        let pipeline = PipelineBuilder::new(registry).build();
        let event = EventContext::from_data("tick", json!({})).unwrap();

        let triggers = vec![
            TriggerContext::new("always").unwrap(),
            TriggerContext::new("counted").unwrap(),
        ];
        assert!(pipeline.any_activated(&event, &triggers).unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!pipeline.any_activated(&event, &[]).unwrap());
        assert!(pipeline.all_satisfied(&event, &[]).unwrap());
    }

    #[test]
    fn test_unknown_type_tag_fails_execution() {
        let pipeline = PipelineBuilder::new(registry()).build();
        let event = EventContext::from_data("tick", json!({})).unwrap();

        let automation = automation(
            AutomationDefinition::new("missing")
                .trigger(TriggerContext::new("always").unwrap())
                .action(ActionContext::new("does_not_exist").unwrap()),
        );

        let err = pipeline.execute(&event, automation).unwrap_err();
        assert!(matches!(
            err,
            EngineError::BlockNotFound {
                phase: Phase::Action,
                ..
            }
        ));
    }

    struct Negate;

    impl Interceptor<TriggerPhase> for Negate {
        fn intercept(
            &self,
            event: &EventContext,
            trigger: TriggerContext,
            next: Next<'_, TriggerPhase>,
        ) -> EngineResult<bool> {
            next.run(event, trigger).map(|activated| !activated)
        }
    }

    #[test]
    fn test_interceptor_wraps_terminal() {
        let pipeline = PipelineBuilder::new(registry())
            .trigger_interceptor(0, Negate)
            .build();
        let event = EventContext::from_data("tick", json!({})).unwrap();

        let trigger = TriggerContext::new("always").unwrap().with_data(json!(false));
        assert!(pipeline.is_activated(&event, trigger).unwrap());
    }
}
