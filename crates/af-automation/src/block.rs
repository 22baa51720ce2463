//! Block implementations and the registry that selects them by type tag
//!
//! A block is the concrete behavior behind one phase entry: the trigger that
//! checks an event, the action that does the work, and so on. Blocks are
//! registered explicitly at startup under a type tag; each chain's terminal
//! link resolves the entry's tag here and invokes the block.
//!
//! Every block receives the [`Pipeline`] it runs in so composite blocks (an
//! `if` action, an `and` condition) can evaluate nested entries through the
//! same interceptor chains as top-level ones.

use std::sync::Arc;

use af_core::{
    ActionContext, ConditionContext, EventContext, Phase, ResultContext, TriggerContext,
    VariableContext,
};
use dashmap::DashMap;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::error::{EngineError, EngineResult};
use crate::pipeline::Pipeline;

/// Resolves a variable value; the engine stores it under the entry's alias
pub trait VariableBlock: Send + Sync {
    fn resolve(
        &self,
        event: &EventContext,
        variable: &VariableContext,
        pipeline: &Pipeline,
    ) -> EngineResult<Value>;
}

/// Decides whether an event activates an automation
pub trait TriggerBlock: Send + Sync {
    fn is_activated(
        &self,
        event: &EventContext,
        trigger: &TriggerContext,
        pipeline: &Pipeline,
    ) -> EngineResult<bool>;
}

/// Checks a precondition once a trigger has activated
pub trait ConditionBlock: Send + Sync {
    fn is_satisfied(
        &self,
        event: &EventContext,
        condition: &ConditionContext,
        pipeline: &Pipeline,
    ) -> EngineResult<bool>;
}

/// Performs work for an executed automation
pub trait ActionBlock: Send + Sync {
    fn execute(
        &self,
        event: &EventContext,
        action: &ActionContext,
        pipeline: &Pipeline,
    ) -> EngineResult<()>;
}

/// Summarizes an automation run into a result value
pub trait ResultBlock: Send + Sync {
    fn summarize(
        &self,
        event: &EventContext,
        result: &ResultContext,
        pipeline: &Pipeline,
    ) -> EngineResult<Value>;
}

macro_rules! fn_block {
    ($name:ident, $block:ident, $method:ident, $ctx:ty, $out:ty) => {
        struct $name<F>(F);

        impl<F> $block for $name<F>
        where
            F: Fn(&EventContext, &$ctx, &Pipeline) -> EngineResult<$out> + Send + Sync,
        {
            fn $method(
                &self,
                event: &EventContext,
                ctx: &$ctx,
                pipeline: &Pipeline,
            ) -> EngineResult<$out> {
                (self.0)(event, ctx, pipeline)
            }
        }
    };
}

fn_block!(FnVariable, VariableBlock, resolve, VariableContext, Value);
fn_block!(FnTrigger, TriggerBlock, is_activated, TriggerContext, bool);
fn_block!(FnCondition, ConditionBlock, is_satisfied, ConditionContext, bool);
fn_block!(FnAction, ActionBlock, execute, ActionContext, ());
fn_block!(FnResult, ResultBlock, summarize, ResultContext, Value);

/// Blocks of one phase indexed by type tag
struct BlockTable<B: ?Sized> {
    phase: Phase,
    blocks: DashMap<String, Arc<B>>,
}

impl<B: ?Sized> BlockTable<B> {
    fn new(phase: Phase) -> Self {
        Self {
            phase,
            blocks: DashMap::new(),
        }
    }

    fn insert(&self, type_tag: String, block: Arc<B>) {
        if self.blocks.insert(type_tag.clone(), block).is_some() {
            warn!(phase = %self.phase, type_tag = %type_tag, "Replaced existing block");
        } else {
            debug!(phase = %self.phase, type_tag = %type_tag, "Registered block");
        }
    }

    fn resolve(&self, type_tag: &str) -> EngineResult<Arc<B>> {
        self.blocks
            .get(type_tag)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| EngineError::BlockNotFound {
                phase: self.phase,
                type_tag: type_tag.to_string(),
            })
    }

    fn remove(&self, type_tag: &str) -> bool {
        self.blocks.remove(type_tag).is_some()
    }

    fn contains(&self, type_tag: &str) -> bool {
        self.blocks.contains_key(type_tag)
    }

    fn tags(&self) -> Vec<String> {
        let mut tags: Vec<_> = self.blocks.iter().map(|e| e.key().clone()).collect();
        tags.sort();
        tags
    }
}

/// Lookup table from type tag to block implementation, one table per phase
pub struct BlockRegistry {
    variables: BlockTable<dyn VariableBlock>,
    triggers: BlockTable<dyn TriggerBlock>,
    conditions: BlockTable<dyn ConditionBlock>,
    actions: BlockTable<dyn ActionBlock>,
    results: BlockTable<dyn ResultBlock>,
}

impl BlockRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            variables: BlockTable::new(Phase::Variable),
            triggers: BlockTable::new(Phase::Trigger),
            conditions: BlockTable::new(Phase::Condition),
            actions: BlockTable::new(Phase::Action),
            results: BlockTable::new(Phase::Result),
        }
    }

    pub fn register_variable(
        &self,
        type_tag: impl Into<String>,
        block: impl VariableBlock + 'static,
    ) {
        self.variables.insert(type_tag.into(), Arc::new(block));
    }

    pub fn register_trigger(
        &self,
        type_tag: impl Into<String>,
        block: impl TriggerBlock + 'static,
    ) {
        self.triggers.insert(type_tag.into(), Arc::new(block));
    }

    pub fn register_condition(
        &self,
        type_tag: impl Into<String>,
        block: impl ConditionBlock + 'static,
    ) {
        self.conditions.insert(type_tag.into(), Arc::new(block));
    }

    pub fn register_action(
        &self,
        type_tag: impl Into<String>,
        block: impl ActionBlock + 'static,
    ) {
        self.actions.insert(type_tag.into(), Arc::new(block));
    }

    pub fn register_result(
        &self,
        type_tag: impl Into<String>,
        block: impl ResultBlock + 'static,
    ) {
        self.results.insert(type_tag.into(), Arc::new(block));
    }

    /// Register a variable block from a closure
    pub fn register_variable_fn<F>(&self, type_tag: impl Into<String>, f: F)
    where
        F: Fn(&EventContext, &VariableContext, &Pipeline) -> EngineResult<Value>
            + Send
            + Sync
            + 'static,
    {
        self.variables.insert(type_tag.into(), Arc::new(FnVariable(f)));
    }

    /// Register a trigger block from a closure
    pub fn register_trigger_fn<F>(&self, type_tag: impl Into<String>, f: F)
    where
        F: Fn(&EventContext, &TriggerContext, &Pipeline) -> EngineResult<bool>
            + Send
            + Sync
            + 'static,
    {
        self.triggers.insert(type_tag.into(), Arc::new(FnTrigger(f)));
    }

    /// Register a condition block from a closure
    pub fn register_condition_fn<F>(&self, type_tag: impl Into<String>, f: F)
    where
        F: Fn(&EventContext, &ConditionContext, &Pipeline) -> EngineResult<bool>
            + Send
            + Sync
            + 'static,
    {
        self.conditions.insert(type_tag.into(), Arc::new(FnCondition(f)));
    }

    /// Register an action block from a closure
    pub fn register_action_fn<F>(&self, type_tag: impl Into<String>, f: F)
    where
        F: Fn(&EventContext, &ActionContext, &Pipeline) -> EngineResult<()>
            + Send
            + Sync
            + 'static,
    {
        self.actions.insert(type_tag.into(), Arc::new(FnAction(f)));
    }

    /// Register a result block from a closure
    pub fn register_result_fn<F>(&self, type_tag: impl Into<String>, f: F)
    where
        F: Fn(&EventContext, &ResultContext, &Pipeline) -> EngineResult<Value>
            + Send
            + Sync
            + 'static,
    {
        self.results.insert(type_tag.into(), Arc::new(FnResult(f)));
    }

    pub fn variable(&self, type_tag: &str) -> EngineResult<Arc<dyn VariableBlock>> {
        self.variables.resolve(type_tag)
    }

    pub fn trigger(&self, type_tag: &str) -> EngineResult<Arc<dyn TriggerBlock>> {
        self.triggers.resolve(type_tag)
    }

    pub fn condition(&self, type_tag: &str) -> EngineResult<Arc<dyn ConditionBlock>> {
        self.conditions.resolve(type_tag)
    }

    pub fn action(&self, type_tag: &str) -> EngineResult<Arc<dyn ActionBlock>> {
        self.actions.resolve(type_tag)
    }

    pub fn result(&self, type_tag: &str) -> EngineResult<Arc<dyn ResultBlock>> {
        self.results.resolve(type_tag)
    }

    /// Check whether a block is registered for `type_tag` in `phase`
    pub fn contains(&self, phase: Phase, type_tag: &str) -> bool {
        match phase {
            Phase::Variable => self.variables.contains(type_tag),
            Phase::Trigger => self.triggers.contains(type_tag),
            Phase::Condition => self.conditions.contains(type_tag),
            Phase::Action => self.actions.contains(type_tag),
            Phase::Result => self.results.contains(type_tag),
        }
    }

    /// Registered type tags for `phase`, sorted
    pub fn tags(&self, phase: Phase) -> Vec<String> {
        match phase {
            Phase::Variable => self.variables.tags(),
            Phase::Trigger => self.triggers.tags(),
            Phase::Condition => self.conditions.tags(),
            Phase::Action => self.actions.tags(),
            Phase::Result => self.results.tags(),
        }
    }

    /// Remove the block registered for `type_tag` in `phase`
    #[instrument(skip(self))]
    pub fn unregister(&self, phase: Phase, type_tag: &str) -> bool {
        let removed = match phase {
            Phase::Variable => self.variables.remove(type_tag),
            Phase::Trigger => self.triggers.remove(type_tag),
            Phase::Condition => self.conditions.remove(type_tag),
            Phase::Action => self.actions.remove(type_tag),
            Phase::Result => self.results.remove(type_tag),
        };

        if removed {
            debug!(phase = %phase, type_tag, "Unregistered block");
        }
        removed
    }
}

impl Default for BlockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe wrapper for BlockRegistry
pub type SharedBlockRegistry = Arc<BlockRegistry>;
