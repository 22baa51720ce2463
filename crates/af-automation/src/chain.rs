//! Interceptor chains
//!
//! Every stage of automation evaluation runs through a [`Chain`]: an ordered
//! list of [`Interceptor`]s ending in a [`Terminal`] link. Each interceptor
//! receives the input and a [`Next`] handle for the rest of the chain and
//! decides whether and when to call it, so cross-cutting behavior
//! (templating, tracing, metrics) attaches here instead of inside the
//! orchestrator.
//!
//! ```text
//! invoke ─▶ interceptor(p=10) ─▶ interceptor(p=20) ─▶ … ─▶ terminal (registry lookup)
//! ```
//!
//! Interceptors are ordered by ascending priority; the lowest priority runs
//! outermost. Equal priorities keep registration order.

use std::sync::Arc;

use af_core::{
    ActionPhase, ConditionPhase, EventContext, PhaseContext, PhaseKind, ResultPhase, TriggerPhase,
    VariablePhase,
};

use crate::automation::Automation;
use crate::error::EngineResult;
use crate::pipeline::Pipeline;
use crate::result::AutomationResult;

/// A chain's input and output types
pub trait Stage: Send + Sync + 'static {
    type Input: Send;
    type Output: Send;

    /// Stage name for logs
    const NAME: &'static str;
}

macro_rules! phase_stage {
    ($($kind:ty),* $(,)?) => {
        $(
            impl Stage for $kind {
                type Input = PhaseContext<$kind>;
                type Output = <$kind as PhaseKind>::Output;
                const NAME: &'static str = <$kind as PhaseKind>::PHASE.as_str();
            }
        )*
    };
}

phase_stage!(
    VariablePhase,
    TriggerPhase,
    ConditionPhase,
    ActionPhase,
    ResultPhase
);

/// The outermost stage: running one whole automation against an event
#[derive(Debug)]
pub enum ExecutionStage {}

impl Stage for ExecutionStage {
    type Input = Arc<Automation>;
    type Output = AutomationResult;
    const NAME: &'static str = "automation";
}

/// Middleware for one stage
///
/// Implementations may replace the input (for phase contexts via
/// `change_data`), skip `next` entirely, call it more than once, or wrap it
/// to do bookkeeping before and after. Errors from `next` should be passed
/// through unchanged unless the interceptor deliberately isolates failures.
pub trait Interceptor<S: Stage>: Send + Sync {
    fn intercept(
        &self,
        event: &EventContext,
        input: S::Input,
        next: Next<'_, S>,
    ) -> EngineResult<S::Output>;
}

/// The last link of a chain, doing the stage's actual work
pub trait Terminal<S: Stage>: Send + Sync {
    fn invoke(
        &self,
        pipeline: &Pipeline,
        event: &EventContext,
        input: S::Input,
    ) -> EngineResult<S::Output>;
}

/// Handle to the remainder of a chain
pub struct Next<'a, S: Stage> {
    pipeline: &'a Pipeline,
    rest: &'a [Arc<dyn Interceptor<S>>],
    terminal: &'a dyn Terminal<S>,
}

impl<'a, S: Stage> Next<'a, S> {
    /// Run the remaining interceptors and the terminal link
    pub fn run(&self, event: &EventContext, input: S::Input) -> EngineResult<S::Output> {
        match self.rest.split_first() {
            Some((head, rest)) => head.intercept(
                event,
                input,
                Next {
                    pipeline: self.pipeline,
                    rest,
                    terminal: self.terminal,
                },
            ),
            None => self.terminal.invoke(self.pipeline, event, input),
        }
    }

    /// The pipeline this chain belongs to
    pub fn pipeline(&self) -> &'a Pipeline {
        self.pipeline
    }

    /// Number of interceptors still ahead of the terminal link
    pub fn remaining(&self) -> usize {
        self.rest.len()
    }
}

impl<S: Stage> Clone for Next<'_, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S: Stage> Copy for Next<'_, S> {}

/// An ordered interceptor list plus its terminal link
pub struct Chain<S: Stage> {
    interceptors: Vec<Arc<dyn Interceptor<S>>>,
    terminal: Arc<dyn Terminal<S>>,
}

impl<S: Stage> Chain<S> {
    /// Invoke the chain from its outermost interceptor
    pub fn invoke(
        &self,
        pipeline: &Pipeline,
        event: &EventContext,
        input: S::Input,
    ) -> EngineResult<S::Output> {
        Next {
            pipeline,
            rest: &self.interceptors,
            terminal: self.terminal.as_ref(),
        }
        .run(event, input)
    }

    /// Number of interceptors (the terminal link is not counted)
    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }
}

/// Collects prioritized interceptors for one chain
pub struct ChainBuilder<S: Stage> {
    links: Vec<(i32, Arc<dyn Interceptor<S>>)>,
}

impl<S: Stage> ChainBuilder<S> {
    pub fn new() -> Self {
        Self { links: Vec::new() }
    }

    /// Add an interceptor; lower priorities run further out
    pub fn push(&mut self, priority: i32, interceptor: Arc<dyn Interceptor<S>>) {
        self.links.push((priority, interceptor));
    }

    /// Finish the chain with `terminal`
    pub fn build(mut self, terminal: Arc<dyn Terminal<S>>) -> Chain<S> {
        // Stable sort: equal priorities keep registration order
        self.links.sort_by_key(|(priority, _)| *priority);

        Chain {
            interceptors: self.links.into_iter().map(|(_, i)| i).collect(),
            terminal,
        }
    }
}

impl<S: Stage> Default for ChainBuilder<S> {
    fn default() -> Self {
        Self::new()
    }
}
