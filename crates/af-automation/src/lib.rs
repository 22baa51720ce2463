//! Automation Engine
//!
//! This crate provides the automation model and the machinery that runs it.
//! Every event is evaluated against every registered automation:
//!
//! ```text
//! AUTOMATION = VARIABLES → TRIGGERS (any) → CONDITIONS (all) → ACTIONS → RESULT
//! ```
//!
//! Each step runs through an interceptor [`Chain`] ending in a lookup in the
//! [`BlockRegistry`], so templating, tracing and custom behavior all attach
//! as interceptors on the [`Pipeline`].
//!
//! # Key Types
//!
//! - [`Automation`] - Validated automation built from an [`AutomationDefinition`]
//! - [`BlockRegistry`] - Type tag to block implementation lookup
//! - [`Pipeline`] - The interceptor chains of one engine instance
//! - [`AutomationOrchestrator`] - Registered automations and event dispatch
//! - [`AutomationResult`] - Outcome of one automation run

pub mod automation;
pub mod block;
pub mod chain;
pub mod error;
pub mod orchestrator;
pub mod pipeline;
pub mod result;

pub use automation::{
    Automation, AutomationDefinition, OPTION_ALLOW_EMPTY_TRIGGERS, OPTION_TRACE,
};
pub use block::{
    ActionBlock, BlockRegistry, ConditionBlock, ResultBlock, SharedBlockRegistry, TriggerBlock,
    VariableBlock,
};
pub use chain::{Chain, ChainBuilder, ExecutionStage, Interceptor, Next, Stage, Terminal};
pub use error::{BlockError, EngineError, EngineResult};
pub use orchestrator::{AutomationOrchestrator, DispatchMode};
pub use pipeline::{Pipeline, PipelineBuilder};
pub use result::AutomationResult;
