//! Execution tracing
//!
//! Tracing is built entirely from interceptors. [`ExecutionTracingInterceptor`]
//! wraps a whole automation run: it attaches a [`TraceContext`] to the event,
//! seals it when the run ends and stores the resulting [`ExecutionTrace`] in
//! the result's `trace` field. [`TracingInterceptor`] sits on every phase
//! chain and records one [`TraceEntry`] per block, nesting the entries a
//! composite block produces under that block's entry.
//!
//! ```text
//! Idle ──get_or_create──▶ Active ──complete──▶ Sealed
//! ```
//!
//! Without an attached trace every interceptor passes straight through.

mod context;
mod entry;
mod interceptor;
mod scope;
mod snapshot;

pub use context::{capture_log, ExecutionTrace, NestedScope, TraceContext, TRACE_FIELD};
pub use entry::{LogEntry, LogLevel, TraceChildren, TraceEntry};
pub use interceptor::{
    ExecutionTracingInterceptor, TraceSettings, TracingInterceptor, TRACING_PRIORITY,
};
pub use scope::{ClosedScope, ScopeId, ScopeStack};
pub use snapshot::Snapshot;

use af_automation::PipelineBuilder;

/// Install both tracing interceptors on a pipeline
pub fn install(builder: PipelineBuilder, settings: TraceSettings) -> PipelineBuilder {
    builder
        .phase_interceptor(TRACING_PRIORITY, TracingInterceptor)
        .execution_interceptor(TRACING_PRIORITY, ExecutionTracingInterceptor::new(settings))
}
