//! Interceptors that turn chain traversal into a trace tree

use std::sync::Arc;

use af_automation::{
    Automation, AutomationResult, EngineResult, ExecutionStage, Interceptor, Next, Stage,
};
use af_core::{EventContext, PhaseContext, PhaseKind};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::context::{TraceContext, TRACE_FIELD};
use crate::entry::{duration_ms, TraceEntry};
use crate::snapshot::Snapshot;

/// Priority the tracing interceptors are installed at
///
/// Outermost, so an entry's timing and children cover every other
/// interceptor on the chain.
pub const TRACING_PRIORITY: i32 = -100;

/// Tracing settings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceSettings {
    /// Trace every automation, not only those with `trace: true`
    pub enabled: bool,

    /// Leave the sealed trace attached to the event after the run
    pub keep_attached: bool,
}

/// Records one [`TraceEntry`] per block invocation on every phase chain
///
/// Does nothing unless an unsealed [`TraceContext`] is attached to the event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingInterceptor;

impl<K> Interceptor<K> for TracingInterceptor
where
    K: PhaseKind + Stage<Input = PhaseContext<K>, Output = <K as PhaseKind>::Output>,
{
    fn intercept(
        &self,
        event: &EventContext,
        input: PhaseContext<K>,
        next: Next<'_, K>,
    ) -> EngineResult<<K as PhaseKind>::Output> {
        let Some(trace) = TraceContext::active(event) else {
            return next.run(event, input);
        };

        let started_at = Utc::now();
        let before = Snapshot::capture(event, input.data());
        let entry_context = input.clone();

        let scope = trace.enter_nested_scope();
        let output = next.run(event, input);
        let closed = scope.finish();

        let finished_at = Utc::now();
        let (outcome, error) = match &output {
            Ok(value) => (Some(K::outcome(value)), None),
            Err(err) => (None, Some(err.to_string())),
        };

        trace!(
            phase = %K::PHASE,
            block = %entry_context.label(),
            failed = error.is_some(),
            "Recorded trace entry"
        );

        trace.record(TraceEntry {
            phase: K::PHASE,
            type_tag: entry_context.type_tag().to_string(),
            alias: entry_context.alias().map(str::to_string),
            started_at,
            finished_at,
            duration_ms: duration_ms(started_at, finished_at),
            before,
            after: Snapshot::event_only(event),
            outcome,
            error,
            children: (!closed.children.is_empty()).then(|| Box::new(closed.children)),
            logs: closed.logs,
        });

        output
    }
}

/// Starts, seals and attaches the trace of a whole automation run
#[derive(Debug, Default, Clone, Copy)]
pub struct ExecutionTracingInterceptor {
    settings: TraceSettings,
}

impl ExecutionTracingInterceptor {
    pub fn new(settings: TraceSettings) -> Self {
        Self { settings }
    }

    fn should_trace(&self, automation: &Automation) -> bool {
        self.settings.enabled || automation.tracing_enabled()
    }
}

impl Interceptor<ExecutionStage> for ExecutionTracingInterceptor {
    fn intercept(
        &self,
        event: &EventContext,
        automation: Arc<Automation>,
        next: Next<'_, ExecutionStage>,
    ) -> EngineResult<AutomationResult> {
        if !self.should_trace(&automation) {
            return next.run(event, automation);
        }

        match TraceContext::current(event) {
            // A run nested inside an active trace records into it
            Some(active) if !active.is_completed() => return next.run(event, automation),
            // A sealed trace kept from an earlier run makes room for a new one
            Some(_) => {
                TraceContext::discard(event);
            }
            None => {}
        }

        let trace = TraceContext::get_or_create(event, &automation);
        let outcome = next.run(event, automation);
        let execution = trace.complete();
        if !self.settings.keep_attached {
            TraceContext::discard(event);
        }

        let value = match serde_json::to_value(&execution) {
            Ok(value) => value,
            Err(err) => {
                warn!(
                    trace_id = %execution.trace_id,
                    error = %err,
                    "Failed to attach execution trace"
                );
                return outcome;
            }
        };

        // A failed run carries its trace on the error
        match outcome {
            Ok(mut result) => {
                result.insert_field(TRACE_FIELD, value);
                Ok(result)
            }
            Err(err) => Err(err.with_field(TRACE_FIELD, value)),
        }
    }
}
