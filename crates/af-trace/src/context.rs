//! Per-event trace recorder

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use af_automation::{Automation, AutomationResult};
use af_core::{keys, EventContext};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::entry::{duration_ms, LogEntry, LogLevel, TraceChildren, TraceEntry};
use crate::scope::{ClosedScope, ScopeStack};

/// Key under which the execution trace is attached to an [`AutomationResult`]
pub const TRACE_FIELD: &str = "trace";

/// The sealed trace of one automation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionTrace {
    pub trace_id: String,
    pub automation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    pub context_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,

    /// Top-level entries of the run
    #[serde(flatten)]
    pub steps: TraceChildren,

    /// Every captured log line, in capture order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub logs: Vec<LogEntry>,
}

impl ExecutionTrace {
    /// Read the trace attached to a result, if tracing was on for it
    pub fn from_result(result: &AutomationResult) -> Option<Self> {
        let value = result.field(TRACE_FIELD)?;
        match serde_json::from_value(value.clone()) {
            Ok(trace) => Some(trace),
            Err(err) => {
                warn!(error = %err, "Result carries an unreadable trace");
                None
            }
        }
    }
}

struct TraceState {
    scopes: ScopeStack,
    sealed: Option<ExecutionTrace>,
}

/// Records the entries of one automation run on one event
///
/// Attached to the [`EventContext`] as an extension while active. Interceptors
/// push a nested scope around each block so entries recorded while the block
/// runs become that block's children.
pub struct TraceContext {
    trace_id: String,
    automation_id: String,
    alias: Option<String>,
    context_id: String,
    started_at: DateTime<Utc>,
    sequence: AtomicU64,
    state: Mutex<TraceState>,
}

impl TraceContext {
    fn new(event: &EventContext, automation: &Automation) -> Self {
        Self {
            trace_id: ulid::Ulid::new().to_string(),
            automation_id: automation.id().to_string(),
            alias: automation.alias().map(str::to_string),
            context_id: event.id().to_string(),
            started_at: Utc::now(),
            sequence: AtomicU64::new(0),
            state: Mutex::new(TraceState {
                scopes: ScopeStack::new(),
                sealed: None,
            }),
        }
    }

    /// The trace attached to `event`, attaching a new one if there is none
    pub fn get_or_create(event: &EventContext, automation: &Automation) -> Arc<TraceContext> {
        let trace = event.get_or_insert_extension(|| TraceContext::new(event, automation));
        if let Err(err) = event.put(keys::TRACE_ID, Value::from(trace.trace_id.as_str())) {
            warn!(error = %err, "Failed to record trace id");
        }
        trace
    }

    /// The trace attached to `event`, if any
    pub fn current(event: &EventContext) -> Option<Arc<TraceContext>> {
        event.extension::<TraceContext>()
    }

    /// The trace attached to `event`, unless there is none or it is sealed
    pub fn active(event: &EventContext) -> Option<Arc<TraceContext>> {
        Self::current(event).filter(|trace| !trace.is_completed())
    }

    /// Detach the trace from `event`
    pub fn discard(event: &EventContext) -> Option<Arc<TraceContext>> {
        event.remove(keys::TRACE_ID);
        event.remove_extension::<TraceContext>()
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn automation_id(&self) -> &str {
        &self.automation_id
    }

    /// Open a scope collecting the entries recorded until it is finished
    pub fn enter_nested_scope(&self) -> NestedScope<'_> {
        self.state().scopes.enter();
        NestedScope {
            trace: self,
            open: true,
        }
    }

    /// Append an entry to the innermost open scope
    pub fn record(&self, entry: TraceEntry) {
        self.state().scopes.record(entry);
    }

    /// Capture a log line into the innermost open scope
    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        let entry = LogEntry {
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst),
            level,
            message: message.into(),
            timestamp: Utc::now(),
        };
        self.state().scopes.log(entry);
    }

    /// Number of open scopes, root included
    pub fn depth(&self) -> usize {
        self.state().scopes.depth()
    }

    /// Entries and log lines recorded but not yet sealed
    pub fn pending(&self) -> usize {
        self.state().scopes.pending()
    }

    pub fn is_completed(&self) -> bool {
        self.state().sealed.is_some()
    }

    /// Seal the trace and build the execution trace
    ///
    /// Scopes left open are folded into the root first. Calling this again
    /// returns the same trace.
    pub fn complete(&self) -> ExecutionTrace {
        let mut state = self.state();
        if let Some(sealed) = &state.sealed {
            return sealed.clone();
        }

        let leftover = state.scopes.collapse();
        if leftover > 0 {
            debug!(trace_id = %self.trace_id, leftover, "Closed scopes left open at completion");
        }

        let ClosedScope { children, logs } = state.scopes.take_root();
        let mut all_logs = logs;
        for entry in children.iter() {
            entry.collect_logs(&mut all_logs);
        }
        all_logs.sort_by_key(|entry| entry.sequence);

        let completed_at = Utc::now();
        let trace = ExecutionTrace {
            trace_id: self.trace_id.clone(),
            automation_id: self.automation_id.clone(),
            alias: self.alias.clone(),
            context_id: self.context_id.clone(),
            started_at: self.started_at,
            completed_at,
            duration_ms: duration_ms(self.started_at, completed_at),
            steps: children,
            logs: all_logs,
        };

        state.sealed = Some(trace.clone());
        trace
    }

    fn state(&self) -> MutexGuard<'_, TraceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// An open scope on a [`TraceContext`]
///
/// Dropping it without calling [`NestedScope::finish`] still closes the
/// scope, discarding what was recorded in it.
pub struct NestedScope<'a> {
    trace: &'a TraceContext,
    open: bool,
}

impl NestedScope<'_> {
    /// Close the scope and return what was recorded inside it
    pub fn finish(mut self) -> ClosedScope {
        self.open = false;
        self.trace.state().scopes.exit().unwrap_or_default()
    }
}

impl Drop for NestedScope<'_> {
    fn drop(&mut self) {
        if self.open {
            self.trace.state().scopes.exit();
        }
    }
}

/// Capture a log line into the active trace on `event`, if any, and emit
/// it through `tracing`
pub fn capture_log(event: &EventContext, level: LogLevel, message: &str) {
    match level {
        LogLevel::Trace => tracing::trace!(context_id = %event.id(), "{}", message),
        LogLevel::Debug => tracing::debug!(context_id = %event.id(), "{}", message),
        LogLevel::Info => tracing::info!(context_id = %event.id(), "{}", message),
        LogLevel::Warn => tracing::warn!(context_id = %event.id(), "{}", message),
        LogLevel::Error => tracing::error!(context_id = %event.id(), "{}", message),
    }

    if let Some(trace) = TraceContext::active(event) {
        trace.log(level, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use af_automation::AutomationDefinition;
    use serde_json::json;

    fn setup() -> (EventContext, Automation) {
        let event = EventContext::from_data("motion", json!({})).unwrap();
        let automation =
            Automation::from_definition(AutomationDefinition::new("traced").with_id("a1")).unwrap();
        (event, automation)
    }

    #[test]
    fn test_get_or_create_attaches_once() {
        let (event, automation) = setup();
        assert!(TraceContext::current(&event).is_none());

        let first = TraceContext::get_or_create(&event, &automation);
        let second = TraceContext::get_or_create(&event, &automation);

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(event.get(keys::TRACE_ID), Some(json!(first.trace_id())));
        assert_eq!(first.depth(), 1);

        TraceContext::discard(&event);
        assert!(TraceContext::current(&event).is_none());
        assert!(!event.contains_key(keys::TRACE_ID));
    }

    #[test]
    fn test_dropped_scope_restores_depth() {
        let (event, automation) = setup();
        let trace = TraceContext::get_or_create(&event, &automation);

        {
            let _outer = trace.enter_nested_scope();
            let _inner = trace.enter_nested_scope();
            assert_eq!(trace.depth(), 3);
        }
        assert_eq!(trace.depth(), 1);
    }

    #[test]
    fn test_complete_is_idempotent() {
        let (event, automation) = setup();
        let trace = TraceContext::get_or_create(&event, &automation);

        let scope = trace.enter_nested_scope();
        trace.log(LogLevel::Info, "inside");
        std::mem::forget(scope);
        assert_eq!(trace.depth(), 2);

        let first = trace.complete();
        assert_eq!(trace.depth(), 1);
        assert!(trace.is_completed());
        assert_eq!(first.logs.len(), 1);
        assert_eq!(first.automation_id, "a1");

        let second = trace.complete();
        assert_eq!(first, second);
        assert_eq!(trace.depth(), 1);
    }

    #[test]
    fn test_capture_log_without_trace_is_noop() {
        let (event, _) = setup();
        capture_log(&event, LogLevel::Warn, "nobody is tracing");
        assert!(TraceContext::current(&event).is_none());
    }
}
