//! Scope stack for nested trace recording
//!
//! The stack is an arena of scope records linked to their parent by index.
//! Index 0 is the root scope and is never removed, so the depth is always at
//! least 1. Entering pushes an empty scope; exiting pops the innermost one
//! and hands back what was recorded inside it.

use crate::entry::{LogEntry, TraceChildren, TraceEntry};

/// Index of a scope in the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeId(usize);

#[derive(Debug, Default)]
struct Scope {
    parent: Option<usize>,
    children: TraceChildren,
    logs: Vec<LogEntry>,
}

/// What a scope contained when it was exited
#[derive(Debug, Default)]
pub struct ClosedScope {
    pub children: TraceChildren,
    pub logs: Vec<LogEntry>,
}

#[derive(Debug)]
pub struct ScopeStack {
    scopes: Vec<Scope>,
    current: usize,
}

impl ScopeStack {
    /// A stack holding only the root scope
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::default()],
            current: 0,
        }
    }

    /// Push an empty scope on top of the current one
    pub fn enter(&mut self) -> ScopeId {
        self.scopes.push(Scope {
            parent: Some(self.current),
            ..Scope::default()
        });
        self.current = self.scopes.len() - 1;
        ScopeId(self.current)
    }

    /// Pop the innermost scope; the root cannot be exited
    pub fn exit(&mut self) -> Option<ClosedScope> {
        let parent = self.scopes[self.current].parent?;
        let scope = self.scopes.pop()?;
        self.current = parent;

        Some(ClosedScope {
            children: scope.children,
            logs: scope.logs,
        })
    }

    /// Number of open scopes, root included
    pub fn depth(&self) -> usize {
        let mut depth = 1;
        let mut scope = self.current;
        while let Some(parent) = self.scopes[scope].parent {
            depth += 1;
            scope = parent;
        }
        depth
    }

    pub fn current(&self) -> ScopeId {
        ScopeId(self.current)
    }

    /// Append an entry to the innermost scope
    pub fn record(&mut self, entry: TraceEntry) {
        self.scopes[self.current].children.push(entry);
    }

    /// Append a log line to the innermost scope
    pub fn log(&mut self, entry: LogEntry) {
        self.scopes[self.current].logs.push(entry);
    }

    /// Entries and log lines held by all open scopes
    pub fn pending(&self) -> usize {
        self.scopes
            .iter()
            .map(|scope| scope.children.len() + scope.logs.len())
            .sum()
    }

    /// Close every scope above the root, folding their contents into it
    pub fn collapse(&mut self) -> usize {
        let mut closed = 0;
        while let Some(scope) = self.exit() {
            let target = &mut self.scopes[self.current];
            target.children.append(scope.children);
            target.logs.extend(scope.logs);
            closed += 1;
        }
        closed
    }

    /// Take everything recorded in the root scope
    pub fn take_root(&mut self) -> ClosedScope {
        let root = &mut self.scopes[0];
        ClosedScope {
            children: std::mem::take(&mut root.children),
            logs: std::mem::take(&mut root.logs),
        }
    }
}

impl Default for ScopeStack {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::Snapshot;
    use af_core::Phase;
    use chrono::Utc;

    fn entry(phase: Phase, type_tag: &str) -> TraceEntry {
        let now = Utc::now();
        TraceEntry {
            phase,
            type_tag: type_tag.to_string(),
            alias: None,
            started_at: now,
            finished_at: now,
            duration_ms: 0,
            before: Snapshot::default(),
            after: Snapshot::default(),
            outcome: None,
            error: None,
            children: None,
            logs: Vec::new(),
        }
    }

    #[test]
    fn test_root_cannot_be_exited() {
        let mut stack = ScopeStack::new();
        assert_eq!(stack.depth(), 1);
        assert!(stack.exit().is_none());
        assert_eq!(stack.depth(), 1);
    }

    #[test]
    fn test_nested_scopes_collect_their_own_entries() {
        let mut stack = ScopeStack::new();
        let outer = stack.enter();
        stack.record(entry(Phase::Condition, "equals"));
        let inner = stack.enter();
        assert_ne!(outer, inner);
        assert_eq!(stack.current(), inner);
        assert_eq!(stack.depth(), 3);

        stack.record(entry(Phase::Action, "logger"));
        let closed_inner = stack.exit().unwrap();
        assert_eq!(closed_inner.children.actions.len(), 1);
        assert_eq!(stack.current(), outer);

        let closed_outer = stack.exit().unwrap();
        assert_eq!(closed_outer.children.conditions.len(), 1);
        assert!(closed_outer.children.actions.is_empty());
        assert_eq!(stack.depth(), 1);
    }

    #[test]
    fn test_collapse_folds_into_root() {
        let mut stack = ScopeStack::new();
        stack.enter();
        stack.record(entry(Phase::Trigger, "always"));
        stack.enter();
        stack.record(entry(Phase::Action, "set"));

        assert_eq!(stack.collapse(), 2);
        assert_eq!(stack.depth(), 1);

        let root = stack.take_root();
        assert_eq!(root.children.len(), 2);
        assert!(stack.take_root().children.is_empty());
    }
}
