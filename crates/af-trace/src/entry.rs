//! Trace records

use std::fmt;
use std::str::FromStr;

use af_core::{Outcome, Phase};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::snapshot::Snapshot;

/// Severity of a captured log line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level '{other}'")),
        }
    }
}

/// A log line captured into a trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Position within the trace, across all scopes
    pub sequence: u64,
    pub level: LogLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Entries recorded within one scope, grouped by phase
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraceChildren {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<TraceEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub triggers: Vec<TraceEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<TraceEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<TraceEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<TraceEntry>,
}

impl TraceChildren {
    /// Append an entry to the list for its phase
    pub fn push(&mut self, entry: TraceEntry) {
        match entry.phase {
            Phase::Variable => self.variables.push(entry),
            Phase::Trigger => self.triggers.push(entry),
            Phase::Condition => self.conditions.push(entry),
            Phase::Action => self.actions.push(entry),
            Phase::Result => self.results.push(entry),
        }
    }

    /// Move every entry of `other` into this one
    pub fn append(&mut self, other: TraceChildren) {
        self.variables.extend(other.variables);
        self.triggers.extend(other.triggers);
        self.conditions.extend(other.conditions);
        self.actions.extend(other.actions);
        self.results.extend(other.results);
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn len(&self) -> usize {
        self.variables.len()
            + self.triggers.len()
            + self.conditions.len()
            + self.actions.len()
            + self.results.len()
    }

    /// All entries, phase by phase
    pub fn iter(&self) -> impl Iterator<Item = &TraceEntry> {
        self.variables
            .iter()
            .chain(&self.triggers)
            .chain(&self.conditions)
            .chain(&self.actions)
            .chain(&self.results)
    }
}

/// One block invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub phase: Phase,

    #[serde(rename = "type")]
    pub type_tag: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,

    /// Event data and the raw entry payload when the block was entered
    ///
    /// The payload is the automation's own, before any interceptor
    /// rewrote it.
    pub before: Snapshot,

    /// Event data when the block returned; `data` is always null
    pub after: Snapshot,

    /// What the block produced; absent when it failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Entries recorded while this block ran, null for leaf blocks
    #[serde(default)]
    pub children: Option<Box<TraceChildren>>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub logs: Vec<LogEntry>,
}

impl TraceEntry {
    /// Whether a trigger entry activated
    pub fn activated(&self) -> Option<bool> {
        match self.outcome {
            Some(Outcome::Activated(activated)) => Some(activated),
            _ => None,
        }
    }

    /// Whether a condition entry was satisfied
    pub fn satisfied(&self) -> Option<bool> {
        match self.outcome {
            Some(Outcome::Satisfied(satisfied)) => Some(satisfied),
            _ => None,
        }
    }

    /// Collect this entry's logs and those of all nested entries
    pub(crate) fn collect_logs(&self, into: &mut Vec<LogEntry>) {
        into.extend(self.logs.iter().cloned());
        if let Some(children) = &self.children {
            for child in children.iter() {
                child.collect_logs(into);
            }
        }
    }
}

pub(crate) fn duration_ms(started_at: DateTime<Utc>, finished_at: DateTime<Utc>) -> u64 {
    (finished_at - started_at)
        .to_std()
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

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
    fn test_children_group_by_phase() {
        let mut children = TraceChildren::default();
        assert!(children.is_empty());

        children.push(entry(Phase::Condition, "equals"));
        children.push(entry(Phase::Action, "logger"));
        children.push(entry(Phase::Action, "set"));

        assert_eq!(children.len(), 3);
        assert_eq!(children.conditions.len(), 1);
        assert_eq!(children.actions[1].type_tag, "set");

        let tags: Vec<_> = children.iter().map(|e| e.type_tag.as_str()).collect();
        assert_eq!(tags, vec!["equals", "logger", "set"]);
    }

    #[test]
    fn test_leaf_serializes_null_children() {
        let mut leaf = entry(Phase::Trigger, "always");
        leaf.outcome = Some(Outcome::Activated(true));

        let value = serde_json::to_value(&leaf).unwrap();
        assert_eq!(value["type"], "always");
        assert_eq!(value["children"], json!(null));
        assert_eq!(value["outcome"], json!({"kind": "activated", "value": true}));
        assert_eq!(leaf.activated(), Some(true));
        assert_eq!(leaf.satisfied(), None);
    }

    #[test]
    fn test_log_level_parse() {
        assert_eq!("WARNING".parse::<LogLevel>(), Ok(LogLevel::Warn));
        assert_eq!("info".parse::<LogLevel>(), Ok(LogLevel::Info));
        assert!("loud".parse::<LogLevel>().is_err());
    }
}
