//! Evaluation phases and the per-block contexts that describe them

use std::fmt;
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ContextError;

/// A stage of automation evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Variable,
    Trigger,
    Condition,
    Action,
    Result,
}

impl Phase {
    /// Phase name as used in logs and traces
    pub const fn as_str(self) -> &'static str {
        match self {
            Phase::Variable => "variable",
            Phase::Trigger => "trigger",
            Phase::Condition => "condition",
            Phase::Action => "action",
            Phase::Result => "result",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phase-specific outcome of running one block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Outcome {
    /// Side-effect only phases (variables, actions)
    None,
    /// Trigger evaluation
    Activated(bool),
    /// Condition evaluation
    Satisfied(bool),
    /// Result computation
    Value(Value),
}

/// Type-level marker for one phase
///
/// Each marker fixes what a block of that phase produces, so chains and
/// interceptors are checked per phase at compile time.
pub trait PhaseKind: Send + Sync + 'static {
    const PHASE: Phase;

    /// What running a block of this phase yields
    type Output: Send + 'static;

    /// Describe an output for tracing
    fn outcome(output: &Self::Output) -> Outcome;
}

/// Marker for variable resolution
#[derive(Debug)]
pub enum VariablePhase {}

/// Marker for trigger evaluation
#[derive(Debug)]
pub enum TriggerPhase {}

/// Marker for condition evaluation
#[derive(Debug)]
pub enum ConditionPhase {}

/// Marker for action execution
#[derive(Debug)]
pub enum ActionPhase {}

/// Marker for result computation
#[derive(Debug)]
pub enum ResultPhase {}

impl PhaseKind for VariablePhase {
    const PHASE: Phase = Phase::Variable;
    type Output = ();

    fn outcome(_: &()) -> Outcome {
        Outcome::None
    }
}

impl PhaseKind for TriggerPhase {
    const PHASE: Phase = Phase::Trigger;
    type Output = bool;

    fn outcome(activated: &bool) -> Outcome {
        Outcome::Activated(*activated)
    }
}

impl PhaseKind for ConditionPhase {
    const PHASE: Phase = Phase::Condition;
    type Output = bool;

    fn outcome(satisfied: &bool) -> Outcome {
        Outcome::Satisfied(*satisfied)
    }
}

impl PhaseKind for ActionPhase {
    const PHASE: Phase = Phase::Action;
    type Output = ();

    fn outcome(_: &()) -> Outcome {
        Outcome::None
    }
}

impl PhaseKind for ResultPhase {
    const PHASE: Phase = Phase::Result;
    type Output = Value;

    fn outcome(value: &Value) -> Outcome {
        Outcome::Value(value.clone())
    }
}

/// One configured entry of an automation for phase `K`
///
/// Contexts are values: interceptors that need different data build a new
/// context with [`PhaseContext::change_data`] and pass that down the chain,
/// leaving the original untouched for retries and later readers.
#[derive(Serialize, Deserialize)]
#[serde(bound = "")]
pub struct PhaseContext<K> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    alias: Option<String>,

    #[serde(rename = "type")]
    type_tag: String,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    options: Map<String, Value>,

    #[serde(default)]
    data: Value,

    #[serde(skip)]
    _phase: PhantomData<fn() -> K>,
}

/// Variable entry
pub type VariableContext = PhaseContext<VariablePhase>;
/// Trigger entry
pub type TriggerContext = PhaseContext<TriggerPhase>;
/// Condition entry
pub type ConditionContext = PhaseContext<ConditionPhase>;
/// Action entry
pub type ActionContext = PhaseContext<ActionPhase>;
/// Result entry
pub type ResultContext = PhaseContext<ResultPhase>;

impl<K: PhaseKind> PhaseContext<K> {
    /// Create an entry selecting the block registered under `type_tag`
    pub fn new(type_tag: impl Into<String>) -> Result<Self, ContextError> {
        let type_tag = type_tag.into();
        if type_tag.trim().is_empty() {
            return Err(ContextError::MissingTypeTag { phase: K::PHASE });
        }

        Ok(Self {
            alias: None,
            type_tag,
            options: Map::new(),
            data: Value::Null,
            _phase: PhantomData,
        })
    }

    /// Set the alias
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Replace the options map
    pub fn with_options(mut self, options: Map<String, Value>) -> Self {
        self.options = options;
        self
    }

    /// Add a single option
    pub fn with_option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }

    /// Set the data payload
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    /// A copy of this entry carrying `data` instead of the current payload
    pub fn change_data(&self, data: Value) -> Self {
        Self {
            alias: self.alias.clone(),
            type_tag: self.type_tag.clone(),
            options: self.options.clone(),
            data,
            _phase: PhantomData,
        }
    }

    /// Re-check invariants after deserialization
    pub fn validate(&self) -> Result<(), ContextError> {
        if self.type_tag.trim().is_empty() {
            return Err(ContextError::MissingTypeTag { phase: K::PHASE });
        }
        Ok(())
    }

    /// The phase this entry belongs to
    pub fn phase(&self) -> crate::Phase {
        K::PHASE
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    pub fn options(&self) -> &Map<String, Value> {
        &self.options
    }

    pub fn option(&self, key: &str) -> Option<&Value> {
        self.options.get(key)
    }

    /// Read a boolean option, treating absence as `false`
    pub fn option_enabled(&self, key: &str) -> bool {
        self.options.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    /// Alias if set, otherwise the type tag
    pub fn label(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.type_tag)
    }
}

impl<K> Clone for PhaseContext<K> {
    fn clone(&self) -> Self {
        Self {
            alias: self.alias.clone(),
            type_tag: self.type_tag.clone(),
            options: self.options.clone(),
            data: self.data.clone(),
            _phase: PhantomData,
        }
    }
}

impl<K> PartialEq for PhaseContext<K> {
    fn eq(&self, other: &Self) -> bool {
        self.alias == other.alias
            && self.type_tag == other.type_tag
            && self.options == other.options
            && self.data == other.data
    }
}

impl<K: PhaseKind> fmt::Debug for PhaseContext<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhaseContext")
            .field("phase", &K::PHASE)
            .field("alias", &self.alias)
            .field("type_tag", &self.type_tag)
            .field("options", &self.options)
            .field("data", &self.data)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_requires_type_tag() {
        let err = TriggerContext::new("").unwrap_err();
        assert_eq!(
            err,
            ContextError::MissingTypeTag {
                phase: Phase::Trigger
            }
        );
    }

    #[test]
    fn test_change_data_leaves_original_untouched() {
        let original = ActionContext::new("logger")
            .unwrap()
            .with_alias("say hello")
            .with_option("level", json!("info"))
            .with_data(json!({"message": "{{ name }}"}));

        let changed = original.change_data(json!({"message": "world"}));

        assert_eq!(original.data(), &json!({"message": "{{ name }}"}));
        assert_eq!(changed.data(), &json!({"message": "world"}));
        assert_eq!(changed.alias(), Some("say hello"));
        assert_eq!(changed.type_tag(), "logger");
        assert_eq!(changed.options(), original.options());
    }

    #[test]
    fn test_deserialize_entry() {
        let ctx: ConditionContext = serde_json::from_value(json!({
            "type": "equals",
            "alias": "front door",
            "data": {"path": "door", "value": "front"}
        }))
        .unwrap();

        assert_eq!(ctx.phase(), Phase::Condition);
        assert_eq!(ctx.label(), "front door");
        assert!(ctx.options().is_empty());
        assert!(ctx.validate().is_ok());
    }

    #[test]
    fn test_outcomes() {
        assert_eq!(TriggerPhase::outcome(&true), Outcome::Activated(true));
        assert_eq!(ConditionPhase::outcome(&false), Outcome::Satisfied(false));
        assert_eq!(ActionPhase::outcome(&()), Outcome::None);
        assert_eq!(
            ResultPhase::outcome(&json!({"ok": 1})),
            Outcome::Value(json!({"ok": 1}))
        );
    }
}
