//! Automation model
//!
//! An automation ties together variables, triggers, conditions, actions and
//! an optional result. It is built once from an [`AutomationDefinition`] and
//! never changes afterwards; interceptors that transform entries work on
//! copies of the phase contexts.

use af_core::events::AutomationRef;
use af_core::{
    ActionContext, ConditionContext, ContextError, Phase, ResultContext, TriggerContext,
    VariableContext,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::EngineResult;

/// Automation option that turns on tracing for this automation
pub const OPTION_TRACE: &str = "trace";

/// Automation option that lets an automation without triggers activate
pub const OPTION_ALLOW_EMPTY_TRIGGERS: &str = "allow_empty_triggers";

/// Automation definition as parsed from YAML or JSON
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutomationDefinition {
    /// Unique ID (optional, auto-generated if not provided)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Human-readable name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,

    /// Free-form options
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub options: Map<String, Value>,

    /// Variables resolved before triggers are evaluated
    #[serde(default, alias = "variable")]
    pub variables: Vec<VariableContext>,

    /// Triggers that start the automation
    #[serde(default, alias = "trigger")]
    pub triggers: Vec<TriggerContext>,

    /// Conditions that must be met
    #[serde(default, alias = "condition")]
    pub conditions: Vec<ConditionContext>,

    /// Actions to execute
    #[serde(default, alias = "action")]
    pub actions: Vec<ActionContext>,

    /// Result computed after execution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ResultContext>,
}

impl AutomationDefinition {
    /// Start a definition with a human-readable name
    pub fn new(alias: impl Into<String>) -> Self {
        Self {
            alias: Some(alias.into()),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }

    pub fn variable(mut self, variable: VariableContext) -> Self {
        self.variables.push(variable);
        self
    }

    pub fn trigger(mut self, trigger: TriggerContext) -> Self {
        self.triggers.push(trigger);
        self
    }

    pub fn condition(mut self, condition: ConditionContext) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn action(mut self, action: ActionContext) -> Self {
        self.actions.push(action);
        self
    }

    pub fn result(mut self, result: ResultContext) -> Self {
        self.result = Some(result);
        self
    }
}

/// A validated, immutable automation
#[derive(Debug, Clone, Serialize)]
pub struct Automation {
    id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    alias: Option<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    options: Map<String, Value>,
    variables: Vec<VariableContext>,
    triggers: Vec<TriggerContext>,
    conditions: Vec<ConditionContext>,
    actions: Vec<ActionContext>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<ResultContext>,
}

impl Automation {
    /// Validate a definition and build the automation from it
    ///
    /// Every entry must carry a type tag and every variable an alias, since
    /// the alias is the metadata key its value is stored under.
    pub fn from_definition(definition: AutomationDefinition) -> EngineResult<Self> {
        for variable in &definition.variables {
            variable.validate()?;
            if variable.alias().map_or(true, |alias| alias.trim().is_empty()) {
                return Err(ContextError::MissingAlias {
                    phase: Phase::Variable,
                    type_tag: variable.type_tag().to_string(),
                }
                .into());
            }
        }
        for trigger in &definition.triggers {
            trigger.validate()?;
        }
        for condition in &definition.conditions {
            condition.validate()?;
        }
        for action in &definition.actions {
            action.validate()?;
        }
        if let Some(result) = &definition.result {
            result.validate()?;
        }

        let id = definition
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| ulid::Ulid::new().to_string());

        Ok(Self {
            id,
            alias: definition.alias,
            options: definition.options,
            variables: definition.variables,
            triggers: definition.triggers,
            conditions: definition.conditions,
            actions: definition.actions,
            result: definition.result,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// Get display name (alias or ID)
    pub fn display_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.id)
    }

    pub fn options(&self) -> &Map<String, Value> {
        &self.options
    }

    pub fn option(&self, key: &str) -> Option<&Value> {
        self.options.get(key)
    }

    pub fn variables(&self) -> &[VariableContext] {
        &self.variables
    }

    pub fn triggers(&self) -> &[TriggerContext] {
        &self.triggers
    }

    pub fn conditions(&self) -> &[ConditionContext] {
        &self.conditions
    }

    pub fn actions(&self) -> &[ActionContext] {
        &self.actions
    }

    pub fn result(&self) -> Option<&ResultContext> {
        self.result.as_ref()
    }

    /// Whether the automation asked to be traced
    pub fn tracing_enabled(&self) -> bool {
        self.flag(OPTION_TRACE)
    }

    /// Whether an empty trigger list counts as activated
    pub fn allows_empty_triggers(&self) -> bool {
        self.flag(OPTION_ALLOW_EMPTY_TRIGGERS)
    }

    /// Id and alias, as carried by lifecycle notifications
    pub fn reference(&self) -> AutomationRef {
        AutomationRef {
            automation_id: self.id.clone(),
            alias: self.alias.clone(),
        }
    }

    fn flag(&self, key: &str) -> bool {
        self.options.get(key).and_then(Value::as_bool).unwrap_or(false)
    }
}
