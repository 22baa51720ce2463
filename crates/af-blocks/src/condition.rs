//! Built-in conditions
//!
//! `and`, `or` and `not` evaluate their nested conditions through the
//! pipeline's condition chain, so nested entries are templated and traced
//! like top-level ones.

use af_automation::{ConditionBlock, EngineError, EngineResult, Pipeline};
use af_core::{ConditionContext, EventContext};
use dashmap::DashMap;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::trace;

use crate::data::{as_text, lookup, parse, OneOrMany};
use crate::error::BlockFailure;

/// `always`: satisfied unless `data` is `false`
pub struct AlwaysCondition;

impl ConditionBlock for AlwaysCondition {
    fn is_satisfied(
        &self,
        _: &EventContext,
        condition: &ConditionContext,
        _: &Pipeline,
    ) -> EngineResult<bool> {
        match condition.data() {
            Value::Null => Ok(true),
            data => parse::<bool>(condition.type_tag(), data),
        }
    }
}

fn nested(condition: &ConditionContext) -> EngineResult<Vec<ConditionContext>> {
    let nested: OneOrMany<ConditionContext> = parse(condition.type_tag(), condition.data())?;
    Ok(nested.into_vec())
}

/// `and`: every nested condition holds
pub struct AndCondition;

impl ConditionBlock for AndCondition {
    fn is_satisfied(
        &self,
        event: &EventContext,
        condition: &ConditionContext,
        pipeline: &Pipeline,
    ) -> EngineResult<bool> {
        pipeline.all_satisfied(event, &nested(condition)?)
    }
}

/// `or`: at least one nested condition holds
pub struct OrCondition;

impl ConditionBlock for OrCondition {
    fn is_satisfied(
        &self,
        event: &EventContext,
        condition: &ConditionContext,
        pipeline: &Pipeline,
    ) -> EngineResult<bool> {
        for inner in nested(condition)? {
            if pipeline.is_satisfied(event, inner)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// `not`: none of the nested conditions holds
pub struct NotCondition;

impl ConditionBlock for NotCondition {
    fn is_satisfied(
        &self,
        event: &EventContext,
        condition: &ConditionContext,
        pipeline: &Pipeline,
    ) -> EngineResult<bool> {
        for inner in nested(condition)? {
            if pipeline.is_satisfied(event, inner)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[derive(Debug, Deserialize)]
struct EqualsData {
    path: String,
    value: Value,
}

/// `equals`: the event field at `path` equals `value`
///
/// A missing field never matches, not even `value: null`.
pub struct EqualsCondition;

impl ConditionBlock for EqualsCondition {
    fn is_satisfied(
        &self,
        event: &EventContext,
        condition: &ConditionContext,
        _: &Pipeline,
    ) -> EngineResult<bool> {
        let data: EqualsData = parse(condition.type_tag(), condition.data())?;
        let fields = event.public_event_data();
        let actual = lookup(&fields, &data.path);
        trace!(path = %data.path, ?actual, expected = ?data.value, "Evaluating equals");
        Ok(actual == Some(&data.value))
    }
}

#[derive(Debug, Deserialize)]
struct RegexData {
    path: String,
    pattern: String,
}

/// `regex`: the event field at `path`, as text, matches `pattern`
///
/// Compiled patterns are kept per pattern string for the lifetime of the
/// block; invalid patterns are not cached.
#[derive(Default)]
pub struct RegexCondition {
    compiled: DashMap<String, Regex>,
}

impl RegexCondition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of compiled patterns held
    pub fn cached(&self) -> usize {
        self.compiled.len()
    }

    fn compile(&self, pattern: &str) -> EngineResult<Regex> {
        if let Some(re) = self.compiled.get(pattern) {
            return Ok(re.clone());
        }

        let re = Regex::new(pattern).map_err(|err| {
            EngineError::block(BlockFailure::InvalidPattern {
                pattern: pattern.to_string(),
                message: err.to_string(),
            })
        })?;
        trace!(pattern, "Compiled regex pattern");
        self.compiled.insert(pattern.to_string(), re.clone());
        Ok(re)
    }
}

impl ConditionBlock for RegexCondition {
    fn is_satisfied(
        &self,
        event: &EventContext,
        condition: &ConditionContext,
        _: &Pipeline,
    ) -> EngineResult<bool> {
        let data: RegexData = parse(condition.type_tag(), condition.data())?;
        let re = self.compile(&data.pattern)?;

        let fields = event.public_event_data();
        Ok(lookup(&fields, &data.path).map_or(false, |value| re.is_match(&as_text(value))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use af_automation::{BlockRegistry, PipelineBuilder};
    use serde_json::json;
    use std::sync::Arc;

    fn condition(pattern: &str) -> ConditionContext {
        ConditionContext::new("regex")
            .unwrap()
            .with_data(json!({"path": "state", "pattern": pattern}))
    }

    #[test]
    fn test_patterns_are_compiled_once() {
        let block = RegexCondition::new();
        let pipeline = PipelineBuilder::new(Arc::new(BlockRegistry::new())).build();
        let event = EventContext::from_data("door", json!({"state": "open"})).unwrap();

        assert!(block.is_satisfied(&event, &condition("^op"), &pipeline).unwrap());
        assert!(block.is_satisfied(&event, &condition("^op"), &pipeline).unwrap());
        assert!(!block.is_satisfied(&event, &condition("^closed$"), &pipeline).unwrap());
        assert_eq!(block.cached(), 2);

        assert!(block.is_satisfied(&event, &condition("(unclosed"), &pipeline).is_err());
        assert_eq!(block.cached(), 2);
    }
}
