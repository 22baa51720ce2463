//! Built-in variables and results

use af_automation::{EngineResult, Pipeline, ResultBlock, VariableBlock};
use af_core::{EventContext, ResultContext, VariableContext};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::data::{lookup, parse, OneOrMany};

/// `constant` variable: the entry's data as is
pub struct ConstantVariable;

impl VariableBlock for ConstantVariable {
    fn resolve(
        &self,
        _: &EventContext,
        variable: &VariableContext,
        _: &Pipeline,
    ) -> EngineResult<Value> {
        Ok(variable.data().clone())
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FieldData {
    Path(String),
    Full {
        path: String,
        #[serde(default)]
        default: Value,
    },
}

/// `event_field` variable: the event field at `path`, or `default`
pub struct EventFieldVariable;

impl VariableBlock for EventFieldVariable {
    fn resolve(
        &self,
        event: &EventContext,
        variable: &VariableContext,
        _: &Pipeline,
    ) -> EngineResult<Value> {
        let (path, default) = match parse(variable.type_tag(), variable.data())? {
            FieldData::Path(path) => (path, Value::Null),
            FieldData::Full { path, default } => (path, default),
        };

        let fields = event.public_event_data();
        Ok(lookup(&fields, &path).cloned().unwrap_or(default))
    }
}

/// `value` result: the entry's data as is
pub struct ValueResult;

impl ResultBlock for ValueResult {
    fn summarize(
        &self,
        _: &EventContext,
        result: &ResultContext,
        _: &Pipeline,
    ) -> EngineResult<Value> {
        Ok(result.data().clone())
    }
}

/// `variables` result: the named metadata values as an object
///
/// Missing keys map to `null`.
pub struct VariablesResult;

impl ResultBlock for VariablesResult {
    fn summarize(
        &self,
        event: &EventContext,
        result: &ResultContext,
        _: &Pipeline,
    ) -> EngineResult<Value> {
        let keys: OneOrMany<String> = parse(result.type_tag(), result.data())?;
        let values: Map<String, Value> = keys
            .into_vec()
            .into_iter()
            .map(|key| {
                let value = event.get(&key).unwrap_or(Value::Null);
                (key, value)
            })
            .collect();
        Ok(Value::Object(values))
    }
}
