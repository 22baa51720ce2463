//! Built-in actions

use af_automation::{ActionBlock, EngineError, EngineResult, Pipeline};
use af_core::{ActionContext, EventContext};
use af_trace::{capture_log, LogLevel};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::data::{as_text, parse, OneOrMany};
use crate::error::BlockFailure;

/// Action option that makes `parallel` swallow branch failures
pub const OPTION_SAFE: &str = "safe";

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LoggerData {
    Message(String),
    Full {
        message: Value,
        #[serde(default)]
        level: LogLevel,
    },
}

/// `logger`: write a message to the log and to the active trace
pub struct LoggerAction;

impl ActionBlock for LoggerAction {
    fn execute(
        &self,
        event: &EventContext,
        action: &ActionContext,
        _: &Pipeline,
    ) -> EngineResult<()> {
        let (message, level) = match parse(action.type_tag(), action.data())? {
            LoggerData::Message(message) => (message, LogLevel::Info),
            LoggerData::Full { message, level } => (as_text(&message), level),
        };
        capture_log(event, level, &message);
        Ok(())
    }
}

/// `set`: write each field of `data` into the event metadata
pub struct SetAction;

impl ActionBlock for SetAction {
    fn execute(
        &self,
        event: &EventContext,
        action: &ActionContext,
        _: &Pipeline,
    ) -> EngineResult<()> {
        let fields: Map<String, Value> = parse(action.type_tag(), action.data())?;
        for (key, value) in fields {
            debug!(key = %key, "Setting event metadata");
            event.put(key, value)?;
        }
        Ok(())
    }
}

/// `sequence`: run nested actions in order
pub struct SequenceAction;

impl ActionBlock for SequenceAction {
    fn execute(
        &self,
        event: &EventContext,
        action: &ActionContext,
        pipeline: &Pipeline,
    ) -> EngineResult<()> {
        let actions: OneOrMany<ActionContext> = parse(action.type_tag(), action.data())?;
        pipeline.execute_actions(event, &actions.into_vec())
    }
}

#[derive(Debug, Deserialize)]
struct IfData {
    #[serde(rename = "if")]
    conditions: OneOrMany<af_core::ConditionContext>,
    then: OneOrMany<ActionContext>,
    #[serde(default, rename = "else")]
    otherwise: Option<OneOrMany<ActionContext>>,
}

/// `if`: run `then` when all `if` conditions hold, `else` otherwise
pub struct IfAction;

impl ActionBlock for IfAction {
    fn execute(
        &self,
        event: &EventContext,
        action: &ActionContext,
        pipeline: &Pipeline,
    ) -> EngineResult<()> {
        let data: IfData = parse(action.type_tag(), action.data())?;

        if pipeline.all_satisfied(event, &data.conditions.into_vec())? {
            pipeline.execute_actions(event, &data.then.into_vec())
        } else if let Some(otherwise) = data.otherwise {
            pipeline.execute_actions(event, &otherwise.into_vec())
        } else {
            Ok(())
        }
    }
}

/// `parallel`: run independent branches
///
/// Branches run one after another on the caller's thread, each isolated from
/// the others: a failing branch does not stop the rest. With option
/// `safe: true` failures are logged and dropped; otherwise the first failure
/// is returned once every branch ran.
pub struct ParallelAction;

impl ActionBlock for ParallelAction {
    fn execute(
        &self,
        event: &EventContext,
        action: &ActionContext,
        pipeline: &Pipeline,
    ) -> EngineResult<()> {
        let branches: Vec<OneOrMany<ActionContext>> = parse(action.type_tag(), action.data())?;
        let safe = action.option_enabled(OPTION_SAFE);

        let mut first_failure: Option<EngineError> = None;
        for (index, branch) in branches.into_iter().enumerate() {
            if let Err(err) = pipeline.execute_actions(event, &branch.into_vec()) {
                warn!(branch = index, error = %err, safe, "Parallel branch failed");
                if !safe && first_failure.is_none() {
                    first_failure = Some(err);
                }
            }
        }

        match first_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FailData {
    Message(String),
    Full { message: String },
}

/// `fail`: raise a block failure carrying `message`
pub struct FailAction;

impl ActionBlock for FailAction {
    fn execute(
        &self,
        _: &EventContext,
        action: &ActionContext,
        _: &Pipeline,
    ) -> EngineResult<()> {
        let message = match action.data() {
            Value::Null => "automation failed".to_string(),
            data => match parse(action.type_tag(), data)? {
                FailData::Message(message) | FailData::Full { message } => message,
            },
        };
        Err(EngineError::block(BlockFailure::Failed(message)))
    }
}
