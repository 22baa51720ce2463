//! Built-in blocks for autoflow
//!
//! | Phase     | Type tags                                           |
//! |-----------|-----------------------------------------------------|
//! | variable  | `constant`, `event_field`                           |
//! | trigger   | `always`, `event_type`                              |
//! | condition | `always`, `and`, `or`, `not`, `equals`, `regex`     |
//! | action    | `logger`, `set`, `sequence`, `if`, `parallel`, `fail` |
//! | result    | `value`, `variables`                                |
//!
//! Composite blocks (`and`, `or`, `not`, `sequence`, `if`, `parallel`) run
//! their nested entries through the pipeline, so interceptors see them too.

mod action;
mod condition;
mod data;
mod error;
mod trigger;
mod variable;

pub use action::{
    FailAction, IfAction, LoggerAction, ParallelAction, SequenceAction, SetAction, OPTION_SAFE,
};
pub use condition::{
    AlwaysCondition, AndCondition, EqualsCondition, NotCondition, OrCondition, RegexCondition,
};
pub use data::{lookup, OneOrMany};
pub use error::BlockFailure;
pub use trigger::{AlwaysTrigger, EventTypeTrigger};
pub use variable::{ConstantVariable, EventFieldVariable, ValueResult, VariablesResult};

use af_automation::BlockRegistry;
use tracing::debug;

/// Register every built-in block
pub fn register_builtin(registry: &BlockRegistry) {
    registry.register_variable("constant", ConstantVariable);
    registry.register_variable("event_field", EventFieldVariable);

    registry.register_trigger("always", AlwaysTrigger);
    registry.register_trigger("event_type", EventTypeTrigger);

    registry.register_condition("always", AlwaysCondition);
    registry.register_condition("and", AndCondition);
    registry.register_condition("or", OrCondition);
    registry.register_condition("not", NotCondition);
    registry.register_condition("equals", EqualsCondition);
    registry.register_condition("regex", RegexCondition::new());

    registry.register_action("logger", LoggerAction);
    registry.register_action("set", SetAction);
    registry.register_action("sequence", SequenceAction);
    registry.register_action("if", IfAction);
    registry.register_action("parallel", ParallelAction);
    registry.register_action("fail", FailAction);

    registry.register_result("value", ValueResult);
    registry.register_result("variables", VariablesResult);

    debug!("Registered built-in blocks");
}
