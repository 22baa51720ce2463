//! Jinja2-compatible templating for autoflow
//!
//! [`TemplatingInterceptor`] renders every template string in an entry's data
//! against the event's merged data before the block runs:
//!
//! ```yaml
//! action:
//!   - type: logger
//!     data:
//!       message: "Motion in {{ room }} at level {{ brightness }}"
//! ```
//!
//! Strings that render to valid JSON become the parsed value, so
//! `"{{ brightness }}"` hands the block a number. Set the entry option
//! `template: false` to pass data through untouched.

mod engine;
mod error;
mod interceptor;

pub use engine::TemplateEngine;
pub use error::{TemplateError, TemplateResult};
pub use interceptor::{TemplatingInterceptor, OPTION_TEMPLATE, TEMPLATING_PRIORITY};

use af_automation::PipelineBuilder;

/// Install the templating interceptor on all phase chains
pub fn install(builder: PipelineBuilder, engine: TemplateEngine) -> PipelineBuilder {
    builder.phase_interceptor(
        TEMPLATING_PRIORITY,
        TemplatingInterceptor::new(std::sync::Arc::new(engine)),
    )
}
