//! Interceptor that renders entry payloads before the block sees them

use std::sync::Arc;

use af_automation::{EngineError, EngineResult, Interceptor, Next, Stage};
use af_core::{EventContext, PhaseContext, PhaseKind};
use tracing::debug;

use crate::engine::TemplateEngine;

/// Priority the templating interceptor is installed at
pub const TEMPLATING_PRIORITY: i32 = 0;

/// Entry option that turns templating off for one entry
pub const OPTION_TEMPLATE: &str = "template";

/// Renders template strings in an entry's data against the event
///
/// The block receives a copy of the entry built with `change_data`; the
/// automation's own entry is never modified. Engine-private metadata is not
/// visible to templates.
///
/// Entries nested in a composite block's data are rendered when that block
/// runs them, not here.
#[derive(Clone, Default)]
pub struct TemplatingInterceptor {
    engine: Arc<TemplateEngine>,
}

impl TemplatingInterceptor {
    pub fn new(engine: Arc<TemplateEngine>) -> Self {
        Self { engine }
    }

    fn enabled_for<K: PhaseKind>(entry: &PhaseContext<K>) -> bool {
        entry
            .option(OPTION_TEMPLATE)
            .and_then(|value| value.as_bool())
            .unwrap_or(true)
    }
}

impl<K> Interceptor<K> for TemplatingInterceptor
where
    K: PhaseKind + Stage<Input = PhaseContext<K>, Output = <K as PhaseKind>::Output>,
{
    fn intercept(
        &self,
        event: &EventContext,
        input: PhaseContext<K>,
        next: Next<'_, K>,
    ) -> EngineResult<<K as PhaseKind>::Output> {
        if !Self::enabled_for(&input) || !TemplateEngine::contains_template(input.data()) {
            return next.run(event, input);
        }

        let context = event.public_event_data();
        let rendered = self
            .engine
            .render_value(input.data(), &context)
            .map_err(EngineError::block)?;

        debug!(phase = %K::PHASE, block = %input.label(), "Rendered entry templates");
        next.run(event, input.change_data(rendered))
    }
}
