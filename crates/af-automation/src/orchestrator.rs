//! Automation orchestrator
//!
//! Holds the registered automations and drives each dispatched event through
//! the [`Pipeline`]. Registration and dispatch may happen concurrently from
//! any number of threads: dispatch works on a snapshot of the registered set
//! taken when it starts.

use std::sync::{Arc, PoisonError, RwLock};

use af_core::events::{
    AutomationProcessedData, AutomationRegisteredData, AutomationRemovedData,
    AutomationsRemovedData, EventReceivedData,
};
use af_core::EventContext;
use af_event_bus::{typed_event, EventPublisher};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::automation::{Automation, AutomationDefinition};
use crate::error::{EngineError, EngineResult};
use crate::pipeline::Pipeline;
use crate::result::AutomationResult;

/// How dispatch reacts to an automation failing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// The first failure aborts dispatch and is returned to the caller
    #[default]
    Strict,

    /// Failures are logged and reported as non-executed results
    Resilient,
}

/// Registered automations plus the pipeline they run through
pub struct AutomationOrchestrator {
    pipeline: Arc<Pipeline>,
    automations: RwLock<Vec<Arc<Automation>>>,
    publisher: Arc<dyn EventPublisher>,
    mode: DispatchMode,
}

impl AutomationOrchestrator {
    /// Create an orchestrator in strict dispatch mode
    pub fn new(pipeline: Arc<Pipeline>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            pipeline,
            automations: RwLock::new(Vec::new()),
            publisher,
            mode: DispatchMode::default(),
        }
    }

    /// Set the dispatch mode
    pub fn with_mode(mut self, mode: DispatchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    pub fn mode(&self) -> DispatchMode {
        self.mode
    }

    /// Add an automation to the registered set
    ///
    /// Ids are unique within the orchestrator; registering a second
    /// automation under a taken id fails and leaves the set unchanged.
    #[instrument(skip(self, automation), fields(automation_id = %automation.id()))]
    pub fn register(&self, automation: Automation) -> EngineResult<Arc<Automation>> {
        let automation = Arc::new(automation);
        {
            let mut automations = self
                .automations
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if automations.iter().any(|registered| registered.id() == automation.id()) {
                warn!("Automation id is already registered");
                return Err(EngineError::DuplicateAutomation(automation.id().to_string()));
            }
            automations.push(automation.clone());
        }

        info!("Registered automation: {}", automation.display_name());
        self.publisher.publish(typed_event(
            AutomationRegisteredData(automation.reference()),
            Default::default(),
        ));
        Ok(automation)
    }

    /// Validate a definition and register the resulting automation
    pub fn register_definition(
        &self,
        definition: AutomationDefinition,
    ) -> EngineResult<Arc<Automation>> {
        self.register(Automation::from_definition(definition)?)
    }

    /// Remove an automation by id
    ///
    /// Returns false when no automation with that id was registered.
    #[instrument(skip(self, automation), fields(automation_id = %automation.id()))]
    pub fn remove(&self, automation: &Automation) -> bool {
        let removed = {
            let mut automations = self
                .automations
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let before = automations.len();
            automations.retain(|registered| registered.id() != automation.id());
            before - automations.len()
        };

        if removed == 0 {
            debug!("Automation was not registered");
            return false;
        }

        info!("Removed automation: {}", automation.display_name());
        self.publisher.publish(typed_event(
            AutomationRemovedData(automation.reference()),
            Default::default(),
        ));
        true
    }

    /// Remove every registered automation, returning how many there were
    #[instrument(skip(self))]
    pub fn remove_all(&self) -> usize {
        let count = {
            let mut automations = self
                .automations
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let count = automations.len();
            automations.clear();
            count
        };

        info!("Removed {} automations", count);
        self.publisher.publish(typed_event(
            AutomationsRemovedData { count },
            Default::default(),
        ));
        count
    }

    /// Snapshot of the registered automations
    pub fn automations(&self) -> Vec<Arc<Automation>> {
        self.automations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Get automation count
    pub fn count(&self) -> usize {
        self.automations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Run every registered automation against `event`
    ///
    /// Automations registered or removed while this runs do not affect it.
    /// In strict mode the first failing automation aborts dispatch; in
    /// resilient mode it is reported in its result and the rest still run.
    pub fn dispatch(&self, event: &EventContext) -> EngineResult<Vec<AutomationResult>> {
        let automations = self.automations();
        debug!(
            event_type = %event.event_type(),
            context_id = %event.id(),
            automations = automations.len(),
            "Dispatching event"
        );

        self.publisher.publish(event.event().clone());
        self.publisher.publish(typed_event(
            EventReceivedData {
                event_type: event.event_type().clone(),
                context_id: event.id().to_string(),
                data: event.public_event_data(),
            },
            event.event().context.child(),
        ));

        let mut results = Vec::with_capacity(automations.len());
        for automation in automations {
            let result = match self.execute_automation(automation.clone(), event) {
                Ok(result) => result,
                Err(err) if self.mode == DispatchMode::Resilient => {
                    warn!(
                        automation_id = %automation.id(),
                        error = %err,
                        "Automation failed, continuing dispatch"
                    );
                    AutomationResult::from_error(automation, event.clone(), &err)
                }
                Err(err) => return Err(err),
            };

            self.publish_processed(&result);
            results.push(result);
        }

        Ok(results)
    }

    /// Run one automation against `event`, propagating any failure
    pub fn execute_automation(
        &self,
        automation: Arc<Automation>,
        event: &EventContext,
    ) -> EngineResult<AutomationResult> {
        self.pipeline.execute(event, automation)
    }

    /// Run an automation without registering it
    ///
    /// Goes through the same pipeline as dispatch. Failures are reported as
    /// a non-executed result carrying the error message.
    pub fn execute_once(&self, automation: Automation, event: &EventContext) -> AutomationResult {
        let automation = Arc::new(automation);
        match self.pipeline.execute(event, automation.clone()) {
            Ok(result) => result,
            Err(err) => {
                debug!(automation_id = %automation.id(), error = %err, "One-shot execution failed");
                AutomationResult::from_error(automation, event.clone(), &err)
            }
        }
    }

    /// Build an automation from `definition` and run it once
    ///
    /// Only an invalid definition is returned as an error; execution
    /// failures are reported in the result like [`Self::execute_once`].
    pub fn execute_definition_once(
        &self,
        definition: AutomationDefinition,
        event: &EventContext,
    ) -> EngineResult<AutomationResult> {
        Ok(self.execute_once(Automation::from_definition(definition)?, event))
    }

    fn publish_processed(&self, result: &AutomationResult) {
        self.publisher.publish(typed_event(
            AutomationProcessedData {
                automation_id: result.automation.id().to_string(),
                context_id: result.event.id().to_string(),
                executed: result.executed,
                result: result.result.clone(),
                error: result.error.clone(),
            },
            result.event.event().context.child(),
        ));
    }
}
