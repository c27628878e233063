use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, info};

use super::registry::EventRegistry;
use crate::contracts::ProcessingError;
use crate::validation::PayloadValidator;

/// Resolves, validates and dispatches inbound events.
///
/// Holds no mutable state, so concurrent calls for distinct messages are fine.
pub struct EventRouter {
    registry: EventRegistry,
    validator: Arc<dyn PayloadValidator>,
}

impl EventRouter {
    pub fn new(registry: EventRegistry, validator: Arc<dyn PayloadValidator>) -> Self {
        Self {
            registry,
            validator,
        }
    }

    pub fn registry(&self) -> &EventRegistry {
        &self.registry
    }

    pub fn routing_keys(&self) -> Vec<&'static str> {
        self.registry.routing_keys()
    }

    /// Errors returned by the processor itself pass through untouched.
    pub async fn process_event(
        &self,
        sender_static_id: &str,
        payload: Value,
        event_name: &str,
    ) -> Result<(), ProcessingError> {
        let Some(processor) = self.registry.lookup(event_name) else {
            error!(event_name, sender_static_id, "No processor registered for event");
            return Err(ProcessingError::invalid_message(format!(
                "No processor for message of type: {}",
                event_name
            )));
        };

        debug!(
            event_name,
            processor = processor.name(),
            schema = processor.event_schema().name(),
            "Validating event payload"
        );

        let validation = self
            .validator
            .validate(processor.event_schema(), &payload)
            .await;

        if validation.has_errors() {
            error!(
                event_name,
                sender_static_id,
                error_count = validation.errors().len(),
                validation_errors = %validation.summary(),
                "Event payload failed validation"
            );
            return Err(ProcessingError::invalid_message(format!(
                "Invalid event message of type: {}",
                event_name
            )));
        }

        info!(
            event_name,
            sender_static_id,
            processor = processor.name(),
            "Dispatching event"
        );

        processor.process(sender_static_id, payload).await
    }
}
