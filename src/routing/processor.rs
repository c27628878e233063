use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::contracts::ProcessingError;
use crate::validation::PayloadSchema;

/// Business-logic unit serving one or more event types.
///
/// The set returned by `event_names` must be fixed at construction time: the registry reads
/// it once at startup and never again.
#[async_trait]
pub trait EventProcessor: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    fn event_names(&self) -> &'static [&'static str];

    fn event_schema(&self) -> &PayloadSchema;

    /// Returning `ProcessingError::InvalidMessage` discards the message; any other failure
    /// gets it redelivered.
    async fn process(&self, sender_static_id: &str, event: Value) -> Result<(), ProcessingError>;
}

/// Decodes an already validated payload into the processor's message type.
pub fn decode_event<T: DeserializeOwned>(event: Value) -> Result<T, ProcessingError> {
    Ok(serde_json::from_value(event)?)
}
