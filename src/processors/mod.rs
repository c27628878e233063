//! Document-exchange processors and their payload schemas.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::contracts::ProcessingError;
use crate::messaging::MessagePublisher;
use crate::metrics::Metrics;
use crate::notifications::Notifier;
use crate::routing::EventProcessor;
use crate::store::{DocumentStore, EffectKey, WriteOutcome};
use crate::validation::SchemaError;

pub mod dismissed_types;
pub mod document_feedback;
pub mod document_request;
pub mod request_note;
pub mod send_documents;
pub mod transaction_result;

pub use dismissed_types::DismissedTypesProcessor;
pub use document_feedback::DocumentFeedbackProcessor;
pub use document_request::DocumentRequestProcessor;
pub use request_note::DocumentRequestNoteProcessor;
pub use send_documents::SendDocumentsProcessor;
pub use transaction_result::TransactionResultProcessor;

/// Collaborators shared by the processors.
#[derive(Clone)]
pub struct ProcessorDeps {
    pub store: Arc<dyn DocumentStore>,
    pub notifier: Arc<dyn Notifier>,
    /// Internal exchange, for fan-out to other services of this node.
    pub internal_publisher: Arc<dyn MessagePublisher>,
    pub metrics: Option<Arc<Metrics>>,
}

/// Processors for events sent by counterparty nodes.
pub fn document_processors(deps: &ProcessorDeps) -> Result<Vec<Arc<dyn EventProcessor>>, SchemaError> {
    let processors: Vec<Arc<dyn EventProcessor>> = vec![
        Arc::new(DocumentRequestProcessor::new(deps)?),
        Arc::new(DocumentRequestNoteProcessor::new(deps)?),
        Arc::new(DismissedTypesProcessor::new(deps)?),
        Arc::new(SendDocumentsProcessor::new(deps)?),
        Arc::new(DocumentFeedbackProcessor::new(deps)?),
    ];
    Ok(processors)
}

/// Processors for results published by the transaction signer.
pub fn transaction_processors(deps: &ProcessorDeps) -> Result<Vec<Arc<dyn EventProcessor>>, SchemaError> {
    let processors: Vec<Arc<dyn EventProcessor>> =
        vec![Arc::new(TransactionResultProcessor::new(deps)?)];
    Ok(processors)
}

/// Whether the follow-ups of a record still have to run. A duplicate write only skips them
/// once an earlier delivery marked them completed.
pub(crate) async fn effects_pending(
    store: &dyn DocumentStore,
    outcome: WriteOutcome,
    key: &EffectKey,
) -> Result<bool, ProcessingError> {
    match outcome {
        WriteOutcome::Created => Ok(true),
        WriteOutcome::Duplicate => Ok(!store.effects_completed(key).await?),
    }
}

/// Wraps a `data` schema in the shared `{ version, messageType, context, data }` envelope.
pub(crate) fn envelope_schema(message_type: &str, data: Value) -> Value {
    json!({
        "type": "object",
        "required": ["version", "messageType", "context", "data"],
        "properties": {
            "version": { "type": "integer", "minimum": 1 },
            "messageType": { "const": message_type },
            "context": {
                "type": "object",
                "required": ["productId"],
                "properties": {
                    "productId": { "type": "string", "minLength": 1 },
                    "requestId": { "type": "string" }
                }
            },
            "data": data
        }
    })
}

pub(crate) fn note_schema() -> Value {
    json!({
        "type": "object",
        "required": ["date", "sender", "content"],
        "properties": {
            "date": { "type": "string" },
            "sender": { "type": "string" },
            "content": { "type": "string" }
        }
    })
}

pub(crate) fn document_schema() -> Value {
    json!({
        "type": "object",
        "required": ["id", "name", "productId", "categoryId", "typeId"],
        "properties": {
            "id": { "type": "string", "minLength": 1 },
            "name": { "type": "string" },
            "productId": { "type": "string" },
            "categoryId": { "type": "string" },
            "typeId": { "type": "string" },
            "hash": { "type": "string" }
        }
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use serde_json::Value;

    use super::ProcessorDeps;
    use crate::contracts::ProcessingError;
    use crate::messaging::{MessagePublisher, PublishError, PublishOptions, PublishReceipt};
    use crate::notifications::{Notification, Notifier, Task};
    use crate::store::InMemoryDocumentStore;

    #[derive(Default)]
    pub struct RecordingNotifier {
        pub tasks: Mutex<Vec<Task>>,
        pub notifications: Mutex<Vec<Notification>>,
        /// Number of upcoming calls, tasks and notifications alike, that fail transiently.
        pub failures: AtomicUsize,
    }

    impl RecordingNotifier {
        pub fn fail_next(&self, calls: usize) {
            self.failures.store(calls, Ordering::SeqCst);
        }

        fn outage(&self) -> Result<(), ProcessingError> {
            let failing = self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                Err(ProcessingError::transient("notification service unavailable"))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn create_task(&self, task: Task) -> Result<(), ProcessingError> {
            self.outage()?;
            self.tasks.lock().unwrap().push(task);
            Ok(())
        }

        async fn send_notification(&self, notification: Notification) -> Result<(), ProcessingError> {
            self.outage()?;
            self.notifications.lock().unwrap().push(notification);
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct RecordingPublisher {
        pub published: Mutex<Vec<(String, Value)>>,
    }

    #[async_trait]
    impl MessagePublisher for RecordingPublisher {
        async fn publish_critical(
            &self,
            routing_key: &str,
            message: &Value,
            _options: PublishOptions,
        ) -> Result<PublishReceipt, PublishError> {
            self.published
                .lock()
                .unwrap()
                .push((routing_key.to_string(), message.clone()));
            Ok(PublishReceipt {
                accepted: true,
                message_id: "out-1".to_string(),
            })
        }
    }

    pub struct Fixture {
        pub store: Arc<InMemoryDocumentStore>,
        pub notifier: Arc<RecordingNotifier>,
        pub publisher: Arc<RecordingPublisher>,
        pub deps: ProcessorDeps,
    }

    pub fn fixture() -> Fixture {
        let store = Arc::new(InMemoryDocumentStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let publisher = Arc::new(RecordingPublisher::default());
        let deps = ProcessorDeps {
            store: store.clone(),
            notifier: notifier.clone(),
            internal_publisher: publisher.clone(),
            metrics: None,
        };

        Fixture {
            store,
            notifier,
            publisher,
            deps,
        }
    }
}
