use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use super::{document_schema, effects_pending, envelope_schema, note_schema, ProcessorDeps};
use crate::contracts::events::REQUEST_DOCUMENTS;
use crate::contracts::messages::DocumentRequestMessage;
use crate::contracts::ProcessingError;
use crate::notifications::{Notification, Notifier, RequiredPermission, Task, TaskType};
use crate::routing::{decode_event, EventProcessor};
use crate::store::{DocumentStore, EffectKey, IncomingRequest};
use crate::validation::{PayloadSchema, SchemaError};

/// Stores document requests sent by counterparties and raises a review task.
pub struct DocumentRequestProcessor {
    store: Arc<dyn DocumentStore>,
    notifier: Arc<dyn Notifier>,
    schema: PayloadSchema,
}

impl DocumentRequestProcessor {
    pub fn new(deps: &ProcessorDeps) -> Result<Self, SchemaError> {
        let data = json!({
            "type": "object",
            "required": ["requestId", "companyId", "types"],
            "properties": {
                "requestId": { "type": "string", "minLength": 1 },
                "companyId": { "type": "string" },
                "types": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "required": ["id", "productId", "categoryId", "name"]
                    }
                },
                "forms": { "type": "array", "items": document_schema() },
                "notes": { "type": "array", "items": note_schema() }
            }
        });

        Ok(Self {
            store: Arc::clone(&deps.store),
            notifier: Arc::clone(&deps.notifier),
            schema: PayloadSchema::compile(
                "DocumentRequestMessage",
                &envelope_schema(REQUEST_DOCUMENTS, data),
            )?,
        })
    }
}

#[async_trait]
impl EventProcessor for DocumentRequestProcessor {
    fn name(&self) -> &'static str {
        "DocumentRequestProcessor"
    }

    fn event_names(&self) -> &'static [&'static str] {
        &[REQUEST_DOCUMENTS]
    }

    fn event_schema(&self) -> &PayloadSchema {
        &self.schema
    }

    async fn process(&self, sender_static_id: &str, event: Value) -> Result<(), ProcessingError> {
        let message: DocumentRequestMessage = decode_event(event)?;
        let product_id = message.context.product_id;
        let request_id = message.data.request_id;

        info!(
            sender_static_id,
            request_id = %request_id,
            types = message.data.types.len(),
            forms = message.data.forms.len(),
            "Processing document request"
        );

        let outcome = self
            .store
            .create_incoming_request(IncomingRequest {
                id: request_id.clone(),
                product_id: product_id.clone(),
                company_id: sender_static_id.to_string(),
                types: message.data.types,
                forms: message.data.forms,
                notes: message.data.notes,
            })
            .await?;

        let effects = EffectKey::new(REQUEST_DOCUMENTS, &product_id, &request_id);
        if !effects_pending(self.store.as_ref(), outcome, &effects).await? {
            info!(request_id = %request_id, "Document request already received, skipping");
            return Ok(());
        }

        let permission = RequiredPermission {
            product_id: product_id.clone(),
            action_id: "manageDocRequest".to_string(),
        };
        let context = json!({ "type": "IncomingRequest", "id": request_id });

        self.notifier
            .create_task(Task::to_do(
                TaskType::ReviewDocumentRequest,
                format!("Document request received from {}", sender_static_id),
                sender_static_id,
                permission.clone(),
                context.clone(),
            ))
            .await?;

        self.notifier
            .send_notification(Notification {
                product_id,
                notification_type: "Documents.requestReceived",
                level: "info",
                message: format!("Document request received from {}", sender_static_id),
                required_permission: permission,
                context,
            })
            .await?;

        self.store.mark_effects_completed(&effects).await?;
        Ok(())
    }
}
