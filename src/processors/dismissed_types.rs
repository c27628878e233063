use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use super::{envelope_schema, ProcessorDeps};
use crate::contracts::events::REQUEST_DOCUMENTS_DISMISSED_TYPES;
use crate::contracts::messages::DismissedTypesMessage;
use crate::contracts::ProcessingError;
use crate::notifications::{Notification, Notifier, RequiredPermission};
use crate::routing::{decode_event, EventProcessor};
use crate::store::DocumentStore;
use crate::validation::{PayloadSchema, SchemaError};

/// Marks document types the counterparty declined to provide on one of our requests.
pub struct DismissedTypesProcessor {
    store: Arc<dyn DocumentStore>,
    notifier: Arc<dyn Notifier>,
    schema: PayloadSchema,
}

impl DismissedTypesProcessor {
    pub fn new(deps: &ProcessorDeps) -> Result<Self, SchemaError> {
        let data = json!({
            "type": "object",
            "required": ["requestId", "dismissedTypes"],
            "properties": {
                "requestId": { "type": "string", "minLength": 1 },
                "dismissedTypes": {
                    "type": "array",
                    "minItems": 1,
                    "items": { "type": "string", "minLength": 1 }
                }
            }
        });

        Ok(Self {
            store: Arc::clone(&deps.store),
            notifier: Arc::clone(&deps.notifier),
            schema: PayloadSchema::compile(
                "DismissedTypesMessage",
                &envelope_schema(REQUEST_DOCUMENTS_DISMISSED_TYPES, data),
            )?,
        })
    }
}

#[async_trait]
impl EventProcessor for DismissedTypesProcessor {
    fn name(&self) -> &'static str {
        "DismissedTypesProcessor"
    }

    fn event_names(&self) -> &'static [&'static str] {
        &[REQUEST_DOCUMENTS_DISMISSED_TYPES]
    }

    fn event_schema(&self) -> &PayloadSchema {
        &self.schema
    }

    async fn process(&self, sender_static_id: &str, event: Value) -> Result<(), ProcessingError> {
        let message: DismissedTypesMessage = decode_event(event)?;
        let product_id = message.context.product_id;
        let data = message.data;

        info!(
            sender_static_id,
            request_id = %data.request_id,
            dismissed = data.dismissed_types.len(),
            "Processing dismissed document types"
        );

        self.store
            .dismiss_request_types(&product_id, &data.request_id, &data.dismissed_types)
            .await?;

        self.notifier
            .send_notification(Notification {
                product_id: product_id.clone(),
                notification_type: "Documents.typesDismissed",
                level: "info",
                message: format!(
                    "{} dismissed {} requested document type(s)",
                    sender_static_id,
                    data.dismissed_types.len()
                ),
                required_permission: RequiredPermission {
                    product_id,
                    action_id: "manageDocRequest".to_string(),
                },
                context: json!({ "type": "OutgoingRequest", "id": data.request_id }),
            })
            .await
    }
}
