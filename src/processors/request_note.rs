use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use super::{effects_pending, envelope_schema, note_schema, ProcessorDeps};
use crate::contracts::events::REQUEST_DOCUMENTS_NOTE;
use crate::contracts::messages::{DocumentRequestNoteMessage, NoteOrigin};
use crate::contracts::ProcessingError;
use crate::messaging::redaction::REDACTED;
use crate::notifications::{Notification, Notifier, RequiredPermission};
use crate::routing::{decode_event, EventProcessor};
use crate::store::{DocumentStore, EffectKey};
use crate::validation::{PayloadSchema, SchemaError};

/// Appends notes exchanged on a document request.
pub struct DocumentRequestNoteProcessor {
    store: Arc<dyn DocumentStore>,
    notifier: Arc<dyn Notifier>,
    schema: PayloadSchema,
}

impl DocumentRequestNoteProcessor {
    pub fn new(deps: &ProcessorDeps) -> Result<Self, SchemaError> {
        let data = json!({
            "type": "object",
            "required": ["requestId", "origin", "note"],
            "properties": {
                "requestId": { "type": "string", "minLength": 1 },
                "origin": { "enum": ["OutgoingRequest", "IncomingRequest"] },
                "note": note_schema()
            }
        });

        Ok(Self {
            store: Arc::clone(&deps.store),
            notifier: Arc::clone(&deps.notifier),
            schema: PayloadSchema::compile(
                "DocumentRequestNoteMessage",
                &envelope_schema(REQUEST_DOCUMENTS_NOTE, data),
            )?,
        })
    }
}

/// The sender names the request from its own side; here it is the opposite one.
fn local_origin(sender_origin: NoteOrigin) -> NoteOrigin {
    match sender_origin {
        NoteOrigin::OutgoingRequest => NoteOrigin::IncomingRequest,
        NoteOrigin::IncomingRequest => NoteOrigin::OutgoingRequest,
    }
}

#[async_trait]
impl EventProcessor for DocumentRequestNoteProcessor {
    fn name(&self) -> &'static str {
        "DocumentRequestNoteProcessor"
    }

    fn event_names(&self) -> &'static [&'static str] {
        &[REQUEST_DOCUMENTS_NOTE]
    }

    fn event_schema(&self) -> &PayloadSchema {
        &self.schema
    }

    async fn process(&self, sender_static_id: &str, event: Value) -> Result<(), ProcessingError> {
        let message: DocumentRequestNoteMessage = decode_event(event)?;
        let product_id = message.context.product_id;
        let data = message.data;
        let origin = local_origin(data.origin);

        info!(
            sender_static_id,
            request_id = %data.request_id,
            origin = ?origin,
            note_date = %data.note.date,
            note_content = REDACTED,
            "Processing document request note"
        );

        let effects = EffectKey::new(
            REQUEST_DOCUMENTS_NOTE,
            &product_id,
            &format!(
                "{:?}:{}:{}:{}",
                origin, data.request_id, data.note.date, data.note.content
            ),
        );

        let outcome = self
            .store
            .add_request_note(&product_id, origin, &data.request_id, data.note)
            .await?;

        if !effects_pending(self.store.as_ref(), outcome, &effects).await? {
            info!(request_id = %data.request_id, "Duplicated note, ignoring it");
            return Ok(());
        }

        self.notifier
            .send_notification(Notification {
                product_id: product_id.clone(),
                notification_type: "Documents.requestNoteReceived",
                level: "info",
                message: format!("New note on document request from {}", sender_static_id),
                required_permission: RequiredPermission {
                    product_id,
                    action_id: "manageDocRequest".to_string(),
                },
                context: json!({ "type": format!("{:?}", origin), "id": data.request_id }),
            })
            .await?;

        self.store.mark_effects_completed(&effects).await?;
        Ok(())
    }
}
