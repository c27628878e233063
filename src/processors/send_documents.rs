use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{info, instrument};

use super::{document_schema, effects_pending, envelope_schema, ProcessorDeps};
use crate::contracts::events::{document_received_key, SEND_DOCUMENTS};
use crate::contracts::messages::{DocumentData, DocumentReceivedMessage, SendDocumentsMessage};
use crate::contracts::ProcessingError;
use crate::messaging::{publish_or_drop, MessagePublisher, PublishOptions};
use crate::metrics::Metrics;
use crate::notifications::{Notification, Notifier, RequiredPermission, Task, TaskType};
use crate::routing::{decode_event, EventProcessor};
use crate::store::{DocumentStore, EffectKey, ReceivedDocuments};
use crate::validation::{PayloadSchema, SchemaError};

/// Stores documents shared by a counterparty and fans the receipt out internally.
pub struct SendDocumentsProcessor {
    store: Arc<dyn DocumentStore>,
    notifier: Arc<dyn Notifier>,
    publisher: Arc<dyn MessagePublisher>,
    metrics: Option<Arc<Metrics>>,
    schema: PayloadSchema,
}

impl SendDocumentsProcessor {
    pub fn new(deps: &ProcessorDeps) -> Result<Self, SchemaError> {
        let data = json!({
            "type": "object",
            "required": ["documents"],
            "properties": {
                "documents": { "type": "array", "minItems": 1, "items": document_schema() },
                "shareId": { "type": "string" },
                "reviewNotRequired": { "type": "boolean" },
                "documentShareNotification": { "type": "boolean" },
                "context": { "type": "object" }
            }
        });

        Ok(Self {
            store: Arc::clone(&deps.store),
            notifier: Arc::clone(&deps.notifier),
            publisher: Arc::clone(&deps.internal_publisher),
            metrics: deps.metrics.clone(),
            schema: PayloadSchema::compile("SendDocumentsMessage", &envelope_schema(SEND_DOCUMENTS, data))?,
        })
    }

    async fn raise_review_task(
        &self,
        sender_static_id: &str,
        product_id: &str,
        received_id: &str,
        count: usize,
    ) -> Result<(), ProcessingError> {
        self.notifier
            .create_task(Task::to_do(
                TaskType::DocumentsReview,
                format!("{} document(s) received from {}", count, sender_static_id),
                sender_static_id,
                RequiredPermission {
                    product_id: product_id.to_string(),
                    action_id: "reviewDoc".to_string(),
                },
                json!({ "receivedDocumentsId": received_id }),
            ))
            .await
    }

    async fn notify_shared(
        &self,
        sender_static_id: &str,
        product_id: &str,
        documents: &[DocumentData],
    ) -> Result<(), ProcessingError> {
        for document in documents {
            self.notifier
                .send_notification(Notification {
                    product_id: product_id.to_string(),
                    notification_type: "Documents.documentShared",
                    level: "info",
                    message: format!("{} shared document {}", sender_static_id, document.name),
                    required_permission: RequiredPermission {
                        product_id: product_id.to_string(),
                        action_id: "reviewDoc".to_string(),
                    },
                    context: json!({ "documentId": document.id, "typeId": document.type_id }),
                })
                .await?;
        }
        Ok(())
    }
}

/// Copies documents for the internal fan-out without their content.
fn without_content(documents: &[DocumentData]) -> Vec<DocumentData> {
    documents
        .iter()
        .map(|document| DocumentData {
            content: None,
            metadata: None,
            ..document.clone()
        })
        .collect()
}

#[async_trait]
impl EventProcessor for SendDocumentsProcessor {
    fn name(&self) -> &'static str {
        "SendDocumentsProcessor"
    }

    fn event_names(&self) -> &'static [&'static str] {
        &[SEND_DOCUMENTS]
    }

    fn event_schema(&self) -> &PayloadSchema {
        &self.schema
    }

    #[instrument(skip(self, event), fields(processor = "SendDocumentsProcessor"))]
    async fn process(&self, sender_static_id: &str, event: Value) -> Result<(), ProcessingError> {
        let message: SendDocumentsMessage = decode_event(event)?;
        let context = message.context;
        let data = message.data;
        let product_id = context.product_id.clone();

        info!(
            share_id = data.share_id.as_deref().unwrap_or("-"),
            documents = data.documents.len(),
            review_not_required = data.review_not_required,
            "Processing shared documents"
        );

        let received_id = data
            .share_id
            .clone()
            .or_else(|| context.request_id.clone())
            .unwrap_or_default();

        let outcome = self
            .store
            .store_received_documents(ReceivedDocuments {
                product_id: product_id.clone(),
                company_id: sender_static_id.to_string(),
                request_id: context.request_id.clone(),
                share_id: data.share_id.clone(),
                documents: data.documents.clone(),
                reviews: Vec::new(),
            })
            .await?;

        let effects = EffectKey::new(
            SEND_DOCUMENTS,
            &product_id,
            &format!("{}:{}", sender_static_id, received_id),
        );
        if !effects_pending(self.store.as_ref(), outcome, &effects).await? {
            info!(received_id = %received_id, "Documents already received, skipping");
            return Ok(());
        }

        if !data.review_not_required {
            self.raise_review_task(sender_static_id, &product_id, &received_id, data.documents.len())
                .await?;
        }

        if data.document_share_notification {
            self.notify_shared(sender_static_id, &product_id, &data.documents)
                .await?;
        }

        let received = DocumentReceivedMessage {
            context,
            documents: without_content(&data.documents),
            sender_static_id: sender_static_id.to_string(),
        };
        let body = serde_json::to_value(&received)
            .map_err(|e| ProcessingError::transient(format!("Failed to encode received documents: {}", e)))?;

        publish_or_drop(
            self.publisher.as_ref(),
            self.metrics.as_ref(),
            &document_received_key(&product_id),
            &body,
            PublishOptions::default(),
        )
        .await?;

        self.store.mark_effects_completed(&effects).await?;
        Ok(())
    }
}
