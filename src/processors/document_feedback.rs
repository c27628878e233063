use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use super::{envelope_schema, ProcessorDeps};
use crate::contracts::events::SEND_DOCUMENT_FEEDBACK;
use crate::contracts::messages::{DocumentFeedbackMessage, FeedbackStatus};
use crate::contracts::ProcessingError;
use crate::notifications::{Notification, Notifier, RequiredPermission};
use crate::routing::{decode_event, EventProcessor};
use crate::store::{DocumentStore, SharedDocumentFeedback};
use crate::validation::{PayloadSchema, SchemaError};

/// Records the counterparty's review of documents this node shared.
pub struct DocumentFeedbackProcessor {
    store: Arc<dyn DocumentStore>,
    notifier: Arc<dyn Notifier>,
    schema: PayloadSchema,
}

impl DocumentFeedbackProcessor {
    pub fn new(deps: &ProcessorDeps) -> Result<Self, SchemaError> {
        let data = json!({
            "type": "object",
            "required": ["documents"],
            "properties": {
                "shareId": { "type": "string" },
                "documents": {
                    "type": "array",
                    "minItems": 1,
                    "items": {
                        "type": "object",
                        "required": ["documentId", "status"],
                        "properties": {
                            "documentId": { "type": "string", "minLength": 1 },
                            "status": { "enum": ["pending", "accepted", "rejected"] },
                            "note": { "type": "string" }
                        }
                    }
                }
            }
        });

        Ok(Self {
            store: Arc::clone(&deps.store),
            notifier: Arc::clone(&deps.notifier),
            schema: PayloadSchema::compile(
                "DocumentFeedbackMessage",
                &envelope_schema(SEND_DOCUMENT_FEEDBACK, data),
            )?,
        })
    }
}

#[async_trait]
impl EventProcessor for DocumentFeedbackProcessor {
    fn name(&self) -> &'static str {
        "DocumentFeedbackProcessor"
    }

    fn event_names(&self) -> &'static [&'static str] {
        &[SEND_DOCUMENT_FEEDBACK]
    }

    fn event_schema(&self) -> &PayloadSchema {
        &self.schema
    }

    async fn process(&self, sender_static_id: &str, event: Value) -> Result<(), ProcessingError> {
        let message: DocumentFeedbackMessage = decode_event(event)?;
        let product_id = message.context.product_id;
        let documents = message.data.documents;
        let rejected = documents
            .iter()
            .filter(|d| d.status == FeedbackStatus::Rejected)
            .count();

        // Feedback notes are free text from the counterparty; only counts are logged.
        info!(
            sender_static_id,
            documents = documents.len(),
            rejected,
            "Processing document feedback"
        );

        let feedback: Vec<SharedDocumentFeedback> = documents
            .iter()
            .map(|document| SharedDocumentFeedback {
                document_id: document.document_id.clone(),
                status: document.status,
                note: document.note.clone(),
            })
            .collect();
        self.store
            .record_feedback(&product_id, sender_static_id, feedback)
            .await?;

        let level = if rejected > 0 { "warning" } else { "info" };
        let document_ids: Vec<&str> = documents.iter().map(|d| d.document_id.as_str()).collect();

        self.notifier
            .send_notification(Notification {
                product_id: product_id.clone(),
                notification_type: "Documents.feedbackReceived",
                level,
                message: format!(
                    "{} reviewed {} shared document(s), {} rejected",
                    sender_static_id,
                    documents.len(),
                    rejected
                ),
                required_permission: RequiredPermission {
                    product_id,
                    action_id: "shareDoc".to_string(),
                },
                context: json!({ "shareId": message.data.share_id, "documentIds": document_ids }),
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::test_support::fixture;
    use crate::store::SharedDocument;

    fn feedback(status: &str) -> Value {
        json!({
            "version": 1,
            "messageType": "SEND_DOCUMENT_FEEDBACK",
            "context": { "productId": "kyc" },
            "data": {
                "shareId": "share-1",
                "documents": [{ "documentId": "doc-1", "status": status, "note": "blurry scan" }]
            }
        })
    }

    async fn share_with(fixture: &crate::processors::test_support::Fixture, company_id: &str) {
        fixture
            .store
            .insert_shared_document(SharedDocument {
                product_id: "kyc".to_string(),
                document_id: "doc-1".to_string(),
                company_id: company_id.to_string(),
                feedback: None,
            })
            .await;
    }

    #[tokio::test]
    async fn records_rejection_and_warns() {
        let fixture = fixture();
        share_with(&fixture, "company-b").await;
        let processor = DocumentFeedbackProcessor::new(&fixture.deps).unwrap();

        processor.process("company-b", feedback("rejected")).await.unwrap();

        let document = fixture.store.shared_document("kyc", "doc-1").await.unwrap();
        let recorded = document.feedback.unwrap();
        assert_eq!(recorded.status, FeedbackStatus::Rejected);
        assert_eq!(recorded.note, "blurry scan");

        let notifications = fixture.notifier.notifications.lock().unwrap();
        assert_eq!(notifications[0].level, "warning");
    }

    #[tokio::test]
    async fn feedback_from_other_company_is_permanent() {
        let fixture = fixture();
        share_with(&fixture, "company-b").await;
        let processor = DocumentFeedbackProcessor::new(&fixture.deps).unwrap();

        let err = processor
            .process("company-c", feedback("accepted"))
            .await
            .unwrap_err();

        assert!(err.is_permanent());
    }

    #[tokio::test]
    async fn unknown_document_in_batch_leaves_known_ones_untouched() {
        let fixture = fixture();
        share_with(&fixture, "company-b").await;
        let processor = DocumentFeedbackProcessor::new(&fixture.deps).unwrap();
        let event = json!({
            "version": 1,
            "messageType": "SEND_DOCUMENT_FEEDBACK",
            "context": { "productId": "kyc" },
            "data": {
                "documents": [
                    { "documentId": "doc-1", "status": "accepted" },
                    { "documentId": "doc-2", "status": "rejected" }
                ]
            }
        });

        let err = processor.process("company-b", event).await.unwrap_err();

        assert!(err.is_permanent());
        let document = fixture.store.shared_document("kyc", "doc-1").await.unwrap();
        assert!(document.feedback.is_none());
        assert!(fixture.notifier.notifications.lock().unwrap().is_empty());
    }
}
