//! Tasks and notifications raised for the users of this node.
//!
//! The notification service consumes them from the internal exchange.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::contracts::events::{NOTIFICATION_CREATE, TASK_CREATE};
use crate::contracts::ProcessingError;
use crate::messaging::{publish_or_drop, MessagePublisher, PublishOptions};
use crate::metrics::Metrics;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequiredPermission {
    pub product_id: String,
    pub action_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TaskType {
    #[serde(rename = "KYC.ReviewDocuments")]
    DocumentsReview,
    #[serde(rename = "KYC.DocRequest")]
    ReviewDocumentRequest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub summary: String,
    pub task_type: TaskType,
    pub status: &'static str,
    pub counterparty_static_id: String,
    pub required_permission: RequiredPermission,
    pub context: Value,
}

impl Task {
    pub fn to_do(
        task_type: TaskType,
        summary: String,
        counterparty_static_id: &str,
        required_permission: RequiredPermission,
        context: Value,
    ) -> Self {
        Self {
            summary,
            task_type,
            status: "To Do",
            counterparty_static_id: counterparty_static_id.to_string(),
            required_permission,
            context,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub product_id: String,
    #[serde(rename = "type")]
    pub notification_type: &'static str,
    pub level: &'static str,
    pub message: String,
    pub required_permission: RequiredPermission,
    pub context: Value,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn create_task(&self, task: Task) -> Result<(), ProcessingError>;

    async fn send_notification(&self, notification: Notification) -> Result<(), ProcessingError>;
}

/// Publishes tasks and notifications on the internal exchange.
pub struct BrokerNotifier {
    publisher: Arc<dyn MessagePublisher>,
    metrics: Option<Arc<Metrics>>,
}

impl BrokerNotifier {
    pub fn new(publisher: Arc<dyn MessagePublisher>, metrics: Option<Arc<Metrics>>) -> Self {
        Self { publisher, metrics }
    }

    async fn publish<T: Serialize + Sync>(&self, routing_key: &str, body: &T) -> Result<(), ProcessingError> {
        let message = serde_json::to_value(body)
            .map_err(|e| ProcessingError::transient(format!("Failed to encode {}: {}", routing_key, e)))?;

        publish_or_drop(
            self.publisher.as_ref(),
            self.metrics.as_ref(),
            routing_key,
            &message,
            PublishOptions::default(),
        )
        .await
    }
}

#[async_trait]
impl Notifier for BrokerNotifier {
    async fn create_task(&self, task: Task) -> Result<(), ProcessingError> {
        self.publish(TASK_CREATE, &task).await
    }

    async fn send_notification(&self, notification: Notification) -> Result<(), ProcessingError> {
        self.publish(NOTIFICATION_CREATE, &notification).await
    }
}
