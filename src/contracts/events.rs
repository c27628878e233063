//! Event type identifiers. They double as AMQP routing keys and as registry keys.

pub const REQUEST_DOCUMENTS: &str = "REQUEST_DOCUMENTS";
pub const REQUEST_DOCUMENTS_NOTE: &str = "REQUEST_DOCUMENTS_NOTE";
pub const REQUEST_DOCUMENTS_DISMISSED_TYPES: &str = "REQUEST_DOCUMENTS_DISMISSED_TYPES";
pub const SEND_DOCUMENTS: &str = "SEND_DOCUMENTS";
pub const SEND_DOCUMENT_FEEDBACK: &str = "SEND_DOCUMENT_FEEDBACK";
pub const BLOCKCHAIN_TRANSACTION_SUCCESS: &str = "BLOCKCHAIN_TRANSACTION_SUCCESS";
pub const BLOCKCHAIN_TRANSACTION_ERROR: &str = "BLOCKCHAIN_TRANSACTION_ERROR";

/// Routing key prefix for the internal fan-out published after documents are received.
pub const DOCUMENT_RECEIVED_PREFIX: &str = "INTERNAL.DOCUMENT.Received";

pub const TASK_CREATE: &str = "INTERNAL.TASK.Create";
pub const NOTIFICATION_CREATE: &str = "INTERNAL.NOTIFICATION.Create";

pub fn document_received_key(product_id: &str) -> String {
    format!("{}.{}", DOCUMENT_RECEIVED_PREFIX, product_id)
}
