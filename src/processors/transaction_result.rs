use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::ProcessorDeps;
use crate::contracts::events::{BLOCKCHAIN_TRANSACTION_ERROR, BLOCKCHAIN_TRANSACTION_SUCCESS};
use crate::contracts::messages::TransactionResultMessage;
use crate::contracts::ProcessingError;
use crate::routing::{decode_event, EventProcessor};
use crate::store::{DocumentStore, RegistrationState};
use crate::validation::{PayloadSchema, SchemaError};

const UNKNOWN_TX_ERROR: &str = "Transaction failed without a reported error";

/// Applies signer results to the document's blockchain registration.
pub struct TransactionResultProcessor {
    store: Arc<dyn DocumentStore>,
    schema: PayloadSchema,
}

impl TransactionResultProcessor {
    pub fn new(deps: &ProcessorDeps) -> Result<Self, SchemaError> {
        let schema = json!({
            "type": "object",
            "required": ["messageType", "txId", "context"],
            "properties": {
                "messageType": {
                    "enum": [BLOCKCHAIN_TRANSACTION_SUCCESS, BLOCKCHAIN_TRANSACTION_ERROR]
                },
                "txId": { "type": "string", "minLength": 1 },
                "txHash": { "type": "string" },
                "error": { "type": "string" },
                "context": {
                    "type": "object",
                    "required": ["productId", "documentId"],
                    "properties": {
                        "productId": { "type": "string", "minLength": 1 },
                        "documentId": { "type": "string", "minLength": 1 }
                    }
                }
            }
        });

        Ok(Self {
            store: Arc::clone(&deps.store),
            schema: PayloadSchema::compile("TransactionResultMessage", &schema)?,
        })
    }
}

#[async_trait]
impl EventProcessor for TransactionResultProcessor {
    fn name(&self) -> &'static str {
        "TransactionResultProcessor"
    }

    fn event_names(&self) -> &'static [&'static str] {
        &[BLOCKCHAIN_TRANSACTION_SUCCESS, BLOCKCHAIN_TRANSACTION_ERROR]
    }

    fn event_schema(&self) -> &PayloadSchema {
        &self.schema
    }

    async fn process(&self, sender_static_id: &str, event: Value) -> Result<(), ProcessingError> {
        let message: TransactionResultMessage = decode_event(event)?;
        let context = message.context;

        let state = match message.message_type.as_str() {
            BLOCKCHAIN_TRANSACTION_SUCCESS => {
                info!(
                    sender_static_id,
                    tx_id = %message.tx_id,
                    document_id = %context.document_id,
                    "Document registration confirmed"
                );
                RegistrationState::Confirmed {
                    tx_hash: message.tx_hash,
                }
            }
            BLOCKCHAIN_TRANSACTION_ERROR => {
                let reason = message.error.unwrap_or_else(|| UNKNOWN_TX_ERROR.to_string());
                warn!(
                    sender_static_id,
                    tx_id = %message.tx_id,
                    document_id = %context.document_id,
                    error = %reason,
                    "Document registration failed"
                );
                RegistrationState::Failed { reason }
            }
            other => {
                return Err(ProcessingError::invalid_message(format!(
                    "Unexpected transaction result type: {}",
                    other
                )));
            }
        };

        self.store
            .update_registration(&context.product_id, &context.document_id, &message.tx_id, state)
            .await?;
        Ok(())
    }
}
