use std::sync::Arc;

use async_trait::async_trait;
use lapin::{
    options::BasicPublishOptions,
    types::{AMQPValue, FieldTable},
    BasicProperties, Channel,
};
use serde_json::Value;
use tracing::{info, warn};

use super::message::SENDER_STATIC_ID_HEADER;
use crate::contracts::ProcessingError;
use crate::metrics::Metrics;

pub const RECIPIENT_STATIC_ID_HEADER: &str = "recipientStaticId";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishOptions {
    pub message_id: Option<String>,
    pub recipient_static_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    /// False when the broker refused the message (negative confirm).
    pub accepted: bool,
    pub message_id: String,
}

/// Deliver-or-fail publishing primitive.
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    async fn publish_critical(
        &self,
        routing_key: &str,
        message: &Value,
        options: PublishOptions,
    ) -> Result<PublishReceipt, PublishError>;
}

/// Publishes persistent JSON messages to one exchange and waits for the broker confirm.
pub struct RabbitMqPublisher {
    channel: Channel,
    exchange: String,
    sender_static_id: String,
}

impl RabbitMqPublisher {
    /// `channel` must have publisher confirms enabled.
    pub fn new(channel: Channel, exchange: impl Into<String>, sender_static_id: impl Into<String>) -> Self {
        Self {
            channel,
            exchange: exchange.into(),
            sender_static_id: sender_static_id.into(),
        }
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }
}

#[async_trait]
impl MessagePublisher for RabbitMqPublisher {
    async fn publish_critical(
        &self,
        routing_key: &str,
        message: &Value,
        options: PublishOptions,
    ) -> Result<PublishReceipt, PublishError> {
        let message_id = options
            .message_id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let body = serde_json::to_vec(message).map_err(|e| PublishError::Encoding(e.to_string()))?;

        let mut headers = FieldTable::default();
        headers.insert(
            SENDER_STATIC_ID_HEADER.into(),
            AMQPValue::LongString(self.sender_static_id.clone().into()),
        );
        if let Some(recipient) = options.recipient_static_id {
            headers.insert(
                RECIPIENT_STATIC_ID_HEADER.into(),
                AMQPValue::LongString(recipient.into()),
            );
        }

        let properties = BasicProperties::default()
            .with_message_id(message_id.clone().into())
            .with_content_type("application/json".into())
            .with_headers(headers)
            .with_delivery_mode(2);

        let confirmation = self
            .channel
            .basic_publish(
                &self.exchange,
                routing_key,
                BasicPublishOptions::default(),
                &body,
                properties,
            )
            .await
            .map_err(|e| PublishError::Broker(e.to_string()))?
            .await
            .map_err(|e| PublishError::Broker(e.to_string()))?;

        let accepted = confirmation.is_ack();
        info!(
            exchange = %self.exchange,
            routing_key,
            message_id = %message_id,
            accepted,
            "Message published"
        );

        Ok(PublishReceipt {
            accepted,
            message_id,
        })
    }
}

/// Publishes and, when the broker pushes back, logs and drops the message instead of
/// blocking. Broker errors surface as transient failures so the inbound message that
/// triggered the publish is redelivered.
pub async fn publish_or_drop(
    publisher: &dyn MessagePublisher,
    metrics: Option<&Arc<Metrics>>,
    routing_key: &str,
    message: &Value,
    options: PublishOptions,
) -> Result<(), ProcessingError> {
    let receipt = publisher
        .publish_critical(routing_key, message, options)
        .await
        .map_err(|e| ProcessingError::transient(e.to_string()))?;

    if !receipt.accepted {
        warn!(
            routing_key,
            message_id = %receipt.message_id,
            "Broker did not accept outbound message, dropping it"
        );
        if let Some(metrics) = metrics {
            metrics.publish_dropped_total.inc();
        }
    }

    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Failed to encode outbound message: {0}")]
    Encoding(String),

    #[error("Failed to publish message: {0}")]
    Broker(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct FixedPublisher(Result<bool, ()>);

    #[async_trait]
    impl MessagePublisher for FixedPublisher {
        async fn publish_critical(
            &self,
            _routing_key: &str,
            _message: &Value,
            _options: PublishOptions,
        ) -> Result<PublishReceipt, PublishError> {
            match self.0 {
                Ok(accepted) => Ok(PublishReceipt {
                    accepted,
                    message_id: "out-1".to_string(),
                }),
                Err(()) => Err(PublishError::Broker("connection reset".to_string())),
            }
        }
    }

    #[tokio::test]
    async fn backpressure_is_dropped_and_counted() {
        let metrics = Metrics::new().unwrap();

        publish_or_drop(
            &FixedPublisher(Ok(false)),
            Some(&metrics),
            "INTERNAL.TASK.Create",
            &json!({}),
            PublishOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(metrics.publish_dropped_total.get(), 1.0);
    }

    #[tokio::test]
    async fn broker_error_is_transient() {
        let err = publish_or_drop(
            &FixedPublisher(Err(())),
            None,
            "INTERNAL.TASK.Create",
            &json!({}),
            PublishOptions::default(),
        )
        .await
        .unwrap_err();

        assert!(err.is_transient());
    }
}
