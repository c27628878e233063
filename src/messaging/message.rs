use async_trait::async_trait;
use lapin::{acker::Acker, message::Delivery, options::*, types::AMQPValue, BasicProperties};

use crate::contracts::ProcessingError;

pub const SENDER_STATIC_ID_HEADER: &str = "senderStaticId";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageOptions {
    pub message_id: Option<String>,
    pub sender_static_id: Option<String>,
}

/// A delivered message, detached from the AMQP frame it came in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub routing_key: String,
    pub content: Vec<u8>,
    pub options: MessageOptions,
    pub redelivered: bool,
}

impl InboundMessage {
    pub fn new(routing_key: impl Into<String>, content: Vec<u8>, options: MessageOptions) -> Self {
        Self {
            routing_key: routing_key.into(),
            content,
            options,
            redelivered: false,
        }
    }

    /// Splits a lapin delivery into the message and the handle used to settle it.
    pub fn from_delivery(delivery: Delivery) -> (Self, Acker) {
        let options = MessageOptions {
            message_id: delivery
                .properties
                .message_id()
                .as_ref()
                .map(|id| id.as_str().to_string()),
            sender_static_id: sender_from_properties(&delivery.properties),
        };

        let message = Self {
            routing_key: delivery.routing_key.as_str().to_string(),
            content: delivery.data,
            options,
            redelivered: delivery.redelivered,
        };

        (message, delivery.acker)
    }

    pub fn message_id(&self) -> &str {
        self.options.message_id.as_deref().unwrap_or("unknown")
    }

    pub fn sender_static_id(&self) -> Result<&str, ProcessingError> {
        self.options
            .sender_static_id
            .as_deref()
            .filter(|sender| !sender.is_empty())
            .ok_or_else(|| {
                ProcessingError::invalid_message(format!(
                    "Missing sender static id for message of type: {}",
                    self.routing_key
                ))
            })
    }

    pub fn payload(&self) -> Result<serde_json::Value, ProcessingError> {
        serde_json::from_slice(&self.content).map_err(|e| {
            ProcessingError::invalid_message(format!(
                "Malformed payload for message of type: {} ({})",
                self.routing_key, e
            ))
        })
    }
}

fn sender_from_properties(properties: &BasicProperties) -> Option<String> {
    properties
        .headers()
        .as_ref()
        .and_then(|headers| headers.inner().get(SENDER_STATIC_ID_HEADER))
        .and_then(|value| match value {
            AMQPValue::LongString(s) => Some(s.to_string()),
            AMQPValue::ShortString(s) => Some(s.as_str().to_string()),
            _ => None,
        })
}

/// The three terminal outcomes of a delivered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BrokerAction {
    /// Processed; remove from the queue.
    Acknowledge,
    /// Permanently failed; discard without redelivery.
    Reject,
    /// Transiently failed; return to the head of the queue.
    Requeue,
}

impl BrokerAction {
    pub fn for_outcome(outcome: &Result<(), ProcessingError>) -> Self {
        match outcome {
            Ok(()) => Self::Acknowledge,
            Err(e) if e.is_permanent() => Self::Reject,
            Err(_) => Self::Requeue,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Acknowledge => "ack",
            Self::Reject => "reject",
            Self::Requeue => "requeue",
        }
    }
}

/// Settles a delivered message with the broker. Exactly one method is called per message.
#[async_trait]
pub trait MessageAcker: Send + Sync {
    async fn ack(&self) -> Result<(), AckError>;

    async fn reject(&self) -> Result<(), AckError>;

    async fn requeue(&self) -> Result<(), AckError>;
}

#[async_trait]
impl MessageAcker for Acker {
    async fn ack(&self) -> Result<(), AckError> {
        Acker::ack(self, BasicAckOptions::default())
            .await
            .map(|_| ())
            .map_err(|e| AckError(e.to_string()))
    }

    async fn reject(&self) -> Result<(), AckError> {
        Acker::reject(self, BasicRejectOptions { requeue: false })
            .await
            .map(|_| ())
            .map_err(|e| AckError(e.to_string()))
    }

    async fn requeue(&self) -> Result<(), AckError> {
        Acker::reject(self, BasicRejectOptions { requeue: true })
            .await
            .map(|_| ())
            .map_err(|e| AckError(e.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Failed to settle message with broker: {0}")]
pub struct AckError(pub String);
