use futures::StreamExt;
use lapin::{options::*, types::FieldTable, Channel, ExchangeKind};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use super::message::InboundMessage;
use super::pipeline::MessagePipeline;
use crate::metrics::Metrics;
use crate::routing::EventRouter;

/// A source exchange and the routing keys this node consumes from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub publisher_id: String,
    pub routing_keys: Vec<String>,
}

impl Subscription {
    pub fn new<I, S>(publisher_id: impl Into<String>, routing_keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            publisher_id: publisher_id.into(),
            routing_keys: routing_keys.into_iter().map(Into::into).collect(),
        }
    }

    pub fn queue_name(&self, consumer_id: &str) -> String {
        format!("{}.{}", consumer_id, self.publisher_id)
    }
}

pub struct Consumer {
    channel: Channel,
    subscription: Subscription,
    queue_name: String,
    consumer_tag: String,
    pipeline: Arc<MessagePipeline>,
    shutdown: Arc<Notify>,
    metrics: Arc<Metrics>,
    drain_timeout: Duration,
}

impl Consumer {
    pub fn new(
        channel: Channel,
        subscription: Subscription,
        consumer_id: &str,
        router: Arc<EventRouter>,
        shutdown: Arc<Notify>,
        metrics: Arc<Metrics>,
        drain_timeout: Duration,
    ) -> Self {
        let queue_name = subscription.queue_name(consumer_id);
        let consumer_tag = format!("{}-{}", queue_name, uuid::Uuid::new_v4());
        let pipeline = Arc::new(MessagePipeline::new(
            queue_name.clone(),
            router,
            Arc::clone(&metrics),
        ));

        Self {
            channel,
            subscription,
            queue_name,
            consumer_tag,
            pipeline,
            shutdown,
            metrics,
            drain_timeout,
        }
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// Declares the source exchange, the durable queue and one binding per routing key.
    pub async fn setup_queues(&self) -> Result<(), ConsumerError> {
        let exchange = &self.subscription.publisher_id;

        self.channel
            .exchange_declare(
                exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| ConsumerError::SetupFailed(format!("Exchange setup failed: {}", e)))?;

        self.channel
            .queue_declare(
                &self.queue_name,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| ConsumerError::SetupFailed(format!("Queue setup failed: {}", e)))?;

        for routing_key in &self.subscription.routing_keys {
            self.channel
                .queue_bind(
                    &self.queue_name,
                    exchange,
                    routing_key,
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await
                .map_err(|e| {
                    ConsumerError::SetupFailed(format!("Binding {} failed: {}", routing_key, e))
                })?;
        }

        info!(
            queue = %self.queue_name,
            exchange = %exchange,
            routing_keys = ?self.subscription.routing_keys,
            "Queue topology configured"
        );

        Ok(())
    }

    /// Consumes until shutdown is signalled or the broker ends the stream. Each delivery
    /// is processed on its own task; on the way out, in-flight messages get
    /// `drain_timeout` to finish before they are abandoned to broker redelivery.
    pub async fn start(self) -> Result<(), ConsumerError> {
        info!(
            queue = %self.queue_name,
            consumer_tag = %self.consumer_tag,
            "Starting RabbitMQ consumer"
        );

        let mut consumer = self
            .channel
            .basic_consume(
                &self.queue_name,
                &self.consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                error!(error = %e, queue = %self.queue_name, "Failed to start consumer");
                ConsumerError::ConsumeFailed(e.to_string())
            })?;
        info!(
            queue = %self.queue_name,
            consumer_tag = %self.consumer_tag,
            "Consumer started successfully"
        );

        self.metrics.active_consumers.inc();

        let shutdown = self.shutdown.notified();
        tokio::pin!(shutdown);
        shutdown.as_mut().enable();

        let mut in_flight = JoinSet::new();

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(
                        consumer_tag = %self.consumer_tag,
                        "Shutdown signal received, stopping consumer"
                    );
                    break;
                }

                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, queue = %self.queue_name, "Message task failed");
                    }
                }

                delivery = consumer.next() => {
                    match delivery {
                        Some(Ok(delivery)) => {
                            let (message, acker) = InboundMessage::from_delivery(delivery);
                            let pipeline = Arc::clone(&self.pipeline);
                            in_flight.spawn(async move {
                                pipeline.handle(message, &acker).await;
                            });
                        }
                        Some(Err(e)) => {
                            error!(error = %e, "Error receiving message from RabbitMQ");
                        }
                        None => {
                            warn!("Consumer stream ended");
                            break;
                        }
                    }
                }
            }
        }

        if let Err(e) = self
            .channel
            .basic_cancel(&self.consumer_tag, BasicCancelOptions::default())
            .await
        {
            warn!(error = %e, consumer_tag = %self.consumer_tag, "Failed to cancel consumer");
        }

        self.drain(in_flight).await;

        self.metrics.active_consumers.dec();
        info!(consumer_tag = %self.consumer_tag, "Consumer stopped");
        Ok(())
    }

    async fn drain(&self, mut in_flight: JoinSet<()>) {
        if in_flight.is_empty() {
            return;
        }

        info!(
            pending = in_flight.len(),
            timeout_ms = self.drain_timeout.as_millis() as u64,
            "Waiting for in-flight messages"
        );

        let drained = tokio::time::timeout(self.drain_timeout, async {
            while in_flight.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            warn!(
                remaining = in_flight.len(),
                queue = %self.queue_name,
                "In-flight messages did not finish in time, abandoning them to redelivery"
            );
            in_flight.abort_all();
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConsumerError {
    #[error("Failed to start consumer: {0}")]
    ConsumeFailed(String),

    #[error("Failed to setup queue topology: {0}")]
    SetupFailed(String),
}
