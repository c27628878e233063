//! Per-message processing: decode, route, and settle with the broker.
//!
//! Every message ends in exactly one of acknowledge, reject or requeue. Processor panics
//! are caught here and treated like any other transient failure.
//!
//! Requeue puts the message back at the head of the queue. A message that keeps failing
//! transiently is redelivered indefinitely and can hold up the queue behind it; there is no
//! retry counter or dead-letter path.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use prometheus::IntGauge;
use tracing::{error, info, info_span, warn, Instrument};

use super::message::{BrokerAction, InboundMessage, MessageAcker};
use super::redaction::redacted_preview;
use crate::contracts::ProcessingError;
use crate::metrics::Metrics;
use crate::routing::EventRouter;

pub struct MessagePipeline {
    queue_name: String,
    router: Arc<EventRouter>,
    metrics: Arc<Metrics>,
}

impl MessagePipeline {
    pub fn new(queue_name: impl Into<String>, router: Arc<EventRouter>, metrics: Arc<Metrics>) -> Self {
        Self {
            queue_name: queue_name.into(),
            router,
            metrics,
        }
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// Processes one message and settles it. Returns the action taken.
    pub async fn handle<A>(&self, message: InboundMessage, acker: &A) -> BrokerAction
    where
        A: MessageAcker + ?Sized,
    {
        let span = info_span!(
            "message",
            message_id = message.message_id(),
            routing_key = %message.routing_key,
        );

        self.handle_in_span(message, acker).instrument(span).await
    }

    async fn handle_in_span<A>(&self, message: InboundMessage, acker: &A) -> BrokerAction
    where
        A: MessageAcker + ?Sized,
    {
        let _in_flight = InFlightGuard::enter(&self.metrics.in_flight_messages);
        let start = Instant::now();

        info!(
            payload_size = message.content.len(),
            redelivered = message.redelivered,
            "Processing message"
        );

        let outcome = AssertUnwindSafe(self.dispatch(&message))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(ProcessingError::transient(format!(
                    "Processor panicked: {}",
                    panic_message(panic.as_ref())
                )))
            });

        let action = BrokerAction::for_outcome(&outcome);
        let duration = start.elapsed().as_secs_f64();
        self.record(&message, &outcome, action, duration);

        let settled = match action {
            BrokerAction::Acknowledge => acker.ack().await,
            BrokerAction::Reject => acker.reject().await,
            BrokerAction::Requeue => acker.requeue().await,
        };

        if let Err(e) = settled {
            error!(
                error = %e,
                action = action.as_str(),
                message_id = message.message_id(),
                "Failed to settle message with broker"
            );
            self.metrics
                .broker_action_failures_total
                .with_label_values(&[&self.queue_name, action.as_str()])
                .inc();
        }

        action
    }

    async fn dispatch(&self, message: &InboundMessage) -> Result<(), ProcessingError> {
        let sender_static_id = message.sender_static_id()?;
        let payload = message.payload()?;

        self.router
            .process_event(sender_static_id, payload, &message.routing_key)
            .await
    }

    fn record(
        &self,
        message: &InboundMessage,
        outcome: &Result<(), ProcessingError>,
        action: BrokerAction,
        duration: f64,
    ) {
        let labels = [self.queue_name.as_str(), message.routing_key.as_str()];

        match outcome {
            Ok(()) => {
                info!(duration_ms = duration * 1000.0, "Message processed, acknowledging");
                self.metrics
                    .messages_acknowledged_total
                    .with_label_values(&labels)
                    .inc();
            }
            Err(err) if err.is_permanent() => {
                error!(
                    event_type = %message.routing_key,
                    message_id = message.message_id(),
                    error = %err,
                    payload = %redacted_preview(&message.content),
                    "Permanent failure, rejecting message"
                );
                self.metrics
                    .messages_rejected_total
                    .with_label_values(&labels)
                    .inc();
            }
            Err(err) => {
                warn!(
                    event_type = %message.routing_key,
                    message_id = message.message_id(),
                    error = %err,
                    "Transient failure, requeueing message"
                );
                self.metrics
                    .messages_requeued_total
                    .with_label_values(&labels)
                    .inc();
            }
        }

        self.metrics
            .message_processing_duration_seconds
            .with_label_values(&[self.queue_name.as_str(), action.as_str()])
            .observe(duration);
    }
}

/// Keeps the in-flight gauge balanced when a message task is aborted mid-processing.
struct InFlightGuard(IntGauge);

impl InFlightGuard {
    fn enter(gauge: &IntGauge) -> Self {
        gauge.inc();
        Self(gauge.clone())
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.dec();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::message::{AckError, MessageOptions};
    use crate::routing::{EventProcessor, EventRegistry};
    use crate::validation::{JsonSchemaValidator, PayloadSchema};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingAcker {
        actions: Mutex<Vec<BrokerAction>>,
        fail: bool,
    }

    impl RecordingAcker {
        fn push(&self, action: BrokerAction) -> Result<(), AckError> {
            self.actions.lock().unwrap().push(action);
            if self.fail {
                Err(AckError("channel closed".to_string()))
            } else {
                Ok(())
            }
        }

        fn actions(&self) -> Vec<BrokerAction> {
            self.actions.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MessageAcker for RecordingAcker {
        async fn ack(&self) -> Result<(), AckError> {
            self.push(BrokerAction::Acknowledge)
        }

        async fn reject(&self) -> Result<(), AckError> {
            self.push(BrokerAction::Reject)
        }

        async fn requeue(&self) -> Result<(), AckError> {
            self.push(BrokerAction::Requeue)
        }
    }

    enum Behaviour {
        Succeed,
        Fail(ProcessingError),
        Panic,
    }

    struct ScriptedProcessor {
        schema: PayloadSchema,
        behaviour: Behaviour,
    }

    #[async_trait]
    impl EventProcessor for ScriptedProcessor {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn event_names(&self) -> &'static [&'static str] {
            &["SEND_DOCUMENTS"]
        }

        fn event_schema(&self) -> &PayloadSchema {
            &self.schema
        }

        async fn process(&self, _sender: &str, _event: Value) -> Result<(), ProcessingError> {
            match &self.behaviour {
                Behaviour::Succeed => Ok(()),
                Behaviour::Fail(err) => Err(err.clone()),
                Behaviour::Panic => panic!("store handle poisoned"),
            }
        }
    }

    fn pipeline(behaviour: Behaviour) -> (MessagePipeline, Arc<Metrics>) {
        let processor = ScriptedProcessor {
            schema: PayloadSchema::compile("any", &json!({ "type": "object" })).unwrap(),
            behaviour,
        };
        let registry =
            EventRegistry::from_processors([Arc::new(processor) as Arc<dyn EventProcessor>])
                .unwrap();
        let router = Arc::new(EventRouter::new(registry, Arc::new(JsonSchemaValidator)));
        let metrics = Metrics::new().unwrap();

        (
            MessagePipeline::new("documents", router, Arc::clone(&metrics)),
            metrics,
        )
    }

    fn message(routing_key: &str, body: &str) -> InboundMessage {
        InboundMessage::new(
            routing_key,
            body.as_bytes().to_vec(),
            MessageOptions {
                message_id: Some("msg-1".to_string()),
                sender_static_id: Some("company-a".to_string()),
            },
        )
    }

    #[tokio::test]
    async fn panicking_processor_is_requeued() {
        let (pipeline, _) = pipeline(Behaviour::Panic);
        let acker = RecordingAcker::default();

        let action = pipeline.handle(message("SEND_DOCUMENTS", "{}"), &acker).await;

        assert_eq!(action, BrokerAction::Requeue);
        assert_eq!(acker.actions(), vec![BrokerAction::Requeue]);
    }

    #[tokio::test]
    async fn processor_signalled_invalid_message_is_rejected() {
        let (pipeline, metrics) =
            pipeline(Behaviour::Fail(ProcessingError::invalid_message("unknown share")));
        let acker = RecordingAcker::default();

        let action = pipeline.handle(message("SEND_DOCUMENTS", "{}"), &acker).await;

        assert_eq!(action, BrokerAction::Reject);
        assert_eq!(acker.actions(), vec![BrokerAction::Reject]);
        assert_eq!(
            metrics
                .messages_rejected_total
                .with_label_values(&["documents", "SEND_DOCUMENTS"])
                .get(),
            1.0
        );
    }

    #[tokio::test]
    async fn malformed_body_is_rejected_without_dispatch() {
        let (pipeline, _) = pipeline(Behaviour::Panic);
        let acker = RecordingAcker::default();

        let action = pipeline.handle(message("SEND_DOCUMENTS", "{oops"), &acker).await;

        assert_eq!(action, BrokerAction::Reject);
    }

    #[tokio::test]
    async fn settle_failure_is_counted_not_retried() {
        let (pipeline, metrics) = pipeline(Behaviour::Succeed);
        let acker = RecordingAcker {
            fail: true,
            ..Default::default()
        };

        let action = pipeline.handle(message("SEND_DOCUMENTS", "{}"), &acker).await;

        assert_eq!(action, BrokerAction::Acknowledge);
        assert_eq!(acker.actions(), vec![BrokerAction::Acknowledge]);
        assert_eq!(
            metrics
                .broker_action_failures_total
                .with_label_values(&["documents", "ack"])
                .get(),
            1.0
        );
        assert_eq!(metrics.in_flight_messages.get(), 0);
    }

    struct StalledProcessor {
        schema: PayloadSchema,
    }

    #[async_trait]
    impl EventProcessor for StalledProcessor {
        fn name(&self) -> &'static str {
            "stalled"
        }

        fn event_names(&self) -> &'static [&'static str] {
            &["SEND_DOCUMENTS"]
        }

        fn event_schema(&self) -> &PayloadSchema {
            &self.schema
        }

        async fn process(&self, _sender: &str, _event: Value) -> Result<(), ProcessingError> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn aborted_message_task_releases_in_flight_gauge() {
        let processor = StalledProcessor {
            schema: PayloadSchema::compile("any", &json!({ "type": "object" })).unwrap(),
        };
        let registry =
            EventRegistry::from_processors([Arc::new(processor) as Arc<dyn EventProcessor>])
                .unwrap();
        let router = Arc::new(EventRouter::new(registry, Arc::new(JsonSchemaValidator)));
        let metrics = Metrics::new().unwrap();
        let pipeline = Arc::new(MessagePipeline::new("documents", router, Arc::clone(&metrics)));

        let task = tokio::spawn({
            let pipeline = Arc::clone(&pipeline);
            async move {
                let acker = RecordingAcker::default();
                pipeline.handle(message("SEND_DOCUMENTS", "{}"), &acker).await
            }
        });

        while metrics.in_flight_messages.get() == 0 {
            tokio::task::yield_now().await;
        }
        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());

        assert_eq!(metrics.in_flight_messages.get(), 0);
    }
}
