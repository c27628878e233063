use prometheus::{
    Counter, CounterVec, Gauge, HistogramOpts, HistogramVec, IntGauge, Opts, Registry,
};
use std::sync::Arc;

pub mod server;

pub struct Metrics {
    pub messages_acknowledged_total: CounterVec,
    pub messages_rejected_total: CounterVec,
    pub messages_requeued_total: CounterVec,
    pub message_processing_duration_seconds: HistogramVec,
    pub broker_action_failures_total: CounterVec,
    pub publish_dropped_total: Counter,
    pub active_consumers: Gauge,
    pub in_flight_messages: IntGauge,
    pub registry: Registry,
}

impl Metrics {
    pub fn new() -> Result<Arc<Self>, prometheus::Error> {
        let registry = Registry::new();

        let messages_acknowledged_total = CounterVec::new(
            Opts::new(
                "documents_messages_acknowledged_total",
                "Total number of messages processed and acknowledged",
            ),
            &["queue", "routing_key"],
        )?;

        let messages_rejected_total = CounterVec::new(
            Opts::new(
                "documents_messages_rejected_total",
                "Total number of messages discarded after a permanent failure",
            ),
            &["queue", "routing_key"],
        )?;

        let messages_requeued_total = CounterVec::new(
            Opts::new(
                "documents_messages_requeued_total",
                "Total number of messages requeued after a transient failure",
            ),
            &["queue", "routing_key"],
        )?;

        let message_processing_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "documents_message_processing_duration_seconds",
                "Time taken to process a message",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
            &["queue", "outcome"],
        )?;

        let broker_action_failures_total = CounterVec::new(
            Opts::new(
                "documents_broker_action_failures_total",
                "Total number of ack/reject/requeue calls the broker did not accept",
            ),
            &["queue", "action"],
        )?;

        let publish_dropped_total = Counter::new(
            "documents_publish_dropped_total",
            "Total number of outbound messages dropped after broker backpressure",
        )?;

        let active_consumers = Gauge::new(
            "documents_active_consumers",
            "Number of active consumer loops",
        )?;

        let in_flight_messages = IntGauge::new(
            "documents_in_flight_messages",
            "Number of messages currently being processed",
        )?;

        registry.register(Box::new(messages_acknowledged_total.clone()))?;
        registry.register(Box::new(messages_rejected_total.clone()))?;
        registry.register(Box::new(messages_requeued_total.clone()))?;
        registry.register(Box::new(message_processing_duration_seconds.clone()))?;
        registry.register(Box::new(broker_action_failures_total.clone()))?;
        registry.register(Box::new(publish_dropped_total.clone()))?;
        registry.register(Box::new(active_consumers.clone()))?;
        registry.register(Box::new(in_flight_messages.clone()))?;

        Ok(Arc::new(Self {
            messages_acknowledged_total,
            messages_rejected_total,
            messages_requeued_total,
            message_processing_duration_seconds,
            broker_action_failures_total,
            publish_dropped_total,
            active_consumers,
            in_flight_messages,
            registry,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_every_family() {
        let metrics = Metrics::new().unwrap();
        metrics
            .messages_rejected_total
            .with_label_values(&["documents", "UNKNOWN_TYPE"])
            .inc();
        metrics.publish_dropped_total.inc();

        let names: Vec<String> = metrics
            .registry
            .gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();

        assert!(names.contains(&"documents_messages_rejected_total".to_string()));
        assert!(names.contains(&"documents_publish_dropped_total".to_string()));
    }
}
