use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::connection::BrokerConnection;
use super::consumer::Consumer;

/// Owns the running consumers and the connection they share.
pub struct ConsumerService {
    connection: Arc<dyn BrokerConnection>,
    shutdown: Arc<Notify>,
    consumers: Vec<JoinHandle<()>>,
    shutdown_timeout: Duration,
}

impl ConsumerService {
    pub fn new(connection: Arc<dyn BrokerConnection>, shutdown_timeout: Duration) -> Self {
        Self {
            connection,
            shutdown: Arc::new(Notify::new()),
            consumers: Vec::new(),
            shutdown_timeout,
        }
    }

    /// Signal that every consumer built for this service must listen to.
    pub fn shutdown_signal(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }

    pub fn spawn(&mut self, consumer: Consumer) {
        let queue = consumer.queue_name().to_string();
        self.track(tokio::spawn(async move {
            if let Err(e) = consumer.start().await {
                error!(error = %e, queue = %queue, "Consumer error");
            }
        }));
    }

    fn track(&mut self, handle: JoinHandle<()>) {
        self.consumers.push(handle);
    }

    pub fn consumer_count(&self) -> usize {
        self.consumers.len()
    }

    /// Stops accepting messages, waits for consumers to drain, then closes the connection.
    /// Never fails: every error on the way out is logged and swallowed.
    pub async fn stop(self) {
        info!(consumers = self.consumers.len(), "Stopping consumers");
        self.shutdown.notify_waiters();

        // Consumers drain with the same deadline; the extra second covers cancel round trips.
        let deadline = self.shutdown_timeout + Duration::from_secs(1);
        for mut handle in self.consumers {
            match tokio::time::timeout(deadline, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(error = %e, "Consumer task failed"),
                Err(_) => {
                    warn!("Consumer shutdown timeout, aborting it");
                    handle.abort();
                }
            }
        }

        if let Err(e) = self.connection.close().await {
            error!(error = %e, "Error during shutdown");
        }

        info!("Consumers stopped");
    }
}
