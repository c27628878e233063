use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use document_exchange::config::{Config, ConfigError};
use document_exchange::messaging::{
    ChannelError, ChannelProvider, Consumer, ConsumerError, ConsumerService, ConnectionError,
    RabbitMqConnection, RabbitMqPublisher, Subscription,
};
use document_exchange::metrics::{server::start_metrics_server, Metrics};
use document_exchange::notifications::BrokerNotifier;
use document_exchange::processors::{document_processors, transaction_processors, ProcessorDeps};
use document_exchange::routing::{EventProcessor, EventRegistry, EventRouter, RegistryError};
use document_exchange::store::InMemoryDocumentStore;
use document_exchange::validation::{JsonSchemaValidator, SchemaError};

#[derive(Debug, thiserror::Error)]
enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Consumer(#[from] ConsumerError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Failed to create metrics: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Failed to listen for shutdown signal: {0}")]
    Signal(#[from] std::io::Error),
}

#[tokio::main]
async fn main() {
    setup_panic_handler();

    if let Err(e) = run().await {
        error!(error = %e, "Documents consumer failed to start");
        eprintln!("Fatal: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), BootstrapError> {
    let config = Config::from_env()?;
    setup_logging(&config.rust_log);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        service_name = %config.service_name,
        company_static_id = %config.company_static_id,
        "Documents consumer starting"
    );

    let metrics = Metrics::new()?;
    let rabbitmq = Arc::new(RabbitMqConnection::connect(config.rabbitmq_url.clone()).await?);
    info!("RabbitMQ connection established");

    let internal_publisher = Arc::new(RabbitMqPublisher::new(
        ChannelProvider::create_confirm_channel(rabbitmq.get_connection()).await?,
        config.internal_publisher_id.clone(),
        config.company_static_id.clone(),
    ));

    let deps = ProcessorDeps {
        store: Arc::new(InMemoryDocumentStore::new()),
        notifier: Arc::new(BrokerNotifier::new(
            internal_publisher.clone(),
            Some(Arc::clone(&metrics)),
        )),
        internal_publisher,
        metrics: Some(Arc::clone(&metrics)),
    };

    let documents = document_processors(&deps)?;
    let transactions = transaction_processors(&deps)?;
    let subscriptions = [
        Subscription::new(config.from_publisher_id.clone(), event_names(&documents)),
        Subscription::new(config.signer_publisher_id.clone(), event_names(&transactions)),
    ];

    let registry = EventRegistry::from_processors(documents.into_iter().chain(transactions))?;
    info!(routing_keys = ?registry.routing_keys(), "Event registry built");
    let router = Arc::new(EventRouter::new(registry, Arc::new(JsonSchemaValidator)));

    let mut service = ConsumerService::new(rabbitmq.clone(), config.shutdown_timeout);
    for subscription in subscriptions {
        let channel =
            ChannelProvider::create_channel(rabbitmq.get_connection(), config.consumer_prefetch)
                .await?;
        let consumer = Consumer::new(
            channel,
            subscription,
            &config.consumer_id,
            Arc::clone(&router),
            service.shutdown_signal(),
            Arc::clone(&metrics),
            config.shutdown_timeout,
        );
        consumer.setup_queues().await?;
        service.spawn(consumer);
    }

    let metrics_port = config.metrics_port;
    let metrics_clone = Arc::clone(&metrics);
    tokio::spawn(async move {
        if let Err(e) = start_metrics_server(metrics_clone, metrics_port).await {
            error!(error = %e, "Metrics server error");
        }
    });

    info!(consumers = service.consumer_count(), "Ready to process document events");

    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received, cleaning up...");

    service.stop().await;
    info!("Documents consumer stopped");
    Ok(())
}

fn event_names(processors: &[Arc<dyn EventProcessor>]) -> Vec<&'static str> {
    processors
        .iter()
        .flat_map(|processor| processor.event_names().iter().copied())
        .collect()
}

fn setup_logging(rust_log: &str) {
    let filter = EnvFilter::try_new(rust_log).unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

fn setup_panic_handler() {
    std::panic::set_hook(Box::new(|panic_info| {
        let payload = panic_info.payload();
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            *s
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.as_str()
        } else {
            "Unknown panic payload"
        };

        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}:{}", loc.file(), loc.line(), loc.column()))
            .unwrap_or_else(|| "unknown location".to_string());

        error!(panic = message, location = %location, "Panic");
    }));
}
