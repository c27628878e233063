pub mod channel;
pub mod connection;
pub mod consumer;
pub mod message;
pub mod pipeline;
pub mod publisher;
pub mod redaction;
pub mod service;

pub use channel::{ChannelError, ChannelProvider};
pub use connection::{BrokerConnection, ConnectionError, RabbitMqConnection};
pub use consumer::{Consumer, ConsumerError, Subscription};
pub use message::{AckError, BrokerAction, InboundMessage, MessageAcker, MessageOptions};
pub use pipeline::MessagePipeline;
pub use publisher::{
    publish_or_drop, MessagePublisher, PublishError, PublishOptions, PublishReceipt,
    RabbitMqPublisher,
};
pub use service::ConsumerService;
