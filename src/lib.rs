pub mod config;
pub mod contracts;
pub mod messaging;
pub mod metrics;
pub mod notifications;
pub mod processors;
pub mod routing;
pub mod store;
pub mod validation;
