use lapin::{options::ConfirmSelectOptions, Channel, Connection};
use tracing::{error, info};

pub struct ChannelProvider;

impl ChannelProvider {
    /// Channel for consuming. `prefetch_count` bounds how many unsettled messages, and so
    /// how many concurrent processor invocations, a consumer has at once.
    pub async fn create_channel(
        connection: &Connection,
        prefetch_count: u16,
    ) -> Result<Channel, ChannelError> {
        info!("Creating RabbitMQ channel");

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to create RabbitMQ channel");
                ChannelError::CreationFailed(e.to_string())
            })?;

        info!(channel_id = channel.id(), prefetch_count, "Configuring channel QoS");

        channel
            .basic_qos(prefetch_count, Default::default())
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to configure channel QoS");
                ChannelError::QoSConfigurationFailed(e.to_string())
            })?;

        info!(
            channel_id = channel.id(),
            prefetch_count,
            "Channel QoS configured successfully"
        );

        Ok(channel)
    }

    /// Channel for publishing with publisher confirms enabled.
    pub async fn create_confirm_channel(connection: &Connection) -> Result<Channel, ChannelError> {
        let channel = connection
            .create_channel()
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to create RabbitMQ publishing channel");
                ChannelError::CreationFailed(e.to_string())
            })?;

        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| {
                error!(error = %e, channel_id = channel.id(), "Failed to enable publisher confirms");
                ChannelError::ConfirmSelectFailed(e.to_string())
            })?;

        info!(channel_id = channel.id(), "Publishing channel created with confirms");
        Ok(channel)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Failed to create channel: {0}")]
    CreationFailed(String),

    #[error("Failed to configure channel QoS: {0}")]
    QoSConfigurationFailed(String),

    #[error("Failed to enable publisher confirms: {0}")]
    ConfirmSelectFailed(String),
}
