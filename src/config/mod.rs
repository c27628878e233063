use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub rabbitmq_url: String,
    pub company_static_id: String,
    pub service_name: String,
    pub rust_log: String,
    /// Prefix of every queue this service consumes from.
    pub consumer_id: String,
    /// Exchange counterparty events arrive on.
    pub from_publisher_id: String,
    /// Exchange for fan-out to the other services of this node.
    pub internal_publisher_id: String,
    pub signer_publisher_id: String,
    pub consumer_prefetch: u16,
    pub shutdown_timeout: Duration,
    pub metrics_port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|value| !value.is_empty())
                .ok_or(ConfigError::MissingRequired(name))
        };
        let or_default =
            |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

        Ok(Self {
            rabbitmq_url: required("RABBITMQ_URL")?,
            company_static_id: required("COMPANY_STATIC_ID")?,
            service_name: or_default("SERVICE_NAME", "api-documents"),
            rust_log: or_default("RUST_LOG", "info"),
            consumer_id: or_default("INTERNAL_MQ_CONSUMER_ID", "api-documents-consumer"),
            from_publisher_id: or_default("INTERNAL_MQ_FROM_PUBLISHER_ID", "from-event-mgnt"),
            internal_publisher_id: or_default("INTERNAL_PUBLISHER_ID", "documents"),
            signer_publisher_id: or_default("SIGNER_PUBLISHER_ID", "api-blockchain-signer"),
            consumer_prefetch: parse_or(&lookup, "CONSUMER_PREFETCH", 10)?,
            shutdown_timeout: Duration::from_secs(parse_or(&lookup, "SHUTDOWN_TIMEOUT_SECS", 5)?),
            metrics_port: parse_or(&lookup, "METRICS_PORT", 9090)?,
        })
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            name,
            value: raw,
        }),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn applies_defaults() {
        let config = Config::from_lookup(lookup(&[
            ("RABBITMQ_URL", "amqp://localhost:5672"),
            ("COMPANY_STATIC_ID", "company-a"),
        ]))
        .unwrap();

        assert_eq!(config.consumer_id, "api-documents-consumer");
        assert_eq!(config.from_publisher_id, "from-event-mgnt");
        assert_eq!(config.signer_publisher_id, "api-blockchain-signer");
        assert_eq!(config.consumer_prefetch, 10);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(5));
        assert_eq!(config.metrics_port, 9090);
    }

    #[test]
    fn missing_company_is_reported() {
        let err = Config::from_lookup(lookup(&[("RABBITMQ_URL", "amqp://localhost:5672")]))
            .unwrap_err();

        assert!(matches!(err, ConfigError::MissingRequired("COMPANY_STATIC_ID")));
    }

    #[test]
    fn malformed_number_is_invalid() {
        let err = Config::from_lookup(lookup(&[
            ("RABBITMQ_URL", "amqp://localhost:5672"),
            ("COMPANY_STATIC_ID", "company-a"),
            ("CONSUMER_PREFETCH", "many"),
        ]))
        .unwrap_err();

        assert!(matches!(err, ConfigError::Invalid { name: "CONSUMER_PREFETCH", .. }));
    }
}
