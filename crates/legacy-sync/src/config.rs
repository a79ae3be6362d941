//! Environment configuration.
//!
//! Every setting has a default so the service starts against a local broker and database with
//! no environment at all. Parse failures name the offending variable.

use anyhow::{Context, Result};
use std::str::FromStr;
use std::time::Duration;

/// Delay before a failed broker connection is retried.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(10);
/// Delay before a failed delivery is rejected back onto its queue.
pub const REQUEUE_DELAY: Duration = Duration::from_secs(5);
/// AMQP heartbeat, in seconds.
pub const HEARTBEAT_SECS: u16 = 60;
/// Upper bound on establishing a broker connection.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Unacknowledged deliveries allowed per consumer.
pub const PREFETCH: u16 = 1;

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub pass: String,
    pub vhost: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueNames {
    pub order: String,
    pub customer: String,
    pub origin: String,
}

impl QueueNames {
    pub fn all(&self) -> Vec<String> {
        vec![self.order.clone(), self.customer.clone(), self.origin.clone()]
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub pass: String,
    /// Downstream (legacy) schema.
    pub downstream_schema: String,
    /// Source (API) schema.
    pub source_schema: String,
    pub pool_size: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// `None` retries failed deliveries forever.
    pub max_delivery_attempts: Option<u32>,
    /// Treat "no other default origin to clear" as an inconsistency.
    pub strict_default_clearing: bool,
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub broker: BrokerConfig,
    pub queues: QueueNames,
    pub database: DatabaseConfig,
    pub api_port: u16,
    pub options: SyncOptions,
}

impl SyncConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let broker = BrokerConfig {
            host: text("RABBITMQ_HOST", "localhost"),
            port: parse(&lookup, "RABBITMQ_PORT", 5672)?,
            user: text("RABBITMQ_USER", "guest"),
            pass: text("RABBITMQ_PASS", "guest"),
            vhost: text("RABBITMQ_VHOST", "/"),
        };
        let queues = QueueNames {
            order: text("ORDER_QUEUE", "order_queue"),
            customer: text("CUSTOMER_QUEUE", "customer_queue"),
            origin: text("ORIGIN_QUEUE", "origin_queue"),
        };
        let database = DatabaseConfig {
            host: text("DB_HOST", "localhost"),
            port: parse(&lookup, "DB_PORT", 3306)?,
            user: text("DB_USER", "root"),
            pass: text("DB_PASS", ""),
            downstream_schema: text("DB_NAME", "ahoraite"),
            source_schema: text("DB_API_NAME", "ahoraite_api"),
            pool_size: parse(&lookup, "DB_POOL_SIZE", 10)?,
        };
        anyhow::ensure!(database.pool_size > 0, "DB_POOL_SIZE must be at least 1");

        let max_delivery_attempts = match lookup("SYNC_MAX_DELIVERY_ATTEMPTS") {
            Some(raw) => {
                let max: u32 = raw
                    .trim()
                    .parse()
                    .with_context(|| "parse SYNC_MAX_DELIVERY_ATTEMPTS")?;
                anyhow::ensure!(max > 0, "SYNC_MAX_DELIVERY_ATTEMPTS must be at least 1");
                Some(max)
            }
            None => None,
        };
        let options = SyncOptions {
            max_delivery_attempts,
            strict_default_clearing: parse(&lookup, "SYNC_STRICT_DEFAULT_CLEARING", false)?,
        };

        Ok(Self {
            broker,
            queues,
            database,
            api_port: parse(&lookup, "API_PORT", 3003)?,
            options,
        })
    }

    /// Loggable view with credentials left out.
    pub fn redacted(&self) -> String {
        format!(
            "broker={}:{}{} queues=[{}, {}, {}] db={}:{} source={} downstream={} pool={}",
            self.broker.host,
            self.broker.port,
            self.broker.vhost,
            self.queues.order,
            self.queues.customer,
            self.queues.origin,
            self.database.host,
            self.database.port,
            self.database.source_schema,
            self.database.downstream_schema,
            self.database.pool_size,
        )
    }
}

fn parse<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().with_context(|| format!("parse {key}")),
        None => Ok(default),
    }
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
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_match_local_setup() {
        let config = SyncConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.broker.port, 5672);
        assert_eq!(config.queues.customer, "customer_queue");
        assert_eq!(config.database.source_schema, "ahoraite_api");
        assert_eq!(config.database.downstream_schema, "ahoraite");
        assert_eq!(config.database.pool_size, 10);
        assert_eq!(config.api_port, 3003);
        assert_eq!(config.options, SyncOptions::default());
    }

    #[test]
    fn overrides_are_applied() {
        let config = SyncConfig::from_lookup(lookup(&[
            ("ORIGIN_QUEUE", "origins"),
            ("DB_POOL_SIZE", "4"),
            ("SYNC_MAX_DELIVERY_ATTEMPTS", "5"),
            ("SYNC_STRICT_DEFAULT_CLEARING", "true"),
        ]))
        .unwrap();
        assert_eq!(config.queues.origin, "origins");
        assert_eq!(config.database.pool_size, 4);
        assert_eq!(config.options.max_delivery_attempts, Some(5));
        assert!(config.options.strict_default_clearing);
    }

    #[test]
    fn bad_values_name_the_variable() {
        let err = SyncConfig::from_lookup(lookup(&[("RABBITMQ_PORT", "amqp")])).unwrap_err();
        assert!(err.to_string().contains("RABBITMQ_PORT"));

        let err = SyncConfig::from_lookup(lookup(&[("SYNC_MAX_DELIVERY_ATTEMPTS", "0")]))
            .unwrap_err();
        assert!(err.to_string().contains("SYNC_MAX_DELIVERY_ATTEMPTS"));
    }

    #[test]
    fn redacted_summary_omits_credentials() {
        let config = SyncConfig::from_lookup(lookup(&[
            ("RABBITMQ_PASS", "s3cret"),
            ("DB_PASS", "hunter2"),
        ]))
        .unwrap();
        let summary = config.redacted();
        assert!(!summary.contains("s3cret"));
        assert!(!summary.contains("hunter2"));
    }
}
