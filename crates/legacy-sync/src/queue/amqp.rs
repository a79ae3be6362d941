//! RabbitMQ transport on lapin.

use super::{BrokerError, Delivery, DeliveryStream, FailureHook, Session, Transport};
use crate::config::{BrokerConfig, CONNECT_TIMEOUT, HEARTBEAT_SECS};
use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions, QueueDeclareOptions,
};
use lapin::types::{AMQPValue, FieldTable};
use lapin::uri::{AMQPAuthority, AMQPQueryString, AMQPUri, AMQPUserInfo};
use lapin::{Channel, Connection, ConnectionProperties};
use std::sync::Arc;
use tracing::debug;

const CLOSE_REPLY_CODE: u16 = 200;
const CLOSE_REPLY_TEXT: &str = "Bye";
const DELIVERY_COUNT_HEADER: &str = "x-delivery-count";

pub struct AmqpTransport {
    uri: AMQPUri,
}

impl AmqpTransport {
    pub fn new(config: &BrokerConfig) -> Self {
        let uri = AMQPUri {
            authority: AMQPAuthority {
                userinfo: AMQPUserInfo {
                    username: config.user.clone(),
                    password: config.pass.clone(),
                },
                host: config.host.clone(),
                port: config.port,
            },
            vhost: config.vhost.clone(),
            query: AMQPQueryString {
                heartbeat: Some(HEARTBEAT_SECS),
                connection_timeout: Some(CONNECT_TIMEOUT.as_millis() as u64),
                ..Default::default()
            },
            ..Default::default()
        };
        Self { uri }
    }
}

#[async_trait]
impl Transport for AmqpTransport {
    type Session = AmqpSession;

    async fn connect(&self) -> Result<AmqpSession, BrokerError> {
        debug!(
            host = %self.uri.authority.host,
            port = self.uri.authority.port,
            vhost = %self.uri.vhost,
            "Opening AMQP connection"
        );
        let connecting = Connection::connect_uri(self.uri.clone(), ConnectionProperties::default());
        let connection = tokio::time::timeout(CONNECT_TIMEOUT, connecting)
            .await
            .map_err(|_| BrokerError::Connect(format!("timed out after {CONNECT_TIMEOUT:?}")))?
            .map_err(|e| BrokerError::Connect(e.to_string()))?;
        let channel = connection
            .create_channel()
            .await
            .map_err(|e| BrokerError::Channel(e.to_string()))?;
        Ok(AmqpSession { connection, channel })
    }
}

pub struct AmqpSession {
    connection: Connection,
    channel: Channel,
}

#[async_trait]
impl Session for AmqpSession {
    async fn declare_queue(&self, name: &str) -> Result<(), BrokerError> {
        let options = QueueDeclareOptions {
            durable: true,
            ..QueueDeclareOptions::default()
        };
        self.channel
            .queue_declare(name, options, FieldTable::default())
            .await
            .map_err(|e| BrokerError::Channel(format!("declare {name}: {e}")))?;
        Ok(())
    }

    async fn set_prefetch(&self, count: u16) -> Result<(), BrokerError> {
        self.channel
            .basic_qos(count, BasicQosOptions::default())
            .await
            .map_err(|e| BrokerError::Channel(e.to_string()))
    }

    async fn consume(
        &self,
        queue: &str,
        consumer_tag: &str,
    ) -> Result<DeliveryStream, BrokerError> {
        let consumer = self
            .channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::Channel(format!("consume {queue}: {e}")))?;
        let stream = consumer.map(|item| {
            item.map(|delivery| Box::new(AmqpDelivery(delivery)) as Box<dyn Delivery>)
                .map_err(|e| BrokerError::Channel(e.to_string()))
        });
        Ok(stream.boxed())
    }

    fn on_failure(&self, hook: FailureHook) {
        let hook = Arc::new(hook);
        let on_error = hook.clone();
        self.connection
            .on_error(move |err| (**on_error)(BrokerError::Connect(err.to_string())));
        if !self.connection.status().connected() {
            (**hook)(BrokerError::Connect("connection closed before it was watched".into()));
        }
    }

    async fn close_channel(&self) -> Result<(), BrokerError> {
        self.channel
            .close(CLOSE_REPLY_CODE, CLOSE_REPLY_TEXT)
            .await
            .map_err(|e| BrokerError::Channel(e.to_string()))
    }

    async fn close_connection(&self) -> Result<(), BrokerError> {
        self.connection
            .close(CLOSE_REPLY_CODE, CLOSE_REPLY_TEXT)
            .await
            .map_err(|e| BrokerError::Connect(e.to_string()))
    }
}

struct AmqpDelivery(lapin::message::Delivery);

fn as_count(value: &AMQPValue) -> Option<u32> {
    match value {
        AMQPValue::ShortShortUInt(v) => Some(u32::from(*v)),
        AMQPValue::ShortUInt(v) => Some(u32::from(*v)),
        AMQPValue::LongUInt(v) => Some(*v),
        AMQPValue::ShortShortInt(v) => u32::try_from(*v).ok(),
        AMQPValue::ShortInt(v) => u32::try_from(*v).ok(),
        AMQPValue::LongInt(v) => u32::try_from(*v).ok(),
        AMQPValue::LongLongInt(v) => u32::try_from(*v).ok(),
        _ => None,
    }
}

#[async_trait]
impl Delivery for AmqpDelivery {
    fn delivery_tag(&self) -> u64 {
        self.0.delivery_tag
    }

    fn payload(&self) -> &[u8] {
        &self.0.data
    }

    fn delivery_count(&self) -> Option<u32> {
        let headers = self.0.properties.headers().as_ref()?;
        headers
            .inner()
            .iter()
            .find(|(key, _)| key.as_str() == DELIVERY_COUNT_HEADER)
            .and_then(|(_, value)| as_count(value))
    }

    async fn ack(&self) -> Result<(), BrokerError> {
        self.0
            .acker
            .ack(BasicAckOptions::default())
            .await
            .map_err(|e| BrokerError::Channel(e.to_string()))
    }

    async fn nack(&self, requeue: bool) -> Result<(), BrokerError> {
        let options = BasicNackOptions {
            requeue,
            ..BasicNackOptions::default()
        };
        self.0
            .acker
            .nack(options)
            .await
            .map_err(|e| BrokerError::Channel(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uri_carries_vhost_and_connection_tuning() {
        let transport = AmqpTransport::new(&BrokerConfig {
            host: "rabbit".into(),
            port: 5673,
            user: "sync".into(),
            pass: "secret".into(),
            vhost: "/legacy".into(),
        });
        assert_eq!(transport.uri.authority.host, "rabbit");
        assert_eq!(transport.uri.authority.port, 5673);
        assert_eq!(transport.uri.vhost, "/legacy");
        assert_eq!(transport.uri.query.heartbeat, Some(60));
        assert_eq!(transport.uri.query.connection_timeout, Some(10_000));
    }

    #[test]
    fn delivery_count_accepts_any_integer_width() {
        assert_eq!(as_count(&AMQPValue::LongLongInt(3)), Some(3));
        assert_eq!(as_count(&AMQPValue::ShortShortUInt(1)), Some(1));
        assert_eq!(as_count(&AMQPValue::LongInt(-1)), None);
        assert_eq!(as_count(&AMQPValue::Boolean(true)), None);
    }
}
