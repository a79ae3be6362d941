//! # Broker Consumption
//!
//! Everything between RabbitMQ and the synchronizers:
//!
//! - [`connection::ConnectionManager`]: owns the single broker connection and its channel,
//!   declares the queues, and reconnects after a fixed delay when the link drops.
//! - [`dispatcher::Dispatcher`]: one consume loop per queue; decodes each delivery, hands it
//!   to a [`MessageHandler`] and acknowledges it, or rejects it back onto the queue.
//! - [`amqp`]: the lapin-backed [`Transport`].
//! - [`memory`]: an in-process broker for tests.
//!
//! The transport traits below are the seam between the two: the manager and dispatcher only
//! ever see [`Transport`], [`Session`] and [`Delivery`].

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;
use sync_framework::FrameworkError;
use thiserror::Error;

pub mod amqp;
pub mod connection;
pub mod dispatcher;
pub mod memory;

pub use connection::{ConnectionManager, ConnectionState, Link};
pub use dispatcher::Dispatcher;

#[derive(Debug, Clone, Error)]
pub enum BrokerError {
    #[error("broker connection failed: {0}")]
    Connect(String),
    #[error("channel operation failed: {0}")]
    Channel(String),
    #[error("not connected to the broker")]
    NotConnected,
    #[error("connection manager is closed")]
    Closed,
}

/// Invoked at most once per failure event when an established connection errors or closes.
/// May run on a thread outside the Tokio runtime.
pub type FailureHook = Box<dyn Fn(BrokerError) + Send + Sync>;

pub type DeliveryStream = BoxStream<'static, Result<Box<dyn Delivery>, BrokerError>>;

/// Opens connections to a broker.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    type Session: Session;

    /// Opens a connection and one channel on it.
    async fn connect(&self) -> Result<Self::Session, BrokerError>;
}

/// One open connection with its channel.
#[async_trait]
pub trait Session: Send + Sync + 'static {
    /// Declares a durable queue, creating it if absent.
    async fn declare_queue(&self, name: &str) -> Result<(), BrokerError>;

    /// Limits unacknowledged deliveries per consumer on this channel.
    async fn set_prefetch(&self, count: u16) -> Result<(), BrokerError>;

    /// Starts a manual-ack consumer. The stream ends when the channel or connection goes away.
    async fn consume(&self, queue: &str, consumer_tag: &str)
        -> Result<DeliveryStream, BrokerError>;

    /// Registers `hook` for failures of this connection. Runs it right away when the connection
    /// is already gone.
    fn on_failure(&self, hook: FailureHook);

    async fn close_channel(&self) -> Result<(), BrokerError>;

    async fn close_connection(&self) -> Result<(), BrokerError>;
}

/// A single unacknowledged message.
#[async_trait]
pub trait Delivery: Send + Sync {
    fn delivery_tag(&self) -> u64;

    fn payload(&self) -> &[u8];

    /// Prior deliveries of this message, when the broker reports them (`x-delivery-count`).
    fn delivery_count(&self) -> Option<u32>;

    async fn ack(&self) -> Result<(), BrokerError>;

    async fn nack(&self, requeue: bool) -> Result<(), BrokerError>;
}

/// Processes one decoded message body. An `Err` leads to the delivery being requeued.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, payload: Value) -> Result<(), FrameworkError>;
}

/// How many times a failing message is attempted before it is dropped from its queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    /// `None` requeues forever.
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    pub fn unbounded() -> Self {
        Self { max_attempts: None }
    }

    pub fn bounded(max_attempts: u32) -> Self {
        Self {
            max_attempts: Some(max_attempts),
        }
    }

    /// Whether the attempt that just failed was the last one allowed.
    ///
    /// A message without a delivery count is on its first attempt.
    pub fn exhausted(&self, delivery_count: Option<u32>) -> bool {
        match self.max_attempts {
            Some(max) => delivery_count.unwrap_or(0).saturating_add(1) >= max,
            None => false,
        }
    }
}
