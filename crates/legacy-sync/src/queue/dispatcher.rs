//! Per-queue consume loops.
//!
//! Each loop follows the connection manager's [`Link`]: it consumes while the link is up,
//! resubscribes after a reconnect and exits once the manager is closed. A consumer that ends
//! or fails to start while the link stays up (a broker-side cancel, a channel error) is
//! restarted after the requeue delay. Deliveries on one queue are processed strictly one after
//! another.

use super::{
    ConnectionManager, ConnectionState, Delivery, DeliveryStream, Link, MessageHandler,
    RetryPolicy, Session, Transport,
};
use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use sync_framework::{FrameworkError, SyncError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};

pub struct Dispatcher<T: Transport> {
    manager: ConnectionManager<T>,
    retry: RetryPolicy,
    requeue_delay: Duration,
}

enum StreamEnd {
    /// The broker ended the consumer.
    Drained,
    /// The link moved on while consuming.
    LinkChanged,
    Closed,
}

impl<T: Transport> Dispatcher<T> {
    pub fn new(manager: ConnectionManager<T>, retry: RetryPolicy, requeue_delay: Duration) -> Self {
        Self {
            manager,
            retry,
            requeue_delay,
        }
    }

    /// Spawns the consume loop for `queue`. Connects first if nobody has yet.
    pub fn consume(
        &self,
        queue: impl Into<String>,
        handler: Arc<dyn MessageHandler>,
    ) -> JoinHandle<()> {
        let consumer = Consumer {
            queue: queue.into(),
            handler,
            retry: self.retry,
            requeue_delay: self.requeue_delay,
        };
        let manager = self.manager.clone();
        tokio::spawn(async move {
            if manager.state() == ConnectionState::Disconnected {
                // A failure is logged and retried by the manager; the loop waits for the link.
                let _ = manager.connect().await;
            }
            consumer.run(manager.subscribe()).await;
        })
    }
}

struct Consumer {
    queue: String,
    handler: Arc<dyn MessageHandler>,
    retry: RetryPolicy,
    requeue_delay: Duration,
}

impl Consumer {
    async fn run<S: Session>(self, mut link: watch::Receiver<Link<S>>) {
        let tag = format!("legacy-sync-{}", self.queue);
        loop {
            let current = link.borrow_and_update().clone();
            let end = match current {
                Link::Closed => StreamEnd::Closed,
                Link::Down => StreamEnd::Drained,
                Link::Up(session) => match session.consume(&self.queue, &tag).await {
                    Ok(stream) => {
                        info!(queue = %self.queue, "Consuming");
                        self.pump(stream, &mut link).await
                    }
                    Err(err) => {
                        error!(queue = %self.queue, error = %err, "Failed to start consumer");
                        StreamEnd::Drained
                    }
                },
            };

            let open = match end {
                StreamEnd::Closed => false,
                StreamEnd::LinkChanged => true,
                StreamEnd::Drained => self.wait_to_resubscribe(&mut link).await,
            };
            if !open {
                break;
            }
        }
        info!(queue = %self.queue, "Consumer stopped");
    }

    /// Waits for a new link, or only for the requeue delay when the current one is still up.
    /// `false` once the manager is gone.
    async fn wait_to_resubscribe<S>(&self, link: &mut watch::Receiver<Link<S>>) -> bool {
        let up = matches!(*link.borrow(), Link::Up(_));
        if !up {
            return link.changed().await.is_ok();
        }

        warn!(
            queue = %self.queue,
            delay_secs = self.requeue_delay.as_secs(),
            "Consumer ended while connected; resubscribing after delay"
        );
        tokio::select! {
            _ = tokio::time::sleep(self.requeue_delay) => true,
            changed = link.changed() => changed.is_ok(),
        }
    }

    async fn pump<S>(
        &self,
        mut stream: DeliveryStream,
        link: &mut watch::Receiver<Link<S>>,
    ) -> StreamEnd {
        loop {
            let next = tokio::select! {
                next = stream.next() => next,
                changed = link.changed() => {
                    return if changed.is_err() {
                        StreamEnd::Closed
                    } else {
                        StreamEnd::LinkChanged
                    };
                }
            };
            match next {
                Some(Ok(delivery)) => self.process(delivery).await,
                Some(Err(err)) => {
                    warn!(queue = %self.queue, error = %err, "Consumer stream failed");
                    return StreamEnd::Drained;
                }
                None => {
                    debug!(queue = %self.queue, "Consumer stream ended");
                    return StreamEnd::Drained;
                }
            }
        }
    }

    async fn process(&self, delivery: Box<dyn Delivery>) {
        let span = info_span!(
            "delivery",
            queue = %self.queue,
            delivery_tag = delivery.delivery_tag()
        );
        async {
            let result = match serde_json::from_slice::<Value>(delivery.payload()) {
                Ok(payload) => {
                    debug!(%payload, "Message received");
                    self.handler.handle(payload).await
                }
                Err(err) => Err(FrameworkError::Sync(SyncError::Validation(format!(
                    "malformed JSON: {err}"
                )))),
            };

            match result {
                Ok(()) => match delivery.ack().await {
                    Ok(()) => debug!("Message acknowledged"),
                    Err(err) => error!(error = %err, "Failed to acknowledge message"),
                },
                Err(err) => self.reject(delivery.as_ref(), err).await,
            }
        }
        .instrument(span)
        .await
    }

    async fn reject(&self, delivery: &dyn Delivery, err: FrameworkError) {
        let category = err.as_sync().map_or("actor", SyncError::category);
        let attempts = delivery.delivery_count().unwrap_or(0).saturating_add(1);

        if self.retry.exhausted(delivery.delivery_count()) {
            error!(
                error = %err,
                category,
                attempts,
                "Message failed, attempts exhausted; rejecting without requeue"
            );
            if let Err(err) = delivery.nack(false).await {
                error!(error = %err, "Failed to reject message");
            }
            return;
        }

        error!(
            error = %err,
            category,
            attempts,
            delay_secs = self.requeue_delay.as_secs(),
            "Message failed; requeueing after delay"
        );
        tokio::time::sleep(self.requeue_delay).await;
        match delivery.nack(true).await {
            Ok(()) => debug!("Message requeued"),
            Err(err) => error!(error = %err, "Failed to requeue message"),
        }
    }
}
