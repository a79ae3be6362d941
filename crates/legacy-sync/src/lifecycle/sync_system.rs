use crate::clients::{CustomerClient, OrderClient, OriginClient};
use crate::config::QueueNames;
use crate::queue::{Dispatcher, Transport};
use crate::store::SyncTx;
use anyhow::{Context, Result};
use std::sync::Arc;
use sync_framework::TxSource;
use tokio::task::JoinHandle;
use tracing::info;

/// The three synchronizers and, once started, their consume loops.
///
/// # Example
///
/// ```ignore
/// let mut system = SyncSystem::new(store);
/// system.start(&dispatcher, &config.queues);
/// // ... until a signal arrives ...
/// manager.close().await;
/// system.shutdown().await?;
/// ```
pub struct SyncSystem {
    pub customer_client: CustomerClient,
    pub origin_client: OriginClient,
    pub order_client: OrderClient,
    actors: Vec<JoinHandle<()>>,
    consumers: Vec<JoinHandle<()>>,
}

impl SyncSystem {
    /// Spawns one synchronizer per kind, all sharing `store`.
    pub fn new<S>(store: S) -> Self
    where
        S: TxSource + Clone,
        S::Tx: SyncTx,
    {
        let (customer_actor, customer_client) = crate::customer_actor::new::<S>();
        let (origin_actor, origin_client) = crate::origin_actor::new::<S>();
        let (order_actor, order_client) = crate::order_actor::new::<S>();

        let actors = vec![
            tokio::spawn(customer_actor.run(store.clone())),
            tokio::spawn(origin_actor.run(store.clone())),
            tokio::spawn(order_actor.run(store)),
        ];

        Self {
            customer_client,
            origin_client,
            order_client,
            actors,
            consumers: Vec::new(),
        }
    }

    /// Starts the consume loop of every queue, each feeding its synchronizer.
    pub fn start<T: Transport>(&mut self, dispatcher: &Dispatcher<T>, queues: &QueueNames) {
        self.consumers
            .push(dispatcher.consume(&queues.order, Arc::new(self.order_client.clone())));
        self.consumers
            .push(dispatcher.consume(&queues.customer, Arc::new(self.customer_client.clone())));
        self.consumers
            .push(dispatcher.consume(&queues.origin, Arc::new(self.origin_client.clone())));
        info!(queues = ?queues.all(), "Consumers started");
    }

    /// Waits for the consume loops, then stops the synchronizers.
    ///
    /// The consume loops only return once the connection manager is closed, so close it first.
    pub async fn shutdown(self) -> Result<()> {
        info!("Shutting down sync system...");

        for consumer in self.consumers {
            consumer.await.context("consumer task failed")?;
        }

        // The consume loops held the other clones; these are the last senders.
        drop(self.customer_client);
        drop(self.origin_client);
        drop(self.order_client);

        for actor in self.actors {
            actor.await.context("synchronizer task failed")?;
        }

        info!("Sync system shutdown complete.");
        Ok(())
    }
}
