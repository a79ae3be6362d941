use crate::model::Order;
use crate::queue::MessageHandler;
use async_trait::async_trait;
use serde_json::Value;
use sync_framework::{EntityClient, FrameworkError, Secondary, SyncClient};
use tracing::{info, instrument, warn};

/// Client for the order synchronizer.
#[derive(Clone)]
pub struct OrderClient {
    inner: SyncClient<Order>,
}

impl OrderClient {
    pub fn new(inner: SyncClient<Order>) -> Self {
        Self { inner }
    }
}

impl EntityClient<Order> for OrderClient {
    fn inner(&self) -> &SyncClient<Order> {
        &self.inner
    }
}

#[async_trait]
impl MessageHandler for OrderClient {
    #[instrument(skip(self, payload))]
    async fn handle(&self, payload: Value) -> Result<(), FrameworkError> {
        let outcome = self.sync_payload(&payload).await?;
        match &outcome.secondary {
            Some(Secondary::Failed(reason)) => warn!(
                source_id = %outcome.source_id,
                mirror_id = %outcome.mirror_id,
                %reason,
                "Order inserted without its references"
            ),
            _ => info!(
                source_id = %outcome.source_id,
                mirror_id = %outcome.mirror_id,
                "Order inserted"
            ),
        }
        Ok(())
    }
}
