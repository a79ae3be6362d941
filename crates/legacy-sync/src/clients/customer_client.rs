use crate::model::Customer;
use crate::queue::MessageHandler;
use async_trait::async_trait;
use serde_json::Value;
use sync_framework::{EntityClient, FrameworkError, SyncClient};
use tracing::{info, instrument};

/// Client for the customer synchronizer.
#[derive(Clone)]
pub struct CustomerClient {
    inner: SyncClient<Customer>,
}

impl CustomerClient {
    pub fn new(inner: SyncClient<Customer>) -> Self {
        Self { inner }
    }
}

impl EntityClient<Customer> for CustomerClient {
    fn inner(&self) -> &SyncClient<Customer> {
        &self.inner
    }
}

#[async_trait]
impl MessageHandler for CustomerClient {
    #[instrument(skip(self, payload))]
    async fn handle(&self, payload: Value) -> Result<(), FrameworkError> {
        let outcome = self.sync_payload(&payload).await?;
        info!(
            source_id = %outcome.source_id,
            mirror_id = %outcome.mirror_id,
            op = ?outcome.op,
            "Customer synchronized"
        );
        Ok(())
    }
}
