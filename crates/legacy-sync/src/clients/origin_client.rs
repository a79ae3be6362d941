use crate::model::Origin;
use crate::queue::MessageHandler;
use async_trait::async_trait;
use serde_json::Value;
use sync_framework::{EntityClient, FrameworkError, SyncClient};
use tracing::{info, instrument};

/// Client for the origin synchronizer.
#[derive(Clone)]
pub struct OriginClient {
    inner: SyncClient<Origin>,
}

impl OriginClient {
    pub fn new(inner: SyncClient<Origin>) -> Self {
        Self { inner }
    }
}

impl EntityClient<Origin> for OriginClient {
    fn inner(&self) -> &SyncClient<Origin> {
        &self.inner
    }
}

#[async_trait]
impl MessageHandler for OriginClient {
    #[instrument(skip(self, payload))]
    async fn handle(&self, payload: Value) -> Result<(), FrameworkError> {
        let outcome = self.sync_payload(&payload).await?;
        info!(
            source_id = %outcome.source_id,
            mirror_id = %outcome.mirror_id,
            op = ?outcome.op,
            "Origin synchronized"
        );
        Ok(())
    }
}
