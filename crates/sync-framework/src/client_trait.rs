//! # EntityClient Trait
//!
//! Common interface for kind-specific clients. Provides `sync`, `stats` and payload validation
//! on top of the generic [`SyncClient`].
use crate::{FrameworkError, SourceId, SyncClient, SyncKind, SyncMessage, SyncOutcome, SyncStats};
use async_trait::async_trait;
use serde_json::Value;

/// Trait for kind-specific clients to inherit the standard operations.
///
/// # Example
///
/// ```rust
/// use sync_framework::{EntityClient, SyncClient, SyncKind};
///
/// #[derive(Debug)]
/// struct Customer;
///
/// impl SyncKind for Customer {
///     const KIND: &'static str = "customer";
/// }
///
/// #[derive(Clone)]
/// struct CustomerClient {
///     inner: SyncClient<Customer>,
/// }
///
/// impl EntityClient<Customer> for CustomerClient {
///     fn inner(&self) -> &SyncClient<Customer> {
///         &self.inner
///     }
/// }
/// ```
#[async_trait]
pub trait EntityClient<E: SyncKind>: Send + Sync {
    /// Access the inner generic client.
    fn inner(&self) -> &SyncClient<E>;

    /// Synchronize one source record.
    #[tracing::instrument(skip(self), fields(kind = E::KIND))]
    async fn sync(&self, id: SourceId) -> Result<SyncOutcome, FrameworkError> {
        tracing::debug!("Sending request");
        self.inner().sync(id).await
    }

    /// Validates a decoded broker payload, then synchronizes the record it names.
    ///
    /// An unusable identifier fails here, before the actor is contacted and before any
    /// database connection is taken.
    #[tracing::instrument(skip(self, payload), fields(kind = E::KIND))]
    async fn sync_payload(&self, payload: &Value) -> Result<SyncOutcome, FrameworkError> {
        let message = SyncMessage::from_payload(payload)?;
        tracing::debug!(source_id = %message.id, "Sending request");
        self.inner().sync(message.id).await
    }

    /// Read the synchronizer's counters.
    async fn stats(&self) -> Result<SyncStats, FrameworkError> {
        self.inner().stats().await
    }
}
