//! # Transaction Boundary
//!
//! A [`TxSource`] hands out one [`Transaction`] per sync attempt. The transaction owns its
//! pooled connection; dropping it (after commit, after rollback, or on any early return)
//! returns the connection to the pool.

use crate::error::SyncError;
use async_trait::async_trait;
use std::sync::Arc;

/// A unit of work spanning the source and downstream stores.
#[async_trait]
pub trait Transaction: Send + Sized {
    async fn commit(self) -> Result<(), SyncError>;
    async fn rollback(self) -> Result<(), SyncError>;
}

/// Something that can open transactions, typically a connection pool.
#[async_trait]
pub trait TxSource: Send + Sync + 'static {
    type Tx: Transaction;

    /// Acquires a pooled connection and begins a transaction on it.
    ///
    /// Suspends while the pool is exhausted.
    async fn begin(&self) -> Result<Self::Tx, SyncError>;
}

#[async_trait]
impl<S: TxSource> TxSource for Arc<S> {
    type Tx = S::Tx;

    async fn begin(&self) -> Result<Self::Tx, SyncError> {
        (**self).begin().await
    }
}
