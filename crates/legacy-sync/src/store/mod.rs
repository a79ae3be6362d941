//! # Stores
//!
//! The statements each synchronizer needs, expressed as the [`SyncTx`] trait over one open
//! transaction spanning the source and downstream schemas.
//!
//! - [`mysql::MySqlStore`]: production store on a bounded sqlx pool.
//! - [`memory::MemoryStore`]: in-memory store with failure injection, used by tests.
//!
//! Write methods return the number of rows they matched so callers can enforce the mapping
//! invariant; none of them interprets a zero on its own.

use crate::model::{Customer, Origin, OrderView};
use async_trait::async_trait;
use sync_framework::{MirrorId, SourceId, SyncError, Transaction};
use thiserror::Error;

pub mod memory;
pub mod mysql;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The pool or the server could not be reached (timeouts, I/O, TLS, closed pool).
    #[error("database unavailable: {0}")]
    Unavailable(String),
    /// The statement reached the server and failed there, or its result could not be decoded.
    #[error("statement failed: {0}")]
    Statement(String),
    #[error("invalid schema name: {0:?}")]
    InvalidSchema(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_) => StoreError::Unavailable(err.to_string()),
            other => StoreError::Statement(other.to_string()),
        }
    }
}

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => SyncError::Connection(msg),
            other => SyncError::Database(other.to_string()),
        }
    }
}

/// One open transaction, with the statements the three synchronizers issue.
#[async_trait]
pub trait SyncTx: Transaction {
    /// Whether clearing other default origins must affect at least one row per schema.
    fn strict_default_clearing(&self) -> bool;

    async fn load_customer(&mut self, id: SourceId) -> StoreResult<Option<Customer>>;
    /// Refreshes downstream customer `mirror` from source customer `id`.
    async fn update_customer_mirror(&mut self, id: SourceId, mirror: MirrorId) -> StoreResult<u64>;
    async fn insert_customer_mirror(&mut self, id: SourceId) -> StoreResult<Option<MirrorId>>;
    async fn set_customer_mapping(&mut self, id: SourceId, mirror: MirrorId) -> StoreResult<u64>;

    async fn load_origin(&mut self, id: SourceId) -> StoreResult<Option<Origin>>;
    async fn update_origin_mirror(&mut self, id: SourceId, mirror: MirrorId) -> StoreResult<u64>;
    async fn insert_origin_mirror(&mut self, id: SourceId) -> StoreResult<Option<MirrorId>>;
    async fn set_origin_mapping(&mut self, id: SourceId, mirror: MirrorId) -> StoreResult<u64>;
    /// Clears the default flag on `user_id`'s downstream origins other than `keep`.
    async fn clear_mirror_origin_defaults(
        &mut self,
        user_id: i64,
        keep: Option<MirrorId>,
    ) -> StoreResult<u64>;
    /// Clears the default flag on `user_id`'s source origins other than `keep`.
    async fn clear_source_origin_defaults(
        &mut self,
        user_id: i64,
        keep: SourceId,
    ) -> StoreResult<u64>;

    /// Projects source order `id` into a new downstream order.
    async fn insert_order_mirror(&mut self, id: SourceId) -> StoreResult<Option<MirrorId>>;
    /// Copies the references of source order `id` onto downstream order `mirror`.
    async fn copy_order_references(&mut self, id: SourceId, mirror: MirrorId) -> StoreResult<u64>;
}

/// Read side used by the HTTP API.
#[async_trait]
pub trait OrderLookup: Send + Sync {
    async fn order_view(&self, order_id: u64) -> StoreResult<Option<OrderView>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_timeouts_become_connection_errors() {
        let err: SyncError = StoreError::from(sqlx::Error::PoolTimedOut).into();
        assert!(matches!(err, SyncError::Connection(_)));

        let err: SyncError = StoreError::from(sqlx::Error::RowNotFound).into();
        assert!(matches!(err, SyncError::Database(_)));
    }
}
