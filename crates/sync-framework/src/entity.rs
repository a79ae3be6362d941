//! # Entity Traits
//!
//! The contracts an entity kind implements to be served by a [`SyncActor`](crate::SyncActor).
//!
//! - [`SyncKind`] names the kind (used by clients, logs and queue wiring).
//! - [`SyncEntity`] is the single operation the actor runs inside a transaction.
//! - [`MirrorEntity`] is the richer contract for kinds that follow the
//!   upsert-by-mapped-identifier protocol; implementing it gives access to the generic
//!   [`upsert`](crate::upsert) algorithm.
//!
//! The traits are generic over the transaction type `Tx`, so the same entity works with the
//! production store and with an in-memory store in tests.

use crate::error::SyncError;
use crate::outcome::SyncOutcome;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display};

/// Identifier assigned by the source store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceId(pub u64);

impl From<u64> for SourceId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier assigned by the downstream store to a mirror row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MirrorId(pub u64);

impl MirrorId {
    /// Interprets a raw mapping column. `NULL` and `0` both mean "not materialized yet".
    pub fn from_mapped(raw: Option<u64>) -> Option<Self> {
        raw.filter(|v| *v > 0).map(Self)
    }
}

impl From<u64> for MirrorId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl Display for MirrorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Names an entity kind. One queue and one synchronizer exist per kind.
pub trait SyncKind: Send + Sync + 'static {
    /// Lower-case kind label, e.g. `"customer"`.
    const KIND: &'static str;
}

/// The operation a synchronizer performs for one source identifier.
///
/// The actor owns the transaction boundary: it begins `tx`, calls [`SyncEntity::synchronize`],
/// and commits on `Ok` or rolls back on `Err`. Implementations only issue statements.
#[async_trait]
pub trait SyncEntity<Tx: Send>: SyncKind + Debug + Sized {
    async fn synchronize(tx: &mut Tx, id: SourceId) -> Result<SyncOutcome, SyncError>;
}

/// Contract for kinds that mirror a source row and record the mapping back.
///
/// The generic [`upsert`](crate::upsert) drives these hooks in order:
/// `load` → `before_write` → (`update_mirror` | `insert_mirror` → `record_mapping`).
#[async_trait]
pub trait MirrorEntity<Tx: Send>: SyncEntity<Tx> {
    /// The mirror row this record is mapped to, if it has been materialized.
    fn mapped_id(&self) -> Option<MirrorId>;

    /// Reads the source record. `None` when the row does not exist.
    async fn load(tx: &mut Tx, id: SourceId) -> Result<Option<Self>, SyncError>;

    /// Runs after the record is loaded and before any mirror write.
    async fn before_write(&self, _tx: &mut Tx, _id: SourceId) -> Result<(), SyncError> {
        Ok(())
    }

    /// Refreshes `mirror_id` from source row `id`, projecting the same columns as
    /// `insert_mirror`. Returns the number of rows matched.
    async fn update_mirror(
        &self,
        tx: &mut Tx,
        id: SourceId,
        mirror_id: MirrorId,
    ) -> Result<u64, SyncError>;

    /// Projects the source row into a new mirror row. `None` when nothing was inserted.
    async fn insert_mirror(tx: &mut Tx, id: SourceId) -> Result<Option<MirrorId>, SyncError>;

    /// Writes `mirror_id` into the source row's mapping column. Returns rows affected.
    async fn record_mapping(
        tx: &mut Tx,
        id: SourceId,
        mirror_id: MirrorId,
    ) -> Result<u64, SyncError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_and_null_mean_unmapped() {
        assert_eq!(MirrorId::from_mapped(None), None);
        assert_eq!(MirrorId::from_mapped(Some(0)), None);
        assert_eq!(MirrorId::from_mapped(Some(301)), Some(MirrorId(301)));
    }
}
