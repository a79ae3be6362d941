//! # Generic Upsert
//!
//! The upsert-by-mapped-identifier algorithm, written once for every [`MirrorEntity`].
//!
//! 1. Load the source record; absent means [`SyncError::NotFound`].
//! 2. Run the entity's `before_write` hook.
//! 3. Mapped: refresh the mirror row. Zero rows matched is [`SyncError::Inconsistency`].
//! 4. Unmapped: insert a mirror row (nothing inserted is [`SyncError::NotFound`]) and record
//!    the new identifier on the source row (zero rows is [`SyncError::Inconsistency`]).
//!
//! The caller owns the transaction and rolls it back on any `Err`.

use crate::entity::{MirrorEntity, SourceId};
use crate::error::SyncError;
use crate::outcome::{Secondary, SyncOutcome};
use std::future::Future;
use tracing::{debug, info, warn};

pub async fn upsert<E, Tx>(tx: &mut Tx, id: SourceId) -> Result<SyncOutcome, SyncError>
where
    E: MirrorEntity<Tx>,
    Tx: Send,
{
    let kind = E::KIND;
    let record = E::load(tx, id)
        .await?
        .ok_or(SyncError::NotFound { kind, id })?;
    debug!(kind, %id, ?record, "Loaded source record");

    record.before_write(tx, id).await?;

    match record.mapped_id() {
        Some(mirror_id) => {
            let matched = record.update_mirror(tx, id, mirror_id).await?;
            if matched == 0 {
                return Err(SyncError::Inconsistency(format!(
                    "{kind} {id} is mapped to {mirror_id}, which does not exist downstream"
                )));
            }
            info!(kind, %id, %mirror_id, "Mirror updated");
            Ok(SyncOutcome::updated(kind, id, mirror_id))
        }
        None => {
            let mirror_id = E::insert_mirror(tx, id)
                .await?
                .ok_or(SyncError::NotFound { kind, id })?;
            info!(kind, %id, %mirror_id, "Mirror inserted");

            let affected = E::record_mapping(tx, id, mirror_id).await?;
            if affected == 0 {
                return Err(SyncError::Inconsistency(format!(
                    "{kind} {id} was mirrored as {mirror_id} but the mapping was not recorded"
                )));
            }
            debug!(kind, %id, %mirror_id, "Mapping recorded");
            Ok(SyncOutcome::inserted(kind, id, mirror_id))
        }
    }
}

/// Runs a secondary write whose failure must not affect the primary one.
///
/// The error is logged as a warning and folded into [`Secondary::Failed`].
pub async fn best_effort<F>(
    kind: &'static str,
    id: SourceId,
    what: &'static str,
    write: F,
) -> Secondary
where
    F: Future<Output = Result<u64, SyncError>>,
{
    match write.await {
        Ok(copied) => {
            info!(kind, %id, what, copied, "Secondary write done");
            Secondary::Copied(copied)
        }
        Err(e) => {
            warn!(kind, %id, what, error = %e, "Secondary write failed");
            Secondary::Failed(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{MirrorId, SyncEntity, SyncKind};
    use crate::outcome::MirrorOp;
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// Source rows keyed by id (value = mapped id) and mirror rows keyed by mirror id.
    #[derive(Default)]
    struct FakeTx {
        source: HashMap<u64, Option<u64>>,
        mirror: HashMap<u64, u64>,
        next_mirror: u64,
        lose_mapping: bool,
    }

    #[derive(Debug)]
    struct Widget {
        id: SourceId,
        mapped: Option<MirrorId>,
    }

    impl SyncKind for Widget {
        const KIND: &'static str = "widget";
    }

    #[async_trait]
    impl SyncEntity<FakeTx> for Widget {
        async fn synchronize(tx: &mut FakeTx, id: SourceId) -> Result<SyncOutcome, SyncError> {
            upsert::<Self, FakeTx>(tx, id).await
        }
    }

    #[async_trait]
    impl MirrorEntity<FakeTx> for Widget {
        fn mapped_id(&self) -> Option<MirrorId> {
            self.mapped
        }

        async fn load(tx: &mut FakeTx, id: SourceId) -> Result<Option<Self>, SyncError> {
            Ok(tx.source.get(&id.0).map(|mapped| Widget {
                id,
                mapped: MirrorId::from_mapped(*mapped),
            }))
        }

        async fn update_mirror(
            &self,
            tx: &mut FakeTx,
            id: SourceId,
            mirror_id: MirrorId,
        ) -> Result<u64, SyncError> {
            Ok(match tx.mirror.get_mut(&mirror_id.0) {
                Some(row) => {
                    *row = id.0;
                    1
                }
                None => 0,
            })
        }

        async fn insert_mirror(
            tx: &mut FakeTx,
            id: SourceId,
        ) -> Result<Option<MirrorId>, SyncError> {
            if !tx.source.contains_key(&id.0) {
                return Ok(None);
            }
            tx.next_mirror += 1;
            tx.mirror.insert(tx.next_mirror, id.0);
            Ok(Some(MirrorId(tx.next_mirror)))
        }

        async fn record_mapping(
            tx: &mut FakeTx,
            id: SourceId,
            mirror_id: MirrorId,
        ) -> Result<u64, SyncError> {
            if tx.lose_mapping {
                return Ok(0);
            }
            tx.source.insert(id.0, Some(mirror_id.0));
            Ok(1)
        }
    }

    #[tokio::test]
    async fn first_sync_inserts_second_sync_updates() {
        let mut tx = FakeTx {
            next_mirror: 100,
            ..Default::default()
        };
        tx.source.insert(42, None);

        let first = Widget::synchronize(&mut tx, SourceId(42)).await.unwrap();
        assert_eq!(first.op, MirrorOp::Inserted);
        assert_eq!(first.mirror_id, MirrorId(101));
        assert_eq!(tx.source[&42], Some(101));

        let second = Widget::synchronize(&mut tx, SourceId(42)).await.unwrap();
        assert_eq!(second.op, MirrorOp::Updated);
        assert_eq!(second.mirror_id, MirrorId(101));
        assert_eq!(tx.mirror.len(), 1);
    }

    #[tokio::test]
    async fn missing_source_is_not_found() {
        let mut tx = FakeTx::default();
        let err = Widget::synchronize(&mut tx, SourceId(5)).await.unwrap_err();
        assert!(matches!(err, SyncError::NotFound { kind: "widget", id } if id == SourceId(5)));
        assert!(tx.mirror.is_empty());
    }

    #[tokio::test]
    async fn dangling_mapping_is_inconsistency() {
        let mut tx = FakeTx::default();
        tx.source.insert(7, Some(301));
        let err = Widget::synchronize(&mut tx, SourceId(7)).await.unwrap_err();
        assert!(matches!(err, SyncError::Inconsistency(_)));
    }

    #[tokio::test]
    async fn unrecorded_mapping_is_inconsistency() {
        let mut tx = FakeTx {
            lose_mapping: true,
            ..Default::default()
        };
        tx.source.insert(3, None);
        let err = Widget::synchronize(&mut tx, SourceId(3)).await.unwrap_err();
        assert!(matches!(err, SyncError::Inconsistency(_)));
    }

    #[tokio::test]
    async fn best_effort_swallows_failure() {
        let ok = best_effort("widget", SourceId(1), "refs", async { Ok(3) }).await;
        assert_eq!(ok, Secondary::Copied(3));

        let failed = best_effort("widget", SourceId(1), "refs", async {
            Err(SyncError::Database("table missing".into()))
        })
        .await;
        assert!(matches!(failed, Secondary::Failed(msg) if msg.contains("table missing")));
    }
}
