//! Sync protocol for [`Order`].
//!
//! Orders are insert-only: every delivery projects the source order into a new `pedidos` row.
//! There is no mapping column, so a redelivered message inserts again. The references are
//! copied best-effort afterwards; their failure is recorded in the outcome and never fails the
//! order.

use crate::model::Order;
use crate::store::SyncTx;
use async_trait::async_trait;
use sync_framework::{best_effort, SourceId, SyncEntity, SyncError, SyncKind, SyncOutcome};

impl SyncKind for Order {
    const KIND: &'static str = "order";
}

#[async_trait]
impl<Tx: SyncTx> SyncEntity<Tx> for Order {
    async fn synchronize(tx: &mut Tx, id: SourceId) -> Result<SyncOutcome, SyncError> {
        let mirror_id = tx
            .insert_order_mirror(id)
            .await?
            .ok_or(SyncError::NotFound { kind: Self::KIND, id })?;

        let references = best_effort(Self::KIND, id, "order references", async {
            Ok(tx.copy_order_references(id, mirror_id).await?)
        })
        .await;

        Ok(SyncOutcome::inserted(Self::KIND, id, mirror_id).with_secondary(references))
    }
}
