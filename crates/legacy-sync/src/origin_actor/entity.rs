//! Sync protocol for [`Origin`].
//!
//! Same upsert as customers, plus the default-flag invariant: when the origin being synced is
//! its owner's default, every other origin of that owner loses the flag in both schemas before
//! the mirror is written. Both clears run in the sync transaction, so a later failure undoes
//! them too.

use crate::model::Origin;
use crate::store::SyncTx;
use async_trait::async_trait;
use sync_framework::{
    upsert, MirrorEntity, MirrorId, SourceId, SyncEntity, SyncError, SyncKind, SyncOutcome,
};
use tracing::{debug, info};

impl SyncKind for Origin {
    const KIND: &'static str = "origin";
}

#[async_trait]
impl<Tx: SyncTx> SyncEntity<Tx> for Origin {
    async fn synchronize(tx: &mut Tx, id: SourceId) -> Result<SyncOutcome, SyncError> {
        upsert::<Self, Tx>(tx, id).await
    }
}

#[async_trait]
impl<Tx: SyncTx> MirrorEntity<Tx> for Origin {
    fn mapped_id(&self) -> Option<MirrorId> {
        MirrorId::from_mapped(self.sync_id)
    }

    async fn load(tx: &mut Tx, id: SourceId) -> Result<Option<Self>, SyncError> {
        Ok(tx.load_origin(id).await?)
    }

    async fn before_write(&self, tx: &mut Tx, id: SourceId) -> Result<(), SyncError> {
        if !self.is_default {
            return Ok(());
        }
        let Some(user_id) = self.user_id else {
            debug!(source_id = %id, "Default origin has no owner, nothing to clear");
            return Ok(());
        };

        let keep = MirrorId::from_mapped(self.sync_id);
        let mirror_cleared = tx.clear_mirror_origin_defaults(user_id, keep).await?;
        let source_cleared = tx.clear_source_origin_defaults(user_id, id).await?;
        info!(
            source_id = %id,
            user_id,
            mirror_cleared,
            source_cleared,
            "Cleared other default origins"
        );

        if tx.strict_default_clearing() && (mirror_cleared == 0 || source_cleared == 0) {
            return Err(SyncError::Inconsistency(format!(
                "origin {id}: no other default origin of user {user_id} to clear \
                 (downstream {mirror_cleared}, source {source_cleared})"
            )));
        }
        Ok(())
    }

    async fn update_mirror(
        &self,
        tx: &mut Tx,
        id: SourceId,
        mirror_id: MirrorId,
    ) -> Result<u64, SyncError> {
        Ok(tx.update_origin_mirror(id, mirror_id).await?)
    }

    async fn insert_mirror(tx: &mut Tx, id: SourceId) -> Result<Option<MirrorId>, SyncError> {
        Ok(tx.insert_origin_mirror(id).await?)
    }

    async fn record_mapping(
        tx: &mut Tx,
        id: SourceId,
        mirror_id: MirrorId,
    ) -> Result<u64, SyncError> {
        Ok(tx.set_origin_mapping(id, mirror_id).await?)
    }
}
