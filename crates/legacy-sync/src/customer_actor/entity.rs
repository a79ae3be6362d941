//! Sync protocol for [`Customer`].
//!
//! Customers follow the plain upsert-by-mapped-identifier protocol with no extra hooks.

use crate::model::Customer;
use crate::store::SyncTx;
use async_trait::async_trait;
use sync_framework::{
    upsert, MirrorEntity, MirrorId, SourceId, SyncEntity, SyncError, SyncKind, SyncOutcome,
};

impl SyncKind for Customer {
    const KIND: &'static str = "customer";
}

#[async_trait]
impl<Tx: SyncTx> SyncEntity<Tx> for Customer {
    async fn synchronize(tx: &mut Tx, id: SourceId) -> Result<SyncOutcome, SyncError> {
        upsert::<Self, Tx>(tx, id).await
    }
}

#[async_trait]
impl<Tx: SyncTx> MirrorEntity<Tx> for Customer {
    fn mapped_id(&self) -> Option<MirrorId> {
        MirrorId::from_mapped(self.sync_id)
    }

    async fn load(tx: &mut Tx, id: SourceId) -> Result<Option<Self>, SyncError> {
        Ok(tx.load_customer(id).await?)
    }

    async fn update_mirror(
        &self,
        tx: &mut Tx,
        id: SourceId,
        mirror_id: MirrorId,
    ) -> Result<u64, SyncError> {
        Ok(tx.update_customer_mirror(id, mirror_id).await?)
    }

    async fn insert_mirror(tx: &mut Tx, id: SourceId) -> Result<Option<MirrorId>, SyncError> {
        Ok(tx.insert_customer_mirror(id).await?)
    }

    async fn record_mapping(
        tx: &mut Tx,
        id: SourceId,
        mirror_id: MirrorId,
    ) -> Result<u64, SyncError> {
        Ok(tx.set_customer_mapping(id, mirror_id).await?)
    }
}
