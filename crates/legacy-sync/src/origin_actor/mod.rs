//! Origin synchronizer: mirrors `origin` into `mp_origen` and keeps one default per user.

pub mod entity;

use crate::clients::OriginClient;
use crate::model::Origin;
use crate::store::SyncTx;
use sync_framework::{SyncActor, TxSource};

/// Creates the origin synchronizer and its client.
pub fn new<S>() -> (SyncActor<Origin, S>, OriginClient)
where
    S: TxSource,
    S::Tx: SyncTx,
{
    let (actor, generic_client) = SyncActor::new(32);
    (actor, OriginClient::new(generic_client))
}
