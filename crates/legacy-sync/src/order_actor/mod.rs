//! Order synchronizer: copies new orders into `pedidos` with their references.

pub mod entity;

use crate::clients::OrderClient;
use crate::model::Order;
use crate::store::SyncTx;
use sync_framework::{SyncActor, TxSource};

/// Creates the order synchronizer and its client.
pub fn new<S>() -> (SyncActor<Order, S>, OrderClient)
where
    S: TxSource,
    S::Tx: SyncTx,
{
    let (actor, generic_client) = SyncActor::new(32);
    (actor, OrderClient::new(generic_client))
}
