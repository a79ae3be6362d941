//! Customer synchronizer: mirrors `customer` into `mp_clientes`.

pub mod entity;

use crate::clients::CustomerClient;
use crate::model::Customer;
use crate::store::SyncTx;
use sync_framework::{SyncActor, TxSource};

/// Creates the customer synchronizer and its client.
pub fn new<S>() -> (SyncActor<Customer, S>, CustomerClient)
where
    S: TxSource,
    S::Tx: SyncTx,
{
    let (actor, generic_client) = SyncActor::new(32);
    (actor, CustomerClient::new(generic_client))
}
