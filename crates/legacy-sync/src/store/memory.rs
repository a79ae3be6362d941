//! In-memory store.
//!
//! A transaction takes the table lock for its whole lifetime and works on a copy; commit
//! publishes the copy, rollback (or drop) discards it. Faults can be switched on to exercise
//! the rollback and best-effort paths.

use super::{OrderLookup, StoreError, StoreResult, SyncTx};
use crate::model::{Customer, LegacyOrder, Order, OrderReference, OrderView, Origin};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use sync_framework::{MirrorId, SourceId, SyncError, Transaction, TxSource};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Both schemas, keyed by row id.
#[derive(Debug, Clone, Default)]
pub struct Tables {
    pub customers: BTreeMap<u64, Customer>,
    pub customer_mirrors: BTreeMap<u64, Customer>,
    pub origins: BTreeMap<u64, Origin>,
    pub origin_mirrors: BTreeMap<u64, Origin>,
    pub orders: BTreeMap<u64, Order>,
    pub order_references: Vec<OrderReference>,
    pub order_mirrors: BTreeMap<u64, LegacyOrder>,
    /// Copied references; `order_id` is the downstream order id.
    pub mirror_references: Vec<OrderReference>,
    /// Driver assignments by downstream order id, as (name, phone).
    pub drivers: BTreeMap<u64, (Option<String>, Option<String>)>,
    /// Delivery status by downstream order id.
    pub order_status: BTreeMap<u64, i64>,
}

fn next_id<V>(table: &BTreeMap<u64, V>) -> u64 {
    table.keys().next_back().map_or(1, |last| last + 1)
}

/// Statements that fail while switched on.
#[derive(Debug, Clone, Copy, Default)]
pub struct Faults {
    pub begin: bool,
    pub mapping: bool,
    pub reference_copy: bool,
}

#[derive(Debug, Default)]
struct Shared {
    faults: StdMutex<Faults>,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    shared: Arc<Shared>,
    strict_default_clearing: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_strict_default_clearing(mut self, strict: bool) -> Self {
        self.strict_default_clearing = strict;
        self
    }

    /// Runs `f` against the committed tables, outside any transaction.
    pub async fn with_tables<R>(&self, f: impl FnOnce(&mut Tables) -> R) -> R {
        let mut tables = self.tables.lock().await;
        f(&mut tables)
    }

    pub async fn snapshot(&self) -> Tables {
        self.tables.lock().await.clone()
    }

    pub fn set_faults(&self, faults: Faults) {
        if let Ok(mut current) = self.shared.faults.lock() {
            *current = faults;
        }
    }

    fn faults(&self) -> Faults {
        self.shared.faults.lock().map(|f| *f).unwrap_or_default()
    }

    pub fn commits(&self) -> usize {
        self.shared.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.shared.rollbacks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TxSource for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx, SyncError> {
        let faults = self.faults();
        if faults.begin {
            return Err(StoreError::Unavailable("connection refused".into()).into());
        }
        let guard = self.tables.clone().lock_owned().await;
        let work = guard.clone();
        Ok(MemoryTx {
            guard,
            work,
            faults,
            shared: self.shared.clone(),
            strict_default_clearing: self.strict_default_clearing,
        })
    }
}

#[async_trait]
impl OrderLookup for MemoryStore {
    async fn order_view(&self, order_id: u64) -> StoreResult<Option<OrderView>> {
        let tables = self.tables.lock().await;
        let Some(order) = tables.order_mirrors.get(&order_id) else {
            return Ok(None);
        };
        let (driver, driver_phone) = tables.drivers.get(&order_id).cloned().unwrap_or_default();
        Ok(Some(OrderView {
            receptor: order.nombre_receptor.clone(),
            phone: order.telefono_receptor.clone(),
            observation: order.descripcion_envio.clone(),
            payment_method: order.forma_pago.clone(),
            status: tables.order_status.get(&order_id).copied(),
            driver,
            driver_phone,
        }))
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<Tables>,
    work: Tables,
    faults: Faults,
    shared: Arc<Shared>,
    strict_default_clearing: bool,
}

#[async_trait]
impl Transaction for MemoryTx {
    async fn commit(mut self) -> Result<(), SyncError> {
        *self.guard = self.work;
        self.shared.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(self) -> Result<(), SyncError> {
        self.shared.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl SyncTx for MemoryTx {
    fn strict_default_clearing(&self) -> bool {
        self.strict_default_clearing
    }

    async fn load_customer(&mut self, id: SourceId) -> StoreResult<Option<Customer>> {
        Ok(self.work.customers.get(&id.0).cloned())
    }

    async fn update_customer_mirror(&mut self, id: SourceId, mirror: MirrorId) -> StoreResult<u64> {
        let projected = self.work.customers.get(&id.0).map(Customer::mirrored);
        match (self.work.customer_mirrors.get_mut(&mirror.0), projected) {
            (Some(row), Some(projected)) => {
                *row = projected;
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn insert_customer_mirror(&mut self, id: SourceId) -> StoreResult<Option<MirrorId>> {
        let Some(customer) = self.work.customers.get(&id.0) else {
            return Ok(None);
        };
        let row = customer.mirrored();
        let mirror_id = next_id(&self.work.customer_mirrors);
        self.work.customer_mirrors.insert(mirror_id, row);
        Ok(Some(MirrorId(mirror_id)))
    }

    async fn set_customer_mapping(&mut self, id: SourceId, mirror: MirrorId) -> StoreResult<u64> {
        if self.faults.mapping {
            return Err(StoreError::Statement("customer mapping write failed".into()));
        }
        Ok(match self.work.customers.get_mut(&id.0) {
            Some(row) => {
                row.sync_id = Some(mirror.0);
                1
            }
            None => 0,
        })
    }

    async fn load_origin(&mut self, id: SourceId) -> StoreResult<Option<Origin>> {
        Ok(self.work.origins.get(&id.0).cloned())
    }

    async fn update_origin_mirror(&mut self, id: SourceId, mirror: MirrorId) -> StoreResult<u64> {
        let projected = self.work.origins.get(&id.0).map(Origin::mirrored);
        match (self.work.origin_mirrors.get_mut(&mirror.0), projected) {
            (Some(row), Some(projected)) => {
                *row = projected;
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn insert_origin_mirror(&mut self, id: SourceId) -> StoreResult<Option<MirrorId>> {
        let Some(origin) = self.work.origins.get(&id.0) else {
            return Ok(None);
        };
        let row = origin.mirrored();
        let mirror_id = next_id(&self.work.origin_mirrors);
        self.work.origin_mirrors.insert(mirror_id, row);
        Ok(Some(MirrorId(mirror_id)))
    }

    async fn set_origin_mapping(&mut self, id: SourceId, mirror: MirrorId) -> StoreResult<u64> {
        if self.faults.mapping {
            return Err(StoreError::Statement("origin mapping write failed".into()));
        }
        Ok(match self.work.origins.get_mut(&id.0) {
            Some(row) => {
                row.sync_id = Some(mirror.0);
                1
            }
            None => 0,
        })
    }

    async fn clear_mirror_origin_defaults(
        &mut self,
        user_id: i64,
        keep: Option<MirrorId>,
    ) -> StoreResult<u64> {
        let mut cleared = 0;
        for (id, row) in self.work.origin_mirrors.iter_mut() {
            if row.user_id == Some(user_id) && Some(MirrorId(*id)) != keep && row.is_default {
                row.is_default = false;
                cleared += 1;
            }
        }
        Ok(cleared)
    }

    async fn clear_source_origin_defaults(
        &mut self,
        user_id: i64,
        keep: SourceId,
    ) -> StoreResult<u64> {
        let mut cleared = 0;
        for (id, row) in self.work.origins.iter_mut() {
            if row.user_id == Some(user_id) && *id != keep.0 && row.is_default {
                row.is_default = false;
                cleared += 1;
            }
        }
        Ok(cleared)
    }

    async fn insert_order_mirror(&mut self, id: SourceId) -> StoreResult<Option<MirrorId>> {
        let Some(order) = self.work.orders.get(&id.0) else {
            return Ok(None);
        };
        let row = LegacyOrder::from(order);
        let mirror_id = next_id(&self.work.order_mirrors);
        self.work.order_mirrors.insert(mirror_id, row);
        Ok(Some(MirrorId(mirror_id)))
    }

    async fn copy_order_references(&mut self, id: SourceId, mirror: MirrorId) -> StoreResult<u64> {
        if self.faults.reference_copy {
            return Err(StoreError::Statement("Unknown column 'nro_doc' in 'field list'".into()));
        }
        let copies: Vec<OrderReference> = self
            .work
            .order_references
            .iter()
            .filter(|r| r.order_id == id.0)
            .map(|r| OrderReference {
                order_id: mirror.0,
                ..r.clone()
            })
            .collect();
        let copied = copies.len() as u64;
        self.work.mirror_references.extend(copies);
        Ok(copied)
    }
}
