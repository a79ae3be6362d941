//! # Synchronizer Actor
//!
//! The `SyncActor` is the server half of a synchronizer. It owns the receiver end of a bounded
//! mailbox and processes requests for one entity kind strictly one at a time, which makes it
//! the serialization point for that kind.
//!
//! # Usage Pattern
//!
//! 1. **Create**: `SyncActor::<E, S>::new(buffer)` returns the actor and its [`SyncClient`].
//! 2. **Wire**: hand the transaction source to `actor.run(store)`.
//! 3. **Run**: spawn the run loop; it ends when every client clone has been dropped.
//!
//! # Transaction Boundary
//!
//! For every `Sync` request the actor begins a transaction, runs [`SyncEntity::synchronize`],
//! commits on success and rolls back on failure. A failed rollback is logged and the original
//! error is still the one returned to the caller.

use crate::client::SyncClient;
use crate::entity::{SourceId, SyncEntity};
use crate::error::SyncError;
use crate::message::SyncRequest;
use crate::outcome::{SyncOutcome, SyncStats};
use crate::transaction::{Transaction, TxSource};
use std::marker::PhantomData;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub struct SyncActor<E, S> {
    receiver: mpsc::Receiver<SyncRequest>,
    stats: SyncStats,
    _marker: PhantomData<fn() -> (E, S)>,
}

impl<E, S> SyncActor<E, S>
where
    S: TxSource,
    E: SyncEntity<S::Tx>,
{
    /// Creates the actor and the client used to reach it.
    ///
    /// `buffer_size` bounds the mailbox; senders wait while it is full.
    pub fn new(buffer_size: usize) -> (Self, SyncClient<E>) {
        let (sender, receiver) = mpsc::channel(buffer_size);
        let actor = Self {
            receiver,
            stats: SyncStats::default(),
            _marker: PhantomData,
        };
        (actor, SyncClient::new(sender))
    }

    /// Runs the event loop until the mailbox closes.
    pub async fn run(mut self, store: S) {
        let kind = E::KIND;
        info!(kind, "Actor started");

        while let Some(msg) = self.receiver.recv().await {
            match msg {
                SyncRequest::Sync { id, respond_to } => {
                    debug!(kind, source_id = %id, "Sync");
                    let result = Self::sync_one(&store, id).await;
                    match &result {
                        Ok(outcome) => {
                            self.stats.synced += 1;
                            info!(
                                kind,
                                source_id = %id,
                                mirror_id = %outcome.mirror_id,
                                op = ?outcome.op,
                                "Synced"
                            );
                        }
                        Err(e) => {
                            self.stats.failed += 1;
                            warn!(
                                kind,
                                source_id = %id,
                                category = e.category(),
                                error = %e,
                                "Sync failed"
                            );
                        }
                    }
                    let _ = respond_to.send(result.map_err(Into::into));
                }
                SyncRequest::Stats { respond_to } => {
                    let _ = respond_to.send(Ok(self.stats));
                }
            }
        }

        info!(
            kind,
            synced = self.stats.synced,
            failed = self.stats.failed,
            "Shutdown"
        );
    }

    async fn sync_one(store: &S, id: SourceId) -> Result<SyncOutcome, SyncError> {
        let mut tx = store.begin().await?;
        match E::synchronize(&mut tx, id).await {
            Ok(outcome) => {
                tx.commit().await?;
                Ok(outcome)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(kind = E::KIND, source_id = %id, error = %rollback, "Rollback failed");
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{MirrorId, SyncKind};
    use crate::error::FrameworkError;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    /// Records what happened to each transaction it hands out.
    #[derive(Default)]
    struct Journal {
        begun: usize,
        committed: Vec<u64>,
        rolled_back: usize,
        fail_rollback: bool,
    }

    struct JournalTx {
        journal: Arc<Mutex<Journal>>,
        written: Option<u64>,
    }

    #[async_trait]
    impl Transaction for JournalTx {
        async fn commit(self) -> Result<(), SyncError> {
            let mut journal = self.journal.lock().unwrap();
            journal.committed.extend(self.written);
            Ok(())
        }

        async fn rollback(self) -> Result<(), SyncError> {
            let mut journal = self.journal.lock().unwrap();
            journal.rolled_back += 1;
            if journal.fail_rollback {
                return Err(SyncError::Connection("socket closed".into()));
            }
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct JournalSource(Arc<Mutex<Journal>>);

    #[async_trait]
    impl TxSource for JournalSource {
        type Tx = JournalTx;

        async fn begin(&self) -> Result<JournalTx, SyncError> {
            self.0.lock().unwrap().begun += 1;
            Ok(JournalTx {
                journal: self.0.clone(),
                written: None,
            })
        }
    }

    /// Even ids succeed, odd ids are missing.
    #[derive(Debug)]
    struct Parity;

    impl SyncKind for Parity {
        const KIND: &'static str = "parity";
    }

    #[async_trait]
    impl SyncEntity<JournalTx> for Parity {
        async fn synchronize(tx: &mut JournalTx, id: SourceId) -> Result<SyncOutcome, SyncError> {
            if id.0 % 2 == 1 {
                return Err(SyncError::NotFound { kind: Self::KIND, id });
            }
            tx.written = Some(id.0);
            Ok(SyncOutcome::inserted(Self::KIND, id, MirrorId(id.0 * 10)))
        }
    }

    #[tokio::test]
    async fn commits_success_and_rolls_back_failure() {
        let source = JournalSource::default();
        let (actor, client) = SyncActor::<Parity, JournalSource>::new(8);
        let handle = tokio::spawn(actor.run(source.clone()));

        let outcome = client.sync(SourceId(4)).await.unwrap();
        assert_eq!(outcome.mirror_id, MirrorId(40));

        let err = client.sync(SourceId(5)).await.unwrap_err();
        assert!(matches!(err.as_sync(), Some(SyncError::NotFound { .. })));

        let stats = client.stats().await.unwrap();
        assert_eq!(stats, SyncStats { synced: 1, failed: 1 });

        drop(client);
        handle.await.unwrap();

        let journal = source.0.lock().unwrap();
        assert_eq!(journal.begun, 2);
        assert_eq!(journal.committed, vec![4]);
        assert_eq!(journal.rolled_back, 1);
    }

    #[tokio::test]
    async fn rollback_failure_keeps_original_error() {
        let source = JournalSource::default();
        source.0.lock().unwrap().fail_rollback = true;
        let (actor, client) = SyncActor::<Parity, JournalSource>::new(8);
        tokio::spawn(actor.run(source.clone()));

        let err = client.sync(SourceId(7)).await.unwrap_err();
        assert!(matches!(
            err,
            FrameworkError::Sync(SyncError::NotFound { id, .. }) if id == SourceId(7)
        ));
    }
}
