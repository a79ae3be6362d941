//! # Mock Synchronizer
//!
//! Test utilities for code that talks to a [`SyncClient`] (dispatch handlers, lifecycle
//! wiring) without spawning a real actor or touching a store.
//!
//! Two styles are offered:
//!
//! - [`MockSyncClient`]: queue expectations with a fluent builder, run the code under test,
//!   then [`verify`](MockSyncClient::verify) that every expectation was consumed.
//! - [`create_mock_client`] + [`expect_sync`]: receive raw requests and answer them by hand.
//!
//! ```rust
//! use sync_framework::mock::MockSyncClient;
//! use sync_framework::{MirrorId, SourceId, SyncKind, SyncOutcome};
//!
//! #[derive(Debug)]
//! struct Customer;
//! impl SyncKind for Customer {
//!     const KIND: &'static str = "customer";
//! }
//!
//! # #[tokio::main]
//! # async fn main() {
//! let mut mock = MockSyncClient::<Customer>::new();
//! mock.expect_sync(SourceId(42))
//!     .return_ok(SyncOutcome::inserted("customer", SourceId(42), MirrorId(1)));
//!
//! let outcome = mock.client().sync(SourceId(42)).await.unwrap();
//! assert_eq!(outcome.mirror_id, MirrorId(1));
//! mock.verify();
//! # }
//! ```

use crate::client::SyncClient;
use crate::entity::{SourceId, SyncKind};
use crate::error::{FrameworkError, SyncError};
use crate::message::{Response, SyncRequest};
use crate::outcome::{SyncOutcome, SyncStats};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

enum Expectation {
    Sync {
        id: SourceId,
        response: Result<SyncOutcome, FrameworkError>,
    },
    Stats {
        response: Result<SyncStats, FrameworkError>,
    },
}

type Expectations = Arc<Mutex<VecDeque<Expectation>>>;

pub struct MockSyncClient<E> {
    client: SyncClient<E>,
    expectations: Expectations,
    _handle: tokio::task::JoinHandle<()>,
}

impl<E: SyncKind> Default for MockSyncClient<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: SyncKind> MockSyncClient<E> {
    pub fn new() -> Self {
        let (sender, mut receiver) = mpsc::channel::<SyncRequest>(100);
        let expectations: Expectations = Arc::new(Mutex::new(VecDeque::new()));
        let expectations_clone = expectations.clone();

        let handle = tokio::spawn(async move {
            while let Some(request) = receiver.recv().await {
                let expectation = expectations_clone.lock().unwrap().pop_front();

                match (request, expectation) {
                    (
                        SyncRequest::Sync { id, respond_to },
                        Some(Expectation::Sync {
                            id: expected,
                            response,
                        }),
                    ) => {
                        assert_eq!(id, expected, "sync requested for an unexpected id");
                        let _ = respond_to.send(response);
                    }
                    (SyncRequest::Stats { respond_to }, Some(Expectation::Stats { response })) => {
                        let _ = respond_to.send(response);
                    }
                    (request, _) => {
                        panic!("Unexpected request or expectation mismatch: {request:?}");
                    }
                }
            }
        });

        Self {
            client: SyncClient::new(sender),
            expectations,
            _handle: handle,
        }
    }

    pub fn client(&self) -> SyncClient<E> {
        self.client.clone()
    }

    pub fn expect_sync(&mut self, id: SourceId) -> SyncExpectationBuilder {
        SyncExpectationBuilder {
            id,
            expectations: self.expectations.clone(),
        }
    }

    pub fn expect_stats(&mut self) -> StatsExpectationBuilder {
        StatsExpectationBuilder {
            expectations: self.expectations.clone(),
        }
    }

    pub fn verify(&self) {
        let exps = self.expectations.lock().unwrap();
        if !exps.is_empty() {
            panic!("Not all expectations were met. {} remaining", exps.len());
        }
    }
}

pub struct SyncExpectationBuilder {
    id: SourceId,
    expectations: Expectations,
}

impl SyncExpectationBuilder {
    pub fn return_ok(self, outcome: SyncOutcome) {
        self.push(Ok(outcome));
    }

    pub fn return_err(self, error: SyncError) {
        self.push(Err(error.into()));
    }

    fn push(self, response: Result<SyncOutcome, FrameworkError>) {
        self.expectations.lock().unwrap().push_back(Expectation::Sync {
            id: self.id,
            response,
        });
    }
}

pub struct StatsExpectationBuilder {
    expectations: Expectations,
}

impl StatsExpectationBuilder {
    pub fn return_ok(self, stats: SyncStats) {
        self.expectations
            .lock()
            .unwrap()
            .push_back(Expectation::Stats { response: Ok(stats) });
    }
}

pub fn create_mock_client<E: SyncKind>(
    buffer_size: usize,
) -> (SyncClient<E>, mpsc::Receiver<SyncRequest>) {
    let (sender, receiver) = mpsc::channel(buffer_size);
    (SyncClient::new(sender), receiver)
}

pub async fn expect_sync(
    receiver: &mut mpsc::Receiver<SyncRequest>,
) -> Option<(SourceId, Response<SyncOutcome>)> {
    match receiver.recv().await {
        Some(SyncRequest::Sync { id, respond_to }) => Some((id, respond_to)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::MirrorId;

    #[derive(Debug)]
    struct Customer;

    impl SyncKind for Customer {
        const KIND: &'static str = "customer";
    }

    #[tokio::test]
    async fn test_mock_client() {
        let (client, mut receiver) = create_mock_client::<Customer>(10);

        let sync_task = tokio::spawn(async move { client.sync(SourceId(42)).await });

        let (id, responder) = expect_sync(&mut receiver)
            .await
            .expect("Expected Sync request");
        assert_eq!(id, SourceId(42));
        responder
            .send(Ok(SyncOutcome::inserted("customer", id, MirrorId(9))))
            .unwrap();

        let result = sync_task.await.unwrap();
        assert!(matches!(result, Ok(outcome) if outcome.mirror_id == MirrorId(9)));
    }

    #[tokio::test]
    async fn test_mock_client_with_expectations() {
        let mut mock = MockSyncClient::<Customer>::new();

        mock.expect_sync(SourceId(1))
            .return_ok(SyncOutcome::updated("customer", SourceId(1), MirrorId(11)));
        mock.expect_sync(SourceId(2)).return_err(SyncError::NotFound {
            kind: "customer",
            id: SourceId(2),
        });
        mock.expect_stats().return_ok(SyncStats { synced: 1, failed: 1 });

        let client = mock.client();

        let outcome = client.sync(SourceId(1)).await.unwrap();
        assert_eq!(outcome.mirror_id, MirrorId(11));

        let err = client.sync(SourceId(2)).await.unwrap_err();
        assert!(matches!(err.as_sync(), Some(SyncError::NotFound { .. })));

        assert_eq!(client.stats().await.unwrap().failed, 1);

        mock.verify();
    }
}
