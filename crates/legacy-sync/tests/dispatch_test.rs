use async_trait::async_trait;
use legacy_sync::clients::{CustomerClient, OrderClient};
use legacy_sync::config::{QueueNames, PREFETCH, RECONNECT_DELAY, REQUEUE_DELAY};
use legacy_sync::lifecycle::SyncSystem;
use legacy_sync::model::{Customer, Order};
use legacy_sync::queue::memory::{MemoryBroker, MemoryTransport};
use legacy_sync::queue::{
    ConnectionManager, ConnectionState, Dispatcher, MessageHandler, RetryPolicy,
};
use legacy_sync::store::memory::MemoryStore;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use sync_framework::mock::MockSyncClient;
use sync_framework::{FrameworkError, MirrorId, Secondary, SourceId, SyncError, SyncOutcome};
use tokio::time::sleep;

const CUSTOMERS: &str = "customer_queue";

fn queues() -> QueueNames {
    QueueNames {
        order: "order_queue".into(),
        customer: CUSTOMERS.into(),
        origin: "origin_queue".into(),
    }
}

fn manager(broker: &MemoryBroker) -> ConnectionManager<MemoryTransport> {
    ConnectionManager::new(broker.transport(), queues().all(), PREFETCH, RECONNECT_DELAY)
}

/// Records every payload; fails them all when `fail` is set.
#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<Value>>,
    fail: bool,
}

impl Recorder {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn seen(&self) -> Vec<Value> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageHandler for Recorder {
    async fn handle(&self, payload: Value) -> Result<(), FrameworkError> {
        self.seen.lock().unwrap().push(payload);
        if self.fail {
            return Err(SyncError::Database("deadlock found".into()).into());
        }
        Ok(())
    }
}

// =============================================================================
// Connection manager
// =============================================================================

#[tokio::test(start_paused = true)]
async fn concurrent_connects_open_one_connection() {
    let broker = MemoryBroker::new();
    let manager = manager(&broker);

    let (a, b) = tokio::join!(manager.connect(), manager.connect());
    assert!(a.is_ok() && b.is_ok());
    assert_eq!(broker.connects(), 1);
    assert_eq!(manager.state(), ConnectionState::Connected);
    assert_eq!(broker.declared(), vec!["customer_queue", "order_queue", "origin_queue"]);
    assert_eq!(broker.prefetch(), Some(1));
}

#[tokio::test(start_paused = true)]
async fn failed_connect_is_retried_after_ten_seconds() {
    let broker = MemoryBroker::new();
    broker.fail_next_connects(1);
    let manager = manager(&broker);

    assert!(manager.connect().await.is_err());
    assert_eq!(manager.state(), ConnectionState::Disconnected);

    sleep(Duration::from_secs(9)).await;
    assert!(!broker.is_connected());

    sleep(Duration::from_secs(2)).await;
    assert_eq!(manager.state(), ConnectionState::Connected);
    assert_eq!(broker.connects(), 1);
}

#[tokio::test(start_paused = true)]
async fn lost_link_schedules_exactly_one_reconnect() {
    let broker = MemoryBroker::new();
    let manager = manager(&broker);
    manager.connect().await.unwrap();

    // Fires the failure hook twice, as an error followed by a close would.
    broker.kill_connection();
    assert_eq!(manager.state(), ConnectionState::Disconnected);

    sleep(RECONNECT_DELAY + Duration::from_secs(1)).await;
    assert_eq!(manager.state(), ConnectionState::Connected);

    sleep(Duration::from_secs(60)).await;
    assert_eq!(broker.connects(), 2);
}

#[tokio::test(start_paused = true)]
async fn link_dropped_during_setup_is_reconnected() {
    let broker = MemoryBroker::new();
    broker.drop_next_after_setup();
    let manager = manager(&broker);

    assert!(manager.connect().await.is_err());
    assert_eq!(manager.state(), ConnectionState::Disconnected);

    sleep(RECONNECT_DELAY + Duration::from_secs(1)).await;
    assert_eq!(manager.state(), ConnectionState::Connected);
    assert!(broker.is_connected());
    assert_eq!(broker.connects(), 2);
}

#[tokio::test(start_paused = true)]
async fn close_survives_channel_failure_and_stops_reconnecting() {
    let broker = MemoryBroker::new();
    let manager = manager(&broker);
    manager.connect().await.unwrap();
    broker.fail_channel_close(true);

    manager.close().await;
    assert_eq!(broker.channel_closes(), 1);
    assert_eq!(broker.connection_closes(), 1);
    assert!(!broker.is_connected());

    assert!(manager.connect().await.is_err());
    sleep(Duration::from_secs(60)).await;
    assert_eq!(broker.connects(), 1);
}

// =============================================================================
// Dispatcher
// =============================================================================

#[tokio::test(start_paused = true)]
async fn handled_message_is_acknowledged() {
    let broker = MemoryBroker::new();
    let manager = manager(&broker);
    let dispatcher = Dispatcher::new(manager.clone(), RetryPolicy::unbounded(), REQUEUE_DELAY);
    let recorder = Arc::new(Recorder::default());

    broker.publish(CUSTOMERS, r#"{"id": 42}"#);
    let consumer = dispatcher.consume(CUSTOMERS, recorder.clone());
    sleep(Duration::from_millis(100)).await;

    assert_eq!(recorder.seen(), vec![json!({ "id": 42 })]);
    assert_eq!(broker.acked(CUSTOMERS).len(), 1);
    assert!(broker.nacks().is_empty());

    manager.close().await;
    consumer.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn malformed_json_is_requeued_after_five_seconds() {
    let broker = MemoryBroker::new();
    let manager = manager(&broker);
    let dispatcher = Dispatcher::new(manager.clone(), RetryPolicy::unbounded(), REQUEUE_DELAY);
    let recorder = Arc::new(Recorder::default());

    broker.publish(CUSTOMERS, "{not json");
    let consumer = dispatcher.consume(CUSTOMERS, recorder.clone());

    sleep(Duration::from_secs(4)).await;
    assert!(broker.nacks().is_empty(), "nack must wait for the requeue delay");

    sleep(Duration::from_secs(2)).await;
    let nacks = broker.nacks();
    assert_eq!(nacks.len(), 1);
    assert!(nacks[0].requeue);
    assert!(broker.acked(CUSTOMERS).is_empty());
    assert!(recorder.seen().is_empty(), "handler never sees undecodable payloads");

    manager.close().await;
    consumer.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn bounded_retry_rejects_without_requeue() {
    let broker = MemoryBroker::new();
    let manager = manager(&broker);
    let dispatcher = Dispatcher::new(manager.clone(), RetryPolicy::bounded(2), REQUEUE_DELAY);
    let recorder = Arc::new(Recorder::failing());

    broker.publish(CUSTOMERS, r#"{"id": 1}"#);
    let consumer = dispatcher.consume(CUSTOMERS, recorder.clone());
    sleep(Duration::from_secs(6)).await;

    let requeues: Vec<bool> = broker.nacks().iter().map(|n| n.requeue).collect();
    assert_eq!(requeues, vec![true, false]);
    assert_eq!(recorder.seen().len(), 2);
    assert_eq!(broker.pending(CUSTOMERS), 0);

    manager.close().await;
    consumer.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn consumers_resubscribe_after_reconnect() {
    let broker = MemoryBroker::new();
    let manager = manager(&broker);
    let dispatcher = Dispatcher::new(manager.clone(), RetryPolicy::unbounded(), REQUEUE_DELAY);
    let recorder = Arc::new(Recorder::default());

    let consumer = dispatcher.consume(CUSTOMERS, recorder.clone());
    sleep(Duration::from_millis(100)).await;
    broker.kill_connection();

    broker.publish(CUSTOMERS, r#"{"id": 2}"#);
    sleep(Duration::from_secs(5)).await;
    assert!(recorder.seen().is_empty());

    sleep(Duration::from_secs(6)).await;
    assert_eq!(recorder.seen(), vec![json!({ "id": 2 })]);
    assert_eq!(broker.acked(CUSTOMERS).len(), 1);

    manager.close().await;
    consumer.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn cancelled_consumer_resubscribes_while_connected() {
    let broker = MemoryBroker::new();
    let manager = manager(&broker);
    let dispatcher = Dispatcher::new(manager.clone(), RetryPolicy::unbounded(), REQUEUE_DELAY);
    let recorder = Arc::new(Recorder::default());

    let consumer = dispatcher.consume(CUSTOMERS, recorder.clone());
    sleep(Duration::from_millis(100)).await;
    broker.cancel_consumers(CUSTOMERS);
    broker.publish(CUSTOMERS, r#"{"id": 3}"#);

    sleep(Duration::from_secs(4)).await;
    assert!(recorder.seen().is_empty());

    sleep(Duration::from_secs(2)).await;
    assert_eq!(recorder.seen(), vec![json!({ "id": 3 })]);
    assert_eq!(broker.acked(CUSTOMERS).len(), 1);
    assert_eq!(broker.consumes(), 2);
    assert_eq!(broker.connects(), 1, "the connection itself never dropped");

    manager.close().await;
    consumer.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn failed_consume_is_retried_while_connected() {
    let broker = MemoryBroker::new();
    broker.fail_next_consumes(1);
    let manager = manager(&broker);
    let dispatcher = Dispatcher::new(manager.clone(), RetryPolicy::unbounded(), REQUEUE_DELAY);
    let recorder = Arc::new(Recorder::default());

    broker.publish(CUSTOMERS, r#"{"id": 4}"#);
    let consumer = dispatcher.consume(CUSTOMERS, recorder.clone());

    sleep(REQUEUE_DELAY + Duration::from_secs(1)).await;
    assert_eq!(recorder.seen(), vec![json!({ "id": 4 })]);
    assert_eq!(manager.state(), ConnectionState::Connected);
    assert_eq!(broker.connects(), 1);

    manager.close().await;
    consumer.await.unwrap();
}

// =============================================================================
// End to end
// =============================================================================

/// Scenario: `{id: 42}` on the customer queue for an unmapped customer.
#[tokio::test(start_paused = true)]
async fn customer_message_is_mirrored_and_acknowledged() {
    let store = MemoryStore::new();
    store
        .with_tables(|t| {
            t.customers.insert(
                42,
                Customer {
                    full_name: Some("Ana".into()),
                    ..Customer::default()
                },
            );
        })
        .await;
    let broker = MemoryBroker::new();
    let manager = manager(&broker);
    let dispatcher = Dispatcher::new(manager.clone(), RetryPolicy::unbounded(), REQUEUE_DELAY);
    let mut system = SyncSystem::new(store.clone());
    system.start(&dispatcher, &queues());

    broker.publish(CUSTOMERS, r#"{"id": 42}"#);
    sleep(Duration::from_millis(100)).await;

    assert_eq!(broker.acked(CUSTOMERS), vec![br#"{"id": 42}"#.to_vec()]);
    let tables = store.snapshot().await;
    assert_eq!(tables.customer_mirrors.len(), 1);
    assert!(tables.customers[&42].sync_id.is_some());

    manager.close().await;
    system.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn message_without_id_is_requeued_and_never_acknowledged() {
    let store = MemoryStore::new();
    let broker = MemoryBroker::new();
    let manager = manager(&broker);
    let dispatcher = Dispatcher::new(manager.clone(), RetryPolicy::unbounded(), REQUEUE_DELAY);
    let mut system = SyncSystem::new(store.clone());
    system.start(&dispatcher, &queues());

    broker.publish(CUSTOMERS, r#"{"name": "no id"}"#);
    sleep(Duration::from_secs(12)).await;

    let nacks = broker.nacks();
    assert!(nacks.len() >= 2);
    assert!(nacks.iter().all(|n| n.requeue));
    assert!(broker.acked(CUSTOMERS).is_empty());
    assert_eq!((store.commits(), store.rollbacks()), (0, 0));

    manager.close().await;
    system.shutdown().await.unwrap();
}

// =============================================================================
// Handlers over mocked synchronizers
// =============================================================================

#[tokio::test]
async fn customer_handler_accepts_string_ids() {
    let mut mock = MockSyncClient::<Customer>::new();
    mock.expect_sync(SourceId(42))
        .return_ok(SyncOutcome::inserted("customer", SourceId(42), MirrorId(301)));
    let handler = CustomerClient::new(mock.client());

    handler.handle(json!({ "id": "42" })).await.unwrap();
    mock.verify();
}

#[tokio::test]
async fn order_handler_succeeds_when_references_failed() {
    let mut mock = MockSyncClient::<Order>::new();
    mock.expect_sync(SourceId(15)).return_ok(
        SyncOutcome::inserted("order", SourceId(15), MirrorId(88))
            .with_secondary(Secondary::Failed("duplicate entry".into())),
    );
    let handler = OrderClient::new(mock.client());

    assert!(handler.handle(json!({ "id": 15 })).await.is_ok());
    mock.verify();
}

#[tokio::test]
async fn handler_surfaces_sync_failures() {
    let mut mock = MockSyncClient::<Customer>::new();
    mock.expect_sync(SourceId(7))
        .return_err(SyncError::Inconsistency("customer 7: mirror 12 matched no row".into()));
    let handler = CustomerClient::new(mock.client());

    let err = handler.handle(json!({ "id": 7 })).await.unwrap_err();
    assert!(matches!(err.as_sync(), Some(SyncError::Inconsistency(_))));
    mock.verify();
}
