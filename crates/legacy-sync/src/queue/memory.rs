//! In-process broker.
//!
//! Queues are FIFO; a nack with requeue puts the message back at the head with its delivery
//! count incremented, and unacknowledged messages return to their queue when the connection
//! dies. Connection failures, lost links, cancelled consumers and close errors can be injected.

use super::{BrokerError, Delivery, DeliveryStream, FailureHook, Session, Transport};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

#[derive(Debug, Clone)]
struct Message {
    payload: Vec<u8>,
    delivery_count: u32,
}

/// A rejected delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nack {
    pub queue: String,
    pub payload: Vec<u8>,
    pub requeue: bool,
}

#[derive(Default)]
struct BrokerState {
    queues: BTreeMap<String, VecDeque<Message>>,
    declared: BTreeSet<String>,
    unacked: BTreeMap<u64, (String, Message, u64)>,
    acked: Vec<(String, Vec<u8>)>,
    nacks: Vec<Nack>,
    hooks: Vec<FailureHook>,
    /// Generation of the live connection, if any.
    alive: Option<u64>,
    generation: u64,
    next_tag: u64,
    connects: usize,
    failing_connects: usize,
    drop_after_setup: bool,
    /// Bumped per queue by [`MemoryBroker::cancel_consumers`]; streams opened earlier end.
    cancelled: BTreeMap<String, u64>,
    consumes: usize,
    failing_consumes: usize,
    fail_channel_close: bool,
    prefetch: Option<u16>,
    channel_closes: usize,
    connection_closes: usize,
}

impl BrokerState {
    fn requeue_unacked(&mut self, generation: u64) {
        let tags: Vec<u64> = self
            .unacked
            .iter()
            .filter(|(_, (_, _, g))| *g == generation)
            .map(|(tag, _)| *tag)
            .collect();
        for tag in tags {
            if let Some((queue, mut message, _)) = self.unacked.remove(&tag) {
                message.delivery_count += 1;
                self.queues.entry(queue).or_default().push_front(message);
            }
        }
    }
}

#[derive(Default)]
struct BrokerInner {
    state: Mutex<BrokerState>,
    changed: Notify,
}

#[derive(Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<BrokerInner>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn transport(&self) -> MemoryTransport {
        MemoryTransport {
            broker: self.clone(),
        }
    }

    pub fn publish(&self, queue: &str, payload: impl Into<Vec<u8>>) {
        self.lock()
            .queues
            .entry(queue.to_string())
            .or_default()
            .push_back(Message {
                payload: payload.into(),
                delivery_count: 0,
            });
        self.inner.changed.notify_waiters();
    }

    /// The next `n` connection attempts fail.
    pub fn fail_next_connects(&self, n: usize) {
        self.lock().failing_connects = n;
    }

    /// The next connection dies right after its queues and prefetch are set up, before anyone
    /// could be watching it.
    pub fn drop_next_after_setup(&self) {
        self.lock().drop_after_setup = true;
    }

    /// The next `n` consume calls fail while the connection stays up.
    pub fn fail_next_consumes(&self, n: usize) {
        self.lock().failing_consumes = n;
    }

    /// Ends every open consumer on `queue`, as a broker-side `basic.cancel` would. The
    /// connection stays up.
    pub fn cancel_consumers(&self, queue: &str) {
        *self.lock().cancelled.entry(queue.to_string()).or_default() += 1;
        self.inner.changed.notify_waiters();
    }

    pub fn fail_channel_close(&self, fail: bool) {
        self.lock().fail_channel_close = fail;
    }

    /// Drops the live connection as a network failure would, firing its failure hooks for both
    /// the error and the close event.
    pub fn kill_connection(&self) {
        let hooks = {
            let mut state = self.lock();
            let Some(generation) = state.alive.take() else {
                return;
            };
            state.requeue_unacked(generation);
            std::mem::take(&mut state.hooks)
        };
        self.inner.changed.notify_waiters();
        for hook in &hooks {
            hook(BrokerError::Connect("connection reset by peer".into()));
            hook(BrokerError::Connect("connection closed".into()));
        }
    }

    pub fn is_connected(&self) -> bool {
        self.lock().alive.is_some()
    }

    pub fn connects(&self) -> usize {
        self.lock().connects
    }

    pub fn consumes(&self) -> usize {
        self.lock().consumes
    }

    pub fn declared(&self) -> Vec<String> {
        self.lock().declared.iter().cloned().collect()
    }

    pub fn prefetch(&self) -> Option<u16> {
        self.lock().prefetch
    }

    pub fn pending(&self, queue: &str) -> usize {
        self.lock().queues.get(queue).map_or(0, VecDeque::len)
    }

    pub fn acked(&self, queue: &str) -> Vec<Vec<u8>> {
        self.lock()
            .acked
            .iter()
            .filter(|(q, _)| q == queue)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    pub fn nacks(&self) -> Vec<Nack> {
        self.lock().nacks.clone()
    }

    pub fn channel_closes(&self) -> usize {
        self.lock().channel_closes
    }

    pub fn connection_closes(&self) -> usize {
        self.lock().connection_closes
    }
}

pub struct MemoryTransport {
    broker: MemoryBroker,
}

#[async_trait]
impl Transport for MemoryTransport {
    type Session = MemorySession;

    async fn connect(&self) -> Result<MemorySession, BrokerError> {
        let mut state = self.broker.lock();
        if state.failing_connects > 0 {
            state.failing_connects -= 1;
            return Err(BrokerError::Connect("connection refused".into()));
        }
        state.connects += 1;
        state.generation += 1;
        state.alive = Some(state.generation);
        state.hooks.clear();
        Ok(MemorySession {
            broker: self.broker.clone(),
            generation: state.generation,
        })
    }
}

pub struct MemorySession {
    broker: MemoryBroker,
    generation: u64,
}

impl MemorySession {
    fn ensure_alive(&self, state: &BrokerState) -> Result<(), BrokerError> {
        if state.alive == Some(self.generation) {
            Ok(())
        } else {
            Err(BrokerError::NotConnected)
        }
    }
}

/// Where an open consumer stands: its queue, connection and cancel count at start.
#[derive(Clone)]
struct Subscription {
    queue: String,
    generation: u64,
    cancelled: u64,
}

async fn next_delivery(broker: MemoryBroker, sub: Subscription) -> Option<MemoryDelivery> {
    let Subscription {
        queue,
        generation,
        cancelled,
    } = sub;
    loop {
        let changed = broker.inner.changed.notified();
        {
            let mut state = broker.lock();
            if state.alive != Some(generation) {
                return None;
            }
            if state.cancelled.get(&queue).copied().unwrap_or(0) != cancelled {
                return None;
            }
            if let Some(message) = state.queues.get_mut(&queue).and_then(VecDeque::pop_front) {
                state.next_tag += 1;
                let tag = state.next_tag;
                state.unacked.insert(tag, (queue.clone(), message.clone(), generation));
                return Some(MemoryDelivery {
                    broker: broker.clone(),
                    tag,
                    generation,
                    message,
                });
            }
        }
        changed.await;
    }
}

#[async_trait]
impl Session for MemorySession {
    async fn declare_queue(&self, name: &str) -> Result<(), BrokerError> {
        let mut state = self.broker.lock();
        self.ensure_alive(&state)?;
        state.declared.insert(name.to_string());
        state.queues.entry(name.to_string()).or_default();
        Ok(())
    }

    async fn set_prefetch(&self, count: u16) -> Result<(), BrokerError> {
        {
            let mut state = self.broker.lock();
            self.ensure_alive(&state)?;
            state.prefetch = Some(count);
            if !std::mem::take(&mut state.drop_after_setup) {
                return Ok(());
            }
            state.alive = None;
            state.hooks.clear();
            state.requeue_unacked(self.generation);
        }
        self.broker.inner.changed.notify_waiters();
        Ok(())
    }

    async fn consume(
        &self,
        queue: &str,
        _consumer_tag: &str,
    ) -> Result<DeliveryStream, BrokerError> {
        let sub = {
            let mut state = self.broker.lock();
            self.ensure_alive(&state)?;
            if !state.declared.contains(queue) {
                return Err(BrokerError::Channel(format!("NOT_FOUND - no queue '{queue}'")));
            }
            if state.failing_consumes > 0 {
                state.failing_consumes -= 1;
                return Err(BrokerError::Channel(format!("consume {queue}: channel busy")));
            }
            state.consumes += 1;
            Subscription {
                queue: queue.to_string(),
                generation: self.generation,
                cancelled: state.cancelled.get(queue).copied().unwrap_or(0),
            }
        };
        let seed = (self.broker.clone(), sub);
        let stream = futures::stream::unfold(seed, |(broker, sub)| async move {
            let delivery = next_delivery(broker.clone(), sub.clone()).await?;
            let boxed: Box<dyn Delivery> = Box::new(delivery);
            Some((Ok(boxed), (broker, sub)))
        });
        Ok(Box::pin(stream))
    }

    fn on_failure(&self, hook: FailureHook) {
        {
            let mut state = self.broker.lock();
            if state.alive == Some(self.generation) {
                state.hooks.push(hook);
                return;
            }
        }
        hook(BrokerError::NotConnected);
    }

    async fn close_channel(&self) -> Result<(), BrokerError> {
        let mut state = self.broker.lock();
        state.channel_closes += 1;
        if state.fail_channel_close {
            return Err(BrokerError::Channel("channel already closed".into()));
        }
        Ok(())
    }

    async fn close_connection(&self) -> Result<(), BrokerError> {
        {
            let mut state = self.broker.lock();
            state.connection_closes += 1;
            if state.alive == Some(self.generation) {
                state.alive = None;
                state.hooks.clear();
                state.requeue_unacked(self.generation);
            }
        }
        self.broker.inner.changed.notify_waiters();
        Ok(())
    }
}

pub struct MemoryDelivery {
    broker: MemoryBroker,
    tag: u64,
    generation: u64,
    message: Message,
}

impl MemoryDelivery {
    fn settle(&self) -> Result<(String, Message), BrokerError> {
        let mut state = self.broker.lock();
        if state.alive != Some(self.generation) {
            return Err(BrokerError::Channel("delivery acknowledged on a closed channel".into()));
        }
        state
            .unacked
            .remove(&self.tag)
            .map(|(queue, message, _)| (queue, message))
            .ok_or_else(|| BrokerError::Channel(format!("unknown delivery tag {}", self.tag)))
    }
}

#[async_trait]
impl Delivery for MemoryDelivery {
    fn delivery_tag(&self) -> u64 {
        self.tag
    }

    fn payload(&self) -> &[u8] {
        &self.message.payload
    }

    fn delivery_count(&self) -> Option<u32> {
        (self.message.delivery_count > 0).then_some(self.message.delivery_count)
    }

    async fn ack(&self) -> Result<(), BrokerError> {
        let (queue, message) = self.settle()?;
        self.broker.lock().acked.push((queue, message.payload));
        Ok(())
    }

    async fn nack(&self, requeue: bool) -> Result<(), BrokerError> {
        let (queue, mut message) = self.settle()?;
        {
            let mut state = self.broker.lock();
            state.nacks.push(Nack {
                queue: queue.clone(),
                payload: message.payload.clone(),
                requeue,
            });
            if requeue {
                message.delivery_count += 1;
                state.queues.entry(queue).or_default().push_front(message);
            }
        }
        self.broker.inner.changed.notify_waiters();
        Ok(())
    }
}
