//! Process-local topic-exchange broker
//!
//! Implements the same contract as the NATS backend: durable topic exchanges,
//! bound FIFO queues, prefetch-limited consumers and ack/nack resolution.
//! Clones share one broker, so a clone can be handed to every worker as its
//! "connection".

use crate::messaging::envelope::{DeliveryAcker, MessageProperties, OutboundMessage, RawDelivery};
use crate::messaging::error::{MessagingError, MessagingResult};
use crate::messaging::routing::{topic_matches, QueueSpec};
use crate::messaging::traits::{Broker, BrokerFactory, DeliveryStream};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// Counters for one queue
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Waiting for a consumer
    pub ready: usize,
    /// Delivered, not yet resolved
    pub unacked: usize,
    /// Positively acknowledged
    pub acked: u64,
    /// Nacked without requeue
    pub dead_lettered: usize,
    /// Nacked with requeue
    pub requeued: u64,
}

#[derive(Debug, Clone)]
struct StoredMessage {
    exchange: String,
    routing_key: String,
    properties: MessageProperties,
    body: Vec<u8>,
    redelivered: bool,
}

#[derive(Default)]
struct QueueState {
    ready: VecDeque<StoredMessage>,
    unacked: HashMap<u64, StoredMessage>,
    acked: u64,
    requeued: u64,
    dead_lettered: Vec<StoredMessage>,
}

enum Resolution {
    Ack,
    Requeue,
    DeadLetter,
}

struct MemoryQueue {
    name: String,
    state: Mutex<QueueState>,
    notify: Notify,
}

impl MemoryQueue {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
        }
    }

    fn push(&self, message: StoredMessage) {
        self.state.lock().ready.push_back(message);
        self.notify.notify_waiters();
    }

    fn take_next(&self, tag: u64) -> Option<StoredMessage> {
        let mut state = self.state.lock();
        let message = state.ready.pop_front()?;
        state.unacked.insert(tag, message.clone());
        Some(message)
    }

    fn resolve(&self, tag: u64, resolution: Resolution) -> MessagingResult<()> {
        let mut state = self.state.lock();
        let mut message = state.unacked.remove(&tag).ok_or_else(|| {
            MessagingError::AckFailed(format!("unknown delivery tag {} on {}", tag, self.name))
        })?;

        match resolution {
            Resolution::Ack => state.acked += 1,
            Resolution::Requeue => {
                message.redelivered = true;
                state.ready.push_front(message);
                state.requeued += 1;
                drop(state);
                self.notify.notify_waiters();
            }
            Resolution::DeadLetter => state.dead_lettered.push(message),
        }
        Ok(())
    }

    fn stats(&self) -> QueueStats {
        let state = self.state.lock();
        QueueStats {
            ready: state.ready.len(),
            unacked: state.unacked.len(),
            acked: state.acked,
            dead_lettered: state.dead_lettered.len(),
            requeued: state.requeued,
        }
    }
}

struct Binding {
    queue: String,
    pattern: String,
}

#[derive(Default)]
struct BrokerState {
    exchanges: RwLock<HashMap<String, Vec<Binding>>>,
    queues: RwLock<HashMap<String, Arc<MemoryQueue>>>,
    next_tag: AtomicU64,
    unroutable: AtomicU64,
}

/// In-memory topic-exchange broker
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<BrokerState>,
}

impl InMemoryBroker {
    /// Create an empty broker
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an exchange has been declared
    pub fn has_exchange(&self, exchange: &str) -> bool {
        self.state.exchanges.read().contains_key(exchange)
    }

    /// Counters for a declared queue
    pub fn queue_stats(&self, queue: &str) -> Option<QueueStats> {
        self.state.queues.read().get(queue).map(|q| q.stats())
    }

    /// Bodies of messages nacked without requeue
    pub fn dead_lettered(&self, queue: &str) -> Vec<Vec<u8>> {
        self.state
            .queues
            .read()
            .get(queue)
            .map(|q| {
                q.state
                    .lock()
                    .dead_lettered
                    .iter()
                    .map(|m| m.body.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Messages published with no matching binding
    pub fn unroutable_count(&self) -> u64 {
        self.state.unroutable.load(Ordering::Relaxed)
    }

    fn queue(&self, name: &str) -> MessagingResult<Arc<MemoryQueue>> {
        self.state
            .queues
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| MessagingError::QueueNotFound(name.to_string()))
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn declare_exchange(&self, exchange: &str) -> MessagingResult<()> {
        self.state
            .exchanges
            .write()
            .entry(exchange.to_string())
            .or_default();
        Ok(())
    }

    async fn declare_queue(&self, spec: &QueueSpec) -> MessagingResult<()> {
        let mut exchanges = self.state.exchanges.write();
        let bindings = exchanges
            .get_mut(&spec.exchange)
            .ok_or_else(|| MessagingError::ExchangeNotFound(spec.exchange.clone()))?;

        self.state
            .queues
            .write()
            .entry(spec.queue.clone())
            .or_insert_with(|| Arc::new(MemoryQueue::new(&spec.queue)));

        let already_bound = bindings
            .iter()
            .any(|b| b.queue == spec.queue && b.pattern == spec.binding_key);
        if !already_bound {
            bindings.push(Binding {
                queue: spec.queue.clone(),
                pattern: spec.binding_key.clone(),
            });
        }
        Ok(())
    }

    async fn publish(&self, message: OutboundMessage) -> MessagingResult<()> {
        let targets: Vec<String> = {
            let exchanges = self.state.exchanges.read();
            let bindings = exchanges
                .get(&message.exchange)
                .ok_or_else(|| MessagingError::ExchangeNotFound(message.exchange.clone()))?;

            let mut targets: Vec<String> = bindings
                .iter()
                .filter(|b| topic_matches(&b.pattern, &message.routing_key))
                .map(|b| b.queue.clone())
                .collect();
            // At most one copy per queue, however many of its bindings match
            targets.sort_unstable();
            targets.dedup();
            targets
        };

        if targets.is_empty() {
            self.state.unroutable.fetch_add(1, Ordering::Relaxed);
            debug!(
                exchange = %message.exchange,
                routing_key = %message.routing_key,
                "Message matched no binding"
            );
            return Ok(());
        }

        let queues = self.state.queues.read();
        for name in targets {
            if let Some(queue) = queues.get(&name) {
                queue.push(StoredMessage {
                    exchange: message.exchange.clone(),
                    routing_key: message.routing_key.clone(),
                    properties: message.properties.clone(),
                    body: message.body.clone(),
                    redelivered: false,
                });
            }
        }
        Ok(())
    }

    async fn consume(
        &self,
        spec: &QueueSpec,
        prefetch: u16,
    ) -> MessagingResult<Box<dyn DeliveryStream>> {
        let queue = self.queue(&spec.queue)?;
        Ok(Box::new(MemoryDeliveryStream {
            queue,
            state: self.state.clone(),
            permits: Arc::new(Semaphore::new(usize::from(prefetch.max(1)))),
            cancelled: false,
        }))
    }

    async fn queue_depth(&self, spec: &QueueSpec) -> MessagingResult<u64> {
        let stats = self.queue(&spec.queue)?.stats();
        Ok((stats.ready + stats.unacked) as u64)
    }

    async fn close(&self) -> MessagingResult<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "in_memory"
    }
}

#[async_trait]
impl BrokerFactory for InMemoryBroker {
    async fn connect(&self) -> MessagingResult<Arc<dyn Broker>> {
        Ok(Arc::new(self.clone()))
    }
}

struct MemoryDeliveryStream {
    queue: Arc<MemoryQueue>,
    state: Arc<BrokerState>,
    permits: Arc<Semaphore>,
    cancelled: bool,
}

#[async_trait]
impl DeliveryStream for MemoryDeliveryStream {
    async fn next(&mut self) -> MessagingResult<Option<RawDelivery>> {
        if self.cancelled {
            return Ok(None);
        }

        // Held until the delivery is acked or nacked
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| MessagingError::ConsumeFailed("consumer closed".to_string()))?;

        loop {
            let notified = self.queue.notify.notified();
            let tag = self.state.next_tag.fetch_add(1, Ordering::Relaxed) + 1;

            if let Some(message) = self.queue.take_next(tag) {
                let acker = MemoryAcker {
                    queue: self.queue.clone(),
                    tag,
                    permit: Mutex::new(Some(permit)),
                };
                return Ok(Some(RawDelivery::new(
                    tag,
                    message.exchange,
                    message.routing_key,
                    message.redelivered,
                    message.properties,
                    message.body,
                    Box::new(acker),
                )));
            }

            notified.await;
        }
    }

    async fn cancel(&mut self) -> MessagingResult<()> {
        self.cancelled = true;
        self.permits.close();
        Ok(())
    }
}

struct MemoryAcker {
    queue: Arc<MemoryQueue>,
    tag: u64,
    permit: Mutex<Option<OwnedSemaphorePermit>>,
}

impl MemoryAcker {
    fn settle(&self, resolution: Resolution) -> MessagingResult<()> {
        let permit = self.permit.lock().take();
        if permit.is_none() {
            return Err(MessagingError::AckFailed(format!(
                "delivery {} already resolved",
                self.tag
            )));
        }
        let result = self.queue.resolve(self.tag, resolution);
        drop(permit);
        result
    }
}

#[async_trait]
impl DeliveryAcker for MemoryAcker {
    async fn ack(&self) -> MessagingResult<()> {
        self.settle(Resolution::Ack)
    }

    async fn nack(&self, requeue: bool) -> MessagingResult<()> {
        if requeue {
            self.settle(Resolution::Requeue)
        } else {
            self.settle(Resolution::DeadLetter)
        }
    }
}

impl Drop for MemoryAcker {
    fn drop(&mut self) {
        // An unresolved delivery goes back to the queue, as on channel close
        if let Some(permit) = self.permit.get_mut().take() {
            let _ = self.queue.resolve(self.tag, Resolution::Requeue);
            drop(permit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::envelope::{MessageProperties, MessageRole};
    use std::time::Duration;

    fn outbound(exchange: &str, routing_key: &str, body: &[u8]) -> OutboundMessage {
        OutboundMessage {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            properties: MessageProperties::new(exchange),
            body: body.to_vec(),
        }
    }

    async fn declared(spec: &QueueSpec) -> InMemoryBroker {
        let broker = InMemoryBroker::new();
        broker.declare_exchange(&spec.exchange).await.unwrap();
        broker.declare_queue(spec).await.unwrap();
        broker
    }

    #[tokio::test]
    async fn test_publish_to_undeclared_exchange_fails() {
        let broker = InMemoryBroker::new();
        let result = broker.publish(outbound("Missing", "Missing", b"{}")).await;
        assert!(matches!(result, Err(MessagingError::ExchangeNotFound(_))));
    }

    #[tokio::test]
    async fn test_declare_is_idempotent() {
        let spec = QueueSpec::for_type("DocumentUploaded");
        let broker = declared(&spec).await;
        broker.declare_exchange("DocumentUploaded").await.unwrap();
        broker.declare_queue(&spec).await.unwrap();

        broker
            .publish(outbound("DocumentUploaded", "DocumentUploaded", b"{}"))
            .await
            .unwrap();

        // A duplicate binding would have enqueued twice
        assert_eq!(broker.queue_stats("DocumentUploaded").unwrap().ready, 1);
    }

    #[tokio::test]
    async fn test_queue_with_overlapping_bindings_gets_one_copy() {
        let audit = QueueSpec {
            exchange: "ConversationMessageCreated".to_string(),
            queue: "audit".to_string(),
            binding_key: "#".to_string(),
        };
        let users = QueueSpec::for_role("ConversationMessageCreated", MessageRole::User);
        let audit_users = QueueSpec {
            binding_key: users.binding_key.clone(),
            ..audit.clone()
        };

        let broker = declared(&audit).await;
        broker.declare_queue(&users).await.unwrap();
        broker.declare_queue(&audit_users).await.unwrap();

        broker
            .publish(outbound(
                "ConversationMessageCreated",
                &users.binding_key,
                b"{}",
            ))
            .await
            .unwrap();

        assert_eq!(broker.queue_stats("audit").unwrap().ready, 1);
        assert_eq!(broker.queue_stats(&users.queue).unwrap().ready, 1);
    }

    #[tokio::test]
    async fn test_unroutable_messages_are_counted() {
        let spec = QueueSpec::for_type("DocumentUploaded");
        let broker = declared(&spec).await;
        broker
            .publish(outbound("DocumentUploaded", "DocumentUploaded.other", b"{}"))
            .await
            .unwrap();

        assert_eq!(broker.unroutable_count(), 1);
        assert_eq!(broker.queue_stats("DocumentUploaded").unwrap().ready, 0);
    }

    #[tokio::test]
    async fn test_prefetch_withholds_next_delivery() {
        let spec = QueueSpec::for_type("Work");
        let broker = declared(&spec).await;
        for body in [b"1", b"2"] {
            broker.publish(outbound("Work", "Work", body)).await.unwrap();
        }

        let mut stream = broker.consume(&spec, 1).await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.body, b"1");

        let blocked = tokio::time::timeout(Duration::from_millis(50), stream.next()).await;
        assert!(blocked.is_err(), "second delivery dispatched before ack");

        first.ack().await.unwrap();
        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(second.body, b"2");
        second.ack().await.unwrap();

        let stats = broker.queue_stats("Work").unwrap();
        assert_eq!(stats.acked, 2);
        assert_eq!(stats.unacked, 0);
    }

    #[tokio::test]
    async fn test_nack_without_requeue_dead_letters() {
        let spec = QueueSpec::for_type("Work");
        let broker = declared(&spec).await;
        broker.publish(outbound("Work", "Work", b"bad")).await.unwrap();

        let mut stream = broker.consume(&spec, 1).await.unwrap();
        stream.next().await.unwrap().unwrap().nack(false).await.unwrap();

        assert_eq!(broker.dead_lettered("Work"), vec![b"bad".to_vec()]);
        assert_eq!(broker.queue_depth(&spec).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_requeue_marks_redelivered() {
        let spec = QueueSpec::for_type("Work");
        let broker = declared(&spec).await;
        broker.publish(outbound("Work", "Work", b"x")).await.unwrap();

        let mut stream = broker.consume(&spec, 1).await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert!(!first.redelivered);
        first.nack(true).await.unwrap();

        let again = stream.next().await.unwrap().unwrap();
        assert!(again.redelivered);
        assert_eq!(broker.queue_stats("Work").unwrap().requeued, 1);
    }

    #[tokio::test]
    async fn test_dropped_delivery_is_requeued() {
        let spec = QueueSpec::for_type("Work");
        let broker = declared(&spec).await;
        broker.publish(outbound("Work", "Work", b"x")).await.unwrap();

        let mut stream = broker.consume(&spec, 1).await.unwrap();
        drop(stream.next().await.unwrap().unwrap());

        let stats = broker.queue_stats("Work").unwrap();
        assert_eq!(stats.ready, 1);
        assert_eq!(stats.unacked, 0);
    }

    #[tokio::test]
    async fn test_cancelled_stream_ends() {
        let spec = QueueSpec::for_type("Work");
        let broker = declared(&spec).await;
        let mut stream = broker.consume(&spec, 1).await.unwrap();
        stream.cancel().await.unwrap();
        assert!(stream.next().await.unwrap().is_none());
    }
}
