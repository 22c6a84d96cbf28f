//! Broker trait abstractions

use crate::messaging::envelope::{OutboundMessage, RawDelivery};
use crate::messaging::error::MessagingResult;
use crate::messaging::routing::QueueSpec;
use async_trait::async_trait;
use std::sync::Arc;

/// A connection to a topic-exchange message broker
#[async_trait]
pub trait Broker: Send + Sync {
    /// Declare a durable topic exchange; idempotent
    async fn declare_exchange(&self, exchange: &str) -> MessagingResult<()>;

    /// Declare a durable queue and bind it to its exchange; idempotent
    async fn declare_queue(&self, spec: &QueueSpec) -> MessagingResult<()>;

    /// Publish an encoded message to its exchange
    async fn publish(&self, message: OutboundMessage) -> MessagingResult<()>;

    /// Start consuming a declared queue with at most `prefetch` unacknowledged deliveries
    async fn consume(&self, spec: &QueueSpec, prefetch: u16)
        -> MessagingResult<Box<dyn DeliveryStream>>;

    /// Number of messages waiting in (or held unacknowledged by) a queue
    async fn queue_depth(&self, spec: &QueueSpec) -> MessagingResult<u64>;

    /// Release the connection
    async fn close(&self) -> MessagingResult<()>;

    /// Backend name for logs and metrics
    fn backend_name(&self) -> &'static str;
}

/// Stream of deliveries from one consumer registration
#[async_trait]
pub trait DeliveryStream: Send {
    /// Next delivery; `None` once the broker ends the registration
    async fn next(&mut self) -> MessagingResult<Option<RawDelivery>>;

    /// Cancel the consumer registration
    async fn cancel(&mut self) -> MessagingResult<()>;
}

/// Opens broker connections; each worker owns the connection it gets
#[async_trait]
pub trait BrokerFactory: Send + Sync {
    async fn connect(&self) -> MessagingResult<Arc<dyn Broker>>;
}
