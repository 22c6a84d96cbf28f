//! Typed message bus over a topic-exchange broker
//!
//! Every message type gets its own durable topic exchange named after the
//! type. Consumers bind a durable queue per (type, role) and resolve each
//! delivery with an explicit ack or nack after local retries.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   publish<M>   ┌────────────────────────────┐
//! │  Publisher   │ ─────────────▶ │ exchange "{Type}" (topic)  │
//! └──────────────┘                └────────────────────────────┘
//!                                     │ "{Type}"      │ "{Type}.{role}"
//!                                     ▼               ▼
//!                              ┌────────────┐  ┌──────────────────┐
//!                              │ queue Type │  │ queue Type.role  │
//!                              └────────────┘  └──────────────────┘
//!                                     │               │
//!                                     ▼               ▼
//!                              ConsumerRuntime<M> (retry, ack/nack)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use gamemaster_pipeline::messaging::{InMemoryBroker, Publisher};
//! use gamemaster_pipeline::messages::DocumentUploaded;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let publisher = Publisher::new(Arc::new(InMemoryBroker::new()));
//! let message = DocumentUploaded::new("doc-1", "rs-1", "/docs/rules.pdf");
//! publisher.publish(&message, &CancellationToken::new()).await?;
//! # Ok(())
//! # }
//! ```

pub mod backfill;
pub mod config;
pub mod consumer;
pub mod envelope;
pub mod error;
pub mod memory;
pub mod metrics;
pub mod nats;
pub mod publisher;
pub mod registry;
pub mod routing;
pub mod traits;

pub use backfill::{BackfillHandle, BackfillJob, BackfillReport};
pub use config::{MessagingBackend, MessagingConfig, NatsConfig, RetryConfig, StreamStorage};
pub use consumer::{ConsumerRuntime, ConsumerState, DeliveryOutcome, MessageHandler, RetryPolicy};
pub use envelope::{Delivery, MessageProperties, MessageRole, PipelineMessage, RawDelivery};
pub use error::{MessagingError, MessagingResult};
pub use memory::{InMemoryBroker, QueueStats};
pub use metrics::{init_messaging_metrics, MESSAGING_METRICS};
pub use nats::{NatsBroker, NatsBrokerFactory};
pub use publisher::Publisher;
pub use registry::{ConsumerRegistry, WorkerSet, WorkerStates};
pub use routing::{routing_key_for, topic_matches, QueueSpec};
pub use traits::{Broker, BrokerFactory, DeliveryStream};

use std::sync::Arc;

/// Broker factory for the configured backend.
///
/// The in-memory backend hands every worker a handle to one shared broker.
pub fn broker_factory(config: &MessagingConfig) -> Arc<dyn BrokerFactory> {
    match config.backend {
        MessagingBackend::Nats => Arc::new(NatsBrokerFactory::new(config.nats.clone())),
        MessagingBackend::InMemory => Arc::new(InMemoryBroker::new()),
    }
}
