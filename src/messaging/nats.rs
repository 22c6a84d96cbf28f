//! NATS JetStream broker implementation
//!
//! Topology mapping:
//! - exchange: a stream named after the message type, capturing the subjects
//!   `{type}` and `{type}.>`
//! - queue: a durable pull consumer on that stream whose `filter_subject` is
//!   the binding key
//! - prefetch: the consumer's `max_ack_pending`
//! - retention: interest based, so a message leaves the stream once every
//!   bound consumer has acked or terminated it
//! - nack without requeue: `AckKind::Term`; nack with requeue: `AckKind::Nak`

use crate::messaging::config::{NatsConfig, StreamStorage};
use crate::messaging::envelope::{
    DeliveryAcker, MessageProperties, OutboundMessage, RawDelivery, CONTENT_TYPE_JSON,
};
use crate::messaging::error::{MessagingError, MessagingResult};
use crate::messaging::routing::QueueSpec;
use crate::messaging::traits::{Broker, BrokerFactory, DeliveryStream};
use async_nats::jetstream::{
    self,
    consumer::{pull, AckPolicy},
    stream::{self, RetentionPolicy, StorageType},
    AckKind,
};
use async_nats::{Client, HeaderMap};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::sync::Arc;
use tracing::{debug, info};

const HEADER_MESSAGE_ID: &str = "Nats-Msg-Id";
const HEADER_CONTENT_TYPE: &str = "Content-Type";
const HEADER_MESSAGE_TYPE: &str = "Message-Type";
const HEADER_TIMESTAMP: &str = "Timestamp";

/// Durable consumer name for a queue; JetStream names may not contain dots
pub fn consumer_name(spec: &QueueSpec) -> String {
    spec.queue.replace('.', "_")
}

/// Stream definition backing an exchange
pub fn stream_config(exchange: &str, config: &NatsConfig) -> stream::Config {
    let storage = match config.storage {
        StreamStorage::File => StorageType::File,
        StreamStorage::Memory => StorageType::Memory,
    };

    stream::Config {
        name: exchange.to_string(),
        subjects: vec![exchange.to_string(), format!("{}.>", exchange)],
        retention: RetentionPolicy::Interest,
        storage,
        max_age: config.max_age(),
        max_messages: config.max_messages,
        ..Default::default()
    }
}

/// JetStream-backed broker connection
pub struct NatsBroker {
    client: Client,
    context: jetstream::Context,
    config: NatsConfig,
}

impl NatsBroker {
    /// Connect to the first configured server
    pub async fn connect(config: NatsConfig) -> MessagingResult<Self> {
        let server = config
            .servers
            .first()
            .ok_or_else(|| MessagingError::ConfigurationError("no NATS servers configured".into()))?;

        let client = async_nats::ConnectOptions::new()
            .name(&config.connection_name)
            .ping_interval(config.ping_interval())
            .connect(server.as_str())
            .await
            .map_err(|e| MessagingError::ConnectionFailed(format!("NATS connection failed: {}", e)))?;

        info!(server = %server, connection = %config.connection_name, "Connected to NATS");

        let context = jetstream::new(client.clone());
        Ok(Self {
            client,
            context,
            config,
        })
    }

    async fn stream(&self, exchange: &str) -> MessagingResult<stream::Stream> {
        self.context
            .get_stream(exchange)
            .await
            .map_err(|e| MessagingError::ExchangeNotFound(format!("{}: {}", exchange, e)))
    }
}

#[async_trait]
impl Broker for NatsBroker {
    async fn declare_exchange(&self, exchange: &str) -> MessagingResult<()> {
        self.context
            .get_or_create_stream(stream_config(exchange, &self.config))
            .await
            .map_err(|e| MessagingError::DeclareFailed(format!("stream {}: {}", exchange, e)))?;

        debug!(exchange = %exchange, "Declared JetStream stream");
        Ok(())
    }

    async fn declare_queue(&self, spec: &QueueSpec) -> MessagingResult<()> {
        // The durable consumer carries the binding and the prefetch limit,
        // so it is created when consumption starts.
        self.stream(&spec.exchange).await?;
        Ok(())
    }

    async fn publish(&self, message: OutboundMessage) -> MessagingResult<()> {
        let mut headers = HeaderMap::new();
        headers.insert(HEADER_MESSAGE_ID, message.properties.message_id.as_str());
        headers.insert(HEADER_CONTENT_TYPE, message.properties.content_type.as_str());
        headers.insert(HEADER_MESSAGE_TYPE, message.properties.message_type.as_str());
        headers.insert(
            HEADER_TIMESTAMP,
            message.properties.timestamp.to_rfc3339().as_str(),
        );

        let ack = self
            .context
            .publish_with_headers(message.routing_key.clone(), headers, message.body.into())
            .await
            .map_err(|e| MessagingError::PublishFailed(format!("NATS publish failed: {}", e)))?;

        // Wait for the stream to persist the message
        ack.await
            .map_err(|e| MessagingError::PublishFailed(format!("NATS publish not acknowledged: {}", e)))?;

        Ok(())
    }

    async fn consume(
        &self,
        spec: &QueueSpec,
        prefetch: u16,
    ) -> MessagingResult<Box<dyn DeliveryStream>> {
        let stream = self.stream(&spec.exchange).await?;
        let name = consumer_name(spec);

        let consumer = stream
            .get_or_create_consumer(
                &name,
                pull::Config {
                    durable_name: Some(name.clone()),
                    filter_subject: spec.binding_key.clone(),
                    ack_policy: AckPolicy::Explicit,
                    max_ack_pending: i64::from(prefetch.max(1)),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| MessagingError::DeclareFailed(format!("consumer {}: {}", name, e)))?;

        let messages = consumer
            .messages()
            .await
            .map_err(|e| MessagingError::ConsumeFailed(format!("consumer {}: {}", name, e)))?;

        Ok(Box::new(NatsDeliveryStream {
            messages,
            exchange: spec.exchange.clone(),
            fallback_tag: 0,
            cancelled: false,
        }))
    }

    async fn queue_depth(&self, spec: &QueueSpec) -> MessagingResult<u64> {
        let stream = self.stream(&spec.exchange).await?;
        let info = stream
            .consumer_info(consumer_name(spec))
            .await
            .map_err(|e| MessagingError::QueueNotFound(format!("{}: {}", spec.queue, e)))?;

        Ok(info.num_pending + info.num_ack_pending as u64)
    }

    async fn close(&self) -> MessagingResult<()> {
        self.client
            .flush()
            .await
            .map_err(|e| MessagingError::ConnectionFailed(format!("NATS flush failed: {}", e)))
    }

    fn backend_name(&self) -> &'static str {
        "nats"
    }
}

/// Opens a fresh NATS connection per worker
pub struct NatsBrokerFactory {
    config: NatsConfig,
}

impl NatsBrokerFactory {
    pub fn new(config: NatsConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl BrokerFactory for NatsBrokerFactory {
    async fn connect(&self) -> MessagingResult<Arc<dyn Broker>> {
        Ok(Arc::new(NatsBroker::connect(self.config.clone()).await?))
    }
}

struct NatsDeliveryStream {
    messages: pull::Stream,
    exchange: String,
    fallback_tag: u64,
    cancelled: bool,
}

#[async_trait]
impl DeliveryStream for NatsDeliveryStream {
    async fn next(&mut self) -> MessagingResult<Option<RawDelivery>> {
        if self.cancelled {
            return Ok(None);
        }

        let message = match self.messages.next().await {
            Some(Ok(message)) => message,
            Some(Err(e)) => return Err(MessagingError::ConsumeFailed(e.to_string())),
            None => return Ok(None),
        };

        let (delivery_tag, redelivered) = match message.info() {
            Ok(info) => (info.stream_sequence, info.delivered > 1),
            Err(_) => {
                self.fallback_tag += 1;
                (self.fallback_tag, false)
            }
        };

        let properties = properties_from_headers(message.headers.as_ref(), &self.exchange);
        let routing_key = message.subject.to_string();
        let body = message.payload.to_vec();

        Ok(Some(RawDelivery::new(
            delivery_tag,
            self.exchange.clone(),
            routing_key,
            redelivered,
            properties,
            body,
            Box::new(NatsAcker { message }),
        )))
    }

    async fn cancel(&mut self) -> MessagingResult<()> {
        // Dropping the pull stream stops fetching; the durable consumer keeps
        // its position for the next worker.
        self.cancelled = true;
        Ok(())
    }
}

fn properties_from_headers(headers: Option<&HeaderMap>, exchange: &str) -> MessageProperties {
    let header = |name: &str| {
        headers
            .and_then(|h| h.get(name))
            .map(|v| v.as_str().to_string())
    };

    MessageProperties {
        message_id: header(HEADER_MESSAGE_ID).unwrap_or_default(),
        content_type: header(HEADER_CONTENT_TYPE).unwrap_or_else(|| CONTENT_TYPE_JSON.to_string()),
        message_type: header(HEADER_MESSAGE_TYPE).unwrap_or_else(|| exchange.to_string()),
        persistent: true,
        timestamp: header(HEADER_TIMESTAMP)
            .and_then(|t| DateTime::parse_from_rfc3339(&t).ok())
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(Utc::now),
    }
}

struct NatsAcker {
    message: jetstream::Message,
}

#[async_trait]
impl DeliveryAcker for NatsAcker {
    async fn ack(&self) -> MessagingResult<()> {
        self.message
            .ack()
            .await
            .map_err(|e| MessagingError::AckFailed(e.to_string()))
    }

    async fn nack(&self, requeue: bool) -> MessagingResult<()> {
        let kind = if requeue { AckKind::Nak(None) } else { AckKind::Term };
        self.message
            .ack_with(kind)
            .await
            .map_err(|e| MessagingError::AckFailed(e.to_string()))
    }
}
