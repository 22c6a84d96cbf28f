//! Typed publisher over a broker connection

use crate::messaging::envelope::{OutboundMessage, PipelineMessage};
use crate::messaging::error::{MessagingError, MessagingResult};
use crate::messaging::metrics::MESSAGING_METRICS;
use crate::messaging::traits::Broker;
use dashmap::DashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Publishes typed messages to the exchange named after their type.
///
/// Exchanges are declared lazily on first use. Concurrent first publishes of
/// the same type may both declare; the broker treats that as a no-op.
pub struct Publisher {
    broker: Arc<dyn Broker>,
    declared: DashSet<String>,
    enable_metrics: bool,
}

impl Publisher {
    /// Create a publisher on a broker connection
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self {
            broker,
            declared: DashSet::new(),
            enable_metrics: true,
        }
    }

    /// Disable metric recording
    pub fn without_metrics(mut self) -> Self {
        self.enable_metrics = false;
        self
    }

    /// Underlying broker connection
    pub fn broker(&self) -> &Arc<dyn Broker> {
        &self.broker
    }

    /// Publish a message; returns the assigned message id.
    ///
    /// Broker failures are returned to the caller and not retried here.
    pub async fn publish<M: PipelineMessage>(
        &self,
        message: &M,
        cancel: &CancellationToken,
    ) -> MessagingResult<String> {
        if cancel.is_cancelled() {
            return Err(MessagingError::Cancelled);
        }

        self.ensure_exchange(M::MESSAGE_TYPE).await?;

        let outbound = OutboundMessage::encode(message)?;
        let message_id = outbound.properties.message_id.clone();
        let routing_key = outbound.routing_key.clone();
        let start = Instant::now();

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(MessagingError::Cancelled),
            result = self.broker.publish(outbound) => result,
        };

        if self.enable_metrics {
            let backend = self.broker.backend_name();
            match &result {
                Ok(()) => {
                    MESSAGING_METRICS
                        .messages_published
                        .with_label_values(&[M::MESSAGE_TYPE, backend])
                        .inc();
                    MESSAGING_METRICS
                        .publish_latency
                        .with_label_values(&[M::MESSAGE_TYPE, backend])
                        .observe(start.elapsed().as_secs_f64());
                }
                Err(_) => {
                    MESSAGING_METRICS
                        .publish_failures
                        .with_label_values(&[M::MESSAGE_TYPE, backend])
                        .inc();
                }
            }
        }

        match result {
            Ok(()) => {
                debug!(
                    message_type = M::MESSAGE_TYPE,
                    routing_key = %routing_key,
                    message_id = %message_id,
                    "Published message"
                );
                Ok(message_id)
            }
            Err(e) => {
                warn!(
                    message_type = M::MESSAGE_TYPE,
                    routing_key = %routing_key,
                    error = %e,
                    "Publish failed"
                );
                Err(e)
            }
        }
    }

    async fn ensure_exchange(&self, exchange: &str) -> MessagingResult<()> {
        if self.declared.contains(exchange) {
            return Ok(());
        }
        self.broker.declare_exchange(exchange).await?;
        self.declared.insert(exchange.to_string());
        Ok(())
    }

    /// Close the underlying connection
    pub async fn close(&self) -> MessagingResult<()> {
        self.broker.close().await
    }
}
