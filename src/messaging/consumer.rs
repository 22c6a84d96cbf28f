//! Long-lived consumer runtime with local retry and ack/nack resolution
//!
//! Lifecycle: `Stopped -> Connecting -> Declaring -> Consuming -> (Stopped | Faulted)`.
//!
//! Each delivery is resolved before the next is requested. With the default
//! prefetch of 1 the broker never hands a worker a second delivery while the
//! first is outstanding.

use crate::messaging::config::RetryConfig;
use crate::messaging::envelope::{Delivery, MessageRole, PipelineMessage, RawDelivery};
use crate::messaging::error::{MessagingError, MessagingResult};
use crate::messaging::metrics::MESSAGING_METRICS;
use crate::messaging::routing::QueueSpec;
use crate::messaging::traits::{Broker, BrokerFactory};
use crate::pipeline::error::PipelineResult;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use strum_macros::Display;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Consumer runtime state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ConsumerState {
    Stopped,
    Connecting,
    Declaring,
    Consuming,
    Faulted,
}

impl ConsumerState {
    fn gauge_value(self) -> i64 {
        match self {
            ConsumerState::Stopped => 0,
            ConsumerState::Connecting => 1,
            ConsumerState::Declaring => 2,
            ConsumerState::Consuming => 3,
            ConsumerState::Faulted => 4,
        }
    }
}

/// How a single delivery was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum DeliveryOutcome {
    /// Handler succeeded; acked
    Acked,
    /// Retries exhausted; nacked without requeue
    DeadLettered,
    /// Body could not be decoded; nacked without requeue, handler never ran
    Poisoned,
    /// Shutdown interrupted the retry loop; nacked with requeue
    Abandoned,
}

/// Local retry policy: `max_attempts` handler invocations, waiting
/// `base_delay * 2^k` after failed attempt `k`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: config.base_delay(),
        }
    }
}

impl RetryPolicy {
    /// Backoff after failed attempt `attempt` (1-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Processes decoded deliveries of one message type
#[async_trait]
pub trait MessageHandler<M: PipelineMessage>: Send + Sync {
    async fn handle(&self, delivery: &Delivery<M>, cancel: &CancellationToken) -> PipelineResult<()>;
}

/// Consumer worker bound to one queue of one message type
pub struct ConsumerRuntime<M: PipelineMessage> {
    factory: Arc<dyn BrokerFactory>,
    handler: Arc<dyn MessageHandler<M>>,
    spec: QueueSpec,
    retry: RetryPolicy,
    prefetch: u16,
    state: watch::Sender<ConsumerState>,
}

impl<M: PipelineMessage> ConsumerRuntime<M> {
    /// Consumer on the default queue for `M`
    pub fn new(factory: Arc<dyn BrokerFactory>, handler: Arc<dyn MessageHandler<M>>) -> Self {
        let (state, _) = watch::channel(ConsumerState::Stopped);
        Self {
            factory,
            handler,
            spec: QueueSpec::for_message::<M>(),
            retry: RetryPolicy::default(),
            prefetch: 1,
            state,
        }
    }

    /// Bind to the role-suffixed queue instead of the default one
    pub fn with_role(mut self, role: MessageRole) -> Self {
        self.spec = QueueSpec::for_message_role::<M>(role);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_prefetch(mut self, prefetch: u16) -> Self {
        self.prefetch = prefetch.max(1);
        self
    }

    /// Queue this runtime consumes
    pub fn queue(&self) -> &QueueSpec {
        &self.spec
    }

    /// Current state
    pub fn state(&self) -> ConsumerState {
        *self.state.borrow()
    }

    /// Watch state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<ConsumerState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: ConsumerState) {
        self.state.send_replace(state);
        MESSAGING_METRICS
            .consumer_state
            .with_label_values(&[&self.spec.queue])
            .set(state.gauge_value());
    }

    fn fault(&self, err: MessagingError) -> MessagingResult<()> {
        error!(
            message_type = M::MESSAGE_TYPE,
            queue = %self.spec.queue,
            error = %err,
            "Consumer faulted"
        );
        self.set_state(ConsumerState::Faulted);
        Err(err)
    }

    async fn declare(&self, broker: &Arc<dyn Broker>) -> MessagingResult<()> {
        broker.declare_exchange(&self.spec.exchange).await?;
        broker.declare_queue(&self.spec).await
    }

    /// Run until `cancel` fires (returns `Ok`) or the broker fails (returns `Err`).
    ///
    /// Broker failures are not retried here; the host is expected to restart
    /// the worker.
    pub async fn run(&self, cancel: &CancellationToken) -> MessagingResult<()> {
        self.set_state(ConsumerState::Connecting);
        let broker = match self.factory.connect().await {
            Ok(broker) => broker,
            Err(e) => return self.fault(e),
        };

        self.set_state(ConsumerState::Declaring);
        if let Err(e) = self.declare(&broker).await {
            let _ = broker.close().await;
            return self.fault(e);
        }

        let mut stream = match broker.consume(&self.spec, self.prefetch).await {
            Ok(stream) => stream,
            Err(e) => {
                let _ = broker.close().await;
                return self.fault(e);
            }
        };

        self.set_state(ConsumerState::Consuming);
        info!(
            message_type = M::MESSAGE_TYPE,
            queue = %self.spec.queue,
            binding_key = %self.spec.binding_key,
            prefetch = self.prefetch,
            backend = broker.backend_name(),
            "Consumer started"
        );

        let result = loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                next = stream.next() => Some(next),
            };

            match next {
                None => break Ok(()),
                Some(Ok(Some(delivery))) => {
                    self.process_delivery(delivery, cancel).await;
                }
                Some(Ok(None)) => {
                    break Err(MessagingError::ConsumeFailed(format!(
                        "delivery stream for {} closed by broker",
                        self.spec.queue
                    )))
                }
                Some(Err(e)) => break Err(e),
            }
        };

        if let Err(e) = stream.cancel().await {
            warn!(queue = %self.spec.queue, error = %e, "Failed to cancel consumer registration");
        }
        if let Err(e) = broker.close().await {
            warn!(queue = %self.spec.queue, error = %e, "Failed to close broker connection");
        }

        match result {
            Ok(()) => {
                self.set_state(ConsumerState::Stopped);
                info!(queue = %self.spec.queue, "Consumer stopped");
                Ok(())
            }
            Err(e) => self.fault(e),
        }
    }

    /// Decode, handle with local retries, and resolve one delivery
    pub async fn process_delivery(
        &self,
        delivery: RawDelivery,
        cancel: &CancellationToken,
    ) -> DeliveryOutcome {
        let queue = self.spec.queue.as_str();
        let tag = delivery.delivery_tag;
        MESSAGING_METRICS
            .deliveries_received
            .with_label_values(&[queue])
            .inc();

        let typed = match delivery.decode::<M>() {
            Ok(typed) => typed,
            Err(e) => {
                error!(
                    message_type = M::MESSAGE_TYPE,
                    queue,
                    delivery_tag = tag,
                    message_id = %delivery.properties.message_id,
                    error = %e,
                    "Poison message rejected without retry"
                );
                self.settle(delivery.nack(false).await, tag);
                return self.record(DeliveryOutcome::Poisoned);
            }
        };

        let mut attempt = 0;
        loop {
            if cancel.is_cancelled() {
                self.settle(delivery.nack(true).await, tag);
                return self.record(DeliveryOutcome::Abandoned);
            }

            attempt += 1;
            let err = match self.handler.handle(&typed, cancel).await {
                Ok(()) => {
                    self.settle(delivery.ack().await, tag);
                    return self.record(DeliveryOutcome::Acked);
                }
                Err(err) => err,
            };

            let delay = self.retry.delay_for_attempt(attempt);
            warn!(
                message_type = M::MESSAGE_TYPE,
                queue,
                delivery_tag = tag,
                attempt,
                max_attempts = self.retry.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Handler attempt failed"
            );

            let exhausted = attempt >= self.retry.max_attempts;
            let interrupted = tokio::select! {
                biased;
                _ = cancel.cancelled() => true,
                _ = tokio::time::sleep(delay) => false,
            };

            if exhausted {
                error!(
                    message_type = M::MESSAGE_TYPE,
                    queue,
                    delivery_tag = tag,
                    message_id = %typed.message_id,
                    attempts = attempt,
                    interrupted,
                    error = %err,
                    "Delivery failed after exhausting retries, discarding"
                );
                self.settle(delivery.nack(false).await, tag);
                return self.record(DeliveryOutcome::DeadLettered);
            }

            if interrupted {
                info!(
                    queue,
                    delivery_tag = tag,
                    attempt,
                    "Shutdown during retry backoff, returning delivery to queue"
                );
                self.settle(delivery.nack(true).await, tag);
                return self.record(DeliveryOutcome::Abandoned);
            }

            MESSAGING_METRICS
                .handler_retries
                .with_label_values(&[queue])
                .inc();
        }
    }

    fn settle(&self, result: MessagingResult<()>, tag: u64) {
        if let Err(e) = result {
            warn!(
                queue = %self.spec.queue,
                delivery_tag = tag,
                error = %e,
                "Failed to resolve delivery with broker"
            );
        }
    }

    fn record(&self, outcome: DeliveryOutcome) -> DeliveryOutcome {
        MESSAGING_METRICS
            .deliveries_resolved
            .with_label_values(&[&self.spec.queue, &outcome.to_string()])
            .inc();
        outcome
    }
}

/// Type-erased consumer the registry can spawn
pub trait Worker: Send + Sync {
    /// Queue the worker consumes
    fn queue(&self) -> &QueueSpec;

    /// Watch the worker's state
    fn watch_state(&self) -> watch::Receiver<ConsumerState>;

    /// Spawn the worker onto the runtime
    fn spawn(self: Box<Self>, cancel: CancellationToken) -> JoinHandle<MessagingResult<()>>;
}

impl<M: PipelineMessage> Worker for ConsumerRuntime<M> {
    fn queue(&self) -> &QueueSpec {
        &self.spec
    }

    fn watch_state(&self) -> watch::Receiver<ConsumerState> {
        self.subscribe_state()
    }

    fn spawn(self: Box<Self>, cancel: CancellationToken) -> JoinHandle<MessagingResult<()>> {
        tokio::spawn(async move { self.run(&cancel).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_per_attempt() {
        let policy = RetryPolicy::default();
        let delays: Vec<u64> = (1..=5)
            .map(|k| policy.delay_for_attempt(k).as_secs())
            .collect();
        assert_eq!(delays, vec![2, 4, 8, 16, 32]);
    }

    #[test]
    fn test_policy_from_config() {
        let config = RetryConfig {
            max_attempts: 0,
            base_delay_ms: 250,
        };
        let policy = RetryPolicy::from(&config);
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(500));
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(DeliveryOutcome::DeadLettered.to_string(), "dead_lettered");
        assert_eq!(ConsumerState::Consuming.to_string(), "Consuming");
    }
}
