//! Bounded bulk publishing
//!
//! A backfill publishes many messages with at most `concurrency` publishes in
//! flight. It runs under its own cancellation token so it outlives the request
//! that started it and can be stopped independently. Cancelling stops new
//! publishes from being scheduled; publishes already handed to the broker
//! run to completion.

use crate::messaging::envelope::PipelineMessage;
use crate::messaging::error::MessagingError;
use crate::messaging::publisher::Publisher;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Outcome of a backfill run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackfillReport {
    pub message_type: String,
    pub submitted: usize,
    pub published: usize,
    pub failed: usize,
    pub cancelled: usize,
}

/// Handle to a running backfill
pub struct BackfillHandle {
    cancel: CancellationToken,
    task: JoinHandle<BackfillReport>,
}

impl BackfillHandle {
    /// Stop scheduling further publishes; in-flight ones finish
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that stops this backfill, for wiring to signals
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the backfill to finish
    pub async fn join(self) -> BackfillReport {
        match self.task.await {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "Backfill task failed");
                BackfillReport::default()
            }
        }
    }
}

/// Bulk publish job
pub struct BackfillJob;

impl BackfillJob {
    /// Start publishing `messages` in the background and return immediately
    pub fn spawn<M: PipelineMessage>(
        publisher: Arc<Publisher>,
        messages: Vec<M>,
        concurrency: usize,
    ) -> BackfillHandle {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(publisher, messages, concurrency.max(1), cancel.clone()));
        BackfillHandle { cancel, task }
    }
}

async fn run<M: PipelineMessage>(
    publisher: Arc<Publisher>,
    messages: Vec<M>,
    concurrency: usize,
    cancel: CancellationToken,
) -> BackfillReport {
    let mut report = BackfillReport {
        message_type: M::MESSAGE_TYPE.to_string(),
        submitted: messages.len(),
        ..Default::default()
    };
    info!(
        message_type = M::MESSAGE_TYPE,
        submitted = report.submitted,
        concurrency,
        "Backfill started"
    );

    let limiter = Arc::new(Semaphore::new(concurrency));
    // Scheduled publishes are not interrupted by the backfill's own token
    let in_flight = CancellationToken::new();
    let mut tasks = JoinSet::new();

    for message in messages {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            permit = limiter.clone().acquire_owned() => permit.ok(),
        };
        let Some(permit) = permit else {
            report.cancelled += 1;
            continue;
        };

        let publisher = publisher.clone();
        let in_flight = in_flight.clone();
        tasks.spawn(async move {
            let result = publisher.publish(&message, &in_flight).await;
            drop(permit);
            result
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(_)) => report.published += 1,
            Ok(Err(MessagingError::Cancelled)) => report.cancelled += 1,
            Ok(Err(e)) => {
                warn!(message_type = M::MESSAGE_TYPE, error = %e, "Backfill publish failed");
                report.failed += 1;
            }
            Err(e) => {
                warn!(message_type = M::MESSAGE_TYPE, error = %e, "Backfill publish task failed");
                report.failed += 1;
            }
        }
    }

    info!(
        message_type = M::MESSAGE_TYPE,
        submitted = report.submitted,
        published = report.published,
        failed = report.failed,
        cancelled = report.cancelled,
        "Backfill finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::memory::InMemoryBroker;
    use crate::messaging::routing::QueueSpec;
    use crate::messaging::envelope::OutboundMessage;
    use crate::messaging::error::MessagingResult;
    use crate::messaging::traits::{Broker, DeliveryStream};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Broker whose publishes park until the gate opens
    struct GatedBroker {
        inner: InMemoryBroker,
        gate: Semaphore,
        entered: AtomicUsize,
    }

    #[async_trait]
    impl Broker for GatedBroker {
        async fn declare_exchange(&self, exchange: &str) -> MessagingResult<()> {
            self.inner.declare_exchange(exchange).await
        }

        async fn declare_queue(&self, spec: &QueueSpec) -> MessagingResult<()> {
            self.inner.declare_queue(spec).await
        }

        async fn publish(&self, message: OutboundMessage) -> MessagingResult<()> {
            self.entered.fetch_add(1, Ordering::SeqCst);
            if let Ok(permit) = self.gate.acquire().await {
                permit.forget();
            }
            self.inner.publish(message).await
        }

        async fn consume(
            &self,
            spec: &QueueSpec,
            prefetch: u16,
        ) -> MessagingResult<Box<dyn DeliveryStream>> {
            self.inner.consume(spec, prefetch).await
        }

        async fn queue_depth(&self, spec: &QueueSpec) -> MessagingResult<u64> {
            self.inner.queue_depth(spec).await
        }

        async fn close(&self) -> MessagingResult<()> {
            self.inner.close().await
        }

        fn backend_name(&self) -> &'static str {
            "gated"
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct RulesetReindexed {
        ruleset_id: String,
    }

    impl PipelineMessage for RulesetReindexed {
        const MESSAGE_TYPE: &'static str = "RulesetReindexed";
    }

    async fn publisher() -> (InMemoryBroker, Arc<Publisher>) {
        let broker = InMemoryBroker::new();
        let spec = QueueSpec::for_type("RulesetReindexed");
        broker.declare_exchange(&spec.exchange).await.unwrap();
        broker.declare_queue(&spec).await.unwrap();
        let publisher = Arc::new(Publisher::new(Arc::new(broker.clone())).without_metrics());
        (broker, publisher)
    }

    fn batch(n: usize) -> Vec<RulesetReindexed> {
        (0..n)
            .map(|i| RulesetReindexed {
                ruleset_id: format!("rs-{}", i),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_backfill_publishes_everything() {
        let (broker, publisher) = publisher().await;

        let report = BackfillJob::spawn(publisher, batch(50), 4).join().await;

        assert_eq!(report.submitted, 50);
        assert_eq!(report.published, 50);
        assert_eq!(report.failed, 0);
        assert_eq!(broker.queue_stats("RulesetReindexed").unwrap().ready, 50);
    }

    #[tokio::test]
    async fn test_cancelled_backfill_accounts_for_every_message() {
        let (_broker, publisher) = publisher().await;

        let handle = BackfillJob::spawn(publisher, batch(100), 1);
        handle.cancel();
        let report = handle.join().await;

        assert_eq!(report.submitted, 100);
        assert_eq!(report.published + report.failed + report.cancelled, 100);
        assert!(report.cancelled > 0);
    }

    #[tokio::test]
    async fn test_cancel_lets_in_flight_publishes_finish() {
        let (inner, _) = publisher().await;
        let broker = Arc::new(GatedBroker {
            inner: inner.clone(),
            gate: Semaphore::new(0),
            entered: AtomicUsize::new(0),
        });
        let publisher = Arc::new(Publisher::new(broker.clone()).without_metrics());

        let handle = BackfillJob::spawn(publisher, batch(10), 2);
        let started = tokio::time::timeout(Duration::from_secs(5), async {
            while broker.entered.load(Ordering::SeqCst) < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(started.is_ok());

        handle.cancel();
        broker.gate.add_permits(10);
        let report = handle.join().await;

        assert_eq!(report.published, 2);
        assert_eq!(report.cancelled, 8);
        assert_eq!(report.failed, 0);
        assert_eq!(inner.queue_stats("RulesetReindexed").unwrap().ready, 2);
    }
}
