//! Explicit registration of consumer workers
//!
//! Every (message type, role) pair gets at most one worker. The host registers
//! handlers at startup and spawns them all under one cancellation token.

use crate::messaging::consumer::{
    ConsumerRuntime, ConsumerState, MessageHandler, RetryPolicy, Worker,
};
use crate::messaging::envelope::{MessageRole, PipelineMessage};
use crate::messaging::error::{MessagingError, MessagingResult};
use crate::messaging::routing::QueueSpec;
use crate::messaging::traits::BrokerFactory;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Registry of consumer workers keyed by queue
pub struct ConsumerRegistry {
    factory: Arc<dyn BrokerFactory>,
    retry: RetryPolicy,
    prefetch: u16,
    workers: Vec<Box<dyn Worker>>,
}

impl ConsumerRegistry {
    pub fn new(factory: Arc<dyn BrokerFactory>, retry: RetryPolicy, prefetch: u16) -> Self {
        Self {
            factory,
            retry,
            prefetch,
            workers: Vec::new(),
        }
    }

    /// Register a handler on the default queue of `M`
    pub fn register<M: PipelineMessage>(
        &mut self,
        handler: Arc<dyn MessageHandler<M>>,
    ) -> MessagingResult<&mut Self> {
        let runtime = ConsumerRuntime::new(self.factory.clone(), handler);
        self.add(runtime)
    }

    /// Register a handler on the `{type}.{role}` queue of `M`
    pub fn register_role<M: PipelineMessage>(
        &mut self,
        role: MessageRole,
        handler: Arc<dyn MessageHandler<M>>,
    ) -> MessagingResult<&mut Self> {
        let runtime = ConsumerRuntime::new(self.factory.clone(), handler).with_role(role);
        self.add(runtime)
    }

    fn add<M: PipelineMessage>(&mut self, runtime: ConsumerRuntime<M>) -> MessagingResult<&mut Self> {
        let runtime = runtime
            .with_retry_policy(self.retry.clone())
            .with_prefetch(self.prefetch);

        if self.workers.iter().any(|w| w.queue().queue == runtime.queue().queue) {
            return Err(MessagingError::ConfigurationError(format!(
                "a consumer is already registered for queue {}",
                runtime.queue().queue
            )));
        }

        self.workers.push(Box::new(runtime));
        Ok(self)
    }

    /// Queues with a registered worker, in registration order
    pub fn queues(&self) -> Vec<QueueSpec> {
        self.workers.iter().map(|w| w.queue().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Spawn every registered worker under a child of `cancel`
    pub fn spawn_all(self, cancel: &CancellationToken) -> WorkerSet {
        let cancel = cancel.child_token();
        let mut tasks = JoinSet::new();
        let mut states = Vec::with_capacity(self.workers.len());

        for worker in self.workers {
            let queue = worker.queue().queue.clone();
            states.push((queue.clone(), worker.watch_state()));
            let handle = worker.spawn(cancel.clone());
            tasks.spawn(async move {
                let result = match handle.await {
                    Ok(result) => result,
                    Err(e) => Err(MessagingError::ConsumeFailed(format!(
                        "consumer task panicked: {}",
                        e
                    ))),
                };
                (queue, result)
            });
        }

        info!(workers = tasks.len(), "Consumer workers started");
        WorkerSet {
            tasks,
            cancel,
            states: WorkerStates(Arc::new(states)),
        }
    }
}

/// Live view of every worker's state, cheap to clone
#[derive(Clone)]
pub struct WorkerStates(Arc<Vec<(String, watch::Receiver<ConsumerState>)>>);

impl WorkerStates {
    /// Current state per queue, in registration order
    pub fn snapshot(&self) -> Vec<(String, ConsumerState)> {
        self.0
            .iter()
            .map(|(queue, rx)| (queue.clone(), *rx.borrow()))
            .collect()
    }

    /// True once every worker is consuming
    pub fn all_consuming(&self) -> bool {
        self.0
            .iter()
            .all(|(_, rx)| *rx.borrow() == ConsumerState::Consuming)
    }
}

/// Running consumer workers
pub struct WorkerSet {
    tasks: JoinSet<(String, MessagingResult<()>)>,
    cancel: CancellationToken,
    states: WorkerStates,
}

impl WorkerSet {
    pub fn states(&self) -> WorkerStates {
        self.states.clone()
    }

    /// Number of workers still running
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait for the next worker to exit; `None` once all have exited
    pub async fn next_exit(&mut self) -> Option<(String, MessagingResult<()>)> {
        match self.tasks.join_next().await? {
            Ok(exit) => Some(exit),
            Err(e) => Some((
                "<unknown>".to_string(),
                Err(MessagingError::ConsumeFailed(format!("worker join failed: {}", e))),
            )),
        }
    }

    /// Cancel all workers and wait for them to finish
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        while let Some((queue, result)) = self.next_exit().await {
            match result {
                Ok(()) => info!(queue = %queue, "Consumer exited"),
                Err(MessagingError::Cancelled) => warn!(queue = %queue, "Consumer cancelled"),
                Err(e) => error!(queue = %queue, error = %e, "Consumer exited with error"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::envelope::Delivery;
    use crate::messaging::memory::InMemoryBroker;
    use crate::pipeline::error::PipelineResult;
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct TurnLogged {
        role: MessageRole,
    }

    impl PipelineMessage for TurnLogged {
        const MESSAGE_TYPE: &'static str = "TurnLogged";

        fn role(&self) -> Option<MessageRole> {
            Some(self.role)
        }
    }

    struct Noop;

    #[async_trait]
    impl MessageHandler<TurnLogged> for Noop {
        async fn handle(
            &self,
            _delivery: &Delivery<TurnLogged>,
            _cancel: &CancellationToken,
        ) -> PipelineResult<()> {
            Ok(())
        }
    }

    fn registry() -> ConsumerRegistry {
        ConsumerRegistry::new(Arc::new(InMemoryBroker::new()), RetryPolicy::default(), 1)
    }

    #[test]
    fn test_duplicate_queue_rejected() {
        let mut registry = registry();
        registry.register::<TurnLogged>(Arc::new(Noop)).unwrap();
        let err = registry.register::<TurnLogged>(Arc::new(Noop)).err().unwrap();
        assert!(matches!(err, MessagingError::ConfigurationError(_)));
    }

    #[test]
    fn test_roles_get_distinct_queues() {
        let mut registry = registry();
        registry
            .register_role::<TurnLogged>(MessageRole::User, Arc::new(Noop))
            .unwrap()
            .register_role::<TurnLogged>(MessageRole::Assistant, Arc::new(Noop))
            .unwrap();

        let queues: Vec<String> = registry.queues().into_iter().map(|q| q.queue).collect();
        assert_eq!(queues, vec!["TurnLogged.user", "TurnLogged.assistant"]);
    }

    #[tokio::test]
    async fn test_shutdown_stops_workers() {
        let mut registry = registry();
        registry.register::<TurnLogged>(Arc::new(Noop)).unwrap();

        let cancel = CancellationToken::new();
        let workers = registry.spawn_all(&cancel);
        assert_eq!(workers.len(), 1);

        let states = workers.states();
        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while !states.all_consuming() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        tokio::time::timeout(std::time::Duration::from_secs(5), workers.shutdown())
            .await
            .unwrap();
        assert!(!cancel.is_cancelled());
    }
}
