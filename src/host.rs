//! Worker host
//!
//! Builds every collaborator from [`Config`], registers one consumer worker per
//! pipeline queue and runs them next to the diagnostics drain and the status
//! server until shutdown.

use crate::api::{spawn_status_server, StatusState};
use crate::config::Config;
use crate::conversation::{
    AnalysisBackend, AnalysisClient, ConversationHandler, DraftSentimentHandler,
    InMemoryConversationStore, LexiconSentimentClassifier, MetricEvaluator, SentimentClassifier,
};
use crate::correlation::CorrelationCache;
use crate::diagnostics::{DiagnosticsQueue, JsonlDiagnosticsStore};
use crate::error::{AppError, Result};
use crate::ingestion::{
    ChunkingHandler, CrackingHandler, Embedder, HashingEmbedder, HttpEmbedder,
    InMemoryDocumentStore, IndexTarget, PlainTextExtractor, TextExtractor, WindowChunker,
};
use crate::messages::{
    ChatMessageDrafted, ConversationMessageCreated, DocumentReadyForChunking,
    DocumentRecrackRequested, DocumentUploaded,
};
use crate::messaging::{
    broker_factory, BrokerFactory, ConsumerRegistry, MessageRole, MessagingResult, Publisher,
    QueueSpec, RetryPolicy, WorkerSet, WorkerStates,
};
use crate::pipeline::{
    BroadcastStageSink, FanoutStageSink, LoggingStageSink, StageEvent, StageTracker,
};
use crate::vector::{build_vector_store, VectorStore};
use std::sync::Arc;
use strum::IntoEnumIterator;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Every queue the host consumes, in registration order
pub fn standard_queues() -> Vec<QueueSpec> {
    let mut queues = vec![
        QueueSpec::for_message::<DocumentUploaded>(),
        QueueSpec::for_message::<DocumentRecrackRequested>(),
        QueueSpec::for_message::<DocumentReadyForChunking>(),
    ];
    for role in MessageRole::iter() {
        queues.push(QueueSpec::for_message_role::<ChatMessageDrafted>(role));
        queues.push(QueueSpec::for_message_role::<ConversationMessageCreated>(role));
    }
    queues
}

/// Fully wired pipeline, ready to start
pub struct PipelineHost {
    config: Config,
    factory: Arc<dyn BrokerFactory>,
    publisher: Arc<Publisher>,
    vectors: Arc<dyn VectorStore>,
    documents: Arc<InMemoryDocumentStore>,
    conversations: Arc<InMemoryConversationStore>,
    correlation: CorrelationCache,
    diagnostics: DiagnosticsQueue,
    stages: Arc<BroadcastStageSink>,
    tracker: StageTracker,
    extractor: Arc<dyn TextExtractor>,
    embedder: Arc<dyn Embedder>,
    classifier: Arc<dyn SentimentClassifier>,
    evaluators: Vec<Arc<dyn MetricEvaluator>>,
}

impl PipelineHost {
    /// Build the host; connects the publishing broker handle
    pub async fn build(config: Config) -> Result<Self> {
        let factory = broker_factory(&config.messaging);
        let broker = factory.connect().await?;
        let mut publisher = Publisher::new(broker);
        if !config.messaging.enable_metrics {
            publisher = publisher.without_metrics();
        }
        info!(
            backend = ?config.messaging.backend,
            "✅ Message bus connected"
        );

        let vectors = build_vector_store(&config.vector_store)?;
        info!(backend = vectors.backend_name(), "✅ Vector store initialized");

        let stages = Arc::new(BroadcastStageSink::new(config.status.stage_channel_capacity));
        let tracker = StageTracker::new(Arc::new(FanoutStageSink::new(vec![
            stages.clone(),
            Arc::new(LoggingStageSink),
        ])));

        let extractor: Arc<dyn TextExtractor> = match &config.ingestion.document_root {
            Some(root) => Arc::new(PlainTextExtractor::with_root(root)),
            None => Arc::new(PlainTextExtractor::new()),
        };

        let dimensions = config.vector_store.dimensions as usize;
        let analysis = &config.analysis;
        let (classifier, evaluators, embedder): (
            Arc<dyn SentimentClassifier>,
            Vec<Arc<dyn MetricEvaluator>>,
            Arc<dyn Embedder>,
        ) = match analysis.backend {
            AnalysisBackend::Http => {
                let client = AnalysisClient::new(&analysis.base_url, analysis.timeout_secs)?;
                let evaluators = analysis
                    .metrics
                    .iter()
                    .map(|metric| Arc::new(client.evaluator(metric)) as Arc<dyn MetricEvaluator>)
                    .collect();
                let embedder = HttpEmbedder::new(
                    &analysis.embedding_url,
                    &analysis.embedding_model,
                    analysis.embedding_api_key(),
                    dimensions,
                    analysis.timeout_secs,
                )?;
                (Arc::new(client), evaluators, Arc::new(embedder))
            }
            AnalysisBackend::Local => {
                warn!("Local analysis backend: lexicon sentiment, hashing embeddings, no evaluators");
                (
                    Arc::new(LexiconSentimentClassifier),
                    Vec::new(),
                    Arc::new(HashingEmbedder::new(dimensions)),
                )
            }
        };

        let diagnostics = DiagnosticsQueue::with_batch_size(
            config.diagnostics.capacity,
            config.diagnostics.batch_size,
            Arc::new(JsonlDiagnosticsStore::new(&config.diagnostics.path)),
        );

        let correlation = CorrelationCache::from_config(&config.correlation);

        Ok(Self {
            factory,
            publisher: Arc::new(publisher),
            vectors,
            documents: Arc::new(InMemoryDocumentStore::new()),
            conversations: Arc::new(InMemoryConversationStore::new()),
            correlation,
            diagnostics,
            stages,
            tracker,
            extractor,
            embedder,
            classifier,
            evaluators,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn publisher(&self) -> Arc<Publisher> {
        self.publisher.clone()
    }

    pub fn vectors(&self) -> Arc<dyn VectorStore> {
        self.vectors.clone()
    }

    pub fn documents(&self) -> Arc<InMemoryDocumentStore> {
        self.documents.clone()
    }

    pub fn conversations(&self) -> Arc<InMemoryConversationStore> {
        self.conversations.clone()
    }

    pub fn correlation(&self) -> &CorrelationCache {
        &self.correlation
    }

    /// Hand-off point for retrieval diagnostics from search callers
    pub fn diagnostics(&self) -> &DiagnosticsQueue {
        &self.diagnostics
    }

    /// Live stage events
    pub fn subscribe_stages(&self) -> broadcast::Receiver<StageEvent> {
        self.stages.subscribe()
    }

    /// Registry with every pipeline handler registered
    pub fn registry(&self) -> MessagingResult<ConsumerRegistry> {
        let mut registry = ConsumerRegistry::new(
            self.factory.clone(),
            RetryPolicy::from(&self.config.messaging.retry),
            self.config.messaging.prefetch,
        );

        let cracking = Arc::new(CrackingHandler::new(
            self.extractor.clone(),
            self.documents.clone(),
            self.publisher.clone(),
            self.tracker.clone(),
        ));
        let chunking = Arc::new(ChunkingHandler::new(
            self.extractor.clone(),
            Arc::new(WindowChunker::new(
                self.config.ingestion.chunk_size,
                self.config.ingestion.chunk_overlap,
            )),
            self.embedder.clone(),
            self.documents.clone(),
            self.vectors.clone(),
            self.tracker.clone(),
            IndexTarget {
                collection: self.config.vector_store.document_collection.clone(),
                params: self.config.vector_store.params(),
                embed_batch_size: self.config.ingestion.embed_batch_size,
            },
        ));

        registry
            .register::<DocumentUploaded>(cracking.clone())?
            .register::<DocumentRecrackRequested>(cracking)?
            .register::<DocumentReadyForChunking>(chunking)?;

        let drafts = Arc::new(DraftSentimentHandler::new(
            self.classifier.clone(),
            self.correlation.clone(),
            self.tracker.clone(),
        ));
        let conversations = Arc::new(ConversationHandler::new(
            self.classifier.clone(),
            self.correlation.clone(),
            self.conversations.clone(),
            self.conversations.clone(),
            self.evaluators.clone(),
            self.tracker.clone(),
        ));

        // One worker per role so each role drains independently
        for role in MessageRole::iter() {
            registry
                .register_role::<ChatMessageDrafted>(role, drafts.clone())?
                .register_role::<ConversationMessageCreated>(role, conversations.clone())?;
        }

        Ok(registry)
    }

    /// Spawn workers, the diagnostics drain and the status server
    pub async fn start(&self, shutdown: &CancellationToken) -> Result<RunningHost> {
        let cancel = shutdown.child_token();
        let registry = self.registry()?;
        let queues = registry.queues();
        let workers = registry.spawn_all(&cancel);
        let drain = self.diagnostics.spawn_drain(cancel.clone());

        let status = if self.config.status.enabled {
            let state = StatusState::new(
                self.publisher.broker().clone(),
                queues,
                self.stages.clone(),
                self.diagnostics.clone(),
            )
            .with_workers(workers.states());
            let addr = format!("{}:{}", self.config.status.host, self.config.status.port);

            match spawn_status_server(&addr, state, cancel.clone()).await {
                Ok(handle) => Some(handle),
                Err(e) => {
                    error!(addr = %addr, error = %e, "Failed to start status server");
                    workers.shutdown().await;
                    cancel.cancel();
                    let _ = drain.await;
                    return Err(e);
                }
            }
        } else {
            info!("⚠️  Status server disabled in configuration");
            None
        };

        Ok(RunningHost {
            workers,
            drain,
            status,
            cancel,
            publisher: self.publisher.clone(),
        })
    }
}

/// Host with its background tasks running
pub struct RunningHost {
    workers: WorkerSet,
    drain: JoinHandle<()>,
    status: Option<JoinHandle<()>>,
    cancel: CancellationToken,
    publisher: Arc<Publisher>,
}

impl RunningHost {
    pub fn worker_states(&self) -> WorkerStates {
        self.workers.states()
    }

    /// Run until shutdown is requested or a worker exits on its own, then
    /// stop everything. A worker exit is returned as an error.
    pub async fn wait(mut self) -> Result<()> {
        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Ok(()),
            exit = self.workers.next_exit() => match exit {
                Some((queue, Err(e))) => {
                    error!(queue = %queue, error = %e, "Consumer worker faulted");
                    Err(AppError::from(e))
                }
                Some((_, Ok(()))) if self.cancel.is_cancelled() => Ok(()),
                Some((queue, Ok(()))) => Err(AppError::Messaging(format!(
                    "consumer for {} exited unexpectedly",
                    queue
                ))),
                None => Ok(()),
            },
        };

        self.shutdown().await;
        outcome
    }

    /// Stop workers first, then the drain (which flushes) and the status server
    pub async fn shutdown(self) {
        info!("Shutting down pipeline host");
        self.workers.shutdown().await;
        self.cancel.cancel();

        if let Err(e) = self.drain.await {
            warn!(error = %e, "Diagnostics drain task failed");
        }
        if let Some(status) = self.status {
            if let Err(e) = status.await {
                warn!(error = %e, "Status server task failed");
            }
        }
        if let Err(e) = self.publisher.close().await {
            warn!(error = %e, "Failed to close publishing connection");
        }
        info!("Pipeline host stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::MessagingBackend;
    use crate::vector::VectorBackend;

    fn local_config() -> Config {
        let mut config = Config::default();
        config.messaging.backend = MessagingBackend::InMemory;
        config.vector_store.backend = VectorBackend::InMemory;
        config.vector_store.dimensions = 8;
        config.analysis.backend = AnalysisBackend::Local;
        config.status.enabled = false;
        config
    }

    #[tokio::test]
    async fn test_registry_matches_standard_queues() {
        let host = PipelineHost::build(local_config()).await.unwrap();
        let registered: Vec<String> = host
            .registry()
            .unwrap()
            .queues()
            .into_iter()
            .map(|q| q.queue)
            .collect();
        let expected: Vec<String> = standard_queues().into_iter().map(|q| q.queue).collect();

        assert_eq!(registered, expected);
        assert_eq!(registered.len(), 11);
        assert!(registered.contains(&"ConversationMessageCreated.assistant".to_string()));
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let host = PipelineHost::build(local_config()).await.unwrap();
        let shutdown = CancellationToken::new();
        let running = host.start(&shutdown).await.unwrap();

        shutdown.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(5), running.wait())
            .await
            .unwrap()
            .unwrap();
    }
}
