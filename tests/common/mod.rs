//! Shared helpers for integration tests
//!
//! Scripted message handlers, stub collaborators and a few async polling
//! utilities built around the in-memory broker.

#![allow(dead_code)]

use async_trait::async_trait;
use gamemaster_pipeline::config::Config;
use gamemaster_pipeline::conversation::{AnalysisBackend, SentimentClassifier};
use gamemaster_pipeline::correlation::SentimentResult;
use gamemaster_pipeline::ingestion::TextExtractor;
use gamemaster_pipeline::messaging::{
    Broker, Delivery, InMemoryBroker, MessageHandler, MessagingBackend, PipelineMessage,
    QueueSpec,
};
use gamemaster_pipeline::pipeline::{PipelineError, PipelineResult};
use gamemaster_pipeline::vector::VectorBackend;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Poll `condition` every 10ms until it holds or `timeout` elapses
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Async variant of [`wait_until`]
pub async fn wait_until_async<F, Fut>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition().await
}

/// Declare the exchange and queue so publishes are routed before a worker starts
pub async fn declare(broker: &InMemoryBroker, spec: &QueueSpec) {
    broker.declare_exchange(&spec.exchange).await.unwrap();
    broker.declare_queue(spec).await.unwrap();
}

/// Config with every backend in-process and the status server off
pub fn local_config() -> Config {
    let mut config = Config::default();
    config.messaging.backend = MessagingBackend::InMemory;
    config.messaging.retry.base_delay_ms = 10;
    config.vector_store.backend = VectorBackend::InMemory;
    config.vector_store.dimensions = 16;
    config.analysis.backend = AnalysisBackend::Local;
    config.ingestion.chunk_size = 200;
    config.ingestion.chunk_overlap = 20;
    config.status.enabled = false;
    config
}

/// Handler that fails its first `failures` calls, then succeeds
pub struct ScriptedHandler {
    failures: u32,
    calls: AtomicU32,
    call_times: Mutex<Vec<Instant>>,
}

impl ScriptedHandler {
    pub fn failing(failures: u32) -> Arc<Self> {
        Arc::new(Self {
            failures,
            calls: AtomicU32::new(0),
            call_times: Mutex::new(Vec::new()),
        })
    }

    pub fn always_failing() -> Arc<Self> {
        Self::failing(u32::MAX)
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.call_times.lock().clone()
    }
}

#[async_trait]
impl<M: PipelineMessage> MessageHandler<M> for ScriptedHandler {
    async fn handle(&self, _delivery: &Delivery<M>, _cancel: &CancellationToken) -> PipelineResult<()> {
        self.call_times.lock().push(Instant::now());
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            Err(PipelineError::Store(format!("scripted failure {}", call)))
        } else {
            Ok(())
        }
    }
}

/// Handler that records every message it sees
pub struct RecordingHandler<M> {
    seen: Mutex<Vec<M>>,
}

impl<M> RecordingHandler<M> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            seen: Mutex::new(Vec::new()),
        })
    }
}

impl<M: Clone> RecordingHandler<M> {
    pub fn seen(&self) -> Vec<M> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl<M: PipelineMessage + Clone> MessageHandler<M> for RecordingHandler<M> {
    async fn handle(&self, delivery: &Delivery<M>, _cancel: &CancellationToken) -> PipelineResult<()> {
        self.seen.lock().push(delivery.message.clone());
        Ok(())
    }
}

/// Handler that holds each delivery for `hold` and tracks peak concurrency
pub struct SlowHandler {
    hold: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    completed: AtomicUsize,
}

impl SlowHandler {
    pub fn new(hold: Duration) -> Arc<Self> {
        Arc::new(Self {
            hold,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
        })
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<M: PipelineMessage> MessageHandler<M> for SlowHandler {
    async fn handle(&self, _delivery: &Delivery<M>, _cancel: &CancellationToken) -> PipelineResult<()> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.hold).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Extractor that returns the same text for any path
pub struct FixedTextExtractor {
    text: String,
}

impl FixedTextExtractor {
    pub fn new(text: impl Into<String>) -> Arc<Self> {
        Arc::new(Self { text: text.into() })
    }
}

#[async_trait]
impl TextExtractor for FixedTextExtractor {
    async fn extract(&self, _file_path: &str) -> PipelineResult<String> {
        Ok(self.text.clone())
    }
}

/// Classifier returning a fixed result and counting calls
pub struct CountingClassifier {
    result: SentimentResult,
    calls: AtomicU32,
}

impl CountingClassifier {
    pub fn new(sentiment: i8, confidence: f32) -> Arc<Self> {
        Arc::new(Self {
            result: SentimentResult {
                sentiment,
                confidence,
            },
            calls: AtomicU32::new(0),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SentimentClassifier for CountingClassifier {
    async fn classify(&self, _text: &str) -> PipelineResult<SentimentResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.result)
    }
}

/// Rules text long enough to produce several chunks
pub fn sample_rules_text() -> String {
    [
        "Opportunity attacks. You can make an opportunity attack when a hostile creature that you can see moves out of your reach.",
        "Cover. Walls, trees, creatures, and other obstacles can provide cover during combat, making a target more difficult to harm.",
        "Grappling. When you want to grab a creature or wrestle with it, you can use the Attack action to make a special melee attack.",
        "Resting. Adventurers can take short rests in the midst of an adventure day and a long rest to end the day.",
    ]
    .join("\n\n")
}
