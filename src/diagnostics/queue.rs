use crate::diagnostics::store::{DiagnosticsStore, SearchDiagnostics, SearchResultRecord};
use crate::pipeline::PIPELINE_METRICS;
use chrono::Utc;
use crossbeam::queue::ArrayQueue;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    /// Entries held before the oldest are dropped
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Entries written per store call
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// JSON lines file the drain appends to
    #[serde(default = "default_path")]
    pub path: String,
}

fn default_capacity() -> usize {
    1024
}

fn default_batch_size() -> usize {
    64
}

fn default_path() -> String {
    "data/search-diagnostics.jsonl".to_string()
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            batch_size: default_batch_size(),
            path: default_path(),
        }
    }
}

/// Queue counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticsStats {
    pub enqueued: u64,
    pub dropped: u64,
    pub stored: u64,
    pub failed: u64,
}

#[derive(Default)]
struct Counters {
    enqueued: AtomicU64,
    dropped: AtomicU64,
    stored: AtomicU64,
    failed: AtomicU64,
}

struct Inner {
    queue: ArrayQueue<SearchDiagnostics>,
    notify: Notify,
    counters: Counters,
    store: Arc<dyn DiagnosticsStore>,
    batch_size: usize,
}

/// Bounded drop-oldest hand-off from the search path to a background drain
#[derive(Clone)]
pub struct DiagnosticsQueue {
    inner: Arc<Inner>,
}

impl DiagnosticsQueue {
    pub fn new(capacity: usize, store: Arc<dyn DiagnosticsStore>) -> Self {
        Self::with_batch_size(capacity, default_batch_size(), store)
    }

    pub fn with_batch_size(
        capacity: usize,
        batch_size: usize,
        store: Arc<dyn DiagnosticsStore>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                queue: ArrayQueue::new(capacity.max(1)),
                notify: Notify::new(),
                counters: Counters::default(),
                store,
                batch_size: batch_size.max(1),
            }),
        }
    }

    /// Record a search for later storage. Never blocks and never fails; when
    /// the queue is full the oldest entry is dropped.
    pub fn enqueue_search_results(
        &self,
        query: &str,
        ruleset_id: &str,
        index_name: &str,
        filter_json: Option<&str>,
        results: Vec<SearchResultRecord>,
    ) {
        let entry = SearchDiagnostics {
            id: Uuid::new_v4(),
            query: query.to_string(),
            ruleset_id: ruleset_id.to_string(),
            index_name: index_name.to_string(),
            filter_json: filter_json.map(str::to_string),
            results,
            recorded_at: Utc::now(),
        };

        if let Some(dropped) = self.inner.queue.force_push(entry) {
            self.inner.counters.dropped.fetch_add(1, Ordering::Relaxed);
            PIPELINE_METRICS
                .diagnostics
                .with_label_values(&["dropped"])
                .inc();
            debug!(dropped_id = %dropped.id, "Diagnostics queue full, dropped oldest entry");
        }

        self.inner.counters.enqueued.fetch_add(1, Ordering::Relaxed);
        PIPELINE_METRICS
            .diagnostics
            .with_label_values(&["enqueued"])
            .inc();
        self.inner.notify.notify_one();
    }

    /// Entries waiting for the drain
    pub fn len(&self) -> usize {
        self.inner.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.queue.is_empty()
    }

    pub fn stats(&self) -> DiagnosticsStats {
        let c = &self.inner.counters;
        DiagnosticsStats {
            enqueued: c.enqueued.load(Ordering::Relaxed),
            dropped: c.dropped.load(Ordering::Relaxed),
            stored: c.stored.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
        }
    }

    /// Start the drain loop; it flushes what is left once `cancel` fires
    pub fn spawn_drain(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            info!("Diagnostics drain started");
            loop {
                inner.flush().await;
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = inner.notify.notified() => {}
                }
            }
            inner.flush().await;
            info!("Diagnostics drain stopped");
        })
    }

    /// Write everything currently queued
    pub async fn flush(&self) {
        self.inner.flush().await;
    }
}

impl Inner {
    async fn flush(&self) {
        loop {
            let mut batch = Vec::with_capacity(self.batch_size);
            while batch.len() < self.batch_size {
                match self.queue.pop() {
                    Some(entry) => batch.push(entry),
                    None => break,
                }
            }
            if batch.is_empty() {
                return;
            }

            let count = batch.len() as u64;
            match self.store.store(&batch).await {
                Ok(()) => {
                    self.counters.stored.fetch_add(count, Ordering::Relaxed);
                    PIPELINE_METRICS
                        .diagnostics
                        .with_label_values(&["stored"])
                        .inc_by(count);
                }
                Err(e) => {
                    self.counters.failed.fetch_add(count, Ordering::Relaxed);
                    PIPELINE_METRICS
                        .diagnostics
                        .with_label_values(&["failed"])
                        .inc_by(count);
                    warn!(error = %e, entries = count, "Failed to store search diagnostics");
                }
            }
        }
    }
}
