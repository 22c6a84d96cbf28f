//! Stage-status sinks

use crate::pipeline::stage::{StageEvent, StageStatus};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Receives stage transitions; must not block
pub trait StageSink: Send + Sync {
    fn notify(&self, event: StageEvent);
}

/// Broadcasts stage events to live subscribers
pub struct BroadcastStageSink {
    tx: broadcast::Sender<StageEvent>,
}

impl BroadcastStageSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to stage events
    pub fn subscribe(&self) -> broadcast::Receiver<StageEvent> {
        self.tx.subscribe()
    }

    /// Get number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl StageSink for BroadcastStageSink {
    fn notify(&self, event: StageEvent) {
        // No subscribers is not an error; the status feed is best-effort
        if self.tx.send(event).is_err() {
            debug!("No stage status subscribers");
        }
    }
}

/// Writes stage events to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingStageSink;

impl StageSink for LoggingStageSink {
    fn notify(&self, event: StageEvent) {
        match event.status {
            StageStatus::Failed => warn!(
                message_id = %event.message_id,
                game_id = ?event.game_id,
                pipeline = %event.pipeline,
                stage = %event.stage,
                error = ?event.error,
                "Pipeline stage failed"
            ),
            status => info!(
                message_id = %event.message_id,
                game_id = ?event.game_id,
                pipeline = %event.pipeline,
                stage = %event.stage,
                status = %status,
                "Pipeline stage transition"
            ),
        }
    }
}

/// Forwards every event to several sinks
#[derive(Default)]
pub struct FanoutStageSink {
    sinks: Vec<Arc<dyn StageSink>>,
}

impl FanoutStageSink {
    pub fn new(sinks: Vec<Arc<dyn StageSink>>) -> Self {
        Self { sinks }
    }

    pub fn push(&mut self, sink: Arc<dyn StageSink>) {
        self.sinks.push(sink);
    }
}

impl StageSink for FanoutStageSink {
    fn notify(&self, event: StageEvent) {
        for sink in &self.sinks {
            sink.notify(event.clone());
        }
    }
}

/// Keeps every event in memory
#[derive(Default)]
pub struct RecordingStageSink {
    events: Mutex<Vec<StageEvent>>,
}

impl RecordingStageSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<StageEvent> {
        self.events.lock().clone()
    }
}

impl StageSink for RecordingStageSink {
    fn notify(&self, event: StageEvent) {
        self.events.lock().push(event);
    }
}
