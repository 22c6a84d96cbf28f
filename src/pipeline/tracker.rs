//! Stage tracker: start/complete/fail notifications with scoped cleanup

use crate::messaging::{Broker, QueueSpec};
use crate::pipeline::error::PipelineResult;
use crate::pipeline::metrics::PIPELINE_METRICS;
use crate::pipeline::sink::StageSink;
use crate::pipeline::stage::{
    stage_for_message_type, PipelineStage, PipelineType, StageContext, StageEvent, StageStatus,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

/// Forwards stage transitions to a sink
#[derive(Clone)]
pub struct StageTracker {
    sink: Arc<dyn StageSink>,
}

impl StageTracker {
    pub fn new(sink: Arc<dyn StageSink>) -> Self {
        Self { sink }
    }

    fn emit(&self, event: StageEvent) {
        PIPELINE_METRICS
            .stage_transitions
            .with_label_values(&[
                &event.pipeline.to_string(),
                &event.stage.to_string(),
                &event.status.to_string(),
            ])
            .inc();
        self.sink.notify(event);
    }

    pub fn notify_stage_started(
        &self,
        context: &StageContext,
        stage: PipelineStage,
        preview: Option<&str>,
    ) {
        self.emit(StageEvent::new(context, stage, StageStatus::Started).with_preview(preview));
    }

    pub fn notify_stage_completed(
        &self,
        context: &StageContext,
        stage: PipelineStage,
        preview: Option<&str>,
    ) {
        self.emit(StageEvent::new(context, stage, StageStatus::Completed).with_preview(preview));
    }

    pub fn notify_stage_failed(&self, context: &StageContext, stage: PipelineStage, error: &str) {
        self.emit(StageEvent::new(context, stage, StageStatus::Failed).with_error(error));
    }

    /// Emit Started and return a guard that emits exactly one of
    /// Completed/Failed. Dropping the guard unresolved emits Failed.
    pub fn begin(
        &self,
        context: &StageContext,
        stage: PipelineStage,
        preview: Option<&str>,
    ) -> StageGuard {
        self.notify_stage_started(context, stage, preview);
        StageGuard {
            tracker: self.clone(),
            context: context.clone(),
            stage,
            started: Instant::now(),
            resolved: false,
        }
    }

    /// Run `work` as one stage, reporting its outcome
    pub async fn run_stage<T, F>(
        &self,
        context: &StageContext,
        stage: PipelineStage,
        preview: Option<&str>,
        work: F,
    ) -> PipelineResult<T>
    where
        F: Future<Output = PipelineResult<T>>,
    {
        let guard = self.begin(context, stage, preview);
        match work.await {
            Ok(value) => {
                guard.complete(None);
                Ok(value)
            }
            Err(e) => {
                guard.fail(&e.to_string());
                Err(e)
            }
        }
    }
}

/// Scoped stage; resolves to Failed if dropped before completion
pub struct StageGuard {
    tracker: StageTracker,
    context: StageContext,
    stage: PipelineStage,
    started: Instant,
    resolved: bool,
}

impl StageGuard {
    pub fn complete(mut self, preview: Option<&str>) {
        self.resolved = true;
        self.observe(StageStatus::Completed);
        self.tracker
            .notify_stage_completed(&self.context, self.stage, preview);
    }

    pub fn fail(mut self, error: &str) {
        self.resolved = true;
        self.observe(StageStatus::Failed);
        self.tracker
            .notify_stage_failed(&self.context, self.stage, error);
    }

    fn observe(&self, status: StageStatus) {
        PIPELINE_METRICS
            .stage_duration
            .with_label_values(&[&self.stage.to_string(), &status.to_string()])
            .observe(self.started.elapsed().as_secs_f64());
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        if !self.resolved {
            self.observe(StageStatus::Failed);
            self.tracker
                .notify_stage_failed(&self.context, self.stage, "stage abandoned before completion");
        }
    }
}

/// Depth of one pipeline queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageQueueDepth {
    pub queue: String,
    pub pipeline: Option<PipelineType>,
    pub stage: Option<PipelineStage>,
    pub depth: Option<u64>,
    pub error: Option<String>,
}

/// Query the depth of every queue; per-queue failures are reported inline
pub async fn queue_depths(broker: &dyn Broker, queues: &[QueueSpec]) -> Vec<StageQueueDepth> {
    let mut depths = Vec::with_capacity(queues.len());

    for spec in queues {
        let stage = stage_for_message_type(&spec.exchange);
        let (depth, error) = match broker.queue_depth(spec).await {
            Ok(depth) => {
                PIPELINE_METRICS
                    .queue_depth
                    .with_label_values(&[&spec.queue])
                    .set(depth as i64);
                (Some(depth), None)
            }
            Err(e) => {
                warn!(queue = %spec.queue, error = %e, "Failed to read queue depth");
                (None, Some(e.to_string()))
            }
        };

        depths.push(StageQueueDepth {
            queue: spec.queue.clone(),
            pipeline: stage.map(|(pipeline, _)| pipeline),
            stage: stage.map(|(_, stage)| stage),
            depth,
            error,
        });
    }

    depths
}
