//! Pipeline stage tracking
//!
//! Stage handlers emit `Started` before doing work and exactly one of
//! `Completed`/`Failed` afterwards. Events are write-only telemetry forwarded
//! to a [`StageSink`]; nothing in the pipeline reads them back.

pub mod error;
pub mod metrics;
pub mod sink;
pub mod stage;
pub mod tracker;

pub use error::{PipelineError, PipelineResult};
pub use metrics::{init_pipeline_metrics, PIPELINE_METRICS};
pub use sink::{BroadcastStageSink, FanoutStageSink, LoggingStageSink, RecordingStageSink, StageSink};
pub use stage::{
    stage_for_message_type, truncate_preview, PipelineStage, PipelineType, StageContext,
    StageEvent, StageStatus,
};
pub use tracker::{queue_depths, StageGuard, StageQueueDepth, StageTracker};
