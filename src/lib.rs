//! Asynchronous event pipeline for the conversational game-master service.
//!
//! Typed messages travel over a topic-exchange bus ([`messaging`]); long-lived
//! consumer workers drive the document ingestion ([`ingestion`]) and
//! conversation post-processing ([`conversation`]) pipelines, reporting every
//! stage transition through [`pipeline`].

pub mod api;
pub mod config;
pub mod conversation;
pub mod correlation;
pub mod diagnostics;
pub mod error;
pub mod host;
pub mod ingestion;
pub mod messages;
pub mod messaging;
pub mod pipeline;
pub mod shutdown;
pub mod vector;

pub use error::{AppError, Result};
pub use host::{standard_queues, PipelineHost, RunningHost};

/// Initialize every Prometheus metric family
pub fn init_metrics() {
    messaging::init_messaging_metrics();
    pipeline::init_pipeline_metrics();
}
