//! Prometheus exposition of pipeline and messaging metrics

mod common;

use common::*;
use gamemaster_pipeline::messages::DocumentUploaded;
use gamemaster_pipeline::messaging::{InMemoryBroker, Publisher, QueueSpec};
use gamemaster_pipeline::pipeline::{
    LoggingStageSink, PipelineStage, StageContext, StageTracker,
};
use prometheus::{Encoder, TextEncoder};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn exposition() -> String {
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&prometheus::gather(), &mut buffer)
        .unwrap();
    String::from_utf8(buffer).unwrap()
}

#[test]
fn test_init_registers_families_once() {
    gamemaster_pipeline::init_metrics();
    gamemaster_pipeline::init_metrics();
}

#[tokio::test]
async fn test_publish_is_counted_per_message_type() {
    gamemaster_pipeline::init_metrics();

    let broker = InMemoryBroker::new();
    let spec = QueueSpec::for_message::<DocumentUploaded>();
    declare(&broker, &spec).await;

    Publisher::new(Arc::new(broker))
        .publish(
            &DocumentUploaded::new("doc-m", "rs-1", "/docs/m.txt"),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let text = exposition();
    assert!(text.contains("gm_messaging_messages_published_total"));
    assert!(text.contains("message_type=\"DocumentUploaded\""));
}

#[tokio::test]
async fn test_stage_transitions_are_exported() {
    gamemaster_pipeline::init_metrics();

    let tracker = StageTracker::new(Arc::new(LoggingStageSink));
    let context = StageContext::document("doc-metrics");
    tracker
        .run_stage(&context, PipelineStage::Cracking, None, async { Ok(()) })
        .await
        .unwrap();

    let text = exposition();
    assert!(text.contains("gm_pipeline_stage_transitions_total"));
    assert!(text.contains("stage=\"Cracking\""));
    assert!(text.contains("gm_pipeline_stage_duration_seconds"));
}
