//! Prometheus metrics for pipeline stages and side channels

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_counter_vec,
    register_int_gauge_vec, CounterVec, HistogramVec, IntCounterVec, IntGaugeVec,
};

/// Pipeline metrics
pub struct PipelineMetrics {
    /// Stage transitions by pipeline, stage and status
    pub stage_transitions: CounterVec,

    /// Time from Started to Completed/Failed
    pub stage_duration: HistogramVec,

    /// Last observed depth per queue
    pub queue_depth: IntGaugeVec,

    /// Correlation cache lookups by outcome (hit, miss)
    pub correlation_lookups: IntCounterVec,

    /// Diagnostics queue events (enqueued, dropped, stored, failed)
    pub diagnostics: IntCounterVec,
}

lazy_static! {
    pub static ref PIPELINE_METRICS: PipelineMetrics = PipelineMetrics {
        stage_transitions: register_counter_vec!(
            "gm_pipeline_stage_transitions_total",
            "Pipeline stage transitions",
            &["pipeline", "stage", "status"]
        )
        .unwrap(),

        stage_duration: register_histogram_vec!(
            "gm_pipeline_stage_duration_seconds",
            "Pipeline stage duration in seconds",
            &["stage", "status"],
            vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0]
        )
        .unwrap(),

        queue_depth: register_int_gauge_vec!(
            "gm_pipeline_queue_depth",
            "Messages waiting in a pipeline queue",
            &["queue"]
        )
        .unwrap(),

        correlation_lookups: register_int_counter_vec!(
            "gm_pipeline_correlation_lookups_total",
            "Correlation cache lookups by outcome",
            &["outcome"]
        )
        .unwrap(),

        diagnostics: register_int_counter_vec!(
            "gm_pipeline_diagnostics_total",
            "Retrieval diagnostics queue events",
            &["event"]
        )
        .unwrap(),
    };
}

/// Initialize pipeline metrics
pub fn init_pipeline_metrics() {
    lazy_static::initialize(&PIPELINE_METRICS);
}
