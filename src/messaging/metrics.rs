//! Prometheus metrics for messaging

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_gauge_vec, CounterVec,
    HistogramVec, IntGaugeVec,
};

/// Messaging metrics
pub struct MessagingMetrics {
    /// Messages published counter
    pub messages_published: CounterVec,

    /// Message publish failures
    pub publish_failures: CounterVec,

    /// Message publish latency
    pub publish_latency: HistogramVec,

    /// Deliveries received by consumers
    pub deliveries_received: CounterVec,

    /// Deliveries resolved, by outcome
    pub deliveries_resolved: CounterVec,

    /// Handler retries after a failed attempt
    pub handler_retries: CounterVec,

    /// Consumer runtime state (0 stopped .. 4 faulted)
    pub consumer_state: IntGaugeVec,
}

lazy_static! {
    pub static ref MESSAGING_METRICS: MessagingMetrics = MessagingMetrics {
        messages_published: register_counter_vec!(
            "gm_messaging_messages_published_total",
            "Total number of messages published",
            &["message_type", "backend"]
        )
        .unwrap(),

        publish_failures: register_counter_vec!(
            "gm_messaging_publish_failures_total",
            "Total number of publish failures",
            &["message_type", "backend"]
        )
        .unwrap(),

        publish_latency: register_histogram_vec!(
            "gm_messaging_publish_latency_seconds",
            "Message publish latency in seconds",
            &["message_type", "backend"]
        )
        .unwrap(),

        deliveries_received: register_counter_vec!(
            "gm_messaging_deliveries_received_total",
            "Total number of deliveries received by consumers",
            &["queue"]
        )
        .unwrap(),

        deliveries_resolved: register_counter_vec!(
            "gm_messaging_deliveries_resolved_total",
            "Deliveries resolved by outcome (acked, dead_lettered, poisoned, abandoned)",
            &["queue", "outcome"]
        )
        .unwrap(),

        handler_retries: register_counter_vec!(
            "gm_messaging_handler_retries_total",
            "Handler attempts that failed and were retried locally",
            &["queue"]
        )
        .unwrap(),

        consumer_state: register_int_gauge_vec!(
            "gm_messaging_consumer_state",
            "Consumer runtime state per queue",
            &["queue"]
        )
        .unwrap(),
    };
}

/// Initialize messaging metrics
pub fn init_messaging_metrics() {
    lazy_static::initialize(&MESSAGING_METRICS);
}
