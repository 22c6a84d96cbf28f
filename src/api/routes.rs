use crate::api::{handlers, StatusState};
use axum::{routing::get, Router};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};

/// Build the status router
pub fn build_router(state: StatusState) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(handlers::health_check))
        .route("/health/live", get(handlers::health_check))
        .route("/health/ready", get(handlers::readiness))
        // Observability
        .route("/metrics", get(handlers::metrics))
        .route("/queues", get(handlers::queue_depths))
        .route("/workers", get(handlers::worker_states))
        .route("/diagnostics", get(handlers::diagnostics_stats))
        .route("/stages", get(handlers::stage_events))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new())
                .on_response(DefaultOnResponse::new()),
        )
}
