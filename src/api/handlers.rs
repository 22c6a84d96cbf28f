use crate::api::StatusState;
use crate::diagnostics::DiagnosticsStats;
use crate::error::{AppError, Result};
use crate::pipeline::{self, StageQueueDepth};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    Json,
};
use futures::Stream;
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use std::convert::Infallible;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tokio_stream::StreamExt;

/// Health check endpoint
pub async fn health_check(State(state): State<StatusState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    })
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
}

/// Ready once every consumer worker is consuming
pub async fn readiness(State(state): State<StatusState>) -> impl IntoResponse {
    let ready = state
        .workers
        .as_ref()
        .map(|workers| workers.all_consuming())
        .unwrap_or(false);

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(serde_json::json!({ "ready": ready })))
}

/// Prometheus text exposition of every registered metric
pub async fn metrics() -> Result<impl IntoResponse> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&prometheus::gather(), &mut buffer)
        .map_err(|e| AppError::Internal(format!("Failed to encode metrics: {}", e)))?;

    let body = String::from_utf8(buffer)
        .map_err(|e| AppError::Internal(format!("Failed to convert metrics: {}", e)))?;

    Ok(([(header::CONTENT_TYPE, encoder.format_type().to_string())], body))
}

/// Depth of every pipeline queue
pub async fn queue_depths(State(state): State<StatusState>) -> Json<Vec<StageQueueDepth>> {
    Json(pipeline::queue_depths(state.broker.as_ref(), &state.queues).await)
}

#[derive(Debug, Serialize)]
pub struct WorkerStateResponse {
    pub queue: String,
    pub state: String,
}

pub async fn worker_states(State(state): State<StatusState>) -> Json<Vec<WorkerStateResponse>> {
    let states = state
        .workers
        .map(|workers| workers.snapshot())
        .unwrap_or_default()
        .into_iter()
        .map(|(queue, worker_state)| WorkerStateResponse {
            queue,
            state: worker_state.to_string(),
        })
        .collect();
    Json(states)
}

pub async fn diagnostics_stats(State(state): State<StatusState>) -> Json<DiagnosticsStats> {
    Json(state.diagnostics.stats())
}

/// Live stage events as server-sent events.
///
/// A subscriber that falls behind receives a `lagged` event with the number
/// of events it missed and continues from the newest.
pub async fn stage_events(
    State(state): State<StatusState>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(state.stages.subscribe()).filter_map(|item| match item {
        Ok(event) => Event::default().event("stage").json_data(&event).ok().map(Ok),
        Err(BroadcastStreamRecvError::Lagged(missed)) => {
            Some(Ok(Event::default().event("lagged").data(missed.to_string())))
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
