//! Status endpoint for the worker host
//!
//! Serves liveness, Prometheus metrics, queue depths, worker states,
//! diagnostics counters and a server-sent-event feed of stage events.

pub mod handlers;
pub mod routes;

pub use routes::*;

use crate::diagnostics::DiagnosticsQueue;
use crate::error::Result;
use crate::messaging::{Broker, QueueSpec, WorkerStates};
use crate::pipeline::BroadcastStageSink;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Shared status state
#[derive(Clone)]
pub struct StatusState {
    pub broker: Arc<dyn Broker>,
    pub queues: Arc<Vec<QueueSpec>>,
    pub stages: Arc<BroadcastStageSink>,
    pub diagnostics: DiagnosticsQueue,
    pub workers: Option<WorkerStates>,
    pub started_at: Instant,
}

impl StatusState {
    pub fn new(
        broker: Arc<dyn Broker>,
        queues: Vec<QueueSpec>,
        stages: Arc<BroadcastStageSink>,
        diagnostics: DiagnosticsQueue,
    ) -> Self {
        Self {
            broker,
            queues: Arc::new(queues),
            stages,
            diagnostics,
            workers: None,
            started_at: Instant::now(),
        }
    }

    /// Attach the running workers
    pub fn with_workers(mut self, workers: WorkerStates) -> Self {
        self.workers = Some(workers);
        self
    }
}

/// Bind `addr` and serve the status router until `cancel` fires
pub async fn spawn_status_server(
    addr: &str,
    state: StatusState,
    cancel: CancellationToken,
) -> Result<JoinHandle<()>> {
    let listener = TcpListener::bind(addr).await?;
    let app = build_router(state);

    tracing::info!("🚀 Status server listening on http://{}", addr);
    tracing::info!("   Health check: http://{}/health", addr);
    tracing::info!("   Metrics: http://{}/metrics", addr);
    tracing::info!("   Stage events: http://{}/stages", addr);

    Ok(tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(cancel.cancelled_owned())
            .await
        {
            tracing::error!("Status server error: {}", e);
        }
    }))
}
