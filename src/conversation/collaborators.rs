//! Collaborators the conversation stages delegate to

use crate::correlation::SentimentResult;
use crate::messages::{ConversationMessageCreated, ToolCallRecord};
use crate::pipeline::PipelineResult;
use async_trait::async_trait;

/// Classifies the sentiment of chat text
#[async_trait]
pub trait SentimentClassifier: Send + Sync {
    async fn classify(&self, text: &str) -> PipelineResult<SentimentResult>;
}

/// Records tool calls the agent made while producing a reply
#[async_trait]
pub trait ToolCallTracker: Send + Sync {
    async fn track(
        &self,
        message_id: &str,
        game_id: &str,
        calls: &[ToolCallRecord],
    ) -> PipelineResult<()>;
}

/// Scores an assistant reply on one metric
#[async_trait]
pub trait MetricEvaluator: Send + Sync {
    fn metric(&self) -> &str;

    async fn evaluate(&self, message: &ConversationMessageCreated) -> PipelineResult<f64>;
}

/// Persistence for per-message analysis results
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn set_sentiment(&self, message_id: &str, sentiment: SentimentResult)
        -> PipelineResult<()>;

    async fn record_metric(&self, message_id: &str, metric: &str, score: f64)
        -> PipelineResult<()>;
}
