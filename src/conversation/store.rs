use crate::conversation::collaborators::{ConversationStore, ToolCallTracker};
use crate::correlation::SentimentResult;
use crate::messages::ToolCallRecord;
use crate::pipeline::PipelineResult;
use async_trait::async_trait;
use dashmap::DashMap;

/// Conversation analysis results held in memory
#[derive(Default)]
pub struct InMemoryConversationStore {
    sentiments: DashMap<String, SentimentResult>,
    tool_calls: DashMap<String, Vec<ToolCallRecord>>,
    metrics: DashMap<String, Vec<(String, f64)>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sentiment(&self, message_id: &str) -> Option<SentimentResult> {
        self.sentiments.get(message_id).map(|s| *s)
    }

    pub fn tool_calls(&self, message_id: &str) -> Vec<ToolCallRecord> {
        self.tool_calls
            .get(message_id)
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    pub fn metrics(&self, message_id: &str) -> Vec<(String, f64)> {
        self.metrics
            .get(message_id)
            .map(|m| m.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn set_sentiment(
        &self,
        message_id: &str,
        sentiment: SentimentResult,
    ) -> PipelineResult<()> {
        self.sentiments.insert(message_id.to_string(), sentiment);
        Ok(())
    }

    async fn record_metric(&self, message_id: &str, metric: &str, score: f64) -> PipelineResult<()> {
        let mut metrics = self.metrics.entry(message_id.to_string()).or_default();
        // Re-evaluation replaces the previous score
        metrics.retain(|(name, _)| name != metric);
        metrics.push((metric.to_string(), score));
        Ok(())
    }
}

#[async_trait]
impl ToolCallTracker for InMemoryConversationStore {
    async fn track(
        &self,
        message_id: &str,
        _game_id: &str,
        calls: &[ToolCallRecord],
    ) -> PipelineResult<()> {
        self.tool_calls
            .insert(message_id.to_string(), calls.to_vec());
        Ok(())
    }
}
