//! Conversation post-processing stage handlers

use crate::conversation::collaborators::{
    ConversationStore, MetricEvaluator, SentimentClassifier, ToolCallTracker,
};
use crate::correlation::CorrelationCache;
use crate::messages::{ChatMessageDrafted, ConversationMessageCreated};
use crate::messaging::{Delivery, MessageHandler, MessageRole};
use crate::pipeline::{
    PipelineError, PipelineResult, PipelineStage, PipelineType, StageContext, StageTracker,
};
use async_trait::async_trait;
use futures::future::try_join_all;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Classifies draft text early and parks the result under its correlation token
pub struct DraftSentimentHandler {
    classifier: Arc<dyn SentimentClassifier>,
    cache: CorrelationCache,
    tracker: StageTracker,
}

impl DraftSentimentHandler {
    pub fn new(
        classifier: Arc<dyn SentimentClassifier>,
        cache: CorrelationCache,
        tracker: StageTracker,
    ) -> Self {
        Self {
            classifier,
            cache,
            tracker,
        }
    }
}

#[async_trait]
impl MessageHandler<ChatMessageDrafted> for DraftSentimentHandler {
    async fn handle(
        &self,
        delivery: &Delivery<ChatMessageDrafted>,
        _cancel: &CancellationToken,
    ) -> PipelineResult<()> {
        let draft = &delivery.message;
        // The row does not exist yet; the token stands in for its id
        let context = StageContext {
            message_id: draft.correlation_token.clone(),
            game_id: Some(draft.game_id.clone()),
            pipeline: PipelineType::Conversation,
        };

        self.tracker
            .run_stage(
                &context,
                PipelineStage::SentimentClassification,
                Some(&draft.content),
                async {
                    let result = self.classifier.classify(&draft.content).await?;
                    self.cache
                        .store(&draft.correlation_token, result.sentiment, result.confidence)
                        .await;
                    Ok(())
                },
            )
            .await
    }
}

/// Runs sentiment, tool-call tracking and metric evaluation for a persisted message
pub struct ConversationHandler {
    classifier: Arc<dyn SentimentClassifier>,
    cache: CorrelationCache,
    store: Arc<dyn ConversationStore>,
    tool_calls: Arc<dyn ToolCallTracker>,
    evaluators: Vec<Arc<dyn MetricEvaluator>>,
    tracker: StageTracker,
}

impl ConversationHandler {
    pub fn new(
        classifier: Arc<dyn SentimentClassifier>,
        cache: CorrelationCache,
        store: Arc<dyn ConversationStore>,
        tool_calls: Arc<dyn ToolCallTracker>,
        evaluators: Vec<Arc<dyn MetricEvaluator>>,
        tracker: StageTracker,
    ) -> Self {
        Self {
            classifier,
            cache,
            store,
            tool_calls,
            evaluators,
            tracker,
        }
    }

    async fn classify(&self, message: &ConversationMessageCreated) -> PipelineResult<()> {
        let cached = match &message.correlation_token {
            Some(token) => self.cache.take(token).await,
            None => None,
        };

        let result = match cached {
            Some(result) => {
                debug!(message_id = %message.message_id, "Using correlated sentiment");
                result
            }
            None => self.classifier.classify(&message.content).await?,
        };

        self.store.set_sentiment(&message.message_id, result).await
    }

    async fn evaluate(&self, message: &ConversationMessageCreated) -> PipelineResult<()> {
        let scores = try_join_all(self.evaluators.iter().map(|evaluator| async move {
            let score = evaluator.evaluate(message).await?;
            PipelineResult::Ok((evaluator.metric().to_string(), score))
        }))
        .await?;

        for (metric, score) in scores {
            self.store
                .record_metric(&message.message_id, &metric, score)
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl MessageHandler<ConversationMessageCreated> for ConversationHandler {
    async fn handle(
        &self,
        delivery: &Delivery<ConversationMessageCreated>,
        cancel: &CancellationToken,
    ) -> PipelineResult<()> {
        let message = &delivery.message;
        let context = StageContext::conversation(&message.message_id, &message.game_id);

        self.tracker
            .run_stage(
                &context,
                PipelineStage::SentimentClassification,
                Some(&message.content),
                self.classify(message),
            )
            .await?;

        if message.role != MessageRole::Assistant {
            return Ok(());
        }
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let preview = format!("{} tool calls", message.tool_calls.len());
        self.tracker
            .run_stage(
                &context,
                PipelineStage::ToolCallTracking,
                Some(&preview),
                self.tool_calls
                    .track(&message.message_id, &message.game_id, &message.tool_calls),
            )
            .await?;

        self.tracker
            .run_stage(
                &context,
                PipelineStage::MetricEvaluation,
                None,
                self.evaluate(message),
            )
            .await
    }
}
