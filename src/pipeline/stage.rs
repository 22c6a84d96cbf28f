//! Pipeline stage model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter};

/// Maximum preview length carried on a stage event
pub const PREVIEW_MAX_CHARS: usize = 120;

/// Pipeline a stage belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum PipelineType {
    Document,
    Conversation,
}

/// A named step of a pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter)]
pub enum PipelineStage {
    Cracking,
    Chunking,
    Indexing,
    SentimentClassification,
    ToolCallTracking,
    MetricEvaluation,
}

impl PipelineStage {
    /// Pipeline the stage runs in
    pub fn pipeline(&self) -> PipelineType {
        match self {
            PipelineStage::Cracking | PipelineStage::Chunking | PipelineStage::Indexing => {
                PipelineType::Document
            }
            PipelineStage::SentimentClassification
            | PipelineStage::ToolCallTracking
            | PipelineStage::MetricEvaluation => PipelineType::Conversation,
        }
    }
}

/// Stage transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum StageStatus {
    Started,
    Completed,
    Failed,
}

/// Identifies the item moving through a pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageContext {
    /// Id of the message or document being processed
    pub message_id: String,
    pub game_id: Option<String>,
    pub pipeline: PipelineType,
}

impl StageContext {
    pub fn document(document_id: impl Into<String>) -> Self {
        Self {
            message_id: document_id.into(),
            game_id: None,
            pipeline: PipelineType::Document,
        }
    }

    pub fn conversation(message_id: impl Into<String>, game_id: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            game_id: Some(game_id.into()),
            pipeline: PipelineType::Conversation,
        }
    }

    pub fn with_game(mut self, game_id: Option<String>) -> Self {
        self.game_id = game_id;
        self
    }
}

/// Outbound stage-status notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageEvent {
    pub message_id: String,
    pub game_id: Option<String>,
    pub pipeline: PipelineType,
    pub stage: PipelineStage,
    pub status: StageStatus,
    pub preview: Option<String>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl StageEvent {
    pub fn new(context: &StageContext, stage: PipelineStage, status: StageStatus) -> Self {
        Self {
            message_id: context.message_id.clone(),
            game_id: context.game_id.clone(),
            pipeline: context.pipeline,
            stage,
            status,
            preview: None,
            error: None,
            timestamp: Utc::now(),
        }
    }

    /// Attach a preview, truncated on a character boundary
    pub fn with_preview(mut self, preview: Option<&str>) -> Self {
        self.preview = preview.map(truncate_preview);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Truncate text to [`PREVIEW_MAX_CHARS`] characters
pub fn truncate_preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_MAX_CHARS) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

/// Pipeline stage driven by consumers of a message type
pub fn stage_for_message_type(message_type: &str) -> Option<(PipelineType, PipelineStage)> {
    let stage = match message_type {
        "DocumentUploaded" | "DocumentRecrackRequested" => PipelineStage::Cracking,
        "DocumentReadyForChunking" => PipelineStage::Chunking,
        "ChatMessageDrafted" | "ConversationMessageCreated" => {
            PipelineStage::SentimentClassification
        }
        _ => return None,
    };
    Some((stage.pipeline(), stage))
}
