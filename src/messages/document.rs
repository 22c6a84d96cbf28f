use crate::messaging::PipelineMessage;
use serde::{Deserialize, Serialize};

/// A ruleset document was uploaded and needs cracking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentUploaded {
    pub document_id: String,
    pub ruleset_id: String,
    pub file_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_id: Option<String>,
}

impl DocumentUploaded {
    pub fn new(
        document_id: impl Into<String>,
        ruleset_id: impl Into<String>,
        file_path: impl Into<String>,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            ruleset_id: ruleset_id.into(),
            file_path: file_path.into(),
            game_id: None,
        }
    }
}

impl PipelineMessage for DocumentUploaded {
    const MESSAGE_TYPE: &'static str = "DocumentUploaded";
}

/// Operator asked for an already-ingested document to be cracked again
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecrackRequested {
    pub document_id: String,
    pub ruleset_id: String,
    pub file_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_id: Option<String>,
}

impl PipelineMessage for DocumentRecrackRequested {
    const MESSAGE_TYPE: &'static str = "DocumentRecrackRequested";
}

/// Text has been extracted; the document can be chunked and indexed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentReadyForChunking {
    pub document_id: String,
    pub ruleset_id: String,
    pub file_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_id: Option<String>,
}

impl PipelineMessage for DocumentReadyForChunking {
    const MESSAGE_TYPE: &'static str = "DocumentReadyForChunking";
}

impl From<&DocumentUploaded> for DocumentReadyForChunking {
    fn from(m: &DocumentUploaded) -> Self {
        Self {
            document_id: m.document_id.clone(),
            ruleset_id: m.ruleset_id.clone(),
            file_path: m.file_path.clone(),
            game_id: m.game_id.clone(),
        }
    }
}

impl From<&DocumentRecrackRequested> for DocumentUploaded {
    fn from(m: &DocumentRecrackRequested) -> Self {
        Self {
            document_id: m.document_id.clone(),
            ruleset_id: m.ruleset_id.clone(),
            file_path: m.file_path.clone(),
            game_id: m.game_id.clone(),
        }
    }
}
