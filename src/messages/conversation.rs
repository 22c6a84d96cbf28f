use crate::messaging::{MessageRole, PipelineMessage};
use serde::{Deserialize, Serialize};

/// A tool invocation made by the agent while producing a reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallRecord {
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

/// Raw chat text seen before its row is written; carries the correlation
/// token the persisting stage will use to claim early results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessageDrafted {
    pub correlation_token: String,
    pub game_id: String,
    pub role: MessageRole,
    pub content: String,
}

impl PipelineMessage for ChatMessageDrafted {
    const MESSAGE_TYPE: &'static str = "ChatMessageDrafted";

    fn role(&self) -> Option<MessageRole> {
        Some(self.role)
    }
}

/// A chat message row was persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMessageCreated {
    pub message_id: String,
    pub game_id: String,
    pub role: MessageRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_token: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRecord>,
}

impl PipelineMessage for ConversationMessageCreated {
    const MESSAGE_TYPE: &'static str = "ConversationMessageCreated";

    fn role(&self) -> Option<MessageRole> {
        Some(self.role)
    }
}
