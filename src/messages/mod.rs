//! Message types carried on the bus
//!
//! Bodies are JSON with camelCase field names. The type name is the exchange.

mod conversation;
mod document;

pub use conversation::{ChatMessageDrafted, ConversationMessageCreated, ToolCallRecord};
pub use document::{DocumentReadyForChunking, DocumentRecrackRequested, DocumentUploaded};
