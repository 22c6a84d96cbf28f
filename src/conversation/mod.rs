//! Conversation post-processing pipeline
//!
//! `ChatMessageDrafted` -> early sentiment parked in the correlation cache.
//! `ConversationMessageCreated` -> SentimentClassification, then for
//! assistant replies ToolCallTracking and MetricEvaluation.

pub mod analysis;
pub mod collaborators;
pub mod config;
pub mod handlers;
pub mod store;

pub use analysis::{AnalysisClient, AnalysisEvaluator, LexiconSentimentClassifier};
pub use collaborators::{ConversationStore, MetricEvaluator, SentimentClassifier, ToolCallTracker};
pub use config::{AnalysisBackend, AnalysisConfig};
pub use handlers::{ConversationHandler, DraftSentimentHandler};
pub use store::InMemoryConversationStore;
