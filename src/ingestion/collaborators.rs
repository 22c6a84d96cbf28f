//! Collaborators the ingestion stages delegate to

use crate::pipeline::PipelineResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A span of document text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextChunk {
    pub document_id: String,
    pub index: usize,
    pub text: String,
    /// Character offsets into the extracted text
    pub char_start: usize,
    pub char_end: usize,
    /// Vector point derived from this chunk, once indexed
    pub point_id: Option<Uuid>,
}

impl TextChunk {
    pub fn chunk_id(&self) -> String {
        format!("{}:{}", self.document_id, self.index)
    }
}

/// Extracts plain text from a stored file
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, file_path: &str) -> PipelineResult<String>;
}

/// Splits extracted text into chunks
pub trait Chunker: Send + Sync {
    fn chunk(&self, document_id: &str, text: &str) -> Vec<TextChunk>;
}

/// Produces one embedding per input text, in order
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> PipelineResult<Vec<Vec<f32>>>;

    fn dimensions(&self) -> usize;
}

/// Persistence for extracted text and chunk records
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn save_text(&self, document_id: &str, text: &str) -> PipelineResult<()>;

    async fn load_text(&self, document_id: &str) -> PipelineResult<Option<String>>;

    /// Replace the chunks of a document
    async fn save_chunks(&self, document_id: &str, chunks: &[TextChunk]) -> PipelineResult<()>;

    /// Record the vector point derived from a chunk
    async fn tag_chunk_point(
        &self,
        document_id: &str,
        chunk_index: usize,
        point_id: Uuid,
    ) -> PipelineResult<()>;
}
