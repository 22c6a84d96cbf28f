use crate::ingestion::collaborators::{DocumentStore, TextChunk};
use crate::pipeline::{PipelineError, PipelineResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Default)]
struct StoredDocument {
    text: Option<String>,
    chunks: Vec<TextChunk>,
}

/// Document store held in memory
#[derive(Default)]
pub struct InMemoryDocumentStore {
    documents: RwLock<HashMap<String, StoredDocument>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chunks(&self, document_id: &str) -> Vec<TextChunk> {
        self.documents
            .read()
            .get(document_id)
            .map(|d| d.chunks.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn save_text(&self, document_id: &str, text: &str) -> PipelineResult<()> {
        self.documents
            .write()
            .entry(document_id.to_string())
            .or_default()
            .text = Some(text.to_string());
        Ok(())
    }

    async fn load_text(&self, document_id: &str) -> PipelineResult<Option<String>> {
        Ok(self
            .documents
            .read()
            .get(document_id)
            .and_then(|d| d.text.clone()))
    }

    async fn save_chunks(&self, document_id: &str, chunks: &[TextChunk]) -> PipelineResult<()> {
        self.documents
            .write()
            .entry(document_id.to_string())
            .or_default()
            .chunks = chunks.to_vec();
        Ok(())
    }

    async fn tag_chunk_point(
        &self,
        document_id: &str,
        chunk_index: usize,
        point_id: Uuid,
    ) -> PipelineResult<()> {
        let mut documents = self.documents.write();
        let chunk = documents
            .get_mut(document_id)
            .and_then(|d| d.chunks.iter_mut().find(|c| c.index == chunk_index))
            .ok_or_else(|| {
                PipelineError::NotFound(format!("chunk {}:{}", document_id, chunk_index))
            })?;
        chunk.point_id = Some(point_id);
        Ok(())
    }
}
