//! Document ingestion stage handlers: crack, then chunk + embed, then index

use crate::ingestion::collaborators::{Chunker, DocumentStore, Embedder, TextChunk, TextExtractor};
use crate::messages::{DocumentReadyForChunking, DocumentRecrackRequested, DocumentUploaded};
use crate::messaging::{Delivery, MessageHandler, Publisher};
use crate::pipeline::{
    truncate_preview, PipelineError, PipelineResult, PipelineStage, StageContext, StageTracker,
};
use crate::vector::{VectorParams, VectorPoint, VectorStore};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

/// Stable point id for a chunk so re-indexing overwrites instead of duplicating
pub fn chunk_point_id(document_id: &str, chunk_index: usize) -> Uuid {
    Uuid::new_v5(
        &Uuid::NAMESPACE_OID,
        format!("{}:{}", document_id, chunk_index).as_bytes(),
    )
}

/// Extracts text from uploaded documents and hands them to chunking
pub struct CrackingHandler {
    extractor: Arc<dyn TextExtractor>,
    store: Arc<dyn DocumentStore>,
    publisher: Arc<Publisher>,
    tracker: StageTracker,
}

impl CrackingHandler {
    pub fn new(
        extractor: Arc<dyn TextExtractor>,
        store: Arc<dyn DocumentStore>,
        publisher: Arc<Publisher>,
        tracker: StageTracker,
    ) -> Self {
        Self {
            extractor,
            store,
            publisher,
            tracker,
        }
    }

    async fn crack(
        &self,
        document: &DocumentUploaded,
        cancel: &CancellationToken,
    ) -> PipelineResult<()> {
        let context = StageContext::document(&document.document_id).with_game(document.game_id.clone());

        self.tracker
            .run_stage(
                &context,
                PipelineStage::Cracking,
                Some(&document.file_path),
                async {
                    let text = self.extractor.extract(&document.file_path).await?;
                    if text.trim().is_empty() {
                        return Err(PipelineError::InvalidInput(format!(
                            "no text extracted from {}",
                            document.file_path
                        )));
                    }
                    self.store.save_text(&document.document_id, &text).await?;

                    self.publisher
                        .publish(&DocumentReadyForChunking::from(document), cancel)
                        .await?;

                    info!(
                        document_id = %document.document_id,
                        chars = text.chars().count(),
                        "Document cracked"
                    );
                    Ok(())
                },
            )
            .await
    }
}

#[async_trait]
impl MessageHandler<DocumentUploaded> for CrackingHandler {
    async fn handle(
        &self,
        delivery: &Delivery<DocumentUploaded>,
        cancel: &CancellationToken,
    ) -> PipelineResult<()> {
        self.crack(&delivery.message, cancel).await
    }
}

#[async_trait]
impl MessageHandler<DocumentRecrackRequested> for CrackingHandler {
    async fn handle(
        &self,
        delivery: &Delivery<DocumentRecrackRequested>,
        cancel: &CancellationToken,
    ) -> PipelineResult<()> {
        info!(document_id = %delivery.message.document_id, "Recrack requested");
        self.crack(&DocumentUploaded::from(&delivery.message), cancel)
            .await
    }
}

/// Where and how chunk embeddings are indexed
#[derive(Debug, Clone)]
pub struct IndexTarget {
    pub collection: String,
    pub params: VectorParams,
    /// Texts per embedding request
    pub embed_batch_size: usize,
}

/// Chunks and embeds extracted text, then indexes the embeddings
pub struct ChunkingHandler {
    extractor: Arc<dyn TextExtractor>,
    chunker: Arc<dyn Chunker>,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn DocumentStore>,
    vectors: Arc<dyn VectorStore>,
    tracker: StageTracker,
    target: IndexTarget,
}

impl ChunkingHandler {
    pub fn new(
        extractor: Arc<dyn TextExtractor>,
        chunker: Arc<dyn Chunker>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn DocumentStore>,
        vectors: Arc<dyn VectorStore>,
        tracker: StageTracker,
        target: IndexTarget,
    ) -> Self {
        Self {
            extractor,
            chunker,
            embedder,
            store,
            vectors,
            tracker,
            target,
        }
    }

    async fn chunk_and_embed(
        &self,
        document: &DocumentReadyForChunking,
        cancel: &CancellationToken,
    ) -> PipelineResult<(Vec<TextChunk>, Vec<Vec<f32>>)> {
        // Text saved by the cracking stage; extract again if it is gone
        let text = match self.store.load_text(&document.document_id).await? {
            Some(text) => text,
            None => self.extractor.extract(&document.file_path).await?,
        };

        let chunks = self.chunker.chunk(&document.document_id, &text);
        if chunks.is_empty() {
            return Err(PipelineError::InvalidInput(format!(
                "document {} produced no chunks",
                document.document_id
            )));
        }

        let mut embeddings = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.target.embed_batch_size.max(1)) {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embedder.embed(&texts).await?;
            if vectors.len() != texts.len() {
                return Err(PipelineError::Embedding(format!(
                    "expected {} embeddings, got {}",
                    texts.len(),
                    vectors.len()
                )));
            }
            embeddings.extend(vectors);
        }

        self.store
            .save_chunks(&document.document_id, &chunks)
            .await?;

        debug!(
            document_id = %document.document_id,
            chunks = chunks.len(),
            "Document chunked and embedded"
        );
        Ok((chunks, embeddings))
    }

    async fn index(
        &self,
        document: &DocumentReadyForChunking,
        chunks: &[TextChunk],
        embeddings: Vec<Vec<f32>>,
    ) -> PipelineResult<()> {
        self.vectors
            .ensure_collection(&self.target.collection, self.target.params)
            .await?;

        let points: Vec<VectorPoint> = chunks
            .iter()
            .zip(embeddings)
            .map(|(chunk, vector)| VectorPoint {
                id: chunk_point_id(&chunk.document_id, chunk.index),
                vector,
                payload: chunk_payload(document, chunk),
            })
            .collect();
        let ids: Vec<(usize, Uuid)> = chunks
            .iter()
            .zip(&points)
            .map(|(chunk, point)| (chunk.index, point.id))
            .collect();

        self.vectors.upsert(&self.target.collection, points).await?;

        for (index, point_id) in ids {
            self.store
                .tag_chunk_point(&document.document_id, index, point_id)
                .await?;
        }

        info!(
            document_id = %document.document_id,
            collection = %self.target.collection,
            points = chunks.len(),
            "Document indexed"
        );
        Ok(())
    }
}

fn chunk_payload(document: &DocumentReadyForChunking, chunk: &TextChunk) -> Map<String, Value> {
    let mut payload = Map::new();
    payload.insert("documentId".into(), json!(document.document_id));
    payload.insert("chunkId".into(), json!(chunk.chunk_id()));
    payload.insert("rulesetId".into(), json!(document.ruleset_id));
    payload.insert("chunkIndex".into(), json!(chunk.index));
    payload.insert("textPreview".into(), json!(truncate_preview(&chunk.text)));
    if let Some(game_id) = &document.game_id {
        payload.insert("gameId".into(), json!(game_id));
    }
    payload
}

#[async_trait]
impl MessageHandler<DocumentReadyForChunking> for ChunkingHandler {
    async fn handle(
        &self,
        delivery: &Delivery<DocumentReadyForChunking>,
        cancel: &CancellationToken,
    ) -> PipelineResult<()> {
        let document = &delivery.message;
        let context = StageContext::document(&document.document_id).with_game(document.game_id.clone());

        let (chunks, embeddings) = self
            .tracker
            .run_stage(
                &context,
                PipelineStage::Chunking,
                Some(&document.file_path),
                self.chunk_and_embed(document, cancel),
            )
            .await?;

        let preview = format!("{} chunks", chunks.len());
        self.tracker
            .run_stage(
                &context,
                PipelineStage::Indexing,
                Some(&preview),
                self.index(document, &chunks, embeddings),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_ids_are_stable() {
        assert_eq!(chunk_point_id("doc-1", 0), chunk_point_id("doc-1", 0));
        assert_ne!(chunk_point_id("doc-1", 0), chunk_point_id("doc-1", 1));
        assert_ne!(chunk_point_id("doc-1", 0), chunk_point_id("doc-2", 0));
    }

    #[test]
    fn test_payload_references_document() {
        let document = DocumentReadyForChunking {
            document_id: "doc-1".to_string(),
            ruleset_id: "rs-1".to_string(),
            file_path: "/docs/rules.pdf".to_string(),
            game_id: None,
        };
        let chunk = TextChunk {
            document_id: "doc-1".to_string(),
            index: 3,
            text: "Opportunity attacks".to_string(),
            char_start: 0,
            char_end: 19,
            point_id: None,
        };

        let payload = chunk_payload(&document, &chunk);
        assert_eq!(payload["documentId"], "doc-1");
        assert_eq!(payload["chunkId"], "doc-1:3");
        assert_eq!(payload["rulesetId"], "rs-1");
        assert!(payload.get("gameId").is_none());
    }
}
