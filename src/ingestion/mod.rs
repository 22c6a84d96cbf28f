//! Document ingestion pipeline
//!
//! `DocumentUploaded` / `DocumentRecrackRequested` -> Cracking ->
//! `DocumentReadyForChunking` -> Chunking (chunk + embed) -> Indexing.

pub mod chunker;
pub mod collaborators;
pub mod config;
pub mod embedder;
pub mod extract;
pub mod handlers;
pub mod store;

pub use chunker::WindowChunker;
pub use collaborators::{Chunker, DocumentStore, Embedder, TextChunk, TextExtractor};
pub use config::IngestionConfig;
pub use embedder::{HashingEmbedder, HttpEmbedder};
pub use extract::PlainTextExtractor;
pub use handlers::{chunk_point_id, ChunkingHandler, CrackingHandler, IndexTarget};
pub use store::InMemoryDocumentStore;
