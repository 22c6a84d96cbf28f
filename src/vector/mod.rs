//! Vector store gateway
//!
//! Two operations only: idempotent collection creation and batch upsert.
//! Search ranking lives outside this crate.

pub mod config;
pub mod error;
pub mod memory;
pub mod qdrant;
pub mod traits;
pub mod types;

pub use config::{VectorBackend, VectorStoreConfig};
pub use error::{VectorStoreError, VectorStoreResult};
pub use memory::InMemoryVectorStore;
pub use qdrant::QdrantGateway;
pub use traits::VectorStore;
pub use types::{CollectionStatus, Distance, VectorParams, VectorPoint};

use std::sync::Arc;

/// Vector store for the configured backend
pub fn build_vector_store(config: &VectorStoreConfig) -> VectorStoreResult<Arc<dyn VectorStore>> {
    match config.backend {
        VectorBackend::Qdrant => Ok(Arc::new(QdrantGateway::new(
            config.url.clone(),
            config.api_key(),
            config.timeout_secs,
        )?)),
        VectorBackend::InMemory => Ok(Arc::new(InMemoryVectorStore::new())),
    }
}
