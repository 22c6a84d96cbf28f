use crate::vector::error::VectorStoreResult;
use crate::vector::types::{CollectionStatus, VectorParams, VectorPoint};
use async_trait::async_trait;

/// Vector similarity store
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the collection unless it already exists with the same parameters
    async fn ensure_collection(
        &self,
        name: &str,
        params: VectorParams,
    ) -> VectorStoreResult<CollectionStatus>;

    /// Upsert a batch; any failure fails the whole batch
    async fn upsert(&self, name: &str, points: Vec<VectorPoint>) -> VectorStoreResult<()>;

    /// Backend name for logs
    fn backend_name(&self) -> &'static str;
}
