//! In-process vector store

use crate::vector::error::{VectorStoreError, VectorStoreResult};
use crate::vector::traits::VectorStore;
use crate::vector::types::{CollectionStatus, VectorParams, VectorPoint};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use uuid::Uuid;

struct Collection {
    params: VectorParams,
    points: HashMap<Uuid, VectorPoint>,
}

/// Vector store held in memory; used by tests and single-node development
#[derive(Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, Collection>>,
    upsert_calls: AtomicUsize,
    unavailable: AtomicBool,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an unreachable store
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn collection_count(&self) -> usize {
        self.collections.read().len()
    }

    /// Number of upsert calls received
    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    /// Points of a collection, in no particular order
    pub fn points(&self, name: &str) -> Vec<VectorPoint> {
        self.collections
            .read()
            .get(name)
            .map(|c| c.points.values().cloned().collect())
            .unwrap_or_default()
    }

    fn check_available(&self) -> VectorStoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(VectorStoreError::Unavailable(
                "in-memory store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn ensure_collection(
        &self,
        name: &str,
        params: VectorParams,
    ) -> VectorStoreResult<CollectionStatus> {
        self.check_available()?;

        let mut collections = self.collections.write();
        if let Some(existing) = collections.get(name) {
            if existing.params != params {
                return Err(VectorStoreError::IncompatibleCollection {
                    name: name.to_string(),
                    detail: format!("{:?} vs {:?}", existing.params, params),
                });
            }
            return Ok(CollectionStatus::AlreadyExists);
        }

        collections.insert(
            name.to_string(),
            Collection {
                params,
                points: HashMap::new(),
            },
        );
        Ok(CollectionStatus::Created)
    }

    async fn upsert(&self, name: &str, points: Vec<VectorPoint>) -> VectorStoreResult<()> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        let mut collections = self.collections.write();
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| VectorStoreError::CollectionNotFound(name.to_string()))?;

        let expected = collection.params.size as usize;
        if let Some(bad) = points.iter().find(|p| p.vector.len() != expected) {
            return Err(VectorStoreError::Rejected {
                status: 400,
                message: format!(
                    "point {} has {} dimensions, expected {}",
                    bad.id,
                    bad.vector.len(),
                    expected
                ),
            });
        }

        for point in points {
            collection.points.insert(point.id, point);
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "in_memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::types::Distance;

    fn point(dims: usize) -> VectorPoint {
        VectorPoint {
            id: Uuid::new_v4(),
            vector: vec![0.5; dims],
            payload: serde_json::Map::new(),
        }
    }

    #[tokio::test]
    async fn test_ensure_collection_is_idempotent() {
        let store = InMemoryVectorStore::new();
        let params = VectorParams::new(3, Distance::Cosine);

        assert_eq!(
            store.ensure_collection("chunks", params).await.unwrap(),
            CollectionStatus::Created
        );
        assert_eq!(
            store.ensure_collection("chunks", params).await.unwrap(),
            CollectionStatus::AlreadyExists
        );
        assert_eq!(store.collection_count(), 1);
    }

    #[tokio::test]
    async fn test_incompatible_parameters() {
        let store = InMemoryVectorStore::new();
        store
            .ensure_collection("chunks", VectorParams::new(3, Distance::Cosine))
            .await
            .unwrap();

        let err = store
            .ensure_collection("chunks", VectorParams::new(4, Distance::Cosine))
            .await
            .unwrap_err();
        assert!(matches!(err, VectorStoreError::IncompatibleCollection { .. }));
    }

    #[tokio::test]
    async fn test_bad_point_fails_whole_batch() {
        let store = InMemoryVectorStore::new();
        store
            .ensure_collection("chunks", VectorParams::new(3, Distance::Cosine))
            .await
            .unwrap();

        let err = store
            .upsert("chunks", vec![point(3), point(2)])
            .await
            .unwrap_err();
        assert!(matches!(err, VectorStoreError::Rejected { status: 400, .. }));
        assert!(store.points("chunks").is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_store() {
        let store = InMemoryVectorStore::new();
        store.set_unavailable(true);

        let err = store
            .ensure_collection("chunks", VectorParams::new(3, Distance::Cosine))
            .await
            .unwrap_err();
        assert!(err.is_unavailable());
    }
}
