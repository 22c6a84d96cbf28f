//! Qdrant REST gateway

use crate::vector::error::{VectorStoreError, VectorStoreResult};
use crate::vector::traits::VectorStore;
use crate::vector::types::{CollectionStatus, Distance, VectorParams, VectorPoint};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct QdrantResponse<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct CollectionInfo {
    config: CollectionConfig,
}

#[derive(Debug, Deserialize)]
struct CollectionConfig {
    params: CollectionParams,
}

#[derive(Debug, Deserialize)]
struct CollectionParams {
    vectors: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct CreateCollection {
    vectors: VectorParams,
}

#[derive(Debug, Serialize)]
struct UpsertPoints<'a> {
    points: &'a [VectorPoint],
}

/// Qdrant gateway over the REST API
#[derive(Clone)]
pub struct QdrantGateway {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    timeout_secs: u64,
}

impl QdrantGateway {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout_secs: u64,
    ) -> VectorStoreResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| VectorStoreError::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            timeout_secs,
        })
    }

    fn request(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header("api-key", key),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> VectorStoreResult<Response> {
        self.request(builder).send().await.map_err(|e| {
            if e.is_timeout() {
                VectorStoreError::Unavailable(format!(
                    "Qdrant request timed out after {} seconds",
                    self.timeout_secs
                ))
            } else if e.is_connect() {
                VectorStoreError::Unavailable(format!("Failed to connect to Qdrant: {}", e))
            } else {
                VectorStoreError::Other(format!("Qdrant request failed: {}", e))
            }
        })
    }

    async fn collection_params(&self, name: &str) -> VectorStoreResult<Option<VectorParams>> {
        let url = format!("{}/collections/{}", self.base_url, name);
        let response = self.send(self.client.get(&url)).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = check_status(response).await?;

        let info: QdrantResponse<CollectionInfo> = response
            .json()
            .await
            .map_err(|e| VectorStoreError::Other(format!("Invalid collection info: {}", e)))?;

        parse_vector_params(name, &info.result.config.params.vectors).map(Some)
    }
}

/// Single unnamed vector config; named multi-vector collections are not supported
fn parse_vector_params(name: &str, vectors: &serde_json::Value) -> VectorStoreResult<VectorParams> {
    let incompatible = |detail: String| VectorStoreError::IncompatibleCollection {
        name: name.to_string(),
        detail,
    };

    let size = vectors
        .get("size")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| incompatible(format!("unsupported vector config {}", vectors)))?;
    let distance = vectors
        .get("distance")
        .and_then(|v| v.as_str())
        .and_then(|d| d.parse::<Distance>().ok())
        .ok_or_else(|| incompatible(format!("unsupported distance in {}", vectors)))?;

    Ok(VectorParams::new(size, distance))
}

async fn check_status(response: Response) -> VectorStoreResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = if body.is_empty() {
        "No response body".to_string()
    } else {
        body
    };

    Err(match status {
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
            VectorStoreError::Unavailable(format!("Qdrant returned {}: {}", status, message))
        }
        _ => VectorStoreError::Rejected {
            status: status.as_u16(),
            message,
        },
    })
}

#[async_trait]
impl VectorStore for QdrantGateway {
    async fn ensure_collection(
        &self,
        name: &str,
        params: VectorParams,
    ) -> VectorStoreResult<CollectionStatus> {
        if let Some(existing) = self.collection_params(name).await? {
            if existing != params {
                return Err(VectorStoreError::IncompatibleCollection {
                    name: name.to_string(),
                    detail: format!(
                        "has size {} / {}, requested {} / {}",
                        existing.size, existing.distance, params.size, params.distance
                    ),
                });
            }
            debug!(collection = %name, "Collection already exists");
            return Ok(CollectionStatus::AlreadyExists);
        }

        let url = format!("{}/collections/{}", self.base_url, name);
        let response = self
            .send(self.client.put(&url).json(&CreateCollection { vectors: params }))
            .await?;

        // Lost a creation race with another worker
        if response.status() == StatusCode::CONFLICT {
            return Ok(CollectionStatus::AlreadyExists);
        }
        check_status(response).await?;

        info!(
            collection = %name,
            size = params.size,
            distance = %params.distance,
            "Created vector collection"
        );
        Ok(CollectionStatus::Created)
    }

    async fn upsert(&self, name: &str, points: Vec<VectorPoint>) -> VectorStoreResult<()> {
        if points.is_empty() {
            return Ok(());
        }

        let url = format!("{}/collections/{}/points?wait=true", self.base_url, name);
        let response = self
            .send(self.client.put(&url).json(&UpsertPoints { points: &points }))
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(VectorStoreError::CollectionNotFound(name.to_string()));
        }
        check_status(response).await?;

        debug!(collection = %name, points = points.len(), "Upserted points");
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "qdrant"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_vector_params() {
        let params = parse_vector_params(
            "chunks",
            &serde_json::json!({ "size": 768, "distance": "Cosine" }),
        )
        .unwrap();
        assert_eq!(params, VectorParams::new(768, Distance::Cosine));
    }

    #[test]
    fn test_named_vectors_are_incompatible() {
        let err = parse_vector_params(
            "chunks",
            &serde_json::json!({ "text": { "size": 768, "distance": "Cosine" } }),
        )
        .unwrap_err();
        assert!(matches!(err, VectorStoreError::IncompatibleCollection { .. }));
    }

    #[test]
    fn test_create_body_shape() {
        let body = serde_json::to_value(CreateCollection {
            vectors: VectorParams::new(4, Distance::Dot),
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({ "vectors": { "size": 4, "distance": "Dot" } }));
    }
}
