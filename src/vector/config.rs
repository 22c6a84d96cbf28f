//! Vector store configuration

use crate::vector::types::{Distance, VectorParams};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VectorBackend {
    Qdrant,
    InMemory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    #[serde(default = "default_backend")]
    pub backend: VectorBackend,

    /// Qdrant REST endpoint
    #[serde(default = "default_url")]
    pub url: String,

    /// Environment variable holding the API key, if any
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Request timeout (seconds)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Collection holding ruleset document chunks
    #[serde(default = "default_document_collection")]
    pub document_collection: String,

    #[serde(default = "default_dimensions")]
    pub dimensions: u64,

    #[serde(default = "default_distance")]
    pub distance: Distance,
}

fn default_backend() -> VectorBackend {
    VectorBackend::Qdrant
}

fn default_url() -> String {
    "http://localhost:6333".to_string()
}

fn default_api_key_env() -> String {
    "QDRANT_API_KEY".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_document_collection() -> String {
    "ruleset_chunks".to_string()
}

fn default_dimensions() -> u64 {
    1536
}

fn default_distance() -> Distance {
    Distance::Cosine
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            url: default_url(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
            document_collection: default_document_collection(),
            dimensions: default_dimensions(),
            distance: default_distance(),
        }
    }
}

impl VectorStoreConfig {
    /// Vector parameters of the document collection
    pub fn params(&self) -> VectorParams {
        VectorParams::new(self.dimensions, self.distance)
    }

    /// API key read from the configured environment variable
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.is_empty())
    }
}
