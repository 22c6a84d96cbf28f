use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisBackend {
    /// External analysis and embedding services over HTTP
    Http,
    /// In-process lexicon classifier and hashing embedder, no evaluators
    Local,
}

/// Analysis and embedding service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_backend")]
    pub backend: AnalysisBackend,

    /// Analysis service base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Request timeout (seconds)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Metrics scored for every assistant reply
    #[serde(default = "default_metrics")]
    pub metrics: Vec<String>,

    /// OpenAI-compatible embedding endpoint
    #[serde(default = "default_embedding_url")]
    pub embedding_url: String,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Environment variable holding the embedding API key, if any
    #[serde(default = "default_embedding_api_key_env")]
    pub embedding_api_key_env: String,
}

fn default_backend() -> AnalysisBackend {
    AnalysisBackend::Http
}

fn default_base_url() -> String {
    "http://localhost:8088".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_metrics() -> Vec<String> {
    vec!["relevance".to_string(), "rules_accuracy".to_string()]
}

fn default_embedding_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_embedding_api_key_env() -> String {
    "EMBEDDING_API_KEY".to_string()
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            metrics: default_metrics(),
            embedding_url: default_embedding_url(),
            embedding_model: default_embedding_model(),
            embedding_api_key_env: default_embedding_api_key_env(),
        }
    }
}

impl AnalysisConfig {
    pub fn embedding_api_key(&self) -> Option<String> {
        std::env::var(&self.embedding_api_key_env)
            .ok()
            .filter(|key| !key.is_empty())
    }
}
