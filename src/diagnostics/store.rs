use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// One ranked search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResultRecord {
    pub document_id: String,
    pub chunk_id: Option<String>,
    pub score: f32,
    pub text_preview: Option<String>,
}

/// A search query with the results it returned
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchDiagnostics {
    pub id: Uuid,
    pub query: String,
    pub ruleset_id: String,
    pub index_name: String,
    /// Filter exactly as the search path received it
    pub filter_json: Option<String>,
    pub results: Vec<SearchResultRecord>,
    pub recorded_at: DateTime<Utc>,
}

/// Persists diagnostics batches
#[async_trait]
pub trait DiagnosticsStore: Send + Sync {
    async fn store(&self, batch: &[SearchDiagnostics]) -> Result<()>;
}

/// Appends diagnostics as JSON lines
pub struct JsonlDiagnosticsStore {
    path: PathBuf,
}

impl JsonlDiagnosticsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl DiagnosticsStore for JsonlDiagnosticsStore {
    async fn store(&self, batch: &[SearchDiagnostics]) -> Result<()> {
        let mut buf = Vec::new();
        for entry in batch {
            serde_json::to_writer(&mut buf, entry)?;
            buf.push(b'\n');
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&buf).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(query: &str) -> SearchDiagnostics {
        SearchDiagnostics {
            id: Uuid::new_v4(),
            query: query.to_string(),
            ruleset_id: "rs-1".to_string(),
            index_name: "ruleset_chunks".to_string(),
            filter_json: Some(r#"{"rulesetId":"rs-1"}"#.to_string()),
            results: vec![SearchResultRecord {
                document_id: "doc-1".to_string(),
                chunk_id: Some("doc-1:0".to_string()),
                score: 0.87,
                text_preview: None,
            }],
            recorded_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_jsonl_store_appends() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlDiagnosticsStore::new(dir.path().join("nested/diagnostics.jsonl"));

        store.store(&[entry("grapple rules")]).await.unwrap();
        store.store(&[entry("flanking")]).await.unwrap();

        let contents = tokio::fs::read_to_string(store.path()).await.unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["query"], "grapple rules");
        assert_eq!(first["rulesetId"], "rs-1");
        assert_eq!(first["results"][0]["documentId"], "doc-1");
    }
}
