use crate::ingestion::collaborators::TextExtractor;
use crate::pipeline::{PipelineError, PipelineResult};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};

/// Reads UTF-8 text files; paths are resolved against an optional root
#[derive(Debug, Clone, Default)]
pub struct PlainTextExtractor {
    root: Option<PathBuf>,
}

impl PlainTextExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    /// Paths under a root may not climb out of it
    fn resolve(&self, file_path: &str) -> PipelineResult<PathBuf> {
        let Some(root) = &self.root else {
            return Ok(Path::new(file_path).to_path_buf());
        };

        let relative = Path::new(file_path.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(PipelineError::InvalidInput(format!(
                "{} escapes the document root",
                file_path
            )));
        }
        Ok(root.join(relative))
    }
}

#[async_trait]
impl TextExtractor for PlainTextExtractor {
    async fn extract(&self, file_path: &str) -> PipelineResult<String> {
        let path = self.resolve(file_path)?;
        let bytes = tokio::fs::read(&path).await.map_err(|e| {
            PipelineError::Extraction(format!("failed to read {}: {}", path.display(), e))
        })?;

        String::from_utf8(bytes)
            .map_err(|_| PipelineError::Extraction(format!("{} is not valid UTF-8", path.display())))
    }
}
