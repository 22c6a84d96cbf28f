use crate::ingestion::collaborators::{Chunker, TextChunk};

/// Fixed-size character windows with overlap, preferring to break on whitespace
#[derive(Debug, Clone, Copy)]
pub struct WindowChunker {
    size: usize,
    overlap: usize,
}

impl WindowChunker {
    pub fn new(size: usize, overlap: usize) -> Self {
        let size = size.max(1);
        Self {
            size,
            overlap: overlap.min(size - 1),
        }
    }
}

impl Default for WindowChunker {
    fn default() -> Self {
        Self::new(1000, 200)
    }
}

impl Chunker for WindowChunker {
    fn chunk(&self, document_id: &str, text: &str) -> Vec<TextChunk> {
        let chars: Vec<char> = text.chars().collect();
        let len = chars.len();
        let mut chunks = Vec::new();
        let mut start = 0;

        while start < len {
            let mut end = (start + self.size).min(len);
            if end < len {
                let floor = start + (self.size * 4 / 5).max(1);
                if let Some(ws) = (floor..end).rev().find(|&i| chars[i].is_whitespace()) {
                    end = ws;
                }
            }

            let span: String = chars[start..end].iter().collect();
            let trimmed = span.trim();
            if !trimmed.is_empty() {
                chunks.push(TextChunk {
                    document_id: document_id.to_string(),
                    index: chunks.len(),
                    text: trimmed.to_string(),
                    char_start: start,
                    char_end: end,
                    point_id: None,
                });
            }

            if end >= len {
                break;
            }
            start = end.saturating_sub(self.overlap).max(start + 1);
        }

        chunks
    }
}
