//! Splits document bodies into index-sized chunks.

use crate::scanner::LoadedDocument;
use crate::types::IndexDocument;
use kbsync_core::{AppError, AppResult};
use text_splitter::{ChunkConfig, TextSplitter};

/// Metadata key naming the document a chunk came from.
pub const SOURCE_KEY: &str = "source";

/// Character-sized splitter with overlap, breaking on semantic boundaries.
pub struct Chunker {
    splitter: TextSplitter<text_splitter::Characters>,
}

impl Chunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> AppResult<Self> {
        let config = ChunkConfig::new(chunk_size)
            .with_overlap(chunk_overlap)
            .map_err(|e| AppError::Config(format!("Invalid chunk settings: {}", e)))?;

        tracing::debug!("Chunking at {} chars with {} overlap", chunk_size, chunk_overlap);
        Ok(Self {
            splitter: TextSplitter::new(config),
        })
    }

    /// Split raw text. Whitespace-only pieces are dropped.
    pub fn split<'a>(&self, text: &'a str) -> Vec<&'a str> {
        self.splitter
            .chunks(text)
            .filter(|chunk| !chunk.trim().is_empty())
            .collect()
    }

    /// Chunk a loaded document's body for the index.
    ///
    /// Every chunk carries the document's front matter plus `source`.
    pub fn chunk_document(&self, document: &LoadedDocument) -> AppResult<Vec<IndexDocument>> {
        let mut metadata = document.metadata.to_index_metadata()?;
        metadata.insert(
            SOURCE_KEY.to_string(),
            serde_json::Value::String(document.path.to_string_lossy().to_string()),
        );

        let chunks: Vec<IndexDocument> = self
            .split(&document.body)
            .into_iter()
            .map(|text| IndexDocument {
                text: text.to_string(),
                metadata: metadata.clone(),
            })
            .collect();

        tracing::debug!(
            "Split {:?} into {} chunks ({} bytes)",
            document.path,
            chunks.len(),
            document.body.len()
        );

        Ok(chunks)
    }
}
