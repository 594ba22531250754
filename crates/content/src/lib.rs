//! Content synchronization for kbsync.
//!
//! Keeps a vector index consistent with a directory of markdown documents
//! carrying YAML front matter. See [`ContentManager::reconcile`].

pub mod chunker;
pub mod embeddings;
pub mod frontmatter;
pub mod index;
pub mod progress;
pub mod reconcile;
pub mod record;
pub mod scanner;
pub mod timestamp;
pub mod types;
pub mod vector_index;

#[cfg(test)]
mod tests;

pub use chunker::Chunker;
pub use embeddings::{create_provider, EmbeddingProvider};
pub use frontmatter::{parse_front_matter, DocumentMetadata};
pub use index::SqliteIndex;
pub use progress::{ProgressCallback, ProgressEvent, ProgressReporter};
pub use reconcile::{plan, ContentManager, ReconcilePlan};
pub use record::{EmbeddingRecord, RecordStore};
pub use scanner::{load_document, scan_documents, LoadedDocument};
pub use types::{IndexDocument, IndexStats, ReconcileReport, ScannedDocument, SearchHit};
pub use vector_index::VectorIndex;

use kbsync_core::{AppConfig, AppResult};

/// Open the configured SQLite index with the configured embedding provider.
pub async fn open_index(config: &AppConfig) -> AppResult<SqliteIndex> {
    let embedder = create_provider(&config.embedding).await?;
    SqliteIndex::open(
        &config.content.index_path,
        &config.content.collection,
        embedder,
    )
}

/// Chunk and record statistics for the configured knowledge base.
pub fn stats(config: &AppConfig, index: &SqliteIndex) -> AppResult<IndexStats> {
    let records = RecordStore::new(config.content.record_path()).load_entries()?;

    Ok(IndexStats {
        collection: index.collection().to_string(),
        chunks_count: index.count()?,
        documents_count: records.len(),
        valid_count: records.iter().filter(|r| r.is_valid).count(),
        db_size_bytes: index.db_size_bytes(),
    })
}
