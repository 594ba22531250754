//! Vector index abstraction.
//!
//! The reconciliation engine only needs to add chunks, delete them by id and
//! flush. Retrieval uses `search`.

use crate::types::{IndexDocument, SearchHit};
use kbsync_core::AppResult;

/// Trait for vector index backends.
#[async_trait::async_trait]
pub trait VectorIndex: Send + Sync {
    /// Store chunks and return their new ids.
    ///
    /// Ids come back in submission order. A backend may return more or fewer
    /// ids than documents if it re-splits input.
    async fn add_documents(&self, documents: &[IndexDocument]) -> AppResult<Vec<String>>;

    /// Remove chunks by id. Unknown ids are ignored.
    async fn delete(&self, ids: &[String]) -> AppResult<()>;

    /// Flush pending writes. Safe to call when nothing changed.
    async fn persist(&self) -> AppResult<()>;

    /// Top-k chunks by descending similarity to `query`.
    async fn search(&self, query: &str, top_k: usize) -> AppResult<Vec<SearchHit>>;
}
