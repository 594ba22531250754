//! SQLite-backed vector index.

use crate::embeddings::{cosine_similarity, EmbeddingProvider};
use crate::types::{IndexDocument, SearchHit};
use crate::vector_index::VectorIndex;
use kbsync_core::{AppError, AppResult};
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Chunk store with brute-force cosine search.
///
/// Several collections can share one database file; every query is scoped
/// to this index's collection.
pub struct SqliteIndex {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
    collection: String,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl std::fmt::Debug for SqliteIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteIndex")
            .field("path", &self.path)
            .field("collection", &self.collection)
            .field("embedder", &self.embedder)
            .finish()
    }
}

impl SqliteIndex {
    /// Open or create the index database at `db_path`.
    pub fn open(
        db_path: &Path,
        collection: &str,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> AppResult<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    AppError::Index(format!("Failed to create index directory: {}", e))
                })?;
            }
        }

        let conn = Connection::open(db_path)
            .map_err(|e| AppError::Index(format!("Failed to open SQLite index: {}", e)))?;

        tracing::debug!("Opened SQLite index at {:?}", db_path);
        Self::with_connection(conn, Some(db_path.to_path_buf()), collection, embedder)
    }

    /// Index that lives only as long as the value.
    pub fn open_in_memory(
        collection: &str,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> AppResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AppError::Index(format!("Failed to open in-memory index: {}", e)))?;
        Self::with_connection(conn, None, collection, embedder)
    }

    fn with_connection(
        conn: Connection,
        path: Option<PathBuf>,
        collection: &str,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> AppResult<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                collection TEXT NOT NULL,
                text TEXT NOT NULL,
                embedding BLOB NOT NULL,
                metadata TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_chunks_collection ON chunks(collection);
            "#,
        )
        .map_err(|e| AppError::Index(format!("Failed to create tables: {}", e)))?;

        Ok(Self {
            conn: Mutex::new(conn),
            path,
            collection: collection.to_string(),
            embedder,
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Number of chunks in this collection.
    pub fn count(&self) -> AppResult<u64> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT COUNT(*) FROM chunks WHERE collection = ?1",
            params![self.collection],
            |row| row.get::<_, i64>(0),
        )
        .map(|n| n as u64)
        .map_err(|e| AppError::Index(format!("Failed to count chunks: {}", e)))
    }

    /// Size of the database file in bytes; zero for in-memory indexes.
    pub fn db_size_bytes(&self) -> u64 {
        self.path
            .as_ref()
            .and_then(|p| std::fs::metadata(p).ok())
            .map(|m| m.len())
            .unwrap_or(0)
    }

    /// Whether a chunk with `id` exists in this collection.
    pub fn contains(&self, id: &str) -> AppResult<bool> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT COUNT(*) FROM chunks WHERE collection = ?1 AND id = ?2",
            params![self.collection, id],
            |row| row.get::<_, i64>(0),
        )
        .map(|n| n > 0)
        .map_err(|e| AppError::Index(format!("Failed to look up chunk: {}", e)))
    }

    fn lock(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Index("Index connection lock poisoned".to_string()))
    }
}

#[async_trait::async_trait]
impl VectorIndex for SqliteIndex {
    async fn add_documents(&self, documents: &[IndexDocument]) -> AppResult<Vec<String>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = documents.iter().map(|d| d.text.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;
        if vectors.len() != documents.len() {
            return Err(AppError::Index(format!(
                "Embedding provider returned {} vectors for {} chunks",
                vectors.len(),
                documents.len()
            )));
        }

        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| AppError::Index(format!("Failed to begin transaction: {}", e)))?;

        let mut ids = Vec::with_capacity(documents.len());
        for (document, vector) in documents.iter().zip(&vectors) {
            let id = uuid::Uuid::new_v4().to_string();
            let metadata = serde_json::to_string(&document.metadata)?;
            tx.execute(
                "INSERT INTO chunks (id, collection, text, embedding, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, self.collection, document.text, embedding_to_bytes(vector), metadata],
            )
            .map_err(|e| AppError::Index(format!("Failed to insert chunk: {}", e)))?;
            ids.push(id);
        }

        tx.commit()
            .map_err(|e| AppError::Index(format!("Failed to commit chunks: {}", e)))?;

        tracing::debug!("Added {} chunks to '{}'", ids.len(), self.collection);
        Ok(ids)
    }

    async fn delete(&self, ids: &[String]) -> AppResult<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| AppError::Index(format!("Failed to begin transaction: {}", e)))?;

        let mut removed = 0;
        for id in ids {
            removed += tx
                .execute(
                    "DELETE FROM chunks WHERE collection = ?1 AND id = ?2",
                    params![self.collection, id],
                )
                .map_err(|e| AppError::Index(format!("Failed to delete chunk {}: {}", id, e)))?;
        }

        tx.commit()
            .map_err(|e| AppError::Index(format!("Failed to commit deletion: {}", e)))?;

        tracing::debug!(
            "Deleted {} of {} requested chunks from '{}'",
            removed,
            ids.len(),
            self.collection
        );
        Ok(())
    }

    async fn persist(&self) -> AppResult<()> {
        let conn = self.lock()?;
        conn.cache_flush()
            .map_err(|e| AppError::Index(format!("Failed to flush index: {}", e)))
    }

    async fn search(&self, query: &str, top_k: usize) -> AppResult<Vec<SearchHit>> {
        let query_vector = self.embedder.embed(query).await?;

        let rows: Vec<(String, String, Vec<u8>, String)> = {
            let conn = self.lock()?;
            let mut stmt = conn
                .prepare(
                    "SELECT id, text, embedding, metadata FROM chunks WHERE collection = ?1",
                )
                .map_err(|e| AppError::Index(format!("Failed to prepare query: {}", e)))?;

            let mapped = stmt
                .query_map(params![self.collection], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                })
                .map_err(|e| AppError::Index(format!("Failed to query chunks: {}", e)))?;

            let rows = mapped
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| AppError::Index(format!("Failed to read chunk row: {}", e)))?;
            rows
        };

        let mut hits = Vec::with_capacity(rows.len());
        for (id, text, blob, metadata) in rows {
            let vector = bytes_to_embedding(&blob)?;
            hits.push(SearchHit {
                score: cosine_similarity(&query_vector, &vector),
                id,
                text,
                metadata: serde_json::from_str(&metadata)?,
            });
        }

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(top_k);

        tracing::debug!("Retrieved {} chunks (requested top-{})", hits.len(), top_k);
        Ok(hits)
    }
}

fn embedding_to_bytes(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn bytes_to_embedding(bytes: &[u8]) -> AppResult<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(AppError::Index(format!(
            "Invalid embedding blob length {}",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}
