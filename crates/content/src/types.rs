//! Content system type definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One document discovered on disk during a scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ScannedDocument {
    /// Path string as produced by walking the content root
    pub path: String,

    /// Last-modified instant from the `date` field
    pub update_time: DateTime<Utc>,

    /// False when the front matter marks the document invalid
    pub is_valid: bool,

    /// Ids the index assigned to this document's chunks
    pub index_ids: Vec<String>,
}

/// A chunk of text submitted to the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDocument {
    pub text: String,

    /// Front matter fields plus `source`
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// A chunk returned by a similarity search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    /// Index id of the chunk
    pub id: String,

    pub text: String,

    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,

    /// Cosine similarity with the query
    pub score: f32,
}

impl SearchHit {
    /// Path of the document the chunk was cut from.
    pub fn source(&self) -> Option<&str> {
        self.metadata.get("source").and_then(|v| v.as_str())
    }
}

/// Summary of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Documents found on disk
    pub scanned: usize,

    /// Documents whose chunks were (re)submitted to the index
    pub added: usize,

    /// Documents whose chunks were removed from the index
    pub deleted: usize,

    /// Documents left as they were
    pub unchanged: usize,

    /// Index ids removed by the batched delete
    pub ids_deleted: usize,

    /// Index ids returned by additions
    pub ids_created: usize,

    /// Record entries whose file no longer exists
    pub removed: usize,

    pub duration_secs: f64,
}

/// Statistics for the index and record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStats {
    pub collection: String,

    /// Chunks stored in the collection
    pub chunks_count: u64,

    /// Entries in the record file
    pub documents_count: usize,

    /// Record entries marked valid
    pub valid_count: usize,

    /// Index database size in bytes
    pub db_size_bytes: u64,
}
