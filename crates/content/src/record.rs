//! Persisted embedding record.
//!
//! The record file is a JSON array with one entry per scanned document. It is
//! the last committed view of which index ids belong to which document, and it
//! is only ever replaced as a whole.

use crate::timestamp;
use crate::types::ScannedDocument;
use chrono::{DateTime, Utc};
use kbsync_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// One entry of the record file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    #[serde(rename = "file")]
    pub path: String,

    #[serde(with = "timestamp::millis")]
    pub update_time: DateTime<Utc>,

    #[serde(rename = "IDs", default)]
    pub index_ids: Vec<String>,

    pub is_valid: bool,
}

impl From<&ScannedDocument> for EmbeddingRecord {
    fn from(doc: &ScannedDocument) -> Self {
        Self {
            path: doc.path.clone(),
            update_time: doc.update_time,
            index_ids: doc.index_ids.clone(),
            is_valid: doc.is_valid,
        }
    }
}

/// Reads and atomically rewrites the record file.
#[derive(Debug, Clone)]
pub struct RecordStore {
    path: PathBuf,
}

impl RecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the prior record keyed by path.
    ///
    /// A missing file is an empty record. An unreadable or corrupt file is an
    /// error; it is never treated as empty.
    pub fn load(&self) -> AppResult<HashMap<String, EmbeddingRecord>> {
        let entries = self.load_entries()?;
        Ok(entries.into_iter().map(|r| (r.path.clone(), r)).collect())
    }

    /// Load the record in file order.
    pub fn load_entries(&self) -> AppResult<Vec<EmbeddingRecord>> {
        if !self.path.exists() {
            tracing::debug!("No record file at {:?}, starting empty", self.path);
            return Ok(Vec::new());
        }

        let contents = fs::read_to_string(&self.path).map_err(|e| {
            AppError::Record(format!("Failed to read record {:?}: {}", self.path, e))
        })?;

        if contents.trim().is_empty() {
            return Ok(Vec::new());
        }

        serde_json::from_str(&contents).map_err(|e| {
            AppError::Record(format!("Corrupt record file {:?}: {}", self.path, e))
        })
    }

    /// Replace the record with `records`.
    ///
    /// Writes a sibling temp file and renames it over the target, so readers
    /// see either the old record or the new one.
    pub fn save(&self, records: &[EmbeddingRecord]) -> AppResult<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|e| {
            AppError::Record(format!("Failed to create record directory {:?}: {}", dir, e))
        })?;

        let bytes = to_pretty_json(records)?;

        let mut temp = NamedTempFile::new_in(&dir)
            .map_err(|e| AppError::Record(format!("Failed to create temp record: {}", e)))?;
        temp.write_all(&bytes)
            .and_then(|_| temp.as_file().sync_all())
            .map_err(|e| AppError::Record(format!("Failed to write temp record: {}", e)))?;
        temp.persist(&self.path).map_err(|e| {
            AppError::Record(format!("Failed to replace record {:?}: {}", self.path, e))
        })?;

        tracing::debug!("Saved {} record entries to {:?}", records.len(), self.path);
        Ok(())
    }
}

fn to_pretty_json(records: &[EmbeddingRecord]) -> AppResult<Vec<u8>> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    records
        .serialize(&mut serializer)
        .map_err(|e| AppError::Record(format!("Failed to serialize record: {}", e)))?;
    Ok(buf)
}
