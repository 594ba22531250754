//! Document discovery.
//!
//! Walks the content root and turns every document into a `ScannedDocument`
//! carrying its identity, last-modified time and validity.

use crate::frontmatter::{parse_front_matter, DocumentMetadata, DATE_KEY};
use crate::timestamp::parse_utc;
use crate::types::ScannedDocument;
use chrono::{DateTime, Utc};
use kbsync_core::{AppError, AppResult};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A document read back from disk for indexing.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub path: PathBuf,
    pub metadata: DocumentMetadata,
    pub body: String,
}

/// Scan `root` recursively for files with one of `extensions`.
///
/// Any unreadable file or malformed front matter aborts the scan. The result
/// is sorted by path.
pub fn scan_documents(root: &Path, extensions: &[String]) -> AppResult<Vec<ScannedDocument>> {
    if !root.is_dir() {
        return Err(AppError::Config(format!(
            "Content directory does not exist: {:?}",
            root
        )));
    }

    let mut documents = Vec::new();

    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            AppError::Io(std::io::Error::other(format!(
                "Failed to walk {:?}: {}",
                root, e
            )))
        })?;

        if !entry.path().is_file() || !has_extension(entry.path(), extensions) {
            continue;
        }

        let loaded = load_document(entry.path())?;
        let update_time = update_time_of(&loaded)?;

        documents.push(ScannedDocument {
            path: entry.path().to_string_lossy().to_string(),
            update_time,
            is_valid: !loaded.metadata.is_marked_invalid(),
            index_ids: Vec::new(),
        });
    }

    documents.sort_by(|a, b| a.path.cmp(&b.path));

    tracing::debug!("Scanned {} documents under {:?}", documents.len(), root);
    Ok(documents)
}

/// Read one document and split its front matter from its body.
///
/// A document without front matter gets empty metadata.
pub fn load_document(path: &Path) -> AppResult<LoadedDocument> {
    let text = fs::read_to_string(path).map_err(|e| {
        AppError::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to read {:?}: {}", path, e),
        ))
    })?;

    let (metadata, body) = parse_front_matter(&text)
        .map_err(|e| AppError::FrontMatter(format!("{:?}: {}", path, e)))?;

    Ok(LoadedDocument {
        path: path.to_path_buf(),
        metadata: metadata.unwrap_or_default(),
        body: body.to_string(),
    })
}

fn update_time_of(document: &LoadedDocument) -> AppResult<DateTime<Utc>> {
    let raw = document.metadata.get_str(DATE_KEY).ok_or_else(|| {
        AppError::FrontMatter(format!(
            "{:?}: missing required '{}' field",
            document.path, DATE_KEY
        ))
    })?;

    parse_utc(&raw).map_err(|e| {
        let detail = match e {
            AppError::FrontMatter(detail) => detail,
            other => other.to_string(),
        };
        AppError::FrontMatter(format!(
            "{:?}: invalid '{}' field: {}",
            document.path, DATE_KEY, detail
        ))
    })
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| extensions.iter().any(|wanted| wanted.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}
