//! Fixtures shared by the scenario tests.

use crate::types::{IndexDocument, SearchHit};
use crate::vector_index::VectorIndex;
use kbsync_core::config::ContentConfig;
use kbsync_core::{AppError, AppResult, RemovedDocumentPolicy};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::TempDir;

/// One call observed by [`RecordingIndex`].
#[derive(Debug, Clone, PartialEq)]
pub enum IndexCall {
    /// Sources of the submitted chunks and the ids handed back
    Add { sources: Vec<String>, ids: Vec<String> },
    Delete(Vec<String>),
    Persist,
}

#[derive(Default)]
struct State {
    calls: Vec<IndexCall>,
    next_id: usize,
    fail_add_for: Option<String>,
    fail_delete: bool,
}

/// In-memory index that records every call and can be told to fail.
#[derive(Default)]
pub struct RecordingIndex {
    state: Mutex<State>,
}

impl RecordingIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<IndexCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Calls other than `Persist`.
    pub fn mutations(&self) -> Vec<IndexCall> {
        self.calls()
            .into_iter()
            .filter(|c| *c != IndexCall::Persist)
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    /// Fail any add whose chunks come from a path ending in `suffix`.
    pub fn fail_add_for(&self, suffix: Option<&str>) {
        self.state.lock().unwrap().fail_add_for = suffix.map(String::from);
    }

    pub fn fail_delete(&self, fail: bool) {
        self.state.lock().unwrap().fail_delete = fail;
    }
}

#[async_trait::async_trait]
impl VectorIndex for RecordingIndex {
    async fn add_documents(&self, documents: &[IndexDocument]) -> AppResult<Vec<String>> {
        let mut state = self.state.lock().unwrap();
        let sources: Vec<String> = documents
            .iter()
            .filter_map(|d| d.metadata.get("source").and_then(|s| s.as_str()))
            .map(String::from)
            .collect();

        if let Some(suffix) = &state.fail_add_for {
            if sources.iter().any(|s| s.ends_with(suffix.as_str())) {
                return Err(AppError::Index(format!("injected add failure for {}", suffix)));
            }
        }

        let ids: Vec<String> = documents
            .iter()
            .map(|_| {
                state.next_id += 1;
                format!("id-{}", state.next_id)
            })
            .collect();

        state.calls.push(IndexCall::Add {
            sources,
            ids: ids.clone(),
        });
        Ok(ids)
    }

    async fn delete(&self, ids: &[String]) -> AppResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_delete {
            return Err(AppError::Index("injected delete failure".to_string()));
        }
        state.calls.push(IndexCall::Delete(ids.to_vec()));
        Ok(())
    }

    async fn persist(&self) -> AppResult<()> {
        self.state.lock().unwrap().calls.push(IndexCall::Persist);
        Ok(())
    }

    async fn search(&self, _query: &str, _top_k: usize) -> AppResult<Vec<SearchHit>> {
        Ok(Vec::new())
    }
}

/// A content directory inside a temp dir.
pub struct ContentFixture {
    _temp: TempDir,
    pub dir: PathBuf,
}

impl ContentFixture {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("original_content");
        fs::create_dir_all(&dir).unwrap();
        Self { _temp: temp, dir }
    }

    pub fn config(&self, policy: RemovedDocumentPolicy) -> ContentConfig {
        ContentConfig {
            content_dir: self.dir.clone(),
            removed_documents: policy,
            ..ContentConfig::default()
        }
    }

    pub fn record_path(&self) -> PathBuf {
        self.dir.join("embedding.json")
    }

    pub fn record_text(&self) -> Option<String> {
        fs::read_to_string(self.record_path()).ok()
    }

    /// Write a document with front matter. `valid` of `None` omits the flag.
    pub fn write_doc(&self, name: &str, date: &str, valid: Option<bool>, body: &str) {
        let flag = match valid {
            Some(true) => "isValid: 1\n",
            Some(false) => "isValid: 0\n",
            None => "",
        };
        let text = format!(
            "---\ntitle: '{}'\ndate: '{}'\n{}---\n\n{}",
            name, date, flag, body
        );
        fs::write(self.dir.join(name), text).unwrap();
    }

    pub fn remove_doc(&self, name: &str) {
        fs::remove_file(self.dir.join(name)).unwrap();
    }

    /// Path string the scanner produces for `name`.
    pub fn path_of(&self, name: &str) -> String {
        path_string(&self.dir.join(name))
    }
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().to_string()
}
