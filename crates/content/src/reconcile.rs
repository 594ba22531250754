//! Reconciliation of the vector index with the document tree.
//!
//! A pass scans the content root, diffs the scan against the record file,
//! deletes stale chunks, adds new ones and finally rewrites the record. The
//! record is only written once every index mutation succeeded, so a failed
//! pass is retried in full by the next one.

use crate::chunker::Chunker;
use crate::progress::ProgressReporter;
use crate::record::{EmbeddingRecord, RecordStore};
use crate::scanner::{load_document, scan_documents};
use crate::types::{ReconcileReport, ScannedDocument};
use crate::vector_index::VectorIndex;
use kbsync_core::config::ContentConfig;
use kbsync_core::{AppResult, RemovedDocumentPolicy};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Index mutations needed to move from the prior record to the current scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcilePlan {
    /// Scanned documents, carrying prior ids where a record existed
    pub documents: Vec<ScannedDocument>,

    /// Positions in `documents` whose ids must be deleted
    pub to_delete: Vec<usize>,

    /// Positions in `documents` that must be (re)indexed
    pub to_add: Vec<usize>,

    /// Record entries whose file is no longer on disk
    pub removed: Vec<EmbeddingRecord>,

    pub policy: RemovedDocumentPolicy,
}

impl ReconcilePlan {
    /// Every id the batched delete will remove.
    pub fn delete_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .to_delete
            .iter()
            .flat_map(|&i| self.documents[i].index_ids.iter().cloned())
            .collect();

        if self.policy == RemovedDocumentPolicy::Purge {
            ids.extend(self.removed.iter().flat_map(|r| r.index_ids.iter().cloned()));
        }
        ids
    }

    pub fn deletions(&self) -> impl Iterator<Item = &ScannedDocument> {
        self.to_delete.iter().map(|&i| &self.documents[i])
    }

    pub fn additions(&self) -> impl Iterator<Item = &ScannedDocument> {
        self.to_add.iter().map(|&i| &self.documents[i])
    }

    /// Documents neither deleted nor added.
    pub fn unchanged(&self) -> usize {
        let touched: BTreeSet<usize> = self.to_delete.iter().chain(&self.to_add).copied().collect();
        self.documents.len() - touched.len()
    }

    /// True when the pass would not touch the index.
    pub fn is_noop(&self) -> bool {
        self.to_add.is_empty() && self.delete_ids().is_empty()
    }
}

/// Diff the current scan against the prior record.
///
/// Pure: no I/O, no index access.
pub fn plan(
    current: Vec<ScannedDocument>,
    prior: &HashMap<String, EmbeddingRecord>,
    policy: RemovedDocumentPolicy,
) -> ReconcilePlan {
    let mut documents = current;
    let mut to_delete = Vec::new();
    let mut to_add = Vec::new();

    for (position, doc) in documents.iter_mut().enumerate() {
        let Some(record) = prior.get(&doc.path) else {
            if doc.is_valid {
                to_add.push(position);
            }
            continue;
        };

        doc.index_ids = record.index_ids.clone();

        match (record.is_valid, doc.is_valid) {
            (true, false) => to_delete.push(position),
            (false, true) => {
                if !doc.index_ids.is_empty() {
                    to_delete.push(position);
                }
                to_add.push(position);
            }
            (true, true) if doc.update_time > record.update_time => {
                to_delete.push(position);
                to_add.push(position);
            }
            (false, false) if !doc.index_ids.is_empty() => to_delete.push(position),
            _ => {}
        }
    }

    let scanned: BTreeSet<&str> = documents.iter().map(|d| d.path.as_str()).collect();
    let mut removed: Vec<EmbeddingRecord> = prior
        .values()
        .filter(|r| !scanned.contains(r.path.as_str()))
        .cloned()
        .collect();
    removed.sort_by(|a, b| a.path.cmp(&b.path));

    ReconcilePlan {
        documents,
        to_delete,
        to_add,
        removed,
        policy,
    }
}

/// Keeps a vector index in sync with a directory of documents.
pub struct ContentManager<I: VectorIndex> {
    index: I,
    records: RecordStore,
    chunker: Chunker,
    content_dir: PathBuf,
    extensions: Vec<String>,
    policy: RemovedDocumentPolicy,
    progress: ProgressReporter,
}

impl<I: VectorIndex> ContentManager<I> {
    pub fn new(config: &ContentConfig, index: I) -> AppResult<Self> {
        Ok(Self {
            index,
            records: RecordStore::new(config.record_path()),
            chunker: Chunker::new(config.chunk_size, config.chunk_overlap)?,
            content_dir: config.content_dir.clone(),
            extensions: config.extensions.clone(),
            policy: config.removed_documents,
            progress: ProgressReporter::noop(),
        })
    }

    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    pub fn index(&self) -> &I {
        &self.index
    }

    /// Compute what a pass would do without touching the index or record.
    pub fn preview(&self) -> AppResult<ReconcilePlan> {
        let current = scan_documents(&self.content_dir, &self.extensions)?;
        let prior = self.records.load()?;
        Ok(plan(current, &prior, self.policy))
    }

    /// Run one reconciliation pass.
    ///
    /// All deletions are issued before any addition. On failure the record
    /// file is left as it was and the error is returned.
    pub async fn reconcile(&mut self) -> AppResult<ReconcileReport> {
        let started = Instant::now();

        let current = scan_documents(&self.content_dir, &self.extensions)?;
        self.progress
            .scan(current.len() as u64, &self.content_dir.to_string_lossy());

        let prior = self.records.load()?;
        let mut plan = plan(current, &prior, self.policy);

        tracing::info!(
            "Reconciling {} documents: {} to delete, {} to add, {} removed from disk",
            plan.documents.len(),
            plan.to_delete.len(),
            plan.to_add.len(),
            plan.removed.len()
        );

        if self.policy == RemovedDocumentPolicy::Retain {
            for record in plan.removed.iter().filter(|r| !r.index_ids.is_empty()) {
                tracing::warn!(
                    "{} was removed from disk; leaving {} chunks in the index",
                    record.path,
                    record.index_ids.len()
                );
            }
        }

        let ids_deleted = self.delete_stale(&mut plan).await?;
        let ids_created = self.add_fresh(&mut plan).await?;

        let entries: Vec<EmbeddingRecord> =
            plan.documents.iter().map(EmbeddingRecord::from).collect();
        self.records.save(&entries)?;
        self.progress
            .record(entries.len() as u64, &self.records.path().to_string_lossy());

        let report = ReconcileReport {
            scanned: plan.documents.len(),
            added: plan.to_add.len(),
            deleted: plan.to_delete.len(),
            unchanged: plan.unchanged(),
            ids_deleted,
            ids_created,
            removed: plan.removed.len(),
            duration_secs: started.elapsed().as_secs_f64(),
        };

        tracing::info!(
            "Reconciliation complete: {} added, {} deleted, {} unchanged in {:.2}s",
            report.added,
            report.deleted,
            report.unchanged,
            report.duration_secs
        );

        Ok(report)
    }

    /// Issue the batched delete and flush, clearing ids of deleted documents.
    async fn delete_stale(&self, plan: &mut ReconcilePlan) -> AppResult<usize> {
        let ids = plan.delete_ids();

        let deleted = if ids.is_empty() {
            Ok(())
        } else {
            tracing::debug!("Deleting {} index ids", ids.len());
            self.index.delete(&ids).await
        };
        let persisted = self.index.persist().await;
        deleted?;
        persisted?;

        for &i in &plan.to_delete {
            plan.documents[i].index_ids.clear();
        }
        self.progress
            .delete(plan.to_delete.len() as u64, ids.len() as u64);

        Ok(ids.len())
    }

    /// Index every document scheduled for addition, in order.
    ///
    /// The first failure stops the remaining additions. The index is flushed
    /// either way.
    async fn add_fresh(&self, plan: &mut ReconcilePlan) -> AppResult<usize> {
        let total = plan.to_add.len() as u64;
        let mut created = 0;

        let mut added: AppResult<()> = Ok(());
        for (n, &i) in plan.to_add.iter().enumerate() {
            match self.add_one(&plan.documents[i].path).await {
                Ok(ids) => {
                    created += ids.len();
                    plan.documents[i].index_ids = ids;
                    self.progress
                        .embed(n as u64 + 1, total, &plan.documents[i].path);
                }
                Err(e) => {
                    tracing::error!("Failed to index {}: {}", plan.documents[i].path, e);
                    added = Err(e);
                    break;
                }
            }
        }

        let persisted = self.index.persist().await;
        added?;
        persisted?;

        Ok(created)
    }

    async fn add_one(&self, path: &str) -> AppResult<Vec<String>> {
        let document = load_document(Path::new(path))?;
        let chunks = self.chunker.chunk_document(&document)?;
        if chunks.is_empty() {
            tracing::debug!("{} has an empty body, nothing to index", path);
            return Ok(Vec::new());
        }
        self.index.add_documents(&chunks).await
    }
}
