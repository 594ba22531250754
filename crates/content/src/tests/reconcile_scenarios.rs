//! End-to-end reconciliation passes against a recording index.

use super::support::{ContentFixture, IndexCall, RecordingIndex};
use crate::embeddings::providers::trigram::TrigramProvider;
use crate::index::SqliteIndex;
use crate::reconcile::ContentManager;
use crate::record::{EmbeddingRecord, RecordStore};
use crate::timestamp::parse_utc;
use crate::vector_index::VectorIndex;
use kbsync_core::{AppError, RemovedDocumentPolicy};
use std::sync::Arc;

const T1: &str = "2023-05-23T14:57:07.322Z";
const T2: &str = "2023-06-01T08:00:00.000Z";

fn manager(fixture: &ContentFixture) -> ContentManager<RecordingIndex> {
    manager_with(fixture, RemovedDocumentPolicy::Purge)
}

fn manager_with(
    fixture: &ContentFixture,
    policy: RemovedDocumentPolicy,
) -> ContentManager<RecordingIndex> {
    ContentManager::new(&fixture.config(policy), RecordingIndex::new()).unwrap()
}

fn record_for(fixture: &ContentFixture, name: &str) -> EmbeddingRecord {
    let records = RecordStore::new(fixture.record_path()).load().unwrap();
    records[&fixture.path_of(name)].clone()
}

#[tokio::test]
async fn test_second_pass_without_changes_is_a_noop() {
    let fixture = ContentFixture::new();
    fixture.write_doc("content01.md", T1, Some(true), "First document body.");
    fixture.write_doc("content02.md", T1, None, "Second document body.");

    let mut manager = manager(&fixture);
    manager.reconcile().await.unwrap();
    let first_record = fixture.record_text().unwrap();

    manager.index().clear_calls();
    let report = manager.reconcile().await.unwrap();

    assert!(manager.index().mutations().is_empty());
    assert_eq!(report.added, 0);
    assert_eq!(report.deleted, 0);
    assert_eq!(report.unchanged, 2);
    assert_eq!(fixture.record_text().unwrap(), first_record);
}

#[tokio::test]
async fn test_new_valid_document_is_indexed() {
    let fixture = ContentFixture::new();
    fixture.write_doc("post.md", T1, Some(true), "Here's the content of the blog post.");

    let mut manager = manager(&fixture);
    let report = manager.reconcile().await.unwrap();

    let mutations = manager.index().mutations();
    assert_eq!(mutations.len(), 1);
    assert!(matches!(&mutations[0], IndexCall::Add { sources, .. } if sources == &vec![fixture.path_of("post.md")]));

    let record = record_for(&fixture, "post.md");
    assert!(record.is_valid);
    assert!(!record.index_ids.is_empty());
    assert_eq!(record.update_time, parse_utc(T1).unwrap());
    assert_eq!(report.ids_created, record.index_ids.len());
}

#[tokio::test]
async fn test_new_invalid_document_is_recorded_only() {
    let fixture = ContentFixture::new();
    fixture.write_doc("draft.md", T1, Some(false), "Not ready yet.");

    let mut manager = manager(&fixture);
    manager.reconcile().await.unwrap();

    assert!(manager.index().mutations().is_empty());
    let record = record_for(&fixture, "draft.md");
    assert!(!record.is_valid);
    assert!(record.index_ids.is_empty());
}

#[tokio::test]
async fn test_updated_document_is_replaced() {
    let fixture = ContentFixture::new();
    fixture.write_doc("post.md", T1, Some(true), "Original text.");

    let mut manager = manager(&fixture);
    manager.reconcile().await.unwrap();
    let old_ids = record_for(&fixture, "post.md").index_ids;

    fixture.write_doc("post.md", T2, Some(true), "Rewritten text.");
    manager.index().clear_calls();
    let report = manager.reconcile().await.unwrap();

    let mutations = manager.index().mutations();
    assert_eq!(mutations.len(), 2);
    assert_eq!(mutations[0], IndexCall::Delete(old_ids.clone()));
    assert!(matches!(&mutations[1], IndexCall::Add { .. }));

    let record = record_for(&fixture, "post.md");
    assert_eq!(record.update_time, parse_utc(T2).unwrap());
    assert!(!record.index_ids.is_empty());
    assert!(record.index_ids.iter().all(|id| !old_ids.contains(id)));
    assert_eq!((report.added, report.deleted), (1, 1));
}

#[tokio::test]
async fn test_validity_toggles_both_ways() {
    let fixture = ContentFixture::new();
    fixture.write_doc("post.md", T1, Some(true), "Body.");

    let mut manager = manager(&fixture);
    manager.reconcile().await.unwrap();
    let ids = record_for(&fixture, "post.md").index_ids;

    fixture.write_doc("post.md", T1, Some(false), "Body.");
    manager.index().clear_calls();
    manager.reconcile().await.unwrap();

    assert_eq!(manager.index().mutations(), vec![IndexCall::Delete(ids)]);
    let hidden = record_for(&fixture, "post.md");
    assert!(!hidden.is_valid);
    assert!(hidden.index_ids.is_empty());

    fixture.write_doc("post.md", T1, Some(true), "Body.");
    manager.index().clear_calls();
    manager.reconcile().await.unwrap();

    let mutations = manager.index().mutations();
    assert_eq!(mutations.len(), 1);
    assert!(matches!(&mutations[0], IndexCall::Add { .. }));
    let shown = record_for(&fixture, "post.md");
    assert!(shown.is_valid);
    assert!(!shown.index_ids.is_empty());
}

#[tokio::test]
async fn test_batch_adds_only_the_new_document() {
    let fixture = ContentFixture::new();
    fixture.write_doc("content01.md", T1, Some(true), "Already indexed.");
    fixture.write_doc("content02.md", T1, Some(true), "Brand new.");

    RecordStore::new(fixture.record_path())
        .save(&[EmbeddingRecord {
            path: fixture.path_of("content01.md"),
            update_time: parse_utc(T1).unwrap(),
            index_ids: vec!["x".to_string()],
            is_valid: true,
        }])
        .unwrap();

    let mut manager = manager(&fixture);
    manager.reconcile().await.unwrap();

    let mutations = manager.index().mutations();
    assert_eq!(mutations.len(), 1);
    assert!(matches!(&mutations[0], IndexCall::Add { sources, .. } if sources[0] == fixture.path_of("content02.md")));

    assert_eq!(record_for(&fixture, "content01.md").index_ids, vec!["x".to_string()]);
    assert!(!record_for(&fixture, "content02.md").index_ids.is_empty());
}

#[tokio::test]
async fn test_failed_add_leaves_record_intact_and_retries() {
    let fixture = ContentFixture::new();
    fixture.write_doc("content01.md", T1, Some(true), "First.");

    let mut manager = manager(&fixture);
    manager.reconcile().await.unwrap();
    let before = fixture.record_text().unwrap();

    fixture.write_doc("content02.md", T1, Some(true), "Second.");
    fixture.write_doc("content03.md", T1, Some(true), "Third.");
    manager.index().fail_add_for(Some("content02.md"));
    manager.index().clear_calls();

    let err = manager.reconcile().await.unwrap_err();
    assert!(matches!(err, AppError::Index(_)));
    assert_eq!(fixture.record_text().unwrap(), before);
    assert_eq!(manager.index().calls().last(), Some(&IndexCall::Persist));
    assert!(manager.index().mutations().is_empty());

    manager.index().fail_add_for(None);
    manager.index().clear_calls();
    let report = manager.reconcile().await.unwrap();

    assert_eq!(report.added, 2);
    assert!(!record_for(&fixture, "content02.md").index_ids.is_empty());
    assert!(!record_for(&fixture, "content03.md").index_ids.is_empty());
}

#[tokio::test]
async fn test_failed_delete_still_persists() {
    let fixture = ContentFixture::new();
    fixture.write_doc("post.md", T1, Some(true), "Body.");

    let mut manager = manager(&fixture);
    manager.reconcile().await.unwrap();
    let before = fixture.record_text().unwrap();

    fixture.write_doc("post.md", T2, Some(true), "New body.");
    manager.index().fail_delete(true);
    manager.index().clear_calls();

    let result = manager.reconcile().await;
    assert!(matches!(result, Err(AppError::Index(_))));
    assert_eq!(manager.index().calls(), vec![IndexCall::Persist]);
    assert_eq!(fixture.record_text().unwrap(), before);
}

#[tokio::test]
async fn test_removed_file_is_purged() {
    let fixture = ContentFixture::new();
    fixture.write_doc("keep.md", T1, Some(true), "Keep me.");
    fixture.write_doc("gone.md", T1, Some(true), "Delete me.");

    let mut manager = manager_with(&fixture, RemovedDocumentPolicy::Purge);
    manager.reconcile().await.unwrap();
    let gone_ids = record_for(&fixture, "gone.md").index_ids;

    fixture.remove_doc("gone.md");
    manager.index().clear_calls();
    let report = manager.reconcile().await.unwrap();

    assert_eq!(manager.index().mutations(), vec![IndexCall::Delete(gone_ids)]);
    assert_eq!(report.removed, 1);
    let records = RecordStore::new(fixture.record_path()).load().unwrap();
    assert_eq!(records.len(), 1);
    assert!(records.contains_key(&fixture.path_of("keep.md")));
}

#[tokio::test]
async fn test_removed_file_is_retained_in_index() {
    let fixture = ContentFixture::new();
    fixture.write_doc("keep.md", T1, Some(true), "Keep me.");
    fixture.write_doc("gone.md", T1, Some(true), "Orphan me.");

    let mut manager = manager_with(&fixture, RemovedDocumentPolicy::Retain);
    manager.reconcile().await.unwrap();

    fixture.remove_doc("gone.md");
    manager.index().clear_calls();
    let report = manager.reconcile().await.unwrap();

    assert!(manager.index().mutations().is_empty());
    assert_eq!(report.removed, 1);
    let records = RecordStore::new(fixture.record_path()).load().unwrap();
    assert!(!records.contains_key(&fixture.path_of("gone.md")));
}

#[tokio::test]
async fn test_corrupt_record_aborts_before_touching_index() {
    let fixture = ContentFixture::new();
    fixture.write_doc("post.md", T1, Some(true), "Body.");
    std::fs::write(fixture.record_path(), "{ not json").unwrap();

    let mut manager = manager(&fixture);
    let result = manager.reconcile().await;

    assert!(matches!(result, Err(AppError::Record(_))));
    assert!(manager.index().calls().is_empty());
    assert_eq!(fixture.record_text().unwrap(), "{ not json");
}

#[tokio::test]
async fn test_preview_does_not_mutate() {
    let fixture = ContentFixture::new();
    fixture.write_doc("post.md", T1, Some(true), "Body.");

    let manager = manager(&fixture);
    let plan = manager.preview().unwrap();

    assert_eq!(plan.to_add.len(), 1);
    assert!(manager.index().calls().is_empty());
    assert!(fixture.record_text().is_none());
}

#[tokio::test]
async fn test_sqlite_index_follows_document_updates() {
    let fixture = ContentFixture::new();
    fixture.write_doc("rust.md", T1, None, "Ownership and borrowing rules in rust.");
    fixture.write_doc("bread.md", T1, None, "Banana bread recipe with walnuts.");

    let index = SqliteIndex::open_in_memory("kb", Arc::new(TrigramProvider::new(128))).unwrap();
    let mut manager =
        ContentManager::new(&fixture.config(RemovedDocumentPolicy::Purge), index).unwrap();

    manager.reconcile().await.unwrap();
    let hits = manager.index().search("borrowing in rust", 1).await.unwrap();
    assert_eq!(hits[0].source(), Some(fixture.path_of("rust.md").as_str()));
    assert_eq!(hits[0].metadata["title"], serde_json::json!("rust.md"));

    let old_ids = record_for(&fixture, "rust.md").index_ids;
    fixture.write_doc("rust.md", T2, None, "Lifetimes in rust explained.");
    manager.reconcile().await.unwrap();

    assert!(!manager.index().contains(&old_ids[0]).unwrap());
    assert_eq!(manager.index().count().unwrap(), 2);
}
