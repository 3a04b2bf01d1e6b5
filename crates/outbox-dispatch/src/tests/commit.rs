//! Chunked commits.

use super::harness::{record, FakeStore};
use crate::{CommitMarker, OutboxError, MAX_COMMIT_CHUNK_SIZE};
use std::sync::Arc;

#[tokio::test]
async fn chunks_1300_ids_into_three_updates() {
    let store = Arc::new(FakeStore::with_records((1..=1300).map(record)));
    let marker = CommitMarker::new(store.clone(), 500);
    let ids: Vec<i64> = (1..=1300).collect();

    let marked = marker.mark_processed(&ids).await.unwrap();

    assert_eq!(marked, 1300);
    let sizes: Vec<usize> = store.mark_calls().iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![500, 500, 300]);
    assert_eq!(store.mark_calls().concat(), ids);
}

#[tokio::test]
async fn remarking_is_a_noop() {
    let store = Arc::new(FakeStore::with_records((1..=5).map(record)));
    let marker = CommitMarker::new(store.clone(), 500);

    assert_eq!(marker.mark_processed(&[1, 2, 3]).await.unwrap(), 3);
    assert_eq!(marker.mark_processed(&[1, 2, 3]).await.unwrap(), 0);
    assert_eq!(marker.mark_processed(&[3, 4]).await.unwrap(), 1);
    assert_eq!(store.processed_ids(), vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn empty_ids_issue_no_statement() {
    let store = Arc::new(FakeStore::new());
    let marker = CommitMarker::new(store.clone(), 500);

    assert_eq!(marker.mark_processed(&[]).await.unwrap(), 0);
    assert!(store.mark_calls().is_empty());
}

#[tokio::test]
async fn failing_chunk_reports_committed_rows_and_stops() {
    let store = Arc::new(FakeStore::with_records((1..=25).map(record)));
    let marker = CommitMarker::new(store.clone(), 10);
    store.fail_mark_on_call(2);
    let ids: Vec<i64> = (1..=25).collect();

    let err = marker.mark_processed(&ids).await.unwrap_err();

    match err {
        OutboxError::Commit { committed, .. } => assert_eq!(committed, 10),
        other => panic!("expected commit error, got {other:?}"),
    }
    assert_eq!(store.mark_calls().len(), 2);
    assert_eq!(store.processed_ids(), (1..=10).collect::<Vec<_>>());
}

#[tokio::test]
async fn zero_chunk_size_is_clamped() {
    let store = Arc::new(FakeStore::with_records((1..=2).map(record)));
    let marker = CommitMarker::new(store.clone(), 0);

    assert_eq!(marker.chunk_size(), 1);
    assert_eq!(marker.mark_processed(&[1, 2]).await.unwrap(), 2);
    assert_eq!(store.mark_calls().len(), 2);
}

#[tokio::test]
async fn oversized_chunk_size_is_clamped() {
    let store = Arc::new(FakeStore::new());
    let marker = CommitMarker::new(store, usize::MAX);
    assert_eq!(marker.chunk_size(), MAX_COMMIT_CHUNK_SIZE);
}
