// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Upsert, search and reset behaviour of the vector store

use crate::support::{
    keyword_embedder, open_store, CountingEmbedder, FailingEmbedder, KeywordEmbedder, NanEmbedder,
};
use fabstir_rag_store::vector::{
    l2_normalize, metadata_from_json, StoreError, StorePaths, UpsertItem, VectorStore,
};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test]
async fn test_upsert_then_search_finds_item() {
    let (_dir, store) = open_store(keyword_embedder()).await;

    let outcome = store
        .upsert(vec![UpsertItem::new("doc1#page-0001", "invoice total 42.00 EUR")])
        .await
        .unwrap();
    assert_eq!(outcome.upserted, 1);
    assert_eq!(outcome.total, 1);

    let results = store.search("invoice total", 1).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, "doc1#page-0001");
    assert!(results[0].score > 0.9, "score was {}", results[0].score);
}

#[tokio::test]
async fn test_replace_by_id_keeps_count() {
    let (_dir, store) = open_store(keyword_embedder()).await;

    store.upsert(vec![UpsertItem::new("x", "alpha")]).await.unwrap();
    let outcome = store.upsert(vec![UpsertItem::new("x", "beta")]).await.unwrap();
    assert_eq!(outcome.total, 1);

    let results = store.search("beta", 1).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].text, "beta");

    // The old text is gone for every query
    let results = store.search("alpha", 5).await.unwrap();
    assert!(results.iter().all(|r| r.text != "alpha"));
}

#[tokio::test]
async fn test_replace_updates_metadata() {
    let (_dir, store) = open_store(keyword_embedder()).await;

    let first = metadata_from_json(json!({"page": 1, "source": "a.pdf"}));
    let second = metadata_from_json(json!({"page": 2}));
    store
        .upsert(vec![UpsertItem::new("x", "alpha").with_metadata(first)])
        .await
        .unwrap();
    store
        .upsert(vec![UpsertItem::new("x", "gamma").with_metadata(second.clone())])
        .await
        .unwrap();

    let record = store.get("x").await.unwrap().unwrap();
    assert_eq!(record.text, "gamma");
    assert_eq!(record.metadata, second);
}

#[tokio::test]
async fn test_alignment_after_mixed_operations() {
    let embedder = keyword_embedder();
    let (_dir, store) = open_store(embedder.clone()).await;

    store
        .upsert(vec![
            UpsertItem::new("a", "alpha payment"),
            UpsertItem::new("b", "beta account"),
            UpsertItem::new("c", "gamma refund"),
        ])
        .await
        .unwrap();
    store
        .upsert(vec![
            UpsertItem::new("b", "delta shipping"),
            UpsertItem::new("d", "invoice total"),
        ])
        .await
        .unwrap();
    store.upsert(vec![UpsertItem::new("a", "alpha alpha")]).await.unwrap();

    let entries = store.entries().await.unwrap();
    let health = store.health().await;
    assert_eq!(entries.len(), 4);
    assert_eq!(health.index_size, health.metadata_size);

    for entry in &entries {
        let mut expected = embedder.embed_one(&entry.text);
        l2_normalize(&mut expected);
        for (stored, want) in entry.vector.iter().zip(&expected) {
            assert!((stored - want).abs() < 1e-5, "vector of {} is stale", entry.id);
        }
    }

    // Survivors keep their relative order, replacements go to the end
    let ids: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["c", "b", "d", "a"]);
}

#[tokio::test]
async fn test_duplicate_ids_in_one_batch_keep_last_value() {
    let (_dir, store) = open_store(keyword_embedder()).await;

    let outcome = store
        .upsert(vec![
            UpsertItem::new("x", "alpha"),
            UpsertItem::new("y", "gamma"),
            UpsertItem::new("x", "beta"),
        ])
        .await
        .unwrap();
    assert_eq!(outcome.upserted, 2);
    assert_eq!(outcome.total, 2);
    assert_eq!(store.get("x").await.unwrap().unwrap().text, "beta");
}

#[tokio::test]
async fn test_rebuild_does_not_reembed_survivors() {
    let embedder = Arc::new(CountingEmbedder::new(KeywordEmbedder::new(&["alpha", "beta"])));
    let (_dir, store) = open_store(embedder.clone()).await;

    store
        .upsert(vec![
            UpsertItem::new("a", "alpha"),
            UpsertItem::new("b", "beta"),
            UpsertItem::new("c", "alpha beta"),
        ])
        .await
        .unwrap();
    assert_eq!(embedder.count(), 3);

    store.upsert(vec![UpsertItem::new("b", "beta beta")]).await.unwrap();
    assert_eq!(embedder.count(), 4);
}

#[tokio::test]
async fn test_scores_stay_in_range() {
    let (_dir, store) = open_store(keyword_embedder()).await;

    store
        .upsert(vec![
            UpsertItem::new("1", "invoice total"),
            UpsertItem::new("2", "invoice total"),
            UpsertItem::new("3", "refund shipping"),
            UpsertItem::new("4", "something unrelated entirely"),
        ])
        .await
        .unwrap();

    for query in ["invoice total", "refund", "nothing in common here"] {
        let results = store.search(query, 10).await.unwrap();
        assert_eq!(results.len(), 4);
        for window in results.windows(2) {
            assert!(window[0].score >= window[1].score);
        }
        assert!(results.iter().all(|r| (-1.0..=1.0).contains(&r.score)));
    }

    // Identical text ties on score and keeps insertion order
    let results = store.search("invoice total", 2).await.unwrap();
    assert_eq!(results[0].id, "1");
    assert_eq!(results[1].id, "2");
    assert!((results[0].score - 1.0).abs() < 1e-4);
}

#[tokio::test]
async fn test_search_empty_store_returns_nothing() {
    let (_dir, store) = open_store(keyword_embedder()).await;
    assert!(store.search("invoice", 5).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_blank_item_rejects_batch() {
    let (_dir, store) = open_store(keyword_embedder()).await;

    let err = store
        .upsert(vec![UpsertItem::new("a", "alpha"), UpsertItem::new("b", "   ")])
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidInput(_)));
    assert_eq!(store.health().await.index_size, 0);
}

#[tokio::test]
async fn test_reset_clears_everything() {
    let (_dir, store) = open_store(keyword_embedder()).await;
    store
        .upsert(vec![UpsertItem::new("a", "alpha"), UpsertItem::new("b", "beta")])
        .await
        .unwrap();

    assert_eq!(store.reset().await.unwrap(), 0);
    let health = store.health().await;
    assert_eq!(health.index_size, 0);
    assert_eq!(health.metadata_size, 0);
    assert!(store.search("alpha", 5).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_operations_before_open_are_not_ready() {
    let dir = TempDir::new().unwrap();
    let store = VectorStore::unobserved(StorePaths::in_dir(dir.path()));

    assert!(matches!(
        store.upsert(vec![UpsertItem::new("a", "alpha")]).await,
        Err(StoreError::NotReady)
    ));
    assert!(matches!(store.search("alpha", 1).await, Err(StoreError::NotReady)));
    assert!(matches!(store.reset().await, Err(StoreError::NotReady)));
    assert!(matches!(store.entries().await, Err(StoreError::NotReady)));

    let health = store.health().await;
    assert!(!health.ready);
    assert!(health.model.is_none());
}

#[tokio::test]
async fn test_model_failure_leaves_store_untouched() {
    let dir = TempDir::new().unwrap();
    let store = VectorStore::unobserved(StorePaths::in_dir(dir.path()));
    store
        .open(Arc::new(FailingEmbedder { dimension: 8 }))
        .await
        .unwrap();

    let err = store
        .upsert(vec![UpsertItem::new("a", "alpha")])
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Model(_)));
    assert_eq!(err.error_code(), "MODEL_ERROR");
    assert!(!err.is_retryable());
    assert_eq!(store.health().await.index_size, 0);

    assert!(matches!(
        store.search("alpha", 1).await,
        Err(StoreError::Model(_))
    ));
}

#[tokio::test]
async fn test_non_finite_embedding_is_model_error() {
    let dir = TempDir::new().unwrap();
    let store = VectorStore::unobserved(StorePaths::in_dir(dir.path()));
    store.open(Arc::new(NanEmbedder)).await.unwrap();

    let err = store
        .upsert(vec![UpsertItem::new("a", "alpha")])
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "MODEL_ERROR");
    assert!(!err.is_retryable());
    assert_eq!(store.health().await.index_size, 0);

    let err = store.search("alpha", 1).await.unwrap_err();
    assert_eq!(err.error_code(), "MODEL_ERROR");
}
