// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! HTTP surface of the store

use crate::support::keyword_embedder;
use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use fabstir_rag_store::{
    api::{router, AppState},
    monitoring::PrometheusObserver,
    rag::{ContextAssembler, ContextRetriever},
    vector::{StoreObserver, StorePaths, VectorStore},
};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt; // for `oneshot`

/// Router over a store in a temp dir; `ready` controls whether it is opened
pub async fn setup_app(ready: bool) -> (TempDir, Router) {
    let dir = TempDir::new().unwrap();
    let metrics = PrometheusObserver::new().unwrap();
    let observer: Arc<dyn StoreObserver> = Arc::new(metrics.clone());
    let store = Arc::new(VectorStore::new(StorePaths::in_dir(dir.path()), observer));
    if ready {
        store.open(keyword_embedder()).await.unwrap();
    }

    let retriever = Arc::new(ContextRetriever::new(
        store.clone(),
        ContextAssembler::default(),
    ));
    let state = AppState {
        store,
        retriever,
        metrics: Some(metrics),
    };
    (dir, router(state))
}

pub async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, value)
}

#[tokio::test]
async fn test_health_reports_store_state() {
    let (_dir, app) = setup_app(true).await;
    let (status, body) = send(&app, Method::GET, "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["ready"], true);
    assert_eq!(body["model"], "keyword-test");
    assert_eq!(body["index_size"], 0);
}

#[tokio::test]
async fn test_upsert_then_search() {
    let (_dir, app) = setup_app(true).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/upsert",
        Some(json!({"items": [
            {"id": "doc1#page-0001", "text": "invoice total 42.00 EUR", "metadata": {"page": 1}},
            {"id": "doc2#page-0001", "text": "refund shipping", "metadata": null}
        ]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"upserted": 2, "total_items": 2}));

    let (status, body) = send(
        &app,
        Method::POST,
        "/search",
        Some(json!({"query": "invoice total", "top_k": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["id"], "doc1#page-0001");
    assert_eq!(results[0]["metadata"]["page"], 1);
    assert!(results[0]["score"].as_f64().unwrap() > 0.9);
}

#[tokio::test]
async fn test_oversized_top_k_is_clamped() {
    let (_dir, app) = setup_app(true).await;
    let items: Vec<Value> = (0..60)
        .map(|i| json!({"id": format!("item-{}", i), "text": format!("alpha {}", i)}))
        .collect();
    send(&app, Method::POST, "/upsert", Some(json!({ "items": items }))).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/search",
        Some(json!({"query": "alpha", "top_k": 500})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"].as_array().unwrap().len(), 50);
}

#[tokio::test]
async fn test_empty_batch_and_blank_query() {
    let (_dir, app) = setup_app(true).await;

    let (status, body) = send(&app, Method::POST, "/upsert", Some(json!({"items": []}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["upserted"], 0);

    let (status, body) = send(&app, Method::POST, "/search", Some(json!({"query": "  "}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"], json!([]));
}

#[tokio::test]
async fn test_blank_text_is_bad_request() {
    let (_dir, app) = setup_app(true).await;
    let (status, body) = send(
        &app,
        Method::POST,
        "/upsert",
        Some(json!({"items": [{"id": "a", "text": ""}]})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_type"], "invalid_request");
}

#[tokio::test]
async fn test_not_ready_is_service_unavailable() {
    let (_dir, app) = setup_app(false).await;

    let (status, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "not_ready");

    let (status, body) = send(
        &app,
        Method::POST,
        "/search",
        Some(json!({"query": "invoice"})),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error_type"], "service_unavailable");

    let (status, _) = send(&app, Method::POST, "/reset", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_reset_endpoint() {
    let (_dir, app) = setup_app(true).await;
    send(
        &app,
        Method::POST,
        "/upsert",
        Some(json!({"items": [{"id": "a", "text": "alpha"}]})),
    )
    .await;

    let (status, body) = send(&app, Method::POST, "/reset", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"message": "All data cleared", "total_items": 0}));

    let (_, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(body["index_size"], 0);
}

#[tokio::test]
async fn test_metrics_exposition() {
    let (_dir, app) = setup_app(true).await;
    send(
        &app,
        Method::POST,
        "/upsert",
        Some(json!({"items": [{"id": "a", "text": "alpha"}]})),
    )
    .await;
    send(&app, Method::POST, "/search", Some(json!({"query": "alpha"}))).await;

    let (status, body) = send(&app, Method::GET, "/metrics", None).await;
    assert_eq!(status, StatusCode::OK);
    let text = body.as_str().unwrap();
    assert!(text.contains("rag_store_upserts_total 1"));
    assert!(text.contains("rag_store_search_total 1"));
    assert!(text.contains("rag_store_index_size 1"));
    assert!(text.contains(r#"rag_store_requests_total{endpoint="upsert",status="success"} 1"#));
}

#[tokio::test]
async fn test_version_endpoint() {
    let (_dir, app) = setup_app(false).await;
    let (status, body) = send(&app, Method::GET, "/version", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}
