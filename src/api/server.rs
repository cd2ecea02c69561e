// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::Result;
use axum::{
    extract::{Json, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::types::{
    ContextRequest, ContextResponse, HealthResponse, ResetResponse, SearchRequest,
    SearchResponse, UpsertRequest, UpsertResponse,
};
use super::ApiError;
use crate::monitoring::PrometheusObserver;
use crate::rag::ContextRetriever;
use crate::vector::VectorStore;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<VectorStore>,
    pub retriever: Arc<ContextRetriever>,
    pub metrics: Option<PrometheusObserver>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        // Store surface
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/upsert", post(upsert_handler))
        .route("/search", post(search_handler))
        .route("/reset", post(reset_handler))
        // Retrieval step for the chat proxy
        .route("/v1/context", post(context_handler))
        // Metrics endpoint
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Serves until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(state);
    tracing::info!("API server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse::from_store(state.store.health().await))
}

async fn version_handler() -> impl IntoResponse {
    Json(crate::version::get_version_info())
}

async fn upsert_handler(
    State(state): State<AppState>,
    Json(request): Json<UpsertRequest>,
) -> Result<Json<UpsertResponse>, ApiError> {
    let outcome = state.store.upsert(request.items).await?;
    Ok(Json(UpsertResponse {
        upserted: outcome.upserted,
        total_items: outcome.total,
    }))
}

async fn search_handler(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    let results = state.store.search(&request.query, request.top_k).await?;
    Ok(Json(SearchResponse { results }))
}

async fn reset_handler(State(state): State<AppState>) -> Result<Json<ResetResponse>, ApiError> {
    let total_items = state.store.reset().await?;
    Ok(Json(ResetResponse {
        message: "All data cleared".to_string(),
        total_items,
    }))
}

async fn context_handler(
    State(state): State<AppState>,
    Json(request): Json<ContextRequest>,
) -> Result<Json<ContextResponse>, ApiError> {
    request.validate()?;
    let augmented = state
        .retriever
        .augment(request.messages, request.thinking)
        .await;
    let context_used = augmented.context.context_used();

    Ok(Json(ContextResponse {
        messages: augmented.context.messages,
        context_used,
        retrieved: augmented.retrieved,
        sources: augmented.context.block.sources,
    }))
}

async fn metrics_handler(State(state): State<AppState>) -> Result<Response, ApiError> {
    let metrics = state
        .metrics
        .as_ref()
        .ok_or_else(|| ApiError::NotFound("Metrics are disabled".to_string()))?;
    let body = metrics
        .render()
        .map_err(|e| ApiError::InternalError(format!("{:#}", e)))?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, metrics.content_type())],
        body,
    )
        .into_response())
}
