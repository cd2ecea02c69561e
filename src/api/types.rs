// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Request and response bodies of the store HTTP API

use serde::{Deserialize, Serialize};

use super::ApiError;
use crate::rag::ChatMessage;
use crate::vector::{SearchResult, StoreHealth, UpsertItem};

/// Request body for POST /upsert
///
/// # Example
/// ```json
/// {
///   "items": [
///     {"id": "doc1#page-0001", "text": "invoice total 42.00 EUR", "metadata": {"page": 1}}
///   ]
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertRequest {
    pub items: Vec<UpsertItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpsertResponse {
    pub upserted: usize,
    pub total_items: usize,
}

/// Request body for POST /search
///
/// `top_k` is clamped to `[1, 50]` by the store rather than rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_top_k() -> usize {
    5
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResetResponse {
    pub message: String,
    pub total_items: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(flatten)]
    pub store: StoreHealth,
    pub version: String,
}

impl HealthResponse {
    pub fn from_store(store: StoreHealth) -> Self {
        Self {
            status: if store.ready { "healthy" } else { "not_ready" }.to_string(),
            store,
            version: crate::version::VERSION.to_string(),
        }
    }
}

/// Request body for POST /v1/context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextRequest {
    pub messages: Vec<ChatMessage>,
    /// Leave the last user turn untagged
    #[serde(default)]
    pub thinking: bool,
}

impl ContextRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.messages.is_empty() {
            return Err(ApiError::ValidationError {
                field: "messages".to_string(),
                message: "messages array must contain at least 1 message".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextResponse {
    pub messages: Vec<ChatMessage>,
    pub context_used: bool,
    /// Results returned by search before the score threshold
    pub retrieved: usize,
    /// Ids of the passages packed into the context
    pub sources: Vec<String>,
}
