// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Retrieval step of a chat turn
//!
//! Searches with the last user message and assembles the result into the
//! conversation. Retrieval never fails the turn: if the search backend errors,
//! the conversation continues without context.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use super::context::{apply_turn_mode, AssembledContext, ContextAssembler, ContextBlock};
use super::messages::{last_user_index, ChatMessage};
use crate::vector::client::StoreClient;
use crate::vector::{SearchResult, VectorStore};

/// Anything that answers similarity queries
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchResult>>;
}

#[async_trait]
impl SearchBackend for VectorStore {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchResult>> {
        Ok(VectorStore::search(self, query, top_k).await?)
    }
}

#[async_trait]
impl SearchBackend for StoreClient {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchResult>> {
        StoreClient::search(self, query, top_k).await
    }
}

/// Result of augmenting one turn
#[derive(Debug, Clone, PartialEq)]
pub struct Augmented {
    pub context: AssembledContext,
    /// Results returned by the backend before filtering
    pub retrieved: usize,
}

pub struct ContextRetriever {
    backend: Arc<dyn SearchBackend>,
    assembler: ContextAssembler,
}

impl ContextRetriever {
    pub fn new(backend: Arc<dyn SearchBackend>, assembler: ContextAssembler) -> Self {
        Self { backend, assembler }
    }

    pub fn assembler(&self) -> &ContextAssembler {
        &self.assembler
    }

    /// Retrieves for the last user message and splices the context in
    pub async fn augment(&self, messages: Vec<ChatMessage>, thinking: bool) -> Augmented {
        let query = last_user_index(&messages)
            .map(|i| messages[i].content.trim().to_string())
            .filter(|q| !q.is_empty());

        let Some(query) = query else {
            let mut messages = messages;
            apply_turn_mode(&mut messages, thinking);
            return Augmented {
                context: AssembledContext {
                    messages,
                    block: ContextBlock::default(),
                    relevant: 0,
                },
                retrieved: 0,
            };
        };

        let results = match self
            .backend
            .search(&query, self.assembler.config().top_k)
            .await
        {
            Ok(results) => results,
            Err(e) => {
                warn!("⚠️  Context retrieval failed, continuing without context: {:#}", e);
                Vec::new()
            }
        };

        let retrieved = results.len();
        let context = self.assembler.assemble(messages, &results, thinking);
        debug!(
            "Retrieved {} results, {} relevant, {} packed ({} chars)",
            retrieved,
            context.relevant,
            context.block.sources.len(),
            context.block.char_len()
        );
        Augmented { context, retrieved }
    }
}
