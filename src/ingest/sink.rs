// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Upsert targets for the ingestion pipeline
//!
//! Chunks go either straight into an in-process [`VectorStore`] or to a
//! running store over HTTP through [`StoreClient`].

use anyhow::Result;
use async_trait::async_trait;

use crate::vector::client::StoreClient;
use crate::vector::{StoreHealth, UpsertItem, UpsertOutcome, VectorStore};

#[async_trait]
pub trait ChunkSink: Send + Sync {
    /// Where the chunks go, for logs
    fn describe(&self) -> String;

    async fn upsert(&self, items: Vec<UpsertItem>) -> Result<UpsertOutcome>;

    /// Model and dimension recorded in manifests
    async fn health(&self) -> Result<StoreHealth>;
}

#[async_trait]
impl ChunkSink for VectorStore {
    fn describe(&self) -> String {
        format!("local store at {}", self.paths().index.display())
    }

    async fn upsert(&self, items: Vec<UpsertItem>) -> Result<UpsertOutcome> {
        Ok(VectorStore::upsert(self, items).await?)
    }

    async fn health(&self) -> Result<StoreHealth> {
        Ok(VectorStore::health(self).await)
    }
}

#[async_trait]
impl ChunkSink for StoreClient {
    fn describe(&self) -> String {
        self.base_url().to_string()
    }

    async fn upsert(&self, items: Vec<UpsertItem>) -> Result<UpsertOutcome> {
        StoreClient::upsert(self, &items).await
    }

    async fn health(&self) -> Result<StoreHealth> {
        StoreClient::health(self).await
    }
}
