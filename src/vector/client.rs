// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use super::store::{SearchResult, StoreHealth, UpsertItem, UpsertOutcome};
use crate::api::types::{HealthResponse, ResetResponse, SearchResponse, UpsertResponse};

/// HTTP client for a running store
pub struct StoreClient {
    client: Client,
    base_url: String,
}

#[derive(Serialize)]
struct UpsertBody<'a> {
    items: &'a [UpsertItem],
}

#[derive(Serialize)]
struct SearchBody<'a> {
    query: &'a str,
    top_k: usize,
}

impl StoreClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let _parsed_url =
            reqwest::Url::parse(base_url).map_err(|e| anyhow!("Invalid URL: {}", e))?;

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn health(&self) -> Result<StoreHealth> {
        let url = format!("{}/health", self.base_url);
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "Health check failed with status: {}",
                response.status()
            ));
        }

        let health = response.json::<HealthResponse>().await?;
        Ok(health.store)
    }

    pub async fn upsert(&self, items: &[UpsertItem]) -> Result<UpsertOutcome> {
        let url = format!("{}/upsert", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&UpsertBody { items })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow!("Upsert failed with status {}: {}", status, error_text));
        }

        let result = response.json::<UpsertResponse>().await?;
        Ok(UpsertOutcome {
            upserted: result.upserted,
            total: result.total_items,
        })
    }

    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchResult>> {
        let url = format!("{}/search", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&SearchBody { query, top_k })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow!("Search failed with status {}: {}", status, error_text));
        }

        let result = response.json::<SearchResponse>().await?;
        Ok(result.results)
    }

    pub async fn reset(&self) -> Result<usize> {
        let url = format!("{}/reset", self.base_url);
        let response = self.client.post(&url).send().await?;

        if !response.status().is_success() {
            return Err(anyhow!("Reset failed with status: {}", response.status()));
        }

        let result = response.json::<ResetResponse>().await?;
        Ok(result.total_items)
    }
}
