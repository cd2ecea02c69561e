// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Ingestion manifests
//!
//! One JSON line per upserted chunk, written once per run for audit and replay.
//! Nothing reads these back.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::chunker::{Chunk, DEFAULT_LANG};

pub const MANIFEST_SCHEMA_VERSION: u32 = 1;

/// Timestamp layout used in file names and records
const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%SZ";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestRecord {
    pub doc_id: String,
    pub chunk_id: String,
    pub row_hash: String,
    pub embedding_model: String,
    pub dim: usize,
    pub ts: String,
    pub source_uri: String,
    pub page: Option<i64>,
    pub token_count: usize,
    pub lang: String,
    pub schema_version: u32,
}

impl ManifestRecord {
    pub fn from_chunk(chunk: &Chunk, embedding_model: &str, dim: usize, ts: &str) -> Self {
        Self {
            doc_id: chunk.doc_id().unwrap_or_default().to_string(),
            chunk_id: chunk.id.clone(),
            row_hash: chunk.content_hash.clone(),
            embedding_model: embedding_model.to_string(),
            dim,
            ts: ts.to_string(),
            source_uri: chunk.source_uri().unwrap_or_default().to_string(),
            page: chunk.page(),
            token_count: chunk.token_count,
            lang: chunk.lang().unwrap_or(DEFAULT_LANG).to_string(),
            schema_version: MANIFEST_SCHEMA_VERSION,
        }
    }
}

/// `manifest_<YYYYMMDDTHHMMSSZ>.jsonl`
pub fn manifest_file_name(at: DateTime<Utc>) -> String {
    format!("manifest_{}.jsonl", at.format(TIMESTAMP_FORMAT))
}

/// Writes the manifest for `chunks` into `dir` and returns its path
pub async fn write_manifest(
    dir: &Path,
    chunks: &[Chunk],
    embedding_model: &str,
    dim: usize,
    at: DateTime<Utc>,
) -> Result<PathBuf> {
    let ts = at.format(TIMESTAMP_FORMAT).to_string();

    let mut body = String::new();
    for chunk in chunks {
        let record = ManifestRecord::from_chunk(chunk, embedding_model, dim, &ts);
        body.push_str(&serde_json::to_string(&record).context("Failed to encode manifest record")?);
        body.push('\n');
    }

    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create manifest directory {}", dir.display()))?;
    let path = dir.join(manifest_file_name(at));
    tokio::fs::write(&path, body)
        .await
        .with_context(|| format!("Failed to write manifest {}", path.display()))?;

    Ok(path)
}
