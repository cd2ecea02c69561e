// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Page-level chunking
//!
//! One page becomes one chunk. Text is cleaned, chunks shorter than the minimum
//! are dropped, ids are derived from the document id and the 1-based page
//! number, and exact duplicates (by SHA-256 of the cleaned text) are removed
//! keeping the first occurrence.

use sha2::{Digest, Sha256};
use std::collections::HashSet;

use super::source::SourceDocument;
use crate::vector::{Metadata, MetadataValue, UpsertItem};

/// Cleaned chunks shorter than this many characters are dropped
pub const MIN_CHUNK_CHARS: usize = 20;

/// Language tag attached to chunks unless configured otherwise
pub const DEFAULT_LANG: &str = "fr";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkerConfig {
    pub min_chars: usize,
    pub lang: String,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            min_chars: MIN_CHUNK_CHARS,
            lang: DEFAULT_LANG.to_string(),
        }
    }
}

/// A cleaned, identified page ready for upsert
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    /// `doc_id`, `source_uri`, `page`, `lang`
    pub metadata: Metadata,
    /// Hex SHA-256 of `text`
    pub content_hash: String,
    /// Whitespace word count
    pub token_count: usize,
}

impl Chunk {
    pub fn doc_id(&self) -> Option<&str> {
        self.metadata.get("doc_id").and_then(MetadataValue::as_str)
    }

    pub fn source_uri(&self) -> Option<&str> {
        self.metadata.get("source_uri").and_then(MetadataValue::as_str)
    }

    pub fn page(&self) -> Option<i64> {
        self.metadata.get("page").and_then(MetadataValue::as_i64)
    }

    pub fn lang(&self) -> Option<&str> {
        self.metadata.get("lang").and_then(MetadataValue::as_str)
    }

    pub fn to_upsert_item(&self) -> UpsertItem {
        UpsertItem {
            id: self.id.clone(),
            text: self.text.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

/// Turns documents into chunks
#[derive(Debug, Clone, Default)]
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Chunks every page of `document`, deduplicated within the document
    ///
    /// Page numbers count every page, including the ones dropped as too short,
    /// so ids stay stable when a blank page is added or removed elsewhere.
    pub fn chunk_document(&self, document: &SourceDocument) -> Vec<Chunk> {
        let chunks = document
            .pages
            .iter()
            .enumerate()
            .filter_map(|(i, raw)| {
                let page = i + 1;
                let text = clean_text(raw);
                if !is_valid_chunk(&text, self.config.min_chars) {
                    return None;
                }

                let mut metadata = Metadata::new();
                metadata.insert("doc_id".into(), document.doc_id.as_str().into());
                metadata.insert(
                    "source_uri".into(),
                    source_locator(&document.source_uri, page).into(),
                );
                metadata.insert("page".into(), page.into());
                metadata.insert("lang".into(), self.config.lang.as_str().into());

                Some(Chunk {
                    id: chunk_id(&document.doc_id, page),
                    content_hash: content_hash(&text),
                    token_count: estimate_tokens(&text),
                    text,
                    metadata,
                })
            })
            .collect();

        dedupe_chunks(chunks)
    }
}

/// Replaces non-breaking spaces, collapses whitespace runs and trims
pub fn clean_text(raw: &str) -> String {
    raw.replace('\u{a0}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn is_valid_chunk(text: &str, min_chars: usize) -> bool {
    text.chars().count() >= min_chars
}

/// Hex-encoded SHA-256 of the text
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// `{doc_id}#page-{page:04}`
pub fn chunk_id(doc_id: &str, page: usize) -> String {
    format!("{}#page-{:04}", doc_id, page)
}

/// `{source_uri}#page={page}`
pub fn source_locator(source_uri: &str, page: usize) -> String {
    format!("{}#page={}", source_uri, page)
}

pub fn estimate_tokens(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Drops chunks whose content hash was already seen, keeping input order
pub fn dedupe_chunks(chunks: Vec<Chunk>) -> Vec<Chunk> {
    let mut seen = HashSet::with_capacity(chunks.len());
    chunks
        .into_iter()
        .filter(|chunk| seen.insert(chunk.content_hash.clone()))
        .collect()
}
