// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Document ingestion
//!
//! Sources are turned into page chunks, deduplicated by content hash and
//! upserted in batches into a [`ChunkSink`].

pub mod chunker;
pub mod manifest;
pub mod pipeline;
pub mod sink;
pub mod source;

pub use chunker::{
    chunk_id, clean_text, content_hash, dedupe_chunks, estimate_tokens, is_valid_chunk, Chunk,
    Chunker, ChunkerConfig, DEFAULT_LANG, MIN_CHUNK_CHARS,
};
pub use manifest::{write_manifest, ManifestRecord, MANIFEST_SCHEMA_VERSION};
pub use pipeline::{preview, ChunkStats, IngestConfig, IngestPipeline, IngestReport, PreparedBatch};
pub use sink::ChunkSink;
pub use source::{DocumentSource, SourceDocument, TextFileSource};
