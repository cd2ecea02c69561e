// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Persistent vector store
//!
//! [`VectorStore`] owns a [`FlatIndex`] and a [`RecordStore`] whose positions
//! line up one-to-one. Every operation takes the same async mutex, so a search
//! never sees the pair halfway through a rebuild and mutations never overlap.
//!
//! Upserting an id that already exists triggers a rebuild: the surviving
//! vectors are copied into a fresh index (stored vectors are reused, texts are
//! not re-embedded), the new vectors are appended, and both halves are swapped
//! in together. Each successful mutation is persisted before the lock is
//! released.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::errors::StoreError;
use super::flat_index::{l2_normalize, FlatIndex};
use super::metadata::{deserialize_metadata, Metadata};
use super::observer::{NoopObserver, Outcome, StoreObserver, StoreOp};
use super::record_store::{Record, RecordStore};
use crate::embeddings::{validate_batch, Embedder, EmbeddingError};

/// Smallest and largest accepted `top_k`
pub const MIN_TOP_K: usize = 1;
pub const MAX_TOP_K: usize = 50;

pub const INDEX_FILE_NAME: &str = "index.bin";
pub const METADATA_FILE_NAME: &str = "meta.json";

/// Locations of the two persisted artifacts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    pub index: PathBuf,
    pub metadata: PathBuf,
}

impl StorePaths {
    pub fn new(index: impl Into<PathBuf>, metadata: impl Into<PathBuf>) -> Self {
        Self {
            index: index.into(),
            metadata: metadata.into(),
        }
    }

    /// `index.bin` and `meta.json` inside `dir`
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self::new(dir.join(INDEX_FILE_NAME), dir.join(METADATA_FILE_NAME))
    }
}

/// One item of an upsert batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpsertItem {
    pub id: String,
    pub text: String,
    #[serde(default, deserialize_with = "deserialize_metadata")]
    pub metadata: Metadata,
}

impl UpsertItem {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertOutcome {
    /// Distinct ids written by this call
    pub upserted: usize,
    /// Records in the store afterwards
    pub total: usize,
}

/// One search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
    /// Cosine similarity, always within `[-1, 1]`
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreHealth {
    pub ready: bool,
    pub model: Option<String>,
    pub index_size: usize,
    pub metadata_size: usize,
    pub embedding_dim: usize,
}

/// Owned copy of a stored record with its normalized vector
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
    pub vector: Vec<f32>,
}

struct StoreState {
    embedder: Arc<dyn Embedder>,
    dimension: usize,
    index: FlatIndex,
    records: RecordStore,
}

impl StoreState {
    fn health(&self) -> StoreHealth {
        StoreHealth {
            ready: true,
            model: Some(self.embedder.model_name().to_string()),
            index_size: self.index.len(),
            metadata_size: self.records.len(),
            embedding_dim: self.dimension,
        }
    }

    /// Embeds and normalizes a batch, checking it against the store dimension
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut vectors = self.embedder.embed(texts).await?;
        validate_batch(texts.len(), &vectors, self.dimension)?;
        for vector in &mut vectors {
            l2_normalize(vector);
        }
        Ok(vectors)
    }
}

/// Embedding-backed store of aligned vectors and records
pub struct VectorStore {
    paths: StorePaths,
    observer: Arc<dyn StoreObserver>,
    state: Mutex<Option<StoreState>>,
}

impl std::fmt::Debug for VectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStore")
            .field("paths", &self.paths)
            .finish_non_exhaustive()
    }
}

impl VectorStore {
    /// Creates a store that answers `NotReady` until [`VectorStore::open`] runs
    pub fn new(paths: StorePaths, observer: Arc<dyn StoreObserver>) -> Self {
        Self {
            paths,
            observer,
            state: Mutex::new(None),
        }
    }

    /// Store without metrics
    pub fn unobserved(paths: StorePaths) -> Self {
        Self::new(paths, Arc::new(NoopObserver))
    }

    pub fn paths(&self) -> &StorePaths {
        &self.paths
    }

    /// Attaches an embedder and loads persisted artifacts
    ///
    /// The store dimension comes from the embedder. A persisted index of another
    /// dimension, or a pair whose lengths disagree, is discarded with a warning
    /// and the store starts empty. Artifacts that cannot be decoded at all are
    /// reported as [`StoreError::Persistence`].
    pub async fn open(&self, embedder: Arc<dyn Embedder>) -> Result<StoreHealth, StoreError> {
        let started = Instant::now();
        let result = self.open_inner(embedder).await;
        self.observe(StoreOp::Load, &result, started);
        result
    }

    async fn open_inner(&self, embedder: Arc<dyn Embedder>) -> Result<StoreHealth, StoreError> {
        let dimension = embedder.dimension();
        if dimension == 0 {
            return Err(StoreError::Model(EmbeddingError::ModelLoad(format!(
                "embedder '{}' reports a zero dimension",
                embedder.model_name()
            ))));
        }

        let mut guard = self.state.lock().await;
        let (index, records) = self.load_artifacts(dimension).await?;

        let state = StoreState {
            embedder,
            dimension,
            index,
            records,
        };
        let health = state.health();
        *guard = Some(state);

        info!(
            "✅ Vector store ready: model={}, dim={}, items={}",
            health.model.as_deref().unwrap_or("unknown"),
            health.embedding_dim,
            health.index_size
        );
        self.observer
            .sizes(health.index_size, health.metadata_size, health.embedding_dim);
        Ok(health)
    }

    async fn load_artifacts(&self, dimension: usize) -> Result<(FlatIndex, RecordStore), StoreError> {
        let empty = || (FlatIndex::new(dimension), RecordStore::new());
        let has_index = self.paths.index.exists();
        let has_metadata = self.paths.metadata.exists();

        match (has_index, has_metadata) {
            (false, false) => {
                info!("No persisted index at {}, starting empty", self.paths.index.display());
                return Ok(empty());
            }
            (true, false) | (false, true) => {
                warn!(
                    "⚠️  Only one store artifact present (index={}, metadata={}), starting empty",
                    has_index, has_metadata
                );
                return Ok(empty());
            }
            (true, true) => {}
        }

        let index = FlatIndex::read_from(&self.paths.index).await?;
        let records = RecordStore::read_from(&self.paths.metadata)
            .await
            .map_err(StoreError::Persistence)?;

        if index.dimension() != dimension {
            warn!(
                "⚠️  Persisted index has dimension {} but embedder produces {}; discarding {} items and starting empty",
                index.dimension(),
                dimension,
                index.len()
            );
            return Ok(empty());
        }
        if index.len() != records.len() {
            warn!(
                "⚠️  Persisted index holds {} vectors but metadata holds {} records; starting empty",
                index.len(),
                records.len()
            );
            return Ok(empty());
        }

        Ok((index, records))
    }

    /// Inserts new records and replaces existing ones by id
    ///
    /// All texts are embedded in one batch. Ids repeated within `items` keep the
    /// last value at the position of their first occurrence. A blank id or
    /// text rejects the whole batch before anything is embedded.
    pub async fn upsert(&self, items: Vec<UpsertItem>) -> Result<UpsertOutcome, StoreError> {
        let started = Instant::now();
        let result = self.upsert_inner(items).await;
        self.observe(StoreOp::Upsert, &result, started);
        if let Ok(outcome) = &result {
            self.observer.upserted(outcome.upserted);
        }
        result
    }

    async fn upsert_inner(&self, items: Vec<UpsertItem>) -> Result<UpsertOutcome, StoreError> {
        let mut guard = self.state.lock().await;
        let state = guard.as_mut().ok_or(StoreError::NotReady)?;

        if items.is_empty() {
            return Ok(UpsertOutcome {
                upserted: 0,
                total: state.records.len(),
            });
        }

        let items = dedupe_batch(items)?;
        let texts: Vec<String> = items.iter().map(|item| item.text.clone()).collect();
        let vectors = state.embed(&texts).await?;

        let incoming: HashSet<&str> = items.iter().map(|item| item.id.as_str()).collect();
        let replacing = incoming.iter().any(|id| state.records.contains(id));

        if replacing {
            let kept_positions: Vec<bool> = state
                .records
                .iter()
                .map(|record| !incoming.contains(record.id.as_str()))
                .collect();
            let mut index = state
                .index
                .retain(|position| kept_positions.get(position).copied().unwrap_or(false));
            let mut records = state
                .records
                .retain(|position, _| kept_positions[position]);
            debug!(
                "Rebuilding index: {} kept, {} incoming",
                records.len(),
                items.len()
            );

            index.add(&vectors)?;
            for item in &items {
                records.push(to_record(item));
            }
            state.index = index;
            state.records = records;
        } else {
            state.index.add(&vectors)?;
            for item in &items {
                state.records.push(to_record(item));
            }
        }

        let upserted = items.len();
        let total = state.records.len();
        self.observer
            .sizes(state.index.len(), total, state.dimension);

        write_artifacts(&self.paths, &state.index, &state.records).await?;

        info!("Upserted {} items (total {})", upserted, total);
        Ok(UpsertOutcome { upserted, total })
    }

    /// Top-k records by cosine similarity to `query`
    ///
    /// `top_k` is clamped to `[1, 50]`. A blank query returns no results and
    /// does not touch the embedder.
    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchResult>, StoreError> {
        let started = Instant::now();
        let result = self.search_inner(query, top_k).await;
        self.observe(StoreOp::Search, &result, started);
        if let Ok(results) = &result {
            self.observer.searched(results.len());
        }
        result
    }

    async fn search_inner(&self, query: &str, top_k: usize) -> Result<Vec<SearchResult>, StoreError> {
        let guard = self.state.lock().await;
        let state = guard.as_ref().ok_or(StoreError::NotReady)?;

        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let top_k = top_k.clamp(MIN_TOP_K, MAX_TOP_K);

        let mut vectors = state.embed(&[query.to_string()]).await?;
        let query_vector = vectors.pop().ok_or(EmbeddingError::BatchSizeMismatch {
            submitted: 1,
            received: 0,
        })?;
        if state.index.is_empty() {
            return Ok(Vec::new());
        }

        let hits = state.index.search(&query_vector, top_k)?;
        let results = hits
            .into_iter()
            .filter_map(|hit| {
                state.records.get(hit.position).map(|record| SearchResult {
                    id: record.id.clone(),
                    text: record.text.clone(),
                    metadata: record.metadata.clone(),
                    score: hit.score.clamp(-1.0, 1.0),
                })
            })
            .collect();
        Ok(results)
    }

    /// Drops every record and persists the empty store
    pub async fn reset(&self) -> Result<usize, StoreError> {
        let started = Instant::now();
        let result = self.reset_inner().await;
        self.observe(StoreOp::Reset, &result, started);
        result
    }

    async fn reset_inner(&self) -> Result<usize, StoreError> {
        let mut guard = self.state.lock().await;
        let state = guard.as_mut().ok_or(StoreError::NotReady)?;

        let discarded = state.records.len();
        state.index = FlatIndex::new(state.dimension);
        state.records = RecordStore::new();
        self.observer.sizes(0, 0, state.dimension);

        write_artifacts(&self.paths, &state.index, &state.records).await?;
        warn!("Vector store reset, {} items discarded", discarded);
        Ok(0)
    }

    /// Writes both artifacts; used on graceful shutdown
    pub async fn persist(&self) -> Result<(), StoreError> {
        let started = Instant::now();
        let result: Result<(), StoreError> = async {
            let guard = self.state.lock().await;
            let state = guard.as_ref().ok_or(StoreError::NotReady)?;
            write_artifacts(&self.paths, &state.index, &state.records).await
        }
        .await;
        self.observe(StoreOp::Persist, &result, started);
        result
    }

    /// Readiness and sizes; never fails
    pub async fn health(&self) -> StoreHealth {
        let guard = self.state.lock().await;
        match guard.as_ref() {
            Some(state) => state.health(),
            None => StoreHealth {
                ready: false,
                model: None,
                index_size: 0,
                metadata_size: 0,
                embedding_dim: 0,
            },
        }
    }

    /// Copy of the record stored under `id`
    pub async fn get(&self, id: &str) -> Result<Option<VectorRecord>, StoreError> {
        let guard = self.state.lock().await;
        let state = guard.as_ref().ok_or(StoreError::NotReady)?;
        Ok(state
            .records
            .position_of(id)
            .and_then(|position| vector_record(state, position)))
    }

    /// Copies of all records in index order
    pub async fn entries(&self) -> Result<Vec<VectorRecord>, StoreError> {
        let guard = self.state.lock().await;
        let state = guard.as_ref().ok_or(StoreError::NotReady)?;
        Ok((0..state.records.len())
            .filter_map(|position| vector_record(state, position))
            .collect())
    }

    fn observe<T>(&self, op: StoreOp, result: &Result<T, StoreError>, started: Instant) {
        let outcome = match result {
            Ok(_) => Outcome::Success,
            Err(e) => Outcome::Error(e.error_code()),
        };
        self.observer.request(op, outcome, started.elapsed());
    }
}

fn to_record(item: &UpsertItem) -> Record {
    Record {
        id: item.id.clone(),
        text: item.text.clone(),
        metadata: item.metadata.clone(),
    }
}

fn vector_record(state: &StoreState, position: usize) -> Option<VectorRecord> {
    let record = state.records.get(position)?;
    let vector = state.index.vector(position)?;
    Some(VectorRecord {
        id: record.id.clone(),
        text: record.text.clone(),
        metadata: record.metadata.clone(),
        vector: vector.to_vec(),
    })
}

/// Validates a batch and collapses repeated ids
fn dedupe_batch(items: Vec<UpsertItem>) -> Result<Vec<UpsertItem>, StoreError> {
    let mut slots: HashMap<String, usize> = HashMap::with_capacity(items.len());
    let mut unique: Vec<UpsertItem> = Vec::with_capacity(items.len());

    for (i, item) in items.into_iter().enumerate() {
        if item.id.trim().is_empty() {
            return Err(StoreError::InvalidInput(format!("item {} has an empty id", i)));
        }
        if item.text.trim().is_empty() {
            return Err(StoreError::InvalidInput(format!(
                "item '{}' has empty text",
                item.id
            )));
        }
        match slots.get(&item.id) {
            Some(&slot) => unique[slot] = item,
            None => {
                slots.insert(item.id.clone(), unique.len());
                unique.push(item);
            }
        }
    }
    Ok(unique)
}

async fn write_artifacts(
    paths: &StorePaths,
    index: &FlatIndex,
    records: &RecordStore,
) -> Result<(), StoreError> {
    let index_bytes = index.to_bytes()?;
    let metadata_bytes = records
        .to_json()
        .map_err(|e| StoreError::Persistence(format!("failed to encode metadata: {}", e)))?;

    // Index first: a torn pair shows up as a length mismatch on load
    write_replace(&paths.index, &index_bytes).await?;
    write_replace(&paths.metadata, &metadata_bytes).await?;
    Ok(())
}

/// Writes to a sibling temp file and renames it over `path`
async fn write_replace(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let fail = |action: &str, e: std::io::Error| {
        error!("Failed to {} {}: {}", action, path.display(), e);
        StoreError::Persistence(format!("failed to {} {}: {}", action, path.display(), e))
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| fail("create directory for", e))?;
        }
    }

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".to_string());
    let tmp = path.with_file_name(format!(".{}.tmp", file_name));

    tokio::fs::write(&tmp, bytes)
        .await
        .map_err(|e| fail("write", e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| fail("replace", e))?;
    Ok(())
}
