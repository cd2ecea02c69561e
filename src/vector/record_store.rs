// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Positional record table
//!
//! Position `i` here describes vector `i` in the [`super::FlatIndex`]. The
//! table never reorders itself; the store decides every transformation and
//! applies it to both sides.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use super::metadata::Metadata;

/// Current layout of the metadata artifact
pub const METADATA_SCHEMA_VERSION: u32 = 1;

/// Id, text and attributes of one stored vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Columnar on-disk form: one array per field, equal lengths
#[derive(Serialize, Deserialize)]
struct MetadataTable {
    schema_version: u32,
    id: Vec<String>,
    text: Vec<String>,
    metadata: Vec<Metadata>,
}

#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    records: Vec<Record>,
    positions: HashMap<String, usize>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Appends a record; ids are expected to be unique within the table
    pub fn push(&mut self, record: Record) {
        self.positions.insert(record.id.clone(), self.records.len());
        self.records.push(record);
    }

    pub fn get(&self, position: usize) -> Option<&Record> {
        self.records.get(position)
    }

    pub fn position_of(&self, id: &str) -> Option<usize> {
        self.positions.get(id).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.positions.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.iter()
    }

    /// Returns a new table with the records for which `keep` is true, in
    /// their original relative order
    pub fn retain<F>(&self, mut keep: F) -> RecordStore
    where
        F: FnMut(usize, &Record) -> bool,
    {
        let mut kept = RecordStore::new();
        for (position, record) in self.records.iter().enumerate() {
            if keep(position, record) {
                kept.push(record.clone());
            }
        }
        kept
    }

    /// Serializes to the columnar JSON artifact
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        let table = MetadataTable {
            schema_version: METADATA_SCHEMA_VERSION,
            id: self.records.iter().map(|r| r.id.clone()).collect(),
            text: self.records.iter().map(|r| r.text.clone()).collect(),
            metadata: self.records.iter().map(|r| r.metadata.clone()).collect(),
        };
        serde_json::to_vec(&table)
    }

    /// Restores a table from the columnar JSON artifact
    pub fn from_json(bytes: &[u8]) -> Result<Self, String> {
        let table: MetadataTable =
            serde_json::from_slice(bytes).map_err(|e| format!("invalid metadata table: {}", e))?;
        if table.schema_version != METADATA_SCHEMA_VERSION {
            return Err(format!(
                "unsupported metadata schema version {}",
                table.schema_version
            ));
        }
        if table.id.len() != table.text.len() || table.id.len() != table.metadata.len() {
            return Err(format!(
                "column lengths differ: id={}, text={}, metadata={}",
                table.id.len(),
                table.text.len(),
                table.metadata.len()
            ));
        }

        let mut store = RecordStore::new();
        for ((id, text), metadata) in table
            .id
            .into_iter()
            .zip(table.text)
            .zip(table.metadata)
        {
            if store.contains(&id) {
                return Err(format!("duplicate id in metadata table: {}", id));
            }
            store.push(Record { id, text, metadata });
        }
        Ok(store)
    }

    pub async fn read_from(path: &Path) -> Result<Self, String> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
        Self::from_json(&bytes)
    }
}
