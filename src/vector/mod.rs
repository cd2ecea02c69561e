// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Vector storage
//!
//! A flat exact inner-product index paired with a positional record table,
//! wrapped by [`VectorStore`] which keeps the two aligned under one lock and
//! persists them side by side.

pub mod client;
pub mod errors;
pub mod flat_index;
pub mod metadata;
pub mod observer;
pub mod record_store;
pub mod store;

pub use client::StoreClient;
pub use errors::StoreError;
pub use flat_index::{inner_product, l2_normalize, FlatIndex, IndexError, Neighbour};
pub use metadata::{metadata_from_json, Metadata, MetadataValue};
pub use observer::{NoopObserver, Outcome, StoreObserver, StoreOp};
pub use record_store::{Record, RecordStore};
pub use store::{
    SearchResult, StoreHealth, StorePaths, UpsertItem, UpsertOutcome, VectorRecord, VectorStore,
    MAX_TOP_K, MIN_TOP_K,
};
