// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Observability hook for the vector store
//!
//! The store reports request outcomes and sizes through a [`StoreObserver`]
//! handed to it at construction. The prometheus-backed implementation lives in
//! `monitoring`; tests and embedded uses pass [`NoopObserver`].

use std::time::Duration;

/// Store operation being reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Upsert,
    Search,
    Reset,
    Load,
    Persist,
}

impl StoreOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreOp::Upsert => "upsert",
            StoreOp::Search => "search",
            StoreOp::Reset => "reset",
            StoreOp::Load => "load",
            StoreOp::Persist => "persist",
        }
    }
}

/// Request outcome label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Success,
    /// Failed with the given error code
    Error(&'static str),
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Error(code) => code,
        }
    }
}

/// Receives store events; every method defaults to a no-op
pub trait StoreObserver: Send + Sync {
    fn request(&self, _op: StoreOp, _outcome: Outcome, _elapsed: Duration) {}

    /// Records were inserted or replaced
    fn upserted(&self, _count: usize) {}

    /// A search returned `result_count` results
    fn searched(&self, _result_count: usize) {}

    /// Current sizes after a mutation or load
    fn sizes(&self, _index_size: usize, _metadata_size: usize, _dimension: usize) {}
}

/// Observer that drops every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl StoreObserver for NoopObserver {}
