// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod errors;
pub mod server;
pub mod types;

pub use errors::{ApiError, ErrorResponse};
pub use server::{router, serve, AppState};
pub use types::{
    ContextRequest, ContextResponse, HealthResponse, ResetResponse, SearchRequest,
    SearchResponse, UpsertRequest, UpsertResponse,
};
