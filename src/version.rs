// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Version information for the Fabstir RAG store

/// Semantic version number
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date
pub const BUILD_DATE: &str = "2025-11-04";

/// Capabilities of this build
pub const FEATURES: &[&str] = &[
    "flat-inner-product-index",
    "index-format-v1",
    "metadata-schema-v1",
    "content-hash-dedup",
    "context-assembly",
];

/// Get formatted version string for logging
pub fn get_version_string() -> String {
    format!("Fabstir RAG store {} ({})", VERSION, BUILD_DATE)
}

/// Get full version info for API responses
pub fn get_version_info() -> serde_json::Value {
    serde_json::json!({
        "version": VERSION,
        "date": BUILD_DATE,
        "features": FEATURES,
    })
}
