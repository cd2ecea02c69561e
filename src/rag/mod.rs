// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// RAG (Retrieval-Augmented Generation) module
// Turns search results into a bounded, citable context block for a chat turn

pub mod context;
pub mod messages;
pub mod retriever;

pub use context::{
    apply_turn_mode, build_context, pack_context, source_label, AssembledContext,
    ContextAssembler, ContextBlock, ContextConfig, DEFAULT_MAX_CONTEXT_CHARS, DEFAULT_MIN_SCORE,
    DEFAULT_PREAMBLE, DEFAULT_TOP_K, NO_THINK_TAG,
};
pub use messages::{last_user_index, ChatMessage, Role};
pub use retriever::{Augmented, ContextRetriever, SearchBackend};
