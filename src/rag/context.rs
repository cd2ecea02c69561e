// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Context assembly for retrieval-augmented chat
//!
//! Search results go through three steps:
//! 1. Relevance gate: results scoring below `min_score` are dropped
//! 2. Packing: results are rendered in order and added while the block stays
//!    within `max_chars`; the first one that does not fit ends the block
//! 3. Splicing: a system message carrying the block is inserted after an
//!    existing leading system message, or prepended
//!
//! Turn-mode tagging runs last, against the final message list.

use crate::vector::{Metadata, MetadataValue, SearchResult};

use super::messages::{last_user_index, ChatMessage, Role};

pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_MIN_SCORE: f32 = 0.5;
pub const DEFAULT_MAX_CONTEXT_CHARS: usize = 4000;

/// Appended to the last user turn when thinking is disabled
pub const NO_THINK_TAG: &str = "/no_think";

pub const DEFAULT_PREAMBLE: &str = "You are a helpful assistant that uses retrieved context to answer. \
If the context is not sufficient, say so and proceed cautiously.\n\n\
You have access to the following context passages. Cite them when relevant.";

/// Metadata keys tried, in order, for the source label
const SOURCE_KEYS: [&str; 3] = ["source", "file", "s3_key"];

#[derive(Debug, Clone, PartialEq)]
pub struct ContextConfig {
    pub top_k: usize,
    pub min_score: f32,
    pub max_chars: usize,
    /// Text placed before the block in the system message
    pub preamble: String,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            min_score: DEFAULT_MIN_SCORE,
            max_chars: DEFAULT_MAX_CONTEXT_CHARS,
            preamble: DEFAULT_PREAMBLE.to_string(),
        }
    }
}

/// Packed, citable passages for one turn
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextBlock {
    pub text: String,
    /// Ids of the results included, in block order
    pub sources: Vec<String>,
}

impl ContextBlock {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Length in characters
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Output of [`ContextAssembler::assemble`]
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledContext {
    pub messages: Vec<ChatMessage>,
    pub block: ContextBlock,
    /// Results that passed the score threshold
    pub relevant: usize,
}

impl AssembledContext {
    pub fn context_used(&self) -> bool {
        !self.block.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ContextAssembler {
    config: ContextConfig,
}

impl ContextAssembler {
    pub fn new(config: ContextConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Results at or above the score threshold, order preserved
    pub fn filter<'a>(&self, results: &'a [SearchResult]) -> Vec<&'a SearchResult> {
        results
            .iter()
            .filter(|r| r.score >= self.config.min_score)
            .collect()
    }

    /// Filters then packs
    pub fn build(&self, results: &[SearchResult]) -> ContextBlock {
        pack_context(self.filter(results), self.config.max_chars)
    }

    /// Inserts the block as a system message; an empty block changes nothing
    pub fn inject(&self, mut messages: Vec<ChatMessage>, block: &ContextBlock) -> Vec<ChatMessage> {
        if block.is_empty() {
            return messages;
        }

        let content = if self.config.preamble.is_empty() {
            block.text.clone()
        } else {
            format!("{}\n\n{}", self.config.preamble, block.text)
        };
        let position = match messages.first() {
            Some(first) if first.role == Role::System => 1,
            _ => 0,
        };
        messages.insert(position, ChatMessage::system(content));
        messages
    }

    /// Filter, pack, splice and tag in one step
    pub fn assemble(
        &self,
        messages: Vec<ChatMessage>,
        results: &[SearchResult],
        thinking: bool,
    ) -> AssembledContext {
        let relevant = self.filter(results);
        let relevant_count = relevant.len();
        let block = pack_context(relevant, self.config.max_chars);

        let mut messages = self.inject(messages, &block);
        apply_turn_mode(&mut messages, thinking);

        AssembledContext {
            messages,
            block,
            relevant: relevant_count,
        }
    }
}

/// Packs results in order into a block of at most `max_chars` characters
///
/// Each result renders as `[i] Source: {label}{ p.{page}}`, the trimmed text
/// and a blank line. Packing stops at the first result that would overflow.
///
/// The budget counts each snippet with its trailing `"\n\n"`, which is then
/// trimmed from the returned block. A last snippet that only fits without that
/// separator is still dropped, so the block can end up to two characters under
/// the budget it could have used.
pub fn pack_context<'a, I>(results: I, max_chars: usize) -> ContextBlock
where
    I: IntoIterator<Item = &'a SearchResult>,
{
    let mut text = String::new();
    let mut sources = Vec::new();
    let mut running = 0;

    for (i, result) in results.into_iter().enumerate() {
        let snippet = render_snippet(i + 1, result);
        let len = snippet.chars().count();
        if running + len > max_chars {
            break;
        }
        text.push_str(&snippet);
        running += len;
        sources.push(result.id.clone());
    }

    let trimmed = text.trim_end().len();
    text.truncate(trimmed);
    ContextBlock { text, sources }
}

/// Packs without a score threshold
pub fn build_context(results: &[SearchResult], max_chars: usize) -> ContextBlock {
    pack_context(results, max_chars)
}

fn render_snippet(number: usize, result: &SearchResult) -> String {
    let page = result
        .metadata
        .get("page")
        .filter(|value| !value.is_null())
        .map(|value| format!(" p.{}", value))
        .unwrap_or_default();
    format!(
        "[{}] Source: {}{}\n{}\n\n",
        number,
        source_label(&result.metadata),
        page,
        result.text.trim()
    )
}

/// First present, non-empty of `source`, `file`, `s3_key`, else `unknown`
pub fn source_label(metadata: &Metadata) -> String {
    SOURCE_KEYS
        .iter()
        .filter_map(|key| metadata.get(*key))
        .find(|value| is_present(value))
        .map(|value| value.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn is_present(value: &MetadataValue) -> bool {
    match value {
        MetadataValue::Null => false,
        MetadataValue::Text(s) => !s.is_empty(),
        _ => true,
    }
}

/// Tags the last user message with [`NO_THINK_TAG`] unless `thinking` is on
/// or the tag is already there
pub fn apply_turn_mode(messages: &mut [ChatMessage], thinking: bool) {
    if thinking {
        return;
    }
    if let Some(index) = last_user_index(messages) {
        let message = &mut messages[index];
        if !message.content.contains(NO_THINK_TAG) {
            message.content = format!("{} {}", message.content.trim_end(), NO_THINK_TAG);
        }
    }
}
