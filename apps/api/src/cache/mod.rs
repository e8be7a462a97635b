// Content caches fronting the generative tiers.
// Both follow one pattern: check cache -> on miss, acquire the in-flight
// sentinel, generate from grounding context, persist, return. Topic
// structures and section contents live in disjoint keyspaces (separate
// tables) and are never mutated by more than one logical entity type.

pub mod content;
pub mod handlers;
pub mod inflight;
pub mod keys;
pub mod prompts;
pub mod store;
pub mod structure;

use crate::coverage::resolver::ChunkRef;

/// Stamped on every cache entry. Bump when generation logic changes shape;
/// old entries keep serving until naturally replaced — no wholesale wipes.
pub const CONTENT_VERSION: i32 = 1;

/// Upper bound on grounding chunks concatenated into one context block.
pub const MAX_GROUNDING_CHUNKS: usize = 20;

/// Formats retained retrieval chunks into the SOURCE EXCERPTS block of a
/// generation prompt. Chapter attributions are kept so the model can cite.
pub fn build_context_block(chunks: &[ChunkRef]) -> String {
    if chunks.is_empty() {
        return "(no source excerpts available)".to_string();
    }
    chunks
        .iter()
        .take(MAX_GROUNDING_CHUNKS)
        .map(|c| match &c.chapter {
            Some(chapter) => format!("[{}]\n{}", chapter, c.text),
            None => c.text.clone(),
        })
        .collect::<Vec<_>>()
        .join("\n---\n")
}
