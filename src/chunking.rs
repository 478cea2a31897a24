//! Paragraph-boundary text chunker.
//!
//! Splits a document's raw text into [`Chunk`]s that respect a
//! configurable `max_tokens` limit, splitting on paragraph boundaries
//! (`\n\n`) to preserve semantic coherence within each chunk. Chunk ids
//! are derived deterministically from the parent catalog id and chunk
//! index (`crate::ids::chunk_id`) so re-chunking identical input is
//! idempotent. Concept fields are left empty here — chunk enrichment
//! (`crate::enrichment::matcher`) fills them in once the parent
//! document's concepts are known.

use crate::ids;
use crate::models::Chunk;

/// Approximate chars-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

/// Split text into chunks on paragraph boundaries, respecting
/// `max_tokens`. Returns chunks with contiguous indices starting at 0.
pub fn chunk_text(catalog_id: u64, text: &str, max_tokens: usize) -> Vec<Chunk> {
    let max_chars = max_tokens * CHARS_PER_TOKEN;

    if text.is_empty() {
        return vec![make_chunk(catalog_id, 0, text)];
    }

    let paragraphs: Vec<&str> = text.split("\n\n").collect();
    let mut chunks = Vec::new();
    let mut current_buf = String::new();
    let mut chunk_index: usize = 0;

    for para in paragraphs {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }

        let would_be = if current_buf.is_empty() {
            trimmed.len()
        } else {
            current_buf.len() + 2 + trimmed.len()
        };

        if would_be > max_chars && !current_buf.is_empty() {
            chunks.push(make_chunk(catalog_id, chunk_index, &current_buf));
            chunk_index += 1;
            current_buf.clear();
        }

        if trimmed.len() > max_chars {
            if !current_buf.is_empty() {
                chunks.push(make_chunk(catalog_id, chunk_index, &current_buf));
                chunk_index += 1;
                current_buf.clear();
            }
            let mut remaining = trimmed;
            while !remaining.is_empty() {
                let split_at = remaining.len().min(max_chars);
                let actual_split = if split_at < remaining.len() {
                    remaining[..split_at]
                        .rfind('\n')
                        .or_else(|| remaining[..split_at].rfind(' '))
                        .map(|pos| pos + 1)
                        .unwrap_or(split_at)
                } else {
                    split_at
                };
                let piece = &remaining[..actual_split];
                chunks.push(make_chunk(catalog_id, chunk_index, piece.trim()));
                chunk_index += 1;
                remaining = &remaining[actual_split..];
            }
        } else {
            if !current_buf.is_empty() {
                current_buf.push_str("\n\n");
            }
            current_buf.push_str(trimmed);
        }
    }

    if !current_buf.is_empty() {
        chunks.push(make_chunk(catalog_id, chunk_index, &current_buf));
    }

    if chunks.is_empty() {
        chunks.push(make_chunk(catalog_id, 0, text.trim()));
    }

    chunks
}

fn make_chunk(catalog_id: u64, index: usize, text: &str) -> Chunk {
    Chunk {
        id: ids::chunk_id(catalog_id, index),
        catalog_id,
        chunk_index: index,
        text: text.to_string(),
        concepts: Vec::new(),
        concept_density: 0.0,
        embedding: Vec::new(),
        page: None,
    }
}
