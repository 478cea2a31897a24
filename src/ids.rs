//! Deterministic 64-bit id derivation.
//!
//! All four entities (Document, Chunk, Concept, Category) use ids
//! derived from canonical inputs so re-running extraction yields the
//! same ids. Each id is the first 8 bytes (big-endian) of a SHA-256
//! digest over a versioned, namespaced string — the same technique the
//! source repo uses for chunk/document dedup hashes, just narrowed to
//! a fixed-width integer instead of a full hex digest.

use sha2::{Digest, Sha256};

fn hash_u64(input: &str) -> u64 {
    let digest = Sha256::digest(input.as_bytes());
    u64::from_be_bytes(digest[0..8].try_into().expect("sha256 digest >= 8 bytes"))
}

/// Normalize a concept or category name: lowercase, trim, collapse
/// internal whitespace runs to single spaces.
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

pub fn document_id(source_path: &str) -> u64 {
    hash_u64(&format!("doc:v1:{source_path}"))
}

pub fn chunk_id(catalog_id: u64, chunk_index: usize) -> u64 {
    hash_u64(&format!("chunk:v1:{catalog_id:016x}:{chunk_index}"))
}

pub fn concept_id(name: &str) -> u64 {
    hash_u64(&format!("concept:v1:{}", normalize_name(name)))
}

pub fn category_id(name: &str) -> u64 {
    hash_u64(&format!("category:v1:{}", normalize_name(name)))
}

/// Render an id the way log lines and JSON responses display it: fixed
/// width lowercase hex, stable across platforms.
pub fn to_hex(id: u64) -> String {
    format!("{id:016x}")
}
