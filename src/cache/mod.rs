//! Tiered cache layer (`SPEC_FULL.md` §4.2): embedding cache,
//! search-result cache, and id↔name maps, each a bounded LRU with
//! per-entry TTL (or none, where the spec calls for content-addressed
//! or unbounded caches). Built on `moka`, the same LRU+TTL crate used
//! across the retrieval-adjacent examples in this corpus for
//! analogous "compute once, reuse across requests" caches — the
//! teacher crate has no cache layer of its own to adapt.
//!
//! All three caches are constructed once at startup by the
//! composition root and shared by reference (`SPEC_FULL.md` §9
//! "Global state") — they are fields on [`crate::AppState`]-equivalent
//! structs, not statics.

pub mod embedding_cache;
pub mod name_maps;
pub mod search_cache;

pub use embedding_cache::EmbeddingCache;
pub use name_maps::NameMaps;
pub use search_cache::SearchCache;

use std::sync::atomic::{AtomicU64, Ordering};

/// Hit/miss counters shared by all three cache kinds.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStats {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits() as f64;
        let total = hits + self.misses() as f64;
        if total == 0.0 {
            0.0
        } else {
            hits / total
        }
    }
}
