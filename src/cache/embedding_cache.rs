//! Embedding cache: `(text_hash, model_name) -> f32[D]`, content
//! addressed so there is no TTL — an embedding for a given text under
//! a given model never changes (`SPEC_FULL.md` §4.2).

use moka::sync::Cache;

use super::CacheStats;

#[derive(Debug, Clone, Hash, Eq, PartialEq)]
struct Key {
    text_hash: u64,
    model: String,
}

pub struct EmbeddingCache {
    cache: Cache<Key, Vec<f32>>,
    stats: CacheStats,
}

impl EmbeddingCache {
    pub fn new(capacity: u64) -> Self {
        Self {
            cache: Cache::new(capacity),
            stats: CacheStats::default(),
        }
    }

    fn key(text: &str, model: &str) -> Key {
        Key {
            text_hash: crate::ids::document_id(text),
            model: model.to_string(),
        }
    }

    pub fn get(&self, text: &str, model: &str) -> Option<Vec<f32>> {
        let hit = self.cache.get(&Self::key(text, model));
        if hit.is_some() {
            self.stats.record_hit();
        } else {
            self.stats.record_miss();
        }
        hit
    }

    pub fn put(&self, text: &str, model: &str, embedding: Vec<f32>) {
        self.cache.insert(Self::key(text, model), embedding);
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}
