//! Search-result cache: `(query_text, limit, filters_hash) -> list<ScoredResult>`,
//! bounded with a TTL so stale rankings age out after a reseed
//! (`SPEC_FULL.md` §4.2).

use std::time::Duration;

use moka::sync::Cache;

use crate::models::ScoredResult;

use super::CacheStats;

#[derive(Debug, Clone, Hash, Eq, PartialEq)]
struct Key {
    query_text: String,
    limit: i64,
    filters_hash: u64,
}

pub struct SearchCache {
    cache: Cache<Key, Vec<ScoredResult>>,
    stats: CacheStats,
}

impl SearchCache {
    pub fn new(capacity: u64, ttl_secs: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(Duration::from_secs(ttl_secs))
            .build();
        Self {
            cache,
            stats: CacheStats::default(),
        }
    }

    fn key(query_text: &str, limit: i64, filters_hash: u64) -> Key {
        Key {
            query_text: query_text.to_string(),
            limit,
            filters_hash,
        }
    }

    pub fn get(&self, query_text: &str, limit: i64, filters_hash: u64) -> Option<Vec<ScoredResult>> {
        let hit = self.cache.get(&Self::key(query_text, limit, filters_hash));
        if hit.is_some() {
            self.stats.record_hit();
        } else {
            self.stats.record_miss();
        }
        hit
    }

    pub fn put(&self, query_text: &str, limit: i64, filters_hash: u64, results: Vec<ScoredResult>) {
        self.cache
            .insert(Self::key(query_text, limit, filters_hash), results);
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }
}
