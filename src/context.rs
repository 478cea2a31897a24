//! Composition root (`SPEC_FULL.md` §2 "[AMBIENT] Composition root"):
//! a single [`Context`] owning the pool, the four collections, the
//! three caches, the resilience executor, the embedding provider, the
//! WordNet source, and the shared enrichment rate limiter. Built once
//! at startup by the seeding entrypoint and by the tool-surface
//! bootstrap, then handed around as `Arc<Context>` — the richer
//! analogue of the teacher's `AppState` in `server.rs`, which held
//! only a `Config`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use sqlx::SqlitePool;

use crate::cache::{EmbeddingCache, NameMaps, SearchCache};
use crate::config::Config;
use crate::embedding::{self, EmbeddingProvider};
use crate::enrichment::rate_limiter::RateLimiter;
use crate::ranking::wordnet::{BundledWordNet, DisabledWordNet, WordNetSource};
use crate::ranking::RankingEngine;
use crate::resilience::ResilientExecutor;
use crate::store::catalog::CatalogCollection;
use crate::store::category::CategoryCollection;
use crate::store::chunk::ChunkCollection;
use crate::store::concept::ConceptCollection;

/// Everything a tool handler or the seeding pipeline needs to touch
/// storage, caches, ranking, or an external collaborator, built once
/// and shared by `Arc` reference (`SPEC_FULL.md` §9 "Global state").
pub struct Context {
    pub config: Arc<Config>,
    pub pool: SqlitePool,
    pub catalog: Arc<CatalogCollection>,
    pub chunks: Arc<ChunkCollection>,
    pub concepts: Arc<ConceptCollection>,
    pub categories: Arc<CategoryCollection>,
    pub embedding_cache: Arc<EmbeddingCache>,
    pub search_cache: Arc<SearchCache>,
    pub names: NameMaps,
    pub resilience: Arc<ResilientExecutor>,
    pub embedding_provider: Arc<dyn EmbeddingProvider>,
    pub wordnet: Arc<dyn WordNetSource>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl Context {
    /// Build the composition root: connect the pool, run migrations,
    /// wire every collection/cache/resilience/embedding/wordnet piece,
    /// and rebuild the id↔name maps from what's already on disk.
    pub async fn build(config: Config) -> Result<Self> {
        let pool = crate::db::connect(&config).await?;
        crate::migrate::run_migrations(&config).await?;

        let resilience = Arc::new(ResilientExecutor::new(config.resilience.clone()));

        let catalog = Arc::new(CatalogCollection::new(pool.clone(), resilience.clone()));
        let chunks = Arc::new(ChunkCollection::new(pool.clone(), resilience.clone()));
        let concepts = Arc::new(ConceptCollection::new(pool.clone(), resilience.clone()));
        let categories = Arc::new(CategoryCollection::new(pool.clone(), resilience.clone()));

        let embedding_cache = Arc::new(EmbeddingCache::new(config.cache.embedding_cache_capacity));
        let search_cache = Arc::new(SearchCache::new(
            config.cache.search_cache_capacity,
            config.cache.search_cache_ttl_secs,
        ));

        let names = NameMaps::new();
        names
            .rebuild(&concepts, &categories)
            .await
            .map_err(anyhow::Error::from)?;

        let embedding_provider: Arc<dyn EmbeddingProvider> =
            Arc::from(embedding::create_provider(&config.embedding)?);

        let wordnet: Arc<dyn WordNetSource> = if config.enrichment.with_wordnet {
            Arc::new(BundledWordNet::load())
        } else {
            Arc::new(DisabledWordNet)
        };

        let rate_limiter = Arc::new(RateLimiter::new(Duration::from_millis(
            config.enrichment.min_interval_ms,
        )));

        Ok(Self {
            config: Arc::new(config),
            pool,
            catalog,
            chunks,
            concepts,
            categories,
            embedding_cache,
            search_cache,
            names,
            resilience,
            embedding_provider,
            wordnet,
            rate_limiter,
        })
    }

    /// Borrow a [`RankingEngine`] over the currently-shared
    /// collections and caches. Cheap: every field is an `Arc` clone or
    /// a `Config` clone, no I/O.
    pub fn ranking_engine(&self) -> RankingEngine {
        RankingEngine::new(
            self.catalog.clone(),
            self.chunks.clone(),
            self.concepts.clone(),
            self.embedding_provider.clone(),
            self.wordnet.clone(),
            self.embedding_cache.clone(),
            self.search_cache.clone(),
            self.resilience.clone(),
            (*self.config).clone(),
        )
    }
}
