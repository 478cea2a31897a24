//! Hybrid Ranking Engine (`SPEC_FULL.md` §4.4): query normalization
//! and expansion, five-signal scoring, weighted fusion, tie-breaking,
//! and result assembly across the three operation variants
//! (catalog-search, chunk-search, concept-search).

pub mod query;
pub mod scoring;
pub mod wordnet;

use std::sync::Arc;

use crate::cache::{EmbeddingCache, SearchCache};
use crate::config::{Config, RankingConfig};
use crate::embedding::{self, EmbeddingProvider};
use crate::error::{CoreError, CoreResult};
use crate::models::{Chunk, ComponentScores, Document, ExpandedTerm, ScoredResult};
use crate::resilience::ResilientExecutor;
use crate::store::catalog::CatalogCollection;
use crate::store::chunk::ChunkCollection;
use crate::store::concept::ConceptCollection;
use crate::store::Collection;

use wordnet::WordNetSource;

pub struct RankingEngine {
    catalog: Arc<CatalogCollection>,
    chunks: Arc<ChunkCollection>,
    concepts: Arc<ConceptCollection>,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    wordnet: Arc<dyn WordNetSource>,
    embedding_cache: Arc<EmbeddingCache>,
    search_cache: Arc<SearchCache>,
    resilience: Arc<ResilientExecutor>,
    config: Config,
}

impl RankingEngine {
    pub fn new(
        catalog: Arc<CatalogCollection>,
        chunks: Arc<ChunkCollection>,
        concepts: Arc<ConceptCollection>,
        embedding_provider: Arc<dyn EmbeddingProvider>,
        wordnet: Arc<dyn WordNetSource>,
        embedding_cache: Arc<EmbeddingCache>,
        search_cache: Arc<SearchCache>,
        resilience: Arc<ResilientExecutor>,
        config: Config,
    ) -> Self {
        Self {
            catalog,
            chunks,
            concepts,
            embedding_provider,
            wordnet,
            embedding_cache,
            search_cache,
            resilience,
            config,
        }
    }

    fn ranking_config(&self) -> &RankingConfig {
        &self.config.ranking
    }

    fn validate_query(&self, text: &str, limit: i64) -> CoreResult<()> {
        if text.trim().is_empty() {
            return Err(CoreError::validation("query text must not be empty"));
        }
        if limit < 1 {
            return Err(CoreError::validation("limit must be >= 1"));
        }
        Ok(())
    }

    async fn query_embedding(&self, text: &str) -> Vec<f32> {
        if !self.config.embedding.is_enabled() {
            return Vec::new();
        }
        let model = self
            .config
            .embedding
            .model
            .clone()
            .unwrap_or_else(|| "unknown".to_string());
        if let Some(cached) = self.embedding_cache.get(text, &model) {
            return cached;
        }
        match embedding::embed_query(
            self.embedding_provider.as_ref(),
            &self.resilience,
            &self.config.embedding,
            text,
        )
        .await
        {
            Ok(vec) => {
                self.embedding_cache.put(text, &model, vec.clone());
                vec
            }
            Err(_) => Vec::new(),
        }
    }

    async fn expand(&self, original_terms: &[String]) -> Vec<ExpandedTerm> {
        query::expand_terms(
            original_terms,
            &self.concepts,
            self.wordnet.as_ref(),
            self.ranking_config(),
        )
        .await
    }

    fn candidate_limit(&self, row_count: u64, k: usize) -> usize {
        let rc = self.ranking_config();
        if (row_count as usize) <= rc.full_scan_row_limit {
            row_count as usize
        } else {
            rc.candidate_multiplier * k
        }
    }

    fn score_document(
        &self,
        doc: &Document,
        query_embedding: &[f32],
        original_terms: &[String],
        expanded: &[ExpandedTerm],
        candidate_texts: &[&str],
    ) -> ComponentScores {
        let text = format!("{} {}", doc.title, doc.summary);
        ComponentScores {
            vector_score: embedding::vector_score(query_embedding, &doc.embedding),
            bm25_score: scoring::bm25_score(
                &text,
                candidate_texts,
                expanded,
                self.ranking_config().bm25_b,
            ),
            title_score: scoring::title_score(&format!("{} {}", doc.title, doc.source), original_terms),
            concept_score: scoring::concept_score(&doc.concept_candidates(), expanded, original_terms),
            wordnet_score: scoring::wordnet_score(&text, expanded),
        }
    }

    fn score_chunk(
        &self,
        chunk: &Chunk,
        parent_title: &str,
        query_embedding: &[f32],
        original_terms: &[String],
        expanded: &[ExpandedTerm],
        candidate_texts: &[&str],
    ) -> ComponentScores {
        ComponentScores {
            vector_score: embedding::vector_score(query_embedding, &chunk.embedding),
            bm25_score: scoring::bm25_score(
                &chunk.text,
                candidate_texts,
                expanded,
                self.ranking_config().bm25_b,
            ),
            title_score: scoring::title_score(parent_title, original_terms),
            concept_score: scoring::concept_score(&chunk.concepts, expanded, original_terms),
            wordnet_score: scoring::wordnet_score(&chunk.text, expanded),
        }
    }

    fn assemble(
        mut scored: Vec<(f32, ComponentScores, ScoredResult)>,
        limit: usize,
        debug: bool,
    ) -> Vec<ScoredResult> {
        scored.sort_by(|a, b| {
            scoring::tie_break_cmp((a.0, &a.1, a.2.id), (b.0, &b.1, b.2.id))
        });
        scored.truncate(limit);
        scored
            .into_iter()
            .map(|(hybrid, component, mut result)| {
                result.hybrid_score = hybrid;
                result.scores = if debug { Some(component) } else { None };
                result
            })
            .collect()
    }

    /// **catalog-search** — emphasizes `title_score`; same fixed weight
    /// vector applies because documents are title-rich.
    pub async fn catalog_search(
        &self,
        query_text: &str,
        limit: usize,
        debug: bool,
    ) -> CoreResult<(Vec<ScoredResult>, Vec<ExpandedTerm>)> {
        self.validate_query(query_text, limit as i64)?;

        let original_terms = query::normalize_and_tokenize(query_text);
        let expanded = self.expand(&original_terms).await;
        let query_embedding = self.query_embedding(query_text).await;

        let total = self.catalog.count().await?;
        let m = self.candidate_limit(total, limit);

        let candidates: Vec<Document> = if query_embedding.is_empty() {
            self.catalog
                .filter_query(&crate::store::Filter::All, m)
                .await?
        } else {
            self.catalog
                .vector_search(&query_embedding, m)
                .await?
                .into_iter()
                .map(|row| row.item)
                .collect()
        };

        let texts: Vec<String> = candidates
            .iter()
            .map(|d| format!("{} {}", d.title, d.summary))
            .collect();
        let text_refs: Vec<&str> = texts.iter().map(|s| s.as_str()).collect();

        let mut scored = Vec::with_capacity(candidates.len());
        for doc in &candidates {
            let component = self.score_document(
                doc,
                &query_embedding,
                &original_terms,
                &expanded,
                &text_refs,
            );
            let hybrid = scoring::fuse(component, self.ranking_config());
            let result = ScoredResult {
                id: doc.id,
                catalog_id: doc.id,
                source: doc.source.clone(),
                title: Some(doc.title.clone()),
                text: doc.summary.clone(),
                concepts: doc.concept_candidates(),
                concept_density: 0.0,
                page: None,
                hybrid_score: 0.0,
                scores: None,
            };
            scored.push((hybrid, component, result));
        }

        Ok((Self::assemble(scored, limit, debug), expanded))
    }

    /// **chunk-search** (`broad_chunks_search`) — runs over the chunk
    /// collection; `title` is derived from the chunk's parent document.
    pub async fn chunk_search(
        &self,
        query_text: &str,
        limit: usize,
        debug: bool,
        restrict_source: Option<&str>,
    ) -> CoreResult<(Vec<ScoredResult>, Vec<ExpandedTerm>)> {
        self.validate_query(query_text, limit as i64)?;

        let original_terms = query::normalize_and_tokenize(query_text);
        let expanded = self.expand(&original_terms).await;
        let query_embedding = self.query_embedding(query_text).await;

        let candidates: Vec<Chunk> = if let Some(source) = restrict_source {
            let doc = self
                .catalog
                .get_by_source(source)
                .await?
                .ok_or_else(|| CoreError::not_found(format!("source not found: {source}")))?;
            self.chunks.by_catalog_id(doc.id).await?
        } else {
            let total = self.chunks.count().await?;
            let m = self.candidate_limit(total, limit);
            if query_embedding.is_empty() {
                self.chunks.filter_query(&crate::store::Filter::All, m).await?
            } else {
                self.chunks
                    .vector_search(&query_embedding, m)
                    .await?
                    .into_iter()
                    .map(|row| row.item)
                    .collect()
            }
        };

        let texts: Vec<&str> = candidates.iter().map(|c| c.text.as_str()).collect();

        let mut scored = Vec::with_capacity(candidates.len());
        for chunk in &candidates {
            let parent_title = self
                .catalog
                .get(chunk.catalog_id)
                .await?
                .map(|d| d.title)
                .unwrap_or_default();

            let component = self.score_chunk(
                chunk,
                &parent_title,
                &query_embedding,
                &original_terms,
                &expanded,
                &texts,
            );
            let hybrid = scoring::fuse(component, self.ranking_config());
            let result = ScoredResult {
                id: chunk.id,
                catalog_id: chunk.catalog_id,
                source: parent_title.clone(),
                title: Some(parent_title),
                text: chunk.text.clone(),
                concepts: chunk.concepts.clone(),
                concept_density: chunk.concept_density,
                page: chunk.page,
                hybrid_score: 0.0,
                scores: None,
            };
            scored.push((hybrid, component, result));
        }

        Ok((Self::assemble(scored, limit, debug), expanded))
    }

    /// **concept-search** — direct filter-based lookup, never a
    /// vector-similarity search against the concept's own embedding
    /// (`SPEC_FULL.md` §4.4 "Concept-search correctness rule").
    pub async fn concept_search(
        &self,
        concept_query: &str,
        limit: usize,
        debug: bool,
    ) -> CoreResult<(Vec<ScoredResult>, usize, Vec<ExpandedTerm>)> {
        self.validate_query(concept_query, limit as i64)?;

        let original_terms = query::normalize_and_tokenize(concept_query);
        let expanded = self.expand(&original_terms).await;
        let query_embedding = self.query_embedding(concept_query).await;

        let resolved_name = self.resolve_concept_name(concept_query, &query_embedding).await?;

        let Some(name) = resolved_name else {
            return Ok((Vec::new(), 0, expanded));
        };

        let mut matching_chunks = self.chunks.containing_concept(&name).await?;
        let total_chunks_found = matching_chunks.len();

        // Secondary re-rank within the filtered set: concept_density
        // desc, then vector similarity to the query.
        matching_chunks.sort_by(|a, b| {
            b.concept_density
                .total_cmp(&a.concept_density)
                .then_with(|| {
                    let sa = embedding::vector_score(&query_embedding, &a.embedding);
                    let sb = embedding::vector_score(&query_embedding, &b.embedding);
                    sb.total_cmp(&sa)
                })
        });

        let texts: Vec<&str> = matching_chunks.iter().map(|c| c.text.as_str()).collect();
        let mut scored = Vec::with_capacity(matching_chunks.len());
        for chunk in &matching_chunks {
            let parent_title = self
                .catalog
                .get(chunk.catalog_id)
                .await?
                .map(|d| d.title)
                .unwrap_or_default();
            let component = self.score_chunk(
                chunk,
                &parent_title,
                &query_embedding,
                &original_terms,
                &expanded,
                &texts,
            );
            let hybrid = scoring::fuse(component, self.ranking_config());
            let result = ScoredResult {
                id: chunk.id,
                catalog_id: chunk.catalog_id,
                source: parent_title.clone(),
                title: Some(parent_title),
                text: chunk.text.clone(),
                concepts: chunk.concepts.clone(),
                concept_density: chunk.concept_density,
                page: chunk.page,
                hybrid_score: 0.0,
                scores: None,
            };
            scored.push((hybrid, component, result));
        }

        // Preserve the concept_density-then-vector ordering rather than
        // re-sorting by hybrid score — the correctness rule in
        // SPEC_FULL.md binds concept-search's primary order.
        scored.truncate(limit);
        let results = scored
            .into_iter()
            .map(|(hybrid, component, mut result)| {
                result.hybrid_score = hybrid;
                result.scores = if debug { Some(component) } else { None };
                result
            })
            .collect();

        Ok((results, total_chunks_found, expanded))
    }

    async fn resolve_concept_name(
        &self,
        concept_query: &str,
        query_embedding: &[f32],
    ) -> CoreResult<Option<String>> {
        if let Some(concept) = self.concepts.get_by_name(concept_query).await? {
            return Ok(Some(concept.name));
        }

        let fuzzy = self
            .concepts
            .filter_query(&crate::store::Filter::TextContains(concept_query.to_string()), 1)
            .await?;
        if let Some(concept) = fuzzy.into_iter().next() {
            return Ok(Some(concept.name));
        }

        if query_embedding.is_empty() {
            return Ok(None);
        }

        let nearest = self.concepts.vector_search(query_embedding, 1).await?;
        Ok(nearest.into_iter().next().map(|row| row.item.name))
    }
}
