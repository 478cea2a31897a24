//! Concept extraction/enrichment pipeline (`SPEC_FULL.md` §4.5): rate
//! limiting, worker-pool extraction, chunk-concept matching, concept
//! index construction, incremental category summaries, and a
//! resumable file checkpoint — composed here, built in the leaf
//! submodules below.

pub mod categories;
pub mod checkpoint;
pub mod concept_index;
pub mod extractor;
pub mod matcher;
pub mod rate_limiter;
pub mod worker_pool;

use crate::models::Chunk;

/// Populate `concepts`/`concept_density` on each chunk by matching it
/// against `candidates` (a document's `concept_candidates()` — primary
/// concepts union technical terms). Re-runnable without touching
/// embeddings, per the spec's "re-enrichable without re-embedding"
/// requirement.
pub fn enrich_chunks(chunks: &mut [Chunk], candidates: &[String], fuzzy_min_ratio: f64) {
    for chunk in chunks {
        let (matched, density) = matcher::match_concepts(&chunk.text, candidates, fuzzy_min_ratio);
        chunk.concepts = matched;
        chunk.concept_density = density;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids;

    #[test]
    fn enrich_chunks_sets_concepts_and_density() {
        let mut chunks = vec![Chunk {
            id: ids::chunk_id(1, 0),
            catalog_id: 1,
            chunk_index: 0,
            text: "a mutex guards the queue".to_string(),
            concepts: Vec::new(),
            concept_density: 0.0,
            embedding: Vec::new(),
            page: None,
        }];
        let candidates = vec!["mutex".to_string(), "unrelated".to_string()];
        enrich_chunks(&mut chunks, &candidates, 0.7);
        assert_eq!(chunks[0].concepts, vec!["mutex".to_string()]);
        assert!((chunks[0].concept_density - 0.5).abs() < 1e-6);
    }
}
