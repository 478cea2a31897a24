//! Concept index construction (`SPEC_FULL.md` §4.5): union all
//! extracted names across documents, assign each a stable type and
//! source set, and derive `chunk_count`/`weight`. Pure and synchronous
//! — embedding the resulting names is the caller's job (it needs the
//! embedding provider and is better done in a batch after this step).

use std::collections::{HashMap, HashSet};

use crate::enrichment::extractor::ExtractionResult;
use crate::enrichment::matcher;
use crate::ids;
use crate::ranking::wordnet::WordNetSource;
use crate::models::{Chunk, Concept, ConceptType};

struct Accumulated {
    display_name: String,
    concept_type: ConceptType,
    sources: HashSet<u64>,
    related_concepts: HashSet<String>,
}

/// Build (unembedded) `Concept` rows from per-document extractions.
///
/// `related_concepts` on each built concept is the union of the
/// `related_concepts` lists from every document that concept appeared
/// in — the extraction contract returns one flat list per document,
/// not one per concept, so this is an approximation of "concepts
/// related to this one" rather than a precise graph.
pub fn build_concept_index(
    extractions: &[(u64, ExtractionResult)],
    chunks_by_doc: &HashMap<u64, Vec<Chunk>>,
    wordnet: &dyn WordNetSource,
    fuzzy_min_ratio: f64,
) -> Vec<Concept> {
    let mut accumulated: HashMap<String, Accumulated> = HashMap::new();

    for (doc_id, extraction) in extractions {
        let mut record = |name: &str, concept_type: ConceptType| {
            let key = ids::normalize_name(name);
            if key.is_empty() {
                return;
            }
            let entry = accumulated.entry(key).or_insert_with(|| Accumulated {
                display_name: name.to_string(),
                concept_type,
                sources: HashSet::new(),
                related_concepts: HashSet::new(),
            });
            entry.sources.insert(*doc_id);
            for related in &extraction.related_concepts {
                entry.related_concepts.insert(related.clone());
            }
        };

        for name in &extraction.primary_concepts {
            record(name, ConceptType::Thematic);
        }
        for name in &extraction.technical_terms {
            record(name, ConceptType::Terminology);
        }
        for name in &extraction.acronyms {
            record(name, ConceptType::Acronym);
        }
    }

    let total_docs = extractions.len().max(1) as f32;
    let all_chunks: Vec<&Chunk> = chunks_by_doc.values().flatten().collect();

    accumulated
        .into_values()
        .map(|acc| {
            let chunk_count = all_chunks
                .iter()
                .filter(|c| matcher::match_tier(&c.text, &acc.display_name, fuzzy_min_ratio).is_some())
                .count() as u32;
            let weight = acc.sources.len() as f32 / total_docs;

            let synonyms = wordnet.synonyms(&acc.display_name, 5);
            let hypernyms = wordnet.hypernyms(&acc.display_name, 5);

            Concept {
                id: ids::concept_id(&acc.display_name),
                name: acc.display_name,
                concept_type: acc.concept_type,
                category_ids: Vec::new(),
                sources: acc.sources.into_iter().collect(),
                related_concepts: acc.related_concepts.into_iter().collect(),
                synonyms,
                hypernyms,
                hyponyms: Vec::new(),
                chunk_count,
                embedding: Vec::new(),
                weight,
            }
        })
        .collect()
}
