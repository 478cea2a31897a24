//! Core entity types: Document (catalog entry), Chunk (passage),
//! Concept, and Category, plus the scored-result types the ranking
//! engine assembles.
//!
//! These replace the source-connector-oriented `Document`/`Chunk`
//! pair the teacher crate used for a sync pipeline; the shapes below
//! follow the data model in `SPEC_FULL.md` §3 instead.

use serde::{Deserialize, Serialize};

/// A document in the catalog collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: u64,
    pub source: String,
    pub title: String,
    pub summary: String,
    pub primary_concepts: Vec<String>,
    pub technical_terms: Vec<String>,
    pub category_ids: Vec<u64>,
    pub embedding: Vec<f32>,
    pub ocr_processed: bool,
    pub content_hash: String,
}

impl Document {
    /// Union of the concepts and technical terms this document was
    /// extracted with — the candidate set chunk enrichment matches
    /// against (spec.md §4.5).
    pub fn concept_candidates(&self) -> Vec<String> {
        let mut set: Vec<String> = self.primary_concepts.clone();
        for term in &self.technical_terms {
            if !set.iter().any(|c| c.eq_ignore_ascii_case(term)) {
                set.push(term.clone());
            }
        }
        set
    }
}

/// A passage extracted from a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: u64,
    pub catalog_id: u64,
    pub chunk_index: usize,
    pub text: String,
    pub concepts: Vec<String>,
    pub concept_density: f32,
    pub embedding: Vec<f32>,
    pub page: Option<u32>,
}

/// Coarse classification of a concept, per the three-type model
/// (spec.md §9 — the two-type schema in older source material is not
/// followed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConceptType {
    Thematic,
    Terminology,
    Acronym,
}

/// A normalized named idea with sources, related concepts, optional
/// WordNet relations, and an embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Concept {
    pub id: u64,
    pub name: String,
    pub concept_type: ConceptType,
    pub category_ids: Vec<u64>,
    pub sources: Vec<u64>,
    pub related_concepts: Vec<String>,
    pub synonyms: Vec<String>,
    pub hypernyms: Vec<String>,
    pub hyponyms: Vec<String>,
    pub chunk_count: u32,
    pub embedding: Vec<f32>,
    pub weight: f32,
}

/// A coarse domain label organised hierarchically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: u64,
    pub name: String,
    pub aliases: Vec<String>,
    pub parent_id: Option<u64>,
    pub summary: String,
    pub embedding: Vec<f32>,
}

/// Per-signal component scores, suppressed in tool responses unless
/// the caller sets `debug=true` (spec.md §4.4 "score gating").
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ComponentScores {
    pub vector_score: f32,
    pub bm25_score: f32,
    pub title_score: f32,
    pub concept_score: f32,
    pub wordnet_score: f32,
}

/// A single term in the expansion record, carrying the weight it was
/// added with and (when available) which synonym/hypernym source
/// produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpandedTerm {
    pub term: String,
    pub weight: f32,
    pub source: ExpansionSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpansionSource {
    Original,
    ConceptCorpus,
    WordNetSynonym,
    WordNetHypernym,
}

/// A single scored hit from the hybrid ranking engine, generic over
/// operation (catalog/chunk/concept search render different payload
/// shapes on top of this shared scoring envelope).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredResult {
    pub id: u64,
    pub catalog_id: u64,
    pub source: String,
    pub title: Option<String>,
    pub text: String,
    pub concepts: Vec<String>,
    pub concept_density: f32,
    pub page: Option<u32>,
    pub hybrid_score: f32,
    pub scores: Option<ComponentScores>,
}
