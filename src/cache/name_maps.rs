//! Id↔name maps for concepts and categories: unbounded, no TTL,
//! rebuilt once at startup via `find_all()` on the respective
//! collection and considered authoritative until a reseed flushes
//! them (`SPEC_FULL.md` §4.2). Backed by `dashmap` for wait-free reads
//! under concurrent enrichment workers, the same sharded-map crate the
//! broader corpus reaches for when many tasks read a shared map and
//! writes are comparatively rare.

use dashmap::DashMap;

use crate::ids;
use crate::store::category::CategoryCollection;
use crate::store::concept::ConceptCollection;
use crate::store::Collection;

#[derive(Default)]
pub struct NameMaps {
    concept_name_to_id: DashMap<String, u64>,
    concept_id_to_name: DashMap<u64, String>,
    category_name_to_id: DashMap<String, u64>,
    category_id_to_name: DashMap<u64, String>,
}

impl NameMaps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Populate both maps from storage. Called once at startup and
    /// again after any reseed that may have added or renamed entries.
    pub async fn rebuild(
        &self,
        concepts: &ConceptCollection,
        categories: &CategoryCollection,
    ) -> crate::error::CoreResult<()> {
        self.concept_name_to_id.clear();
        self.concept_id_to_name.clear();
        self.category_name_to_id.clear();
        self.category_id_to_name.clear();

        for concept in concepts.find_all().await? {
            let normalized = ids::normalize_name(&concept.name);
            self.concept_name_to_id.insert(normalized, concept.id);
            self.concept_id_to_name.insert(concept.id, concept.name);
        }

        for category in categories.find_all().await? {
            let normalized = ids::normalize_name(&category.name);
            self.category_name_to_id.insert(normalized, category.id);
            self.category_id_to_name.insert(category.id, category.name);
            for alias in &category.aliases {
                self.category_name_to_id
                    .insert(ids::normalize_name(alias), category.id);
            }
        }

        Ok(())
    }

    pub fn concept_id(&self, name: &str) -> Option<u64> {
        self.concept_name_to_id
            .get(&ids::normalize_name(name))
            .map(|r| *r)
    }

    pub fn concept_name(&self, id: u64) -> Option<String> {
        self.concept_id_to_name.get(&id).map(|r| r.clone())
    }

    pub fn category_id(&self, name: &str) -> Option<u64> {
        self.category_name_to_id
            .get(&ids::normalize_name(name))
            .map(|r| *r)
    }

    pub fn category_name(&self, id: u64) -> Option<String> {
        self.category_id_to_name.get(&id).map(|r| r.clone())
    }

    pub fn concept_count(&self) -> usize {
        self.concept_id_to_name.len()
    }

    pub fn category_count(&self) -> usize {
        self.category_id_to_name.len()
    }

    /// Insert or update a single concept entry without a full rebuild
    /// — used by the enrichment pipeline after extracting a
    /// previously-unseen concept mid-run.
    pub fn upsert_concept(&self, name: &str, id: u64) {
        self.concept_name_to_id
            .insert(ids::normalize_name(name), id);
        self.concept_id_to_name.insert(id, name.to_string());
    }

    pub fn upsert_category(&self, name: &str, id: u64) {
        self.category_name_to_id
            .insert(ids::normalize_name(name), id);
        self.category_id_to_name.insert(id, name.to_string());
    }
}
