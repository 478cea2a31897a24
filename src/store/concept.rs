//! `ConceptCollection` — normalized named ideas with soft edges to
//! related concepts (`SPEC_FULL.md` §3/§9 — cyclic `related_concepts`
//! graphs are stored as name arrays, resolved on demand, not as
//! materialized pointers).

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, vec_to_blob, vector_score};
use crate::error::{CoreError, CoreResult};
use crate::ids;
use crate::models::{Concept, ConceptType};
use crate::resilience::{Profile, ResilientExecutor};

use super::{from_json, map_sqlx_err, to_json, Collection, DistanceRow, Filter};

pub struct ConceptCollection {
    pool: SqlitePool,
    resilience: Arc<ResilientExecutor>,
}

impl ConceptCollection {
    pub fn new(pool: SqlitePool, resilience: Arc<ResilientExecutor>) -> Self {
        Self { pool, resilience }
    }

    pub async fn get(&self, id: u64) -> CoreResult<Option<Concept>> {
        self.resilience
            .execute(Profile::Database, "concept_get", || async {
                let row = sqlx::query(
                    r#"SELECT id, name, concept_type, category_ids_json, sources_json,
                              related_concepts_json, synonyms_json, hypernyms_json, hyponyms_json,
                              chunk_count, embedding, weight
                       FROM concepts WHERE id = ?1"#,
                )
                .bind(ids::to_hex(id))
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_err)?;

                Ok(row.map(|r| row_to_concept(&r)))
            })
            .await
    }

    /// Exact, case-insensitive lookup by normalized name — the primary
    /// concept-search entry point (`SPEC_FULL.md` §4.4).
    pub async fn get_by_name(&self, name: &str) -> CoreResult<Option<Concept>> {
        let normalized = ids::normalize_name(name);
        self.resilience
            .execute(Profile::Database, "concept_get_by_name", || async {
                let row = sqlx::query(
                    r#"SELECT id, name, concept_type, category_ids_json, sources_json,
                              related_concepts_json, synonyms_json, hypernyms_json, hyponyms_json,
                              chunk_count, embedding, weight
                       FROM concepts WHERE lower(name) = ?1"#,
                )
                .bind(normalized.clone())
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_err)?;

                Ok(row.map(|r| row_to_concept(&r)))
            })
            .await
    }

    pub async fn find_all(&self) -> CoreResult<Vec<Concept>> {
        self.filter_query(&Filter::All, usize::MAX).await
    }
}

fn row_to_concept(row: &sqlx::sqlite::SqliteRow) -> Concept {
    let id_hex: String = row.get("id");
    let embedding: Option<Vec<u8>> = row.get("embedding");
    let concept_type_str: String = row.get("concept_type");
    Concept {
        id: u64::from_str_radix(&id_hex, 16).unwrap_or(0),
        name: row.get("name"),
        concept_type: parse_concept_type(&concept_type_str),
        category_ids: from_json::<Vec<String>>(row.get::<String, _>("category_ids_json").as_str())
            .into_iter()
            .filter_map(|h| u64::from_str_radix(&h, 16).ok())
            .collect(),
        sources: from_json::<Vec<String>>(row.get::<String, _>("sources_json").as_str())
            .into_iter()
            .filter_map(|h| u64::from_str_radix(&h, 16).ok())
            .collect(),
        related_concepts: from_json(row.get::<String, _>("related_concepts_json").as_str()),
        synonyms: from_json(row.get::<String, _>("synonyms_json").as_str()),
        hypernyms: from_json(row.get::<String, _>("hypernyms_json").as_str()),
        hyponyms: from_json(row.get::<String, _>("hyponyms_json").as_str()),
        chunk_count: row.get::<i64, _>("chunk_count") as u32,
        embedding: embedding.map(|b| blob_to_vec(&b)).unwrap_or_default(),
        weight: row.get::<f64, _>("weight") as f32,
    }
}

fn parse_concept_type(raw: &str) -> ConceptType {
    match raw {
        "terminology" => ConceptType::Terminology,
        "acronym" => ConceptType::Acronym,
        _ => ConceptType::Thematic,
    }
}

fn concept_type_str(t: ConceptType) -> &'static str {
    match t {
        ConceptType::Thematic => "thematic",
        ConceptType::Terminology => "terminology",
        ConceptType::Acronym => "acronym",
    }
}

fn hex_list(ids_list: &[u64]) -> String {
    to_json(&ids_list.iter().map(|id| ids::to_hex(*id)).collect::<Vec<_>>())
}

#[async_trait]
impl Collection for ConceptCollection {
    type Item = Concept;

    async fn vector_search(
        &self,
        query_vec: &[f32],
        limit: usize,
    ) -> CoreResult<Vec<DistanceRow<Concept>>> {
        let concepts = self.find_all().await?;
        let mut scored: Vec<DistanceRow<Concept>> = concepts
            .into_iter()
            .filter(|c| !c.embedding.is_empty())
            .map(|c| {
                let distance = 1.0 - vector_score(query_vec, &c.embedding);
                DistanceRow { item: c, distance }
            })
            .collect();
        scored.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        scored.truncate(limit);
        Ok(scored)
    }

    async fn filter_query(&self, filter: &Filter, limit: usize) -> CoreResult<Vec<Concept>> {
        let limit_i64 = if limit == usize::MAX {
            i64::MAX
        } else {
            limit as i64
        };

        match filter {
            Filter::IdEq(id) => return Ok(self.get(*id).await?.into_iter().collect()),
            Filter::NameEq(name) => return Ok(self.get_by_name(name).await?.into_iter().collect()),
            Filter::SourceEq(_) => {
                return Err(CoreError::validation(
                    "SourceEq filter is not meaningful on the concept collection",
                ));
            }
            _ => {}
        }

        let rows = self
            .resilience
            .execute(Profile::Database, "concept_filter_query", || async {
                let rows = match filter {
                    Filter::All => sqlx::query(
                        r#"SELECT id, name, concept_type, category_ids_json, sources_json,
                                  related_concepts_json, synonyms_json, hypernyms_json, hyponyms_json,
                                  chunk_count, embedding, weight
                           FROM concepts LIMIT ?1"#,
                    )
                    .bind(limit_i64)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(map_sqlx_err)?,
                    Filter::IdIn(ids_list) => {
                        let hexes: Vec<String> = ids_list.iter().map(|i| ids::to_hex(*i)).collect();
                        let placeholders = hexes.iter().map(|_| "?").collect::<Vec<_>>().join(",");
                        let sql = format!(
                            r#"SELECT id, name, concept_type, category_ids_json, sources_json,
                                      related_concepts_json, synonyms_json, hypernyms_json, hyponyms_json,
                                      chunk_count, embedding, weight
                               FROM concepts WHERE id IN ({placeholders}) LIMIT {limit_i64}"#
                        );
                        let mut q = sqlx::query(&sql);
                        for h in &hexes {
                            q = q.bind(h);
                        }
                        q.fetch_all(&self.pool).await.map_err(map_sqlx_err)?
                    }
                    Filter::TextContains(needle) => {
                        let pattern = format!("%{}%", needle.to_lowercase());
                        sqlx::query(
                            r#"SELECT id, name, concept_type, category_ids_json, sources_json,
                                      related_concepts_json, synonyms_json, hypernyms_json, hyponyms_json,
                                      chunk_count, embedding, weight
                               FROM concepts WHERE lower(name) LIKE ?1 LIMIT ?2"#,
                        )
                        .bind(pattern)
                        .bind(limit_i64)
                        .fetch_all(&self.pool)
                        .await
                        .map_err(map_sqlx_err)?
                    }
                    Filter::CatalogIdEq(catalog_id) => {
                        let hex = ids::to_hex(*catalog_id);
                        let pattern = format!("%\"{hex}\"%");
                        sqlx::query(
                            r#"SELECT id, name, concept_type, category_ids_json, sources_json,
                                      related_concepts_json, synonyms_json, hypernyms_json, hyponyms_json,
                                      chunk_count, embedding, weight
                               FROM concepts WHERE sources_json LIKE ?1 LIMIT ?2"#,
                        )
                        .bind(pattern)
                        .bind(limit_i64)
                        .fetch_all(&self.pool)
                        .await
                        .map_err(map_sqlx_err)?
                    }
                    Filter::IdEq(_) | Filter::NameEq(_) | Filter::SourceEq(_) => unreachable!(
                        "handled before entering the resilience-wrapped query above"
                    ),
                };
                Ok(rows)
            })
            .await?;

        Ok(rows.iter().map(row_to_concept).collect())
    }

    async fn batch_upsert(&self, items: &[Concept]) -> CoreResult<()> {
        self.resilience
            .execute(Profile::Database, "concept_batch_upsert", || async {
                let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;

                for concept in items {
                    let embedding_blob = if concept.embedding.is_empty() {
                        None
                    } else {
                        Some(vec_to_blob(&concept.embedding))
                    };

                    sqlx::query(
                        r#"INSERT INTO concepts
                             (id, name, concept_type, category_ids_json, sources_json,
                              related_concepts_json, synonyms_json, hypernyms_json, hyponyms_json,
                              chunk_count, embedding, weight)
                           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                           ON CONFLICT(id) DO UPDATE SET
                             name = excluded.name,
                             concept_type = excluded.concept_type,
                             category_ids_json = excluded.category_ids_json,
                             sources_json = excluded.sources_json,
                             related_concepts_json = excluded.related_concepts_json,
                             synonyms_json = excluded.synonyms_json,
                             hypernyms_json = excluded.hypernyms_json,
                             hyponyms_json = excluded.hyponyms_json,
                             chunk_count = excluded.chunk_count,
                             embedding = excluded.embedding,
                             weight = excluded.weight"#,
                    )
                    .bind(ids::to_hex(concept.id))
                    .bind(&concept.name)
                    .bind(concept_type_str(concept.concept_type))
                    .bind(hex_list(&concept.category_ids))
                    .bind(hex_list(&concept.sources))
                    .bind(to_json(&concept.related_concepts))
                    .bind(to_json(&concept.synonyms))
                    .bind(to_json(&concept.hypernyms))
                    .bind(to_json(&concept.hyponyms))
                    .bind(concept.chunk_count as i64)
                    .bind(embedding_blob)
                    .bind(concept.weight as f64)
                    .execute(&mut *tx)
                    .await
                    .map_err(map_sqlx_err)?;
                }

                tx.commit().await.map_err(map_sqlx_err)?;
                Ok(())
            })
            .await
    }

    async fn batch_delete(&self, ids_list: &[u64]) -> CoreResult<()> {
        self.resilience
            .execute(Profile::Database, "concept_batch_delete", || async {
                let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;
                for id in ids_list {
                    sqlx::query("DELETE FROM concepts WHERE id = ?1")
                        .bind(ids::to_hex(*id))
                        .execute(&mut *tx)
                        .await
                        .map_err(map_sqlx_err)?;
                }
                tx.commit().await.map_err(map_sqlx_err)?;
                Ok(())
            })
            .await
    }

    async fn count(&self) -> CoreResult<u64> {
        self.resilience
            .execute(Profile::Database, "concept_count", || async {
                let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM concepts")
                    .fetch_one(&self.pool)
                    .await
                    .map_err(map_sqlx_err)?;
                Ok(count as u64)
            })
            .await
    }
}
