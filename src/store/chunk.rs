//! `ChunkCollection` — the chunks (passages) table.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, vec_to_blob, vector_score};
use crate::error::{CoreError, CoreResult};
use crate::ids;
use crate::models::Chunk;
use crate::resilience::{Profile, ResilientExecutor};

use super::{from_json, map_sqlx_err, to_json, Collection, DistanceRow, Filter};

pub struct ChunkCollection {
    pool: SqlitePool,
    resilience: Arc<ResilientExecutor>,
}

impl ChunkCollection {
    pub fn new(pool: SqlitePool, resilience: Arc<ResilientExecutor>) -> Self {
        Self { pool, resilience }
    }

    pub async fn get(&self, id: u64) -> CoreResult<Option<Chunk>> {
        self.resilience
            .execute(Profile::Database, "chunk_get", || async {
                let row = sqlx::query(
                    r#"SELECT id, catalog_id, chunk_index, text, concepts_json, concept_density, embedding, page
                       FROM chunks WHERE id = ?1"#,
                )
                .bind(ids::to_hex(id))
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_err)?;

                Ok(row.map(|r| row_to_chunk(&r)))
            })
            .await
    }

    /// All chunks belonging to one document, ordered by `chunk_index`.
    pub async fn by_catalog_id(&self, catalog_id: u64) -> CoreResult<Vec<Chunk>> {
        self.resilience
            .execute(Profile::Database, "chunk_by_catalog_id", || async {
                let rows = sqlx::query(
                    r#"SELECT id, catalog_id, chunk_index, text, concepts_json, concept_density, embedding, page
                       FROM chunks WHERE catalog_id = ?1 ORDER BY chunk_index ASC"#,
                )
                .bind(ids::to_hex(catalog_id))
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_err)?;

                Ok(rows.iter().map(row_to_chunk).collect())
            })
            .await
    }

    /// Chunks whose `concepts` list contains `concept_name`
    /// (case-insensitive), the filter-based lookup the concept-search
    /// correctness rule mandates (`SPEC_FULL.md` §4.4) — never a
    /// vector-similarity search against the concept's own embedding.
    pub async fn containing_concept(&self, concept_name: &str) -> CoreResult<Vec<Chunk>> {
        let all = self.filter_query(&Filter::All, usize::MAX).await?;
        let needle = concept_name.to_lowercase();
        Ok(all
            .into_iter()
            .filter(|c| c.concepts.iter().any(|name| name.to_lowercase() == needle))
            .collect())
    }

    pub async fn find_all(&self) -> CoreResult<Vec<Chunk>> {
        self.filter_query(&Filter::All, usize::MAX).await
    }
}

fn row_to_chunk(row: &sqlx::sqlite::SqliteRow) -> Chunk {
    let id_hex: String = row.get("id");
    let catalog_hex: String = row.get("catalog_id");
    let embedding: Option<Vec<u8>> = row.get("embedding");
    Chunk {
        id: u64::from_str_radix(&id_hex, 16).unwrap_or(0),
        catalog_id: u64::from_str_radix(&catalog_hex, 16).unwrap_or(0),
        chunk_index: row.get::<i64, _>("chunk_index") as usize,
        text: row.get("text"),
        concepts: from_json(row.get::<String, _>("concepts_json").as_str()),
        concept_density: row.get::<f64, _>("concept_density") as f32,
        embedding: embedding.map(|b| blob_to_vec(&b)).unwrap_or_default(),
        page: row.get::<Option<i64>, _>("page").map(|p| p as u32),
    }
}

#[async_trait]
impl Collection for ChunkCollection {
    type Item = Chunk;

    async fn vector_search(
        &self,
        query_vec: &[f32],
        limit: usize,
    ) -> CoreResult<Vec<DistanceRow<Chunk>>> {
        let chunks = self.find_all().await?;
        let mut scored: Vec<DistanceRow<Chunk>> = chunks
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

    async fn filter_query(&self, filter: &Filter, limit: usize) -> CoreResult<Vec<Chunk>> {
        let limit_i64 = if limit == usize::MAX {
            i64::MAX
        } else {
            limit as i64
        };

        match filter {
            Filter::IdEq(id) => return Ok(self.get(*id).await?.into_iter().collect()),
            Filter::CatalogIdEq(catalog_id) => {
                return self.by_catalog_id(*catalog_id).await.map(|mut v| {
                    v.truncate(limit);
                    v
                })
            }
            Filter::SourceEq(_) | Filter::NameEq(_) => {
                return Err(CoreError::validation(
                    "SourceEq/NameEq filters are not meaningful on the chunk collection directly",
                ));
            }
            _ => {}
        }

        let rows = self
            .resilience
            .execute(Profile::Database, "chunk_filter_query", || async {
                let rows = match filter {
                    Filter::All => sqlx::query(
                        r#"SELECT id, catalog_id, chunk_index, text, concepts_json, concept_density, embedding, page
                           FROM chunks LIMIT ?1"#,
                    )
                    .bind(limit_i64)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(map_sqlx_err)?,
                    Filter::IdIn(ids_list) => {
                        let hexes: Vec<String> = ids_list.iter().map(|i| ids::to_hex(*i)).collect();
                        let placeholders = hexes.iter().map(|_| "?").collect::<Vec<_>>().join(",");
                        let sql = format!(
                            r#"SELECT id, catalog_id, chunk_index, text, concepts_json, concept_density, embedding, page
                               FROM chunks WHERE id IN ({placeholders}) LIMIT {limit_i64}"#
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
                            r#"SELECT id, catalog_id, chunk_index, text, concepts_json, concept_density, embedding, page
                               FROM chunks WHERE lower(text) LIKE ?1 LIMIT ?2"#,
                        )
                        .bind(pattern)
                        .bind(limit_i64)
                        .fetch_all(&self.pool)
                        .await
                        .map_err(map_sqlx_err)?
                    }
                    Filter::IdEq(_) | Filter::CatalogIdEq(_) | Filter::SourceEq(_) | Filter::NameEq(_) => {
                        unreachable!("handled before entering the resilience-wrapped query above")
                    }
                };
                Ok(rows)
            })
            .await?;

        Ok(rows.iter().map(row_to_chunk).collect())
    }

    async fn batch_upsert(&self, items: &[Chunk]) -> CoreResult<()> {
        self.resilience
            .execute(Profile::Database, "chunk_batch_upsert", || async {
                let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;

                for chunk in items {
                    let embedding_blob = if chunk.embedding.is_empty() {
                        None
                    } else {
                        Some(vec_to_blob(&chunk.embedding))
                    };

                    sqlx::query(
                        r#"INSERT INTO chunks
                             (id, catalog_id, chunk_index, text, concepts_json, concept_density, embedding, page)
                           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                           ON CONFLICT(id) DO UPDATE SET
                             text = excluded.text,
                             concepts_json = excluded.concepts_json,
                             concept_density = excluded.concept_density,
                             embedding = excluded.embedding,
                             page = excluded.page"#,
                    )
                    .bind(ids::to_hex(chunk.id))
                    .bind(ids::to_hex(chunk.catalog_id))
                    .bind(chunk.chunk_index as i64)
                    .bind(&chunk.text)
                    .bind(to_json(&chunk.concepts))
                    .bind(chunk.concept_density as f64)
                    .bind(embedding_blob)
                    .bind(chunk.page.map(|p| p as i64))
                    .execute(&mut *tx)
                    .await
                    .map_err(map_sqlx_err)?;

                    sqlx::query("DELETE FROM chunks_fts WHERE chunk_id = ?1")
                        .bind(ids::to_hex(chunk.id))
                        .execute(&mut *tx)
                        .await
                        .map_err(map_sqlx_err)?;
                    sqlx::query("INSERT INTO chunks_fts (chunk_id, catalog_id, text) VALUES (?1, ?2, ?3)")
                        .bind(ids::to_hex(chunk.id))
                        .bind(ids::to_hex(chunk.catalog_id))
                        .bind(&chunk.text)
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
            .execute(Profile::Database, "chunk_batch_delete", || async {
                let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;
                for id in ids_list {
                    sqlx::query("DELETE FROM chunks WHERE id = ?1")
                        .bind(ids::to_hex(*id))
                        .execute(&mut *tx)
                        .await
                        .map_err(map_sqlx_err)?;
                    sqlx::query("DELETE FROM chunks_fts WHERE chunk_id = ?1")
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
            .execute(Profile::Database, "chunk_count", || async {
                let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
                    .fetch_one(&self.pool)
                    .await
                    .map_err(map_sqlx_err)?;
                Ok(count as u64)
            })
            .await
    }
}

/// Replace all chunks belonging to one document in a single
/// transaction — used when re-chunking or re-enriching a document so
/// stale chunk rows from a previous, differently-sized chunking pass
/// don't linger.
pub async fn replace_for_catalog(
    pool: &SqlitePool,
    resilience: &ResilientExecutor,
    catalog_id: u64,
    chunks: &[Chunk],
) -> CoreResult<()> {
    resilience
        .execute(Profile::Database, "chunk_replace_for_catalog", || async {
            let mut tx = pool.begin().await.map_err(map_sqlx_err)?;

            sqlx::query("DELETE FROM chunks_fts WHERE catalog_id = ?1")
                .bind(ids::to_hex(catalog_id))
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_err)?;
            sqlx::query("DELETE FROM chunks WHERE catalog_id = ?1")
                .bind(ids::to_hex(catalog_id))
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_err)?;

            for chunk in chunks {
                let embedding_blob = if chunk.embedding.is_empty() {
                    None
                } else {
                    Some(vec_to_blob(&chunk.embedding))
                };
                sqlx::query(
                    r#"INSERT INTO chunks
                         (id, catalog_id, chunk_index, text, concepts_json, concept_density, embedding, page)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
                )
                .bind(ids::to_hex(chunk.id))
                .bind(ids::to_hex(chunk.catalog_id))
                .bind(chunk.chunk_index as i64)
                .bind(&chunk.text)
                .bind(to_json(&chunk.concepts))
                .bind(chunk.concept_density as f64)
                .bind(embedding_blob)
                .bind(chunk.page.map(|p| p as i64))
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_err)?;

                sqlx::query("INSERT INTO chunks_fts (chunk_id, catalog_id, text) VALUES (?1, ?2, ?3)")
                    .bind(ids::to_hex(chunk.id))
                    .bind(ids::to_hex(catalog_id))
                    .bind(&chunk.text)
                    .execute(&mut *tx)
                    .await
                    .map_err(map_sqlx_err)?;
            }

            tx.commit().await.map_err(map_sqlx_err)?;
            Ok(())
        })
        .await
}
