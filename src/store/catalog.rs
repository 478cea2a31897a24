//! `CatalogCollection` — the documents table.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, vec_to_blob, vector_score};
use crate::error::{CoreError, CoreResult};
use crate::ids;
use crate::models::Document;
use crate::resilience::{Profile, ResilientExecutor};

use super::{from_json, map_sqlx_err, to_json, Collection, DistanceRow, Filter};

pub struct CatalogCollection {
    pool: SqlitePool,
    resilience: Arc<ResilientExecutor>,
}

impl CatalogCollection {
    pub fn new(pool: SqlitePool, resilience: Arc<ResilientExecutor>) -> Self {
        Self { pool, resilience }
    }

    pub async fn get(&self, id: u64) -> CoreResult<Option<Document>> {
        self.resilience
            .execute(Profile::Database, "catalog_get", || async {
                let row = sqlx::query(
                    r#"SELECT id, source, title, summary, primary_concepts_json, technical_terms_json,
                              category_ids_json, embedding, ocr_processed, content_hash
                       FROM documents WHERE id = ?1"#,
                )
                .bind(ids::to_hex(id))
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_err)?;

                Ok(row.map(|r| row_to_document(&r)))
            })
            .await
    }

    pub async fn get_by_source(&self, source: &str) -> CoreResult<Option<Document>> {
        self.resilience
            .execute(Profile::Database, "catalog_get_by_source", || async {
                let row = sqlx::query(
                    r#"SELECT id, source, title, summary, primary_concepts_json, technical_terms_json,
                              category_ids_json, embedding, ocr_processed, content_hash
                       FROM documents WHERE source = ?1"#,
                )
                .bind(source)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_err)?;

                Ok(row.map(|r| row_to_document(&r)))
            })
            .await
    }

    pub async fn find_all(&self) -> CoreResult<Vec<Document>> {
        self.filter_query(&Filter::All, usize::MAX).await
    }
}

fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> Document {
    let id_hex: String = row.get("id");
    let embedding: Option<Vec<u8>> = row.get("embedding");
    Document {
        id: u64::from_str_radix(&id_hex, 16).unwrap_or(0),
        source: row.get("source"),
        title: row.get("title"),
        summary: row.get("summary"),
        primary_concepts: from_json(row.get::<String, _>("primary_concepts_json").as_str()),
        technical_terms: from_json(row.get::<String, _>("technical_terms_json").as_str()),
        category_ids: from_json::<Vec<String>>(row.get::<String, _>("category_ids_json").as_str())
            .into_iter()
            .filter_map(|h| u64::from_str_radix(&h, 16).ok())
            .collect(),
        embedding: embedding.map(|b| blob_to_vec(&b)).unwrap_or_default(),
        ocr_processed: row.get::<i64, _>("ocr_processed") != 0,
        content_hash: row.get("content_hash"),
    }
}

fn category_ids_json(ids: &[u64]) -> String {
    to_json(&ids.iter().map(|id| ids::to_hex(*id)).collect::<Vec<_>>())
}

#[async_trait]
impl Collection for CatalogCollection {
    type Item = Document;

    async fn vector_search(
        &self,
        query_vec: &[f32],
        limit: usize,
    ) -> CoreResult<Vec<DistanceRow<Document>>> {
        let docs = self.find_all().await?;
        let mut scored: Vec<DistanceRow<Document>> = docs
            .into_iter()
            .filter(|d| !d.embedding.is_empty())
            .map(|d| {
                let distance = 1.0 - vector_score(query_vec, &d.embedding);
                DistanceRow { item: d, distance }
            })
            .collect();
        scored.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        scored.truncate(limit);
        Ok(scored)
    }

    async fn filter_query(&self, filter: &Filter, limit: usize) -> CoreResult<Vec<Document>> {
        let limit_i64 = if limit == usize::MAX {
            i64::MAX
        } else {
            limit as i64
        };

        match filter {
            Filter::IdEq(id) => return Ok(self.get(*id).await?.into_iter().collect()),
            Filter::SourceEq(source) => {
                return Ok(self.get_by_source(source).await?.into_iter().collect());
            }
            Filter::CatalogIdEq(_) => {
                return Err(CoreError::validation(
                    "CatalogIdEq filter is not meaningful on the catalog collection itself",
                ));
            }
            Filter::NameEq(_) => {
                return Err(CoreError::validation(
                    "NameEq filter is not meaningful on the catalog collection",
                ));
            }
            _ => {}
        }

        let rows = self
            .resilience
            .execute(Profile::Database, "catalog_filter_query", || async {
                let rows = match filter {
                    Filter::All => sqlx::query(
                        r#"SELECT id, source, title, summary, primary_concepts_json, technical_terms_json,
                                  category_ids_json, embedding, ocr_processed, content_hash
                           FROM documents LIMIT ?1"#,
                    )
                    .bind(limit_i64)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(map_sqlx_err)?,
                    Filter::IdIn(ids_list) => {
                        let hexes: Vec<String> = ids_list.iter().map(|i| ids::to_hex(*i)).collect();
                        let placeholders = hexes.iter().map(|_| "?").collect::<Vec<_>>().join(",");
                        let sql = format!(
                            r#"SELECT id, source, title, summary, primary_concepts_json, technical_terms_json,
                                      category_ids_json, embedding, ocr_processed, content_hash
                               FROM documents WHERE id IN ({placeholders}) LIMIT {limit_i64}"#
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
                            r#"SELECT id, source, title, summary, primary_concepts_json, technical_terms_json,
                                      category_ids_json, embedding, ocr_processed, content_hash
                               FROM documents WHERE lower(title) LIKE ?1 OR lower(summary) LIKE ?1
                               LIMIT ?2"#,
                        )
                        .bind(pattern)
                        .bind(limit_i64)
                        .fetch_all(&self.pool)
                        .await
                        .map_err(map_sqlx_err)?
                    }
                    Filter::IdEq(_) | Filter::SourceEq(_) | Filter::CatalogIdEq(_) | Filter::NameEq(_) => {
                        unreachable!("handled before entering the resilience-wrapped query above")
                    }
                };
                Ok(rows)
            })
            .await?;

        Ok(rows.iter().map(row_to_document).collect())
    }

    async fn batch_upsert(&self, items: &[Document]) -> CoreResult<()> {
        self.resilience
            .execute(Profile::Database, "catalog_batch_upsert", || async {
                let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;
                let now = chrono::Utc::now().timestamp();

                for doc in items {
                    let embedding_blob = if doc.embedding.is_empty() {
                        None
                    } else {
                        Some(vec_to_blob(&doc.embedding))
                    };

                    sqlx::query(
                        r#"INSERT INTO documents
                             (id, source, title, summary, primary_concepts_json, technical_terms_json,
                              category_ids_json, embedding, ocr_processed, content_hash, created_at, updated_at)
                           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
                           ON CONFLICT(id) DO UPDATE SET
                             source = excluded.source,
                             title = excluded.title,
                             summary = excluded.summary,
                             primary_concepts_json = excluded.primary_concepts_json,
                             technical_terms_json = excluded.technical_terms_json,
                             category_ids_json = excluded.category_ids_json,
                             embedding = excluded.embedding,
                             ocr_processed = excluded.ocr_processed,
                             content_hash = excluded.content_hash,
                             updated_at = excluded.updated_at"#,
                    )
                    .bind(ids::to_hex(doc.id))
                    .bind(&doc.source)
                    .bind(&doc.title)
                    .bind(&doc.summary)
                    .bind(to_json(&doc.primary_concepts))
                    .bind(to_json(&doc.technical_terms))
                    .bind(category_ids_json(&doc.category_ids))
                    .bind(embedding_blob)
                    .bind(doc.ocr_processed as i64)
                    .bind(&doc.content_hash)
                    .bind(now)
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
            .execute(Profile::Database, "catalog_batch_delete", || async {
                let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;
                for id in ids_list {
                    sqlx::query("DELETE FROM documents WHERE id = ?1")
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
            .execute(Profile::Database, "catalog_count", || async {
                let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
                    .fetch_one(&self.pool)
                    .await
                    .map_err(map_sqlx_err)?;
                Ok(count as u64)
            })
            .await
    }
}
