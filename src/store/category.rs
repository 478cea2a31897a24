//! `CategoryCollection` — the coarse domain taxonomy.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, vec_to_blob, vector_score};
use crate::error::{CoreError, CoreResult};
use crate::ids;
use crate::models::Category;
use crate::resilience::{Profile, ResilientExecutor};

use super::{from_json, map_sqlx_err, to_json, Collection, DistanceRow, Filter};

pub struct CategoryCollection {
    pool: SqlitePool,
    resilience: Arc<ResilientExecutor>,
}

impl CategoryCollection {
    pub fn new(pool: SqlitePool, resilience: Arc<ResilientExecutor>) -> Self {
        Self { pool, resilience }
    }

    pub async fn get(&self, id: u64) -> CoreResult<Option<Category>> {
        self.resilience
            .execute(Profile::Database, "category_get", || async {
                let row = sqlx::query(
                    "SELECT id, name, aliases_json, parent_id, summary, embedding FROM categories WHERE id = ?1",
                )
                .bind(ids::to_hex(id))
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_err)?;

                Ok(row.map(|r| row_to_category(&r)))
            })
            .await
    }

    /// Resolve by canonical name or any alias, case-insensitive.
    pub async fn get_by_name(&self, name: &str) -> CoreResult<Option<Category>> {
        let normalized = ids::normalize_name(name);
        self.resilience
            .execute(Profile::Database, "category_get_by_name", || async {
                let row = sqlx::query(
                    "SELECT id, name, aliases_json, parent_id, summary, embedding FROM categories WHERE lower(name) = ?1",
                )
                .bind(&normalized)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_err)?;

                if let Some(r) = row {
                    return Ok(Some(row_to_category(&r)));
                }

                let pattern = format!("%\"{normalized}\"%");
                let row = sqlx::query(
                    "SELECT id, name, aliases_json, parent_id, summary, embedding FROM categories WHERE lower(aliases_json) LIKE ?1",
                )
                .bind(pattern)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_err)?;

                Ok(row.map(|r| row_to_category(&r)))
            })
            .await
    }

    pub async fn find_all(&self) -> CoreResult<Vec<Category>> {
        self.filter_query(&Filter::All, usize::MAX).await
    }
}

fn row_to_category(row: &sqlx::sqlite::SqliteRow) -> Category {
    let id_hex: String = row.get("id");
    let embedding: Option<Vec<u8>> = row.get("embedding");
    let parent_hex: Option<String> = row.get("parent_id");
    Category {
        id: u64::from_str_radix(&id_hex, 16).unwrap_or(0),
        name: row.get("name"),
        aliases: from_json(row.get::<String, _>("aliases_json").as_str()),
        parent_id: parent_hex.and_then(|h| u64::from_str_radix(&h, 16).ok()),
        summary: row.get("summary"),
        embedding: embedding.map(|b| blob_to_vec(&b)).unwrap_or_default(),
    }
}

#[async_trait]
impl Collection for CategoryCollection {
    type Item = Category;

    async fn vector_search(
        &self,
        query_vec: &[f32],
        limit: usize,
    ) -> CoreResult<Vec<DistanceRow<Category>>> {
        let categories = self.find_all().await?;
        let mut scored: Vec<DistanceRow<Category>> = categories
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

    async fn filter_query(&self, filter: &Filter, limit: usize) -> CoreResult<Vec<Category>> {
        let limit_i64 = if limit == usize::MAX {
            i64::MAX
        } else {
            limit as i64
        };

        match filter {
            Filter::IdEq(id) => return Ok(self.get(*id).await?.into_iter().collect()),
            Filter::NameEq(name) => return Ok(self.get_by_name(name).await?.into_iter().collect()),
            Filter::CatalogIdEq(_) | Filter::SourceEq(_) => {
                return Err(CoreError::validation(
                    "CatalogIdEq/SourceEq filters are not meaningful on the category collection",
                ));
            }
            _ => {}
        }

        let rows = self
            .resilience
            .execute(Profile::Database, "category_filter_query", || async {
                let rows = match filter {
                    Filter::All => sqlx::query(
                        "SELECT id, name, aliases_json, parent_id, summary, embedding FROM categories LIMIT ?1",
                    )
                    .bind(limit_i64)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(map_sqlx_err)?,
                    Filter::IdIn(ids_list) => {
                        let hexes: Vec<String> = ids_list.iter().map(|i| ids::to_hex(*i)).collect();
                        let placeholders = hexes.iter().map(|_| "?").collect::<Vec<_>>().join(",");
                        let sql = format!(
                            "SELECT id, name, aliases_json, parent_id, summary, embedding FROM categories WHERE id IN ({placeholders}) LIMIT {limit_i64}"
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
                            "SELECT id, name, aliases_json, parent_id, summary, embedding FROM categories WHERE lower(name) LIKE ?1 LIMIT ?2",
                        )
                        .bind(pattern)
                        .bind(limit_i64)
                        .fetch_all(&self.pool)
                        .await
                        .map_err(map_sqlx_err)?
                    }
                    Filter::IdEq(_) | Filter::NameEq(_) | Filter::CatalogIdEq(_) | Filter::SourceEq(_) => {
                        unreachable!("handled before entering the resilience-wrapped query above")
                    }
                };
                Ok(rows)
            })
            .await?;

        Ok(rows.iter().map(row_to_category).collect())
    }

    async fn batch_upsert(&self, items: &[Category]) -> CoreResult<()> {
        self.resilience
            .execute(Profile::Database, "category_batch_upsert", || async {
                let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;

                for category in items {
                    let embedding_blob = if category.embedding.is_empty() {
                        None
                    } else {
                        Some(vec_to_blob(&category.embedding))
                    };

                    sqlx::query(
                        r#"INSERT INTO categories (id, name, aliases_json, parent_id, summary, embedding)
                           VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                           ON CONFLICT(id) DO UPDATE SET
                             name = excluded.name,
                             aliases_json = excluded.aliases_json,
                             parent_id = excluded.parent_id,
                             summary = excluded.summary,
                             embedding = excluded.embedding"#,
                    )
                    .bind(ids::to_hex(category.id))
                    .bind(&category.name)
                    .bind(to_json(&category.aliases))
                    .bind(category.parent_id.map(ids::to_hex))
                    .bind(&category.summary)
                    .bind(embedding_blob)
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
            .execute(Profile::Database, "category_batch_delete", || async {
                let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;
                for id in ids_list {
                    sqlx::query("DELETE FROM categories WHERE id = ?1")
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
            .execute(Profile::Database, "category_count", || async {
                let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM categories")
                    .fetch_one(&self.pool)
                    .await
                    .map_err(map_sqlx_err)?;
                Ok(count as u64)
            })
            .await
    }
}
