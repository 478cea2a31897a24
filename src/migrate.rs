//! Database schema migrations.
//!
//! Creates the four collection tables (`documents`, `chunks`, `concepts`,
//! `categories`), the `chunks_fts` virtual table the bm25 signal queries,
//! and supporting indexes. Ids are stored as fixed-width lowercase hex
//! (`crate::ids::to_hex`) rather than SQLite `INTEGER`, since a `u64` id's
//! top bit does not fit in SQLite's signed 64-bit integer type. Embedding
//! vectors are `BLOB` columns (`crate::embedding::vec_to_blob`). There is
//! no `checkpoints` table: the seeding pipeline's resume state is a flat
//! JSON file (`crate::enrichment::checkpoint`), not database state — it
//! needs to survive a from-scratch `--overwrite` reseed of the database
//! itself. Run via `noesis-seed init`, idempotent on repeated calls.

use anyhow::Result;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            source TEXT NOT NULL UNIQUE,
            title TEXT NOT NULL,
            summary TEXT NOT NULL DEFAULT '',
            primary_concepts_json TEXT NOT NULL DEFAULT '[]',
            technical_terms_json TEXT NOT NULL DEFAULT '[]',
            category_ids_json TEXT NOT NULL DEFAULT '[]',
            embedding BLOB,
            ocr_processed INTEGER NOT NULL DEFAULT 0,
            content_hash TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            catalog_id TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            text TEXT NOT NULL,
            concepts_json TEXT NOT NULL DEFAULT '[]',
            concept_density REAL NOT NULL DEFAULT 0.0,
            embedding BLOB,
            page INTEGER,
            UNIQUE(catalog_id, chunk_index),
            FOREIGN KEY (catalog_id) REFERENCES documents(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS concepts (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            concept_type TEXT NOT NULL,
            category_ids_json TEXT NOT NULL DEFAULT '[]',
            sources_json TEXT NOT NULL DEFAULT '[]',
            related_concepts_json TEXT NOT NULL DEFAULT '[]',
            synonyms_json TEXT NOT NULL DEFAULT '[]',
            hypernyms_json TEXT NOT NULL DEFAULT '[]',
            hyponyms_json TEXT NOT NULL DEFAULT '[]',
            chunk_count INTEGER NOT NULL DEFAULT 0,
            embedding BLOB,
            weight REAL NOT NULL DEFAULT 0.0
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS categories (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            aliases_json TEXT NOT NULL DEFAULT '[]',
            parent_id TEXT,
            summary TEXT NOT NULL DEFAULT '',
            embedding BLOB,
            FOREIGN KEY (parent_id) REFERENCES categories(id)
        )
        "#,
    )
    .execute(&pool)
    .await?;

    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='chunks_fts'",
    )
    .fetch_one(&pool)
    .await?;

    if !fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE chunks_fts USING fts5(
                chunk_id UNINDEXED,
                catalog_id UNINDEXED,
                text
            )
            "#,
        )
        .execute(&pool)
        .await?;
    }

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_catalog_id ON chunks(catalog_id)")
        .execute(&pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_source ON documents(source)")
        .execute(&pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_concepts_name ON concepts(name)")
        .execute(&pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_categories_parent_id ON categories(parent_id)")
        .execute(&pool)
        .await?;

    pool.close().await;
    Ok(())
}
