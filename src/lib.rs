//! # Noesis
//!
//! **A local-first concept index over a folder of plain-text notes.**
//!
//! Noesis seeds a SQLite database from a `--filesdir` of documents: it
//! extracts concepts and technical terms via an LLM, builds a
//! deduplicated concept index across the whole corpus, chunks and
//! embeds everything, and exposes the result as eight retrieval tools
//! (concept search, catalog search, chunk search, category browsing)
//! over a small JSON HTTP surface.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌───────────────┐   ┌───────────┐
//! │ --filesdir  │──▶│  seed         │──▶│  SQLite   │
//! │  (text)     │   │ extract+embed │   │ FTS5+Vec  │
//! └─────────────┘   └───────────────┘   └─────┬─────┘
//!                                              │
//!                        ┌─────────────────────┤
//!                        ▼                     ▼
//!                  ┌───────────┐         ┌───────────┐
//!                  │  ranking  │────────▶│   tools   │
//!                  │  engine   │         │  (HTTP)   │
//!                  └───────────┘         └───────────┘
//! ```
//!
//! ## Data Flow
//!
//! 1. [`source_loader`] walks `--filesdir` into `{source, text, hash}` tuples.
//! 2. [`seed`] filters against the [`enrichment::checkpoint`] state, then
//!    runs concept extraction ([`enrichment::worker_pool`]) concurrently.
//! 3. [`chunking`] splits each document into paragraph-bounded [`models::Chunk`]s,
//!    which [`enrichment`] re-enriches with matched concepts.
//! 4. [`enrichment::concept_index`] unions extracted names across the whole
//!    corpus into [`models::Concept`] rows; new categories are summarized
//!    incrementally ([`enrichment::categories`]).
//! 5. Everything with text is embedded via the configured
//!    [`embedding`] provider and persisted through [`store`]'s four
//!    collections.
//! 6. [`ranking`] answers hybrid (vector + BM25 + title + concept +
//!    WordNet) queries, surfaced as [`tools`] over [`server`]'s HTTP API.
//!
//! ## Quick Start
//!
//! ```bash
//! noesis-seed --filesdir ./notes --dbpath ./data/noesis.db
//! noesis-seed --filesdir ./notes --dbpath ./data/noesis.db --serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing, env overlay, and validation |
//! | [`models`] | Core data types: `Document`, `Chunk`, `Concept`, `Category` |
//! | [`ids`] | Deterministic id derivation (SHA-256-based) |
//! | [`store`] | Storage abstraction over the four SQLite collections |
//! | [`cache`] | Embedding/search/name-lookup caches |
//! | [`resilience`] | Retry, circuit breaker, bulkhead, timeout, fallback |
//! | [`ranking`] | Hybrid scoring engine (vector + BM25 + title + concept + WordNet) |
//! | [`enrichment`] | Concept extraction, matching, index construction, checkpoint |
//! | [`embedding`] | Embedding provider trait, OpenAI/Ollama implementations |
//! | [`chunking`] | Paragraph-boundary text chunker |
//! | [`source_loader`] | Minimal `--filesdir` walker |
//! | [`seed`] | Seeding pipeline orchestration |
//! | [`context`] | Composition root shared by the seeder and the tool surface |
//! | [`tools`] | The eight built-in `Tool` implementations |
//! | [`traits`] | The `Tool` trait and its registry |
//! | [`server`] | JSON HTTP tool surface (Axum) with CORS |
//! | [`db`] | SQLite connection pool with WAL mode |
//! | [`migrate`] | Database schema migrations (idempotent) |
//! | [`progress`] | Sync/enrichment progress reporting |
//!
//! ## Configuration
//!
//! Noesis is configured via a TOML file. See [`config`] for all
//! available options and [`config::load_config`] for validation rules.

pub mod cache;
pub mod chunking;
pub mod config;
pub mod context;
pub mod db;
pub mod embedding;
pub mod enrichment;
pub mod error;
pub mod ids;
pub mod migrate;
pub mod models;
pub mod progress;
pub mod ranking;
pub mod resilience;
pub mod seed;
pub mod server;
pub mod source_loader;
pub mod store;
pub mod tools;
pub mod traits;
