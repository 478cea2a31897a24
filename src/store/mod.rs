//! Storage Abstraction Layer — four typed collections over SQLite.
//!
//! Each collection (`CatalogCollection`, `ChunkCollection`,
//! `ConceptCollection`, `CategoryCollection`) exposes the same
//! capability set (`SPEC_FULL.md` §4.1/§9): vector search, filtered
//! query, batch upsert/delete, and count. Rather than a class
//! hierarchy, that capability set is a single [`Collection`] trait
//! parametric over an item type, implemented once per concrete
//! collection — composition over inheritance, following the storage
//! trait shape in the teacher's `Store` abstraction but split into
//! four narrower collections instead of one do-everything trait.
//!
//! The layer does not rank results: `vector_search` returns rows
//! ordered by ascending distance and `filter_query` returns rows
//! matching a predicate in storage order. Scoring and fusion live in
//! [`crate::ranking`].
//!
//! **Vector index policy.** Below 100k rows a linear scan beats the
//! cost of training a partitioned index, so every collection scans
//! linearly regardless of size; an IVF+PQ-style index above that
//! threshold is named as a future extension point (`VectorIndex`
//! below) rather than built here — no corpus in this deployment's
//! target range approaches 100k rows per collection, and an untested
//! quantized index is a correctness risk the linear scan avoids.

pub mod catalog;
pub mod category;
pub mod chunk;
pub mod concept;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::{CoreError, CoreResult};

/// Row count above which an implementation should prefer a
/// partitioned vector index over a linear scan (`SPEC_FULL.md` §4.1).
/// Advisory only — see module docs.
pub const VECTOR_INDEX_THRESHOLD: usize = 100_000;

/// A row returned from [`Collection::vector_search`], carrying the
/// item plus its distance from the query vector (ascending = closer).
#[derive(Debug, Clone)]
pub struct DistanceRow<T> {
    pub item: T,
    pub distance: f32,
}

/// Exact/range filter predicates supported by `filter_query`
/// (`SPEC_FULL.md` §4.1 — "exact/range filters on integer ids and
/// string equality").
#[derive(Debug, Clone)]
pub enum Filter {
    IdEq(u64),
    IdIn(Vec<u64>),
    NameEq(String),
    SourceEq(String),
    CatalogIdEq(u64),
    /// Substring match against a text column, case-insensitive.
    TextContains(String),
    All,
}

/// The capability set every collection exposes (`SPEC_FULL.md` §9:
/// "expose it as a capability set ... avoid inheritance; use
/// composition/parametric types").
#[async_trait]
pub trait Collection {
    type Item: Send + Sync;

    async fn vector_search(
        &self,
        query_vec: &[f32],
        limit: usize,
    ) -> CoreResult<Vec<DistanceRow<Self::Item>>>;

    async fn filter_query(&self, filter: &Filter, limit: usize) -> CoreResult<Vec<Self::Item>>;

    async fn batch_upsert(&self, items: &[Self::Item]) -> CoreResult<()>;

    async fn batch_delete(&self, ids: &[u64]) -> CoreResult<()>;

    async fn count(&self) -> CoreResult<u64>;
}

pub(crate) fn map_sqlx_err(err: sqlx::Error) -> CoreError {
    match err {
        sqlx::Error::RowNotFound => CoreError::not_found("row not found"),
        other => CoreError::transient("sqlite", other.to_string()),
    }
}

pub(crate) fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "[]".to_string())
}

pub(crate) fn from_json<T: DeserializeOwned + Default>(raw: &str) -> T {
    serde_json::from_str(raw).unwrap_or_default()
}
