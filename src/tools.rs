//! The eight MCP tool definitions (`SPEC_FULL.md` §6): `concept_search`,
//! `catalog_search`, `broad_chunks_search`, `source_chunks_search`,
//! `extract_concepts`, `list_categories`, `category_search`,
//! `list_concepts_in_category`. Each is a [`Tool`] impl in the teacher's
//! `traits.rs` style — `name`/`description`/`parameters_schema`/`execute`
//! — but backed by [`Context`] instead of a bare `Config`, so a handler
//! reaches the ranking engine and collections directly rather than
//! through module-level free functions.
//!
//! The wire-level dispatch surface (MCP transport itself) is out of
//! scope; these are the tool *bodies* the dispatch surface would call,
//! wired into `server.rs` as ordinary Axum routes and exercised directly
//! in tests.

use std::collections::HashSet;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::ids;
use crate::models::ScoredResult;
use crate::store::{Collection, Filter};
use crate::traits::{Tool, ToolContext};

fn param_str<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(|v| v.as_str())
}

fn param_usize(params: &Value, key: &str, default: usize) -> usize {
    params
        .get(key)
        .and_then(|v| v.as_u64())
        .map(|n| n as usize)
        .unwrap_or(default)
}

fn param_bool(params: &Value, key: &str, default: bool) -> bool {
    params.get(key).and_then(|v| v.as_bool()).unwrap_or(default)
}

fn scored_results_json(results: &[ScoredResult]) -> Value {
    json!(results
        .iter()
        .map(|r| {
            json!({
                "id": ids::to_hex(r.id),
                "catalog_id": ids::to_hex(r.catalog_id),
                "source": r.source,
                "title": r.title,
                "text": r.text,
                "concepts": r.concepts,
                "concept_density": r.concept_density,
                "page": r.page,
                "hybrid_score": r.hybrid_score,
                "scores": r.scores,
            })
        })
        .collect::<Vec<_>>())
}

/// `concept_search{concept,limit?,debug?}` — exact/near concept lookup
/// fanning out to every chunk that concept touches.
pub struct ConceptSearchTool;

#[async_trait]
impl Tool for ConceptSearchTool {
    fn name(&self) -> &str {
        "concept_search"
    }

    fn description(&self) -> &str {
        "Search chunks by a named concept, expanded through its corpus and WordNet relations"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "concept": { "type": "string", "description": "Concept name to search for" },
                "limit": { "type": "integer", "description": "Max results", "default": 10 },
                "debug": { "type": "boolean", "description": "Include per-signal component scores and expansion trace", "default": false }
            },
            "required": ["concept"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let concept = param_str(&params, "concept").unwrap_or("").trim();
        if concept.is_empty() {
            bail!("concept must not be empty");
        }
        let limit = param_usize(&params, "limit", 10);
        let debug = param_bool(&params, "debug", false);

        let (results, total_chunks_found, expanded_terms) = ctx
            .ctx
            .ranking_engine()
            .concept_search(concept, limit, debug)
            .await
            .map_err(|e| anyhow!(e))?;

        let mut body = json!({
            "results": scored_results_json(&results),
            "total_chunks_found": total_chunks_found,
        });
        if debug {
            body["expanded_terms"] = json!(expanded_terms);
        }
        Ok(body)
    }
}

/// `catalog_search{text,limit?,debug?}` — document-level hybrid search.
pub struct CatalogSearchTool;

#[async_trait]
impl Tool for CatalogSearchTool {
    fn name(&self) -> &str {
        "catalog_search"
    }

    fn description(&self) -> &str {
        "Search the document catalog by hybrid keyword/semantic relevance"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "text": { "type": "string", "description": "Query text" },
                "limit": { "type": "integer", "description": "Max results", "default": 10 },
                "debug": { "type": "boolean", "description": "Include per-signal component scores and expansion trace", "default": false }
            },
            "required": ["text"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let text = param_str(&params, "text").unwrap_or("").trim();
        if text.is_empty() {
            bail!("text must not be empty");
        }
        let limit = param_usize(&params, "limit", 10);
        let debug = param_bool(&params, "debug", false);

        let (results, expanded_terms) = ctx
            .ctx
            .ranking_engine()
            .catalog_search(text, limit, debug)
            .await
            .map_err(|e| anyhow!(e))?;

        let mut body = json!({ "results": scored_results_json(&results) });
        if debug {
            body["expanded_terms"] = json!(expanded_terms);
        }
        Ok(body)
    }
}

/// `broad_chunks_search{text,limit?,debug?}` — chunk-level hybrid search
/// across the whole corpus, unrestricted by source.
pub struct BroadChunksSearchTool;

#[async_trait]
impl Tool for BroadChunksSearchTool {
    fn name(&self) -> &str {
        "broad_chunks_search"
    }

    fn description(&self) -> &str {
        "Search passages across the entire corpus by hybrid relevance"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "text": { "type": "string", "description": "Query text" },
                "limit": { "type": "integer", "description": "Max results", "default": 10 },
                "debug": { "type": "boolean", "description": "Include per-signal component scores and expansion trace", "default": false }
            },
            "required": ["text"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let text = param_str(&params, "text").unwrap_or("").trim();
        if text.is_empty() {
            bail!("text must not be empty");
        }
        let limit = param_usize(&params, "limit", 10);
        let debug = param_bool(&params, "debug", false);

        let (results, expanded_terms) = ctx
            .ctx
            .ranking_engine()
            .chunk_search(text, limit, debug, None)
            .await
            .map_err(|e| anyhow!(e))?;

        let mut body = json!({ "results": scored_results_json(&results) });
        if debug {
            body["expanded_terms"] = json!(expanded_terms);
        }
        Ok(body)
    }
}

/// `source_chunks_search{text,source,limit?}` — chunk-level search
/// restricted to a single document's source label.
pub struct SourceChunksSearchTool;

#[async_trait]
impl Tool for SourceChunksSearchTool {
    fn name(&self) -> &str {
        "source_chunks_search"
    }

    fn description(&self) -> &str {
        "Search passages within a single source document"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "text": { "type": "string", "description": "Query text" },
                "source": { "type": "string", "description": "Source label to restrict the search to" },
                "limit": { "type": "integer", "description": "Max results", "default": 10 }
            },
            "required": ["text", "source"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let text = param_str(&params, "text").unwrap_or("").trim();
        if text.is_empty() {
            bail!("text must not be empty");
        }
        let source = param_str(&params, "source").unwrap_or("").trim();
        if source.is_empty() {
            bail!("source must not be empty");
        }
        let limit = param_usize(&params, "limit", 10);

        let (results, _expanded_terms) = ctx
            .ctx
            .ranking_engine()
            .chunk_search(text, limit, false, Some(source))
            .await
            .map_err(|e| anyhow!(e))?;

        Ok(json!({ "results": scored_results_json(&results) }))
    }
}

/// `extract_concepts{document_query,format?}` — surface the concepts a
/// previously-seeded document was indexed under, without re-running
/// extraction. `document_query` matches a document's exact source
/// label first, falling back to a case-insensitive title/source
/// substring match.
pub struct ExtractConceptsTool;

#[async_trait]
impl Tool for ExtractConceptsTool {
    fn name(&self) -> &str {
        "extract_concepts"
    }

    fn description(&self) -> &str {
        "Look up the concepts, technical terms, and categories a document was indexed under"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "document_query": { "type": "string", "description": "Source label or title to look up" },
                "format": { "type": "string", "enum": ["json", "list"], "default": "json" }
            },
            "required": ["document_query"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let query = param_str(&params, "document_query").unwrap_or("").trim();
        if query.is_empty() {
            bail!("document_query must not be empty");
        }
        let format = param_str(&params, "format").unwrap_or("json");

        let document = match ctx.ctx.catalog.get_by_source(query).await.map_err(|e| anyhow!(e))? {
            Some(doc) => doc,
            None => {
                let needle = query.to_lowercase();
                ctx.ctx
                    .catalog
                    .find_all()
                    .await
                    .map_err(|e| anyhow!(e))?
                    .into_iter()
                    .find(|d| {
                        d.source.to_lowercase().contains(&needle)
                            || d.title.to_lowercase().contains(&needle)
                    })
                    .ok_or_else(|| anyhow!("not found: no document matches '{query}'"))?
            }
        };

        let category_names: Vec<String> = document
            .category_ids
            .iter()
            .filter_map(|id| ctx.ctx.names.category_name(*id))
            .collect();

        if format == "list" {
            let mut lines = document.primary_concepts.clone();
            lines.extend(document.technical_terms.clone());
            return Ok(json!({ "source": document.source, "concepts": lines }));
        }

        Ok(json!({
            "source": document.source,
            "title": document.title,
            "primary_concepts": document.primary_concepts,
            "technical_terms": document.technical_terms,
            "categories": category_names,
        }))
    }
}

/// `list_categories` — the full coarse domain taxonomy.
pub struct ListCategoriesTool;

#[async_trait]
impl Tool for ListCategoriesTool {
    fn name(&self) -> &str {
        "list_categories"
    }

    fn description(&self) -> &str {
        "List every category in the domain taxonomy"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _params: Value, ctx: &ToolContext) -> Result<Value> {
        let categories = ctx.ctx.categories.find_all().await.map_err(|e| anyhow!(e))?;
        Ok(json!({
            "categories": categories.iter().map(|c| json!({
                "id": ids::to_hex(c.id),
                "name": c.name,
                "aliases": c.aliases,
                "summary": c.summary,
            })).collect::<Vec<_>>()
        }))
    }
}

/// `category_search{query,limit?}` — fuzzy-ish substring lookup over
/// category names and aliases.
pub struct CategorySearchTool;

#[async_trait]
impl Tool for CategorySearchTool {
    fn name(&self) -> &str {
        "category_search"
    }

    fn description(&self) -> &str {
        "Search categories by name or alias"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Category name or alias fragment" },
                "limit": { "type": "integer", "description": "Max results", "default": 20 }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let query = param_str(&params, "query").unwrap_or("").trim();
        if query.is_empty() {
            bail!("query must not be empty");
        }
        let limit = param_usize(&params, "limit", 20);

        let mut matches = ctx
            .ctx
            .categories
            .filter_query(&Filter::TextContains(query.to_string()), limit)
            .await
            .map_err(|e| anyhow!(e))?;

        if matches.is_empty() {
            if let Some(exact) = ctx
                .ctx
                .categories
                .get_by_name(query)
                .await
                .map_err(|e| anyhow!(e))?
            {
                matches.push(exact);
            }
        }

        Ok(json!({
            "categories": matches.iter().map(|c| json!({
                "id": ids::to_hex(c.id),
                "name": c.name,
                "aliases": c.aliases,
                "summary": c.summary,
            })).collect::<Vec<_>>()
        }))
    }
}

/// `list_concepts_in_category{category,limit?}` — every concept tagged
/// under a given category, resolved by name or alias.
pub struct ListConceptsInCategoryTool;

#[async_trait]
impl Tool for ListConceptsInCategoryTool {
    fn name(&self) -> &str {
        "list_concepts_in_category"
    }

    fn description(&self) -> &str {
        "List every concept tagged under a given category"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "category": { "type": "string", "description": "Category name or alias" },
                "limit": { "type": "integer", "description": "Max results", "default": 50 }
            },
            "required": ["category"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Value> {
        let category_name = param_str(&params, "category").unwrap_or("").trim();
        if category_name.is_empty() {
            bail!("category must not be empty");
        }
        let limit = param_usize(&params, "limit", 50);

        let category = ctx
            .ctx
            .categories
            .get_by_name(category_name)
            .await
            .map_err(|e| anyhow!(e))?
            .ok_or_else(|| anyhow!("not found: no category matches '{category_name}'"))?;

        let descendant_ids: HashSet<u64> = ctx
            .ctx
            .categories
            .find_all()
            .await
            .map_err(|e| anyhow!(e))?
            .into_iter()
            .filter(|c| c.id == category.id || c.parent_id == Some(category.id))
            .map(|c| c.id)
            .collect();

        let mut concepts: Vec<_> = ctx
            .ctx
            .concepts
            .find_all()
            .await
            .map_err(|e| anyhow!(e))?
            .into_iter()
            .filter(|c| c.category_ids.iter().any(|id| descendant_ids.contains(id)))
            .collect();
        concepts.sort_by(|a, b| b.weight.total_cmp(&a.weight));
        concepts.truncate(limit);

        Ok(json!({
            "category": category.name,
            "concepts": concepts.iter().map(|c| json!({
                "id": ids::to_hex(c.id),
                "name": c.name,
                "concept_type": c.concept_type,
                "chunk_count": c.chunk_count,
                "weight": c.weight,
            })).collect::<Vec<_>>()
        }))
    }
}
