//! Integration tests for the tool surface and HTTP server, exercised
//! directly against a [`Context`] seeded with fixture rows (no LLM/embedding
//! calls involved — extraction is the seeding pipeline's concern, not the
//! tool surface's).

use std::sync::Arc;
use std::time::Duration;

use noesis_core::config::Config;
use noesis_core::context::Context;
use noesis_core::ids;
use noesis_core::models::{Category, Chunk, Concept, ConceptType, Document};
use noesis_core::store::chunk::replace_for_catalog;
use noesis_core::store::Collection;
use noesis_core::traits::ToolRegistry;
use serde_json::{json, Value};
use tempfile::TempDir;

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn test_config(tmp: &TempDir, port: u16) -> Config {
    let db_path = tmp.path().join("noesis.db");
    let content = format!(
        r#"
[db]
path = "{}"

[chunking]
max_tokens = 700

[server]
bind = "127.0.0.1:{port}"
"#,
        db_path.display()
    );
    toml::from_str(&content).unwrap()
}

async fn wait_for_health(port: u16) {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{port}/health");
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
    }
    panic!("server did not become healthy within 5 seconds");
}

/// Seeds one document, two chunks, a concept and a category directly
/// through the collections, bypassing the LLM-backed seeding pipeline.
async fn seed_fixtures(ctx: &Context) {
    let doc_id = ids::document_id("rust/ownership.md");
    let document = Document {
        id: doc_id,
        source: "rust/ownership.md".to_string(),
        title: "Rust Ownership".to_string(),
        summary: "An overview of ownership and borrowing in Rust.".to_string(),
        primary_concepts: vec!["ownership".to_string(), "borrowing".to_string()],
        technical_terms: vec!["cargo".to_string()],
        category_ids: vec![ids::category_id("programming languages")],
        embedding: Vec::new(),
        ocr_processed: false,
        content_hash: "deadbeef".to_string(),
    };
    ctx.catalog.batch_upsert(&[document]).await.unwrap();

    let chunks = vec![
        Chunk {
            id: ids::chunk_id(doc_id, 0),
            catalog_id: doc_id,
            chunk_index: 0,
            text: "Ownership is Rust's central memory management concept.".to_string(),
            concepts: vec!["ownership".to_string()],
            concept_density: 1.0,
            embedding: Vec::new(),
            page: None,
        },
        Chunk {
            id: ids::chunk_id(doc_id, 1),
            catalog_id: doc_id,
            chunk_index: 1,
            text: "Borrowing lets you reference data without taking ownership of it.".to_string(),
            concepts: vec!["borrowing".to_string()],
            concept_density: 1.0,
            embedding: Vec::new(),
            page: None,
        },
    ];
    replace_for_catalog(&ctx.pool, &ctx.resilience, doc_id, &chunks)
        .await
        .unwrap();

    let category = Category {
        id: ids::category_id("programming languages"),
        name: "Programming Languages".to_string(),
        aliases: vec!["langs".to_string()],
        parent_id: None,
        summary: "Languages used to write software.".to_string(),
        embedding: Vec::new(),
    };
    ctx.categories.batch_upsert(&[category]).await.unwrap();

    let concept = Concept {
        id: ids::concept_id("ownership"),
        name: "ownership".to_string(),
        concept_type: ConceptType::Thematic,
        category_ids: vec![ids::category_id("programming languages")],
        sources: vec![doc_id],
        related_concepts: vec!["borrowing".to_string()],
        synonyms: Vec::new(),
        hypernyms: Vec::new(),
        hyponyms: Vec::new(),
        chunk_count: 1,
        embedding: Vec::new(),
        weight: 1.0,
    };
    ctx.concepts.batch_upsert(&[concept]).await.unwrap();

    ctx.names.rebuild(&ctx.concepts, &ctx.categories).await.unwrap();
}

async fn spawn_server(config: Config, port: u16) {
    tokio::spawn(async move {
        noesis_core::server::run_server(&config).await.ok();
    });
    wait_for_health(port).await;
}

#[tokio::test]
async fn tools_list_contains_all_eight_builtins() {
    let port = find_free_port();
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp, port);
    spawn_server(config, port).await;

    let client = reqwest::Client::new();
    let resp = client
        .get(format!("http://127.0.0.1:{port}/tools/list"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let names: Vec<&str> = body["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();

    for expected in [
        "concept_search",
        "catalog_search",
        "broad_chunks_search",
        "source_chunks_search",
        "extract_concepts",
        "list_categories",
        "category_search",
        "list_concepts_in_category",
    ] {
        assert!(names.contains(&expected), "missing tool {expected} in {names:?}");
    }
    assert!(body["tools"].as_array().unwrap().iter().all(|t| t["builtin"] == true));
}

#[tokio::test]
async fn unknown_tool_returns_404() {
    let port = find_free_port();
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp, port);
    spawn_server(config, port).await;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("http://127.0.0.1:{port}/tools/nonexistent"))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "unknown_tool");
}

#[tokio::test]
async fn concept_search_finds_seeded_chunk() {
    let port = find_free_port();
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp, port);
    let ctx = Context::build(config.clone()).await.unwrap();
    seed_fixtures(&ctx).await;
    drop(ctx);

    spawn_server(config, port).await;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("http://127.0.0.1:{port}/tools/concept_search"))
        .json(&json!({"concept": "ownership"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let results = body["result"]["results"].as_array().unwrap();
    assert!(!results.is_empty(), "expected a chunk tagged with 'ownership'");
    assert!(results.iter().any(|r| r["source"] == "rust/ownership.md"));
}

#[tokio::test]
async fn concept_search_rejects_empty_concept() {
    let port = find_free_port();
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp, port);
    spawn_server(config, port).await;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("http://127.0.0.1:{port}/tools/concept_search"))
        .json(&json!({"concept": "  "}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn catalog_and_broad_chunks_search_find_seeded_document() {
    let port = find_free_port();
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp, port);
    let ctx = Context::build(config.clone()).await.unwrap();
    seed_fixtures(&ctx).await;
    drop(ctx);

    spawn_server(config, port).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://127.0.0.1:{port}/tools/catalog_search"))
        .json(&json!({"text": "ownership borrowing"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert!(!body["result"]["results"].as_array().unwrap().is_empty());

    let resp = client
        .post(format!("http://127.0.0.1:{port}/tools/broad_chunks_search"))
        .json(&json!({"text": "Rust memory management"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert!(!body["result"]["results"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn source_chunks_search_restricts_to_one_document() {
    let port = find_free_port();
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp, port);
    let ctx = Context::build(config.clone()).await.unwrap();
    seed_fixtures(&ctx).await;
    drop(ctx);

    spawn_server(config, port).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://127.0.0.1:{port}/tools/source_chunks_search"))
        .json(&json!({"text": "borrowing", "source": "rust/ownership.md"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let results = body["result"]["results"].as_array().unwrap();
    assert!(results.iter().all(|r| r["source"] == "rust/ownership.md"));
}

#[tokio::test]
async fn extract_concepts_looks_up_seeded_document() {
    let port = find_free_port();
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp, port);
    let ctx = Context::build(config.clone()).await.unwrap();
    seed_fixtures(&ctx).await;
    drop(ctx);

    spawn_server(config, port).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://127.0.0.1:{port}/tools/extract_concepts"))
        .json(&json!({"document_query": "rust/ownership.md"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["result"]["source"], "rust/ownership.md");
    let concepts = body["result"]["primary_concepts"].as_array().unwrap();
    assert!(concepts.iter().any(|c| c == "ownership"));

    // Substring fallback over title also resolves.
    let resp = client
        .post(format!("http://127.0.0.1:{port}/tools/extract_concepts"))
        .json(&json!({"document_query": "Ownership"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .post(format!("http://127.0.0.1:{port}/tools/extract_concepts"))
        .json(&json!({"document_query": "nonexistent-doc"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn category_tools_resolve_by_name_and_alias() {
    let port = find_free_port();
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp, port);
    let ctx = Context::build(config.clone()).await.unwrap();
    seed_fixtures(&ctx).await;
    drop(ctx);

    spawn_server(config, port).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://127.0.0.1:{port}/tools/list_categories"))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let categories = body["result"]["categories"].as_array().unwrap();
    assert!(categories.iter().any(|c| c["name"] == "Programming Languages"));

    let resp = client
        .post(format!("http://127.0.0.1:{port}/tools/category_search"))
        .json(&json!({"query": "langs"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert!(!body["result"]["categories"].as_array().unwrap().is_empty());

    let resp = client
        .post(format!("http://127.0.0.1:{port}/tools/list_concepts_in_category"))
        .json(&json!({"category": "Programming Languages"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let concepts = body["result"]["concepts"].as_array().unwrap();
    assert!(concepts.iter().any(|c| c["name"] == "ownership"));

    let resp = client
        .post(format!("http://127.0.0.1:{port}/tools/list_concepts_in_category"))
        .json(&json!({"category": "nonexistent category"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn health_endpoint_reports_ok() {
    let port = find_free_port();
    let tmp = TempDir::new().unwrap();
    let config = test_config(&tmp, port);
    spawn_server(config, port).await;

    let client = reqwest::Client::new();
    let resp = client
        .get(format!("http://127.0.0.1:{port}/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn registry_with_builtins_reports_eight_tools() {
    let registry = ToolRegistry::with_builtins();
    assert_eq!(registry.len(), 8);
    assert!(registry.find("concept_search").is_some());
    assert!(registry.find("nonexistent").is_none());
}
