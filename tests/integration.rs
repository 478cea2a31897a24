//! End-to-end tests of the `noesis-seed` binary: scan a `--filesdir`,
//! extract concepts through a local mock LLM endpoint, persist, and
//! (for the `--serve` test) answer tool calls over HTTP.
//!
//! The mock endpoint stands in for the real OpenAI-compatible chat
//! completions API so these tests run offline and fast — `[enrichment]
//! llm_endpoint` points at it instead of the real provider.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use tempfile::TempDir;

fn seed_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // deps/<test-binary>
    path.pop(); // debug/
    path.push("noesis-seed");
    path
}

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// A chat-completions stand-in: documents whose text contains
/// `TRIGGER_FAILURE` get back unparseable JSON (an extraction error
/// without the real backoff/retry delay a 5xx would trigger), everything
/// else gets a fixed, valid extraction payload.
async fn mock_chat_completions(Json(body): Json<Value>) -> impl IntoResponse {
    let user_content = body["messages"]
        .as_array()
        .and_then(|messages| messages.iter().find(|m| m["role"] == "user"))
        .and_then(|m| m["content"].as_str())
        .unwrap_or("");

    let content = if user_content.contains("TRIGGER_FAILURE") {
        "not valid json {{".to_string()
    } else {
        json!({
            "primary_concepts": ["ownership", "borrowing"],
            "technical_terms": ["cargo"],
            "acronyms": [],
            "categories": ["Programming Languages"],
            "related_concepts": ["memory safety"],
        })
        .to_string()
    };

    Json(json!({ "choices": [ { "message": { "content": content } } ] }))
}

/// Spawns the mock LLM server on a dedicated background thread with its
/// own current-thread runtime, detached for the test binary's lifetime.
fn spawn_mock_llm_server() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async move {
            listener.set_nonblocking(true).unwrap();
            let tokio_listener = tokio::net::TcpListener::from_std(listener).unwrap();
            let app = Router::new().route("/v1/chat/completions", post(mock_chat_completions));
            axum::serve(tokio_listener, app).await.unwrap();
        });
    });

    port
}

fn write_config(root: &Path, llm_port: u16, server_port: Option<u16>) -> PathBuf {
    let db_path = root.join("data").join("noesis.db");
    fs::create_dir_all(db_path.parent().unwrap()).unwrap();

    let server_section = match server_port {
        Some(port) => format!("[server]\nbind = \"127.0.0.1:{port}\"\n\n"),
        None => String::new(),
    };

    let content = format!(
        r#"[db]
path = "{}"

[chunking]
max_tokens = 700

{server_section}[enrichment]
min_interval_ms = 1
worker_concurrency = 2
llm_endpoint = "http://127.0.0.1:{llm_port}/v1/chat/completions"
"#,
        db_path.display(),
    );

    let config_path = root.join("noesis.toml");
    fs::write(&config_path, content).unwrap();
    config_path
}

fn write_files_dir(root: &Path, files: &[(&str, &str)]) -> PathBuf {
    let files_dir = root.join("files");
    fs::create_dir_all(&files_dir).unwrap();
    for (name, contents) in files {
        fs::write(files_dir.join(name), contents).unwrap();
    }
    files_dir
}

struct RunOutput {
    stdout: String,
    stderr: String,
    success: bool,
}

fn run_seed(config_path: &Path, filesdir: &Path, extra_args: &[&str]) -> RunOutput {
    let output = Command::new(seed_binary())
        .arg("--config")
        .arg(config_path)
        .arg("--filesdir")
        .arg(filesdir)
        .arg("--quiet")
        .args(extra_args)
        .output()
        .unwrap_or_else(|e| panic!("failed to run noesis-seed: {e}"));

    RunOutput {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        success: output.status.success(),
    }
}

#[test]
fn seed_creates_database_and_reports_counts() {
    let llm_port = spawn_mock_llm_server();
    let tmp = TempDir::new().unwrap();
    let config_path = write_config(tmp.path(), llm_port, None);
    let files_dir = write_files_dir(
        tmp.path(),
        &[
            ("alpha.md", "# Alpha\n\nOwnership and borrowing in Rust."),
            ("beta.md", "# Beta\n\nCargo and crates for packaging."),
        ],
    );

    let out = run_seed(&config_path, &files_dir, &[]);
    assert!(out.success, "stdout={} stderr={}", out.stdout, out.stderr);
    assert!(out.stdout.contains("seeded 2/2"), "{}", out.stdout);
    assert!(tmp.path().join("data").join("noesis.db").exists());
}

#[test]
fn seed_skips_unchanged_documents_on_rerun() {
    let llm_port = spawn_mock_llm_server();
    let tmp = TempDir::new().unwrap();
    let config_path = write_config(tmp.path(), llm_port, None);
    let files_dir = write_files_dir(tmp.path(), &[("doc.md", "Ownership in Rust.")]);

    let first = run_seed(&config_path, &files_dir, &[]);
    assert!(first.success, "{}", first.stderr);
    assert!(first.stdout.contains("seeded 1/1"));

    let second = run_seed(&config_path, &files_dir, &[]);
    assert!(second.success, "{}", second.stderr);
    assert!(second.stdout.contains("seeded 0/1"), "{}", second.stdout);
}

#[test]
fn seed_overwrite_reprocesses_every_document() {
    let llm_port = spawn_mock_llm_server();
    let tmp = TempDir::new().unwrap();
    let config_path = write_config(tmp.path(), llm_port, None);
    let files_dir = write_files_dir(tmp.path(), &[("doc.md", "Ownership in Rust.")]);

    run_seed(&config_path, &files_dir, &[]);
    let second = run_seed(&config_path, &files_dir, &["--overwrite"]);
    assert!(second.success, "{}", second.stderr);
    assert!(second.stdout.contains("seeded 1/1"), "{}", second.stdout);
}

#[test]
fn seed_auto_reseed_reprocesses_only_changed_documents() {
    let llm_port = spawn_mock_llm_server();
    let tmp = TempDir::new().unwrap();
    let config_path = write_config(tmp.path(), llm_port, None);
    let files_dir = write_files_dir(
        tmp.path(),
        &[
            ("alpha.md", "Ownership in Rust."),
            ("beta.md", "Cargo and crates."),
        ],
    );

    run_seed(&config_path, &files_dir, &[]);
    fs::write(files_dir.join("alpha.md"), "Ownership, borrowing, and lifetimes in Rust.").unwrap();

    let second = run_seed(&config_path, &files_dir, &["--auto-reseed"]);
    assert!(second.success, "{}", second.stderr);
    assert!(second.stdout.contains("seeded 1/2"), "{}", second.stdout);
}

#[test]
fn seed_missing_filesdir_fails_with_exit_code_four() {
    let llm_port = spawn_mock_llm_server();
    let tmp = TempDir::new().unwrap();
    let config_path = write_config(tmp.path(), llm_port, None);
    let missing = tmp.path().join("does-not-exist");

    let out = run_seed(&config_path, &missing, &[]);
    assert!(!out.success);
    assert!(out.stderr.contains("does not exist"), "{}", out.stderr);
}

#[test]
fn seed_resume_sticks_to_failed_documents_until_retried() {
    let llm_port = spawn_mock_llm_server();
    let tmp = TempDir::new().unwrap();
    let config_path = write_config(tmp.path(), llm_port, None);
    let files_dir = write_files_dir(
        tmp.path(),
        &[
            ("good.md", "Ownership in Rust."),
            ("bad.md", "TRIGGER_FAILURE this document always fails extraction."),
        ],
    );

    let first = run_seed(&config_path, &files_dir, &["--resume"]);
    assert!(!first.success, "expected partial failure exit code, got success: {}", first.stdout);
    assert!(first.stdout.contains("seeded 1/2"), "{}", first.stdout);
    assert!(first.stdout.contains("1 failed"), "{}", first.stdout);

    // Second run: both documents already accounted for (one processed,
    // one stuck failed) — nothing new happens without --retry-failed.
    let second = run_seed(&config_path, &files_dir, &["--resume"]);
    assert!(second.success, "{}", second.stderr);
    assert!(second.stdout.contains("seeded 0/2"), "{}", second.stdout);

    // Third run: --retry-failed re-attempts the sticky failure.
    let third = run_seed(&config_path, &files_dir, &["--resume", "--retry-failed"]);
    assert!(!third.success);
    assert!(third.stdout.contains("seeded 0/2"), "{}", third.stdout);
    assert!(third.stdout.contains("1 failed"), "{}", third.stdout);
}

#[test]
fn seed_serve_flag_exposes_tool_surface_over_http() {
    let llm_port = spawn_mock_llm_server();
    let server_port = find_free_port();
    let tmp = TempDir::new().unwrap();
    let config_path = write_config(tmp.path(), llm_port, Some(server_port));
    let files_dir = write_files_dir(tmp.path(), &[("doc.md", "Ownership in Rust.")]);

    let mut child = Command::new(seed_binary())
        .arg("--config")
        .arg(&config_path)
        .arg("--filesdir")
        .arg(&files_dir)
        .arg("--quiet")
        .arg("--serve")
        .spawn()
        .unwrap_or_else(|e| panic!("failed to spawn noesis-seed --serve: {e}"));

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let outcome = rt.block_on(async {
        let client = reqwest::Client::new();
        let health_url = format!("http://127.0.0.1:{server_port}/health");
        let mut healthy = false;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if let Ok(resp) = client.get(&health_url).send().await {
                if resp.status().is_success() {
                    healthy = true;
                    break;
                }
            }
        }
        assert!(healthy, "server never became healthy");

        let resp = client
            .get(format!("http://127.0.0.1:{server_port}/tools/list"))
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
        assert!(names.contains(&"concept_search"));
        assert_eq!(names.len(), 8);
    });

    let _ = child.kill();
    let _ = child.wait();
    outcome
}
