//! Proves `CoreError::CircuitOpen`/`BulkheadFull` are reachable from
//! real call sites, not just from directly-constructed
//! `ResilientExecutor`s: a mock chat-completions endpoint that always
//! answers 500 is wired in as the `llm_endpoint`, then
//! `extract_concepts` is driven far enough past the `LLM_API` profile's
//! failure threshold that the circuit opens, and far enough past the
//! bulkhead's concurrency+queue capacity that a call is rejected
//! outright.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use axum::response::IntoResponse;
use axum::routing::post;
use axum::Router;
use noesis_core::config::EnrichmentConfig;
use noesis_core::enrichment::extractor::extract_concepts;
use noesis_core::error::CoreError;
use noesis_core::resilience::{Profile, ResilientExecutor};

/// Always answers 500, counting requests so callers can assert the
/// bulkhead/circuit breaker actually bounded how many reached it.
async fn always_fail(hits: Arc<AtomicU16>) -> impl IntoResponse {
    hits.fetch_add(1, Ordering::SeqCst);
    (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "boom")
}

/// Spawns the mock failing server on a dedicated background thread
/// with its own current-thread runtime, detached for the test binary's
/// lifetime — same shape as `tests/integration.rs`'s mock LLM server.
fn spawn_failing_server(hits: Arc<AtomicU16>) -> u16 {
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
            let app = Router::new().route(
                "/v1/chat/completions",
                post(move || always_fail(hits.clone())),
            );
            axum::serve(tokio_listener, app).await.unwrap();
        });
    });

    port
}

fn enrichment_config(port: u16) -> EnrichmentConfig {
    EnrichmentConfig {
        min_interval_ms: 0,
        worker_concurrency: 1,
        token_threshold: 100_000,
        fuzzy_match_ratio: 0.7,
        with_wordnet: false,
        concept_embedding_from_examples: false,
        llm_model: "gpt-4o-mini".to_string(),
        llm_endpoint: Some(format!("http://127.0.0.1:{port}/v1/chat/completions")),
    }
}

#[tokio::test]
async fn extract_concepts_trips_the_circuit_breaker_against_a_failing_endpoint() {
    let hits = Arc::new(AtomicU16::new(0));
    let port = spawn_failing_server(hits.clone());

    let config = enrichment_config(port);
    let resilience = ResilientExecutor::new(Default::default());

    // `LLM_API` has a failure_threshold of 5 and retry max_attempts of
    // 3; three calls (9 failed attempts) push well past the threshold
    // and hard-open the circuit for this operation name.
    let mut saw_circuit_open = false;
    for _ in 0..3 {
        let err = extract_concepts(&resilience, &config, "some short document")
            .await
            .expect_err("endpoint always fails");
        if err.downcast_ref::<CoreError>().map(|e| matches!(e, CoreError::CircuitOpen { .. })) == Some(true) {
            saw_circuit_open = true;
        }
    }

    assert!(
        saw_circuit_open,
        "expected at least one CircuitOpen error once the failure threshold was crossed"
    );
    assert!(!resilience.health_summary().healthy);
    assert!(resilience
        .health_summary()
        .open_circuits
        .contains(&"extract_concepts".to_string()));

    // Once open, the circuit fails fast: later attempts shouldn't all
    // have reached the server.
    let hits_seen = hits.load(Ordering::SeqCst);
    assert!(
        hits_seen < 3 * 3,
        "circuit breaker should have short-circuited some attempts, saw {hits_seen} requests"
    );
}

#[tokio::test]
async fn concurrent_extraction_past_bulkhead_capacity_is_rejected() {
    // A distinct operation name so this test's bulkhead state doesn't
    // interact with the circuit-breaker test's `extract_concepts`
    // breaker/bulkhead (both keyed by name in the same executor type,
    // but this is a fresh executor instance regardless).
    let resilience = Arc::new(ResilientExecutor::new(Default::default()));

    // `LLM_API`'s bulkhead allows 5 concurrent + 10 queued = 15 total
    // in flight before rejecting outright. Each op sleeps briefly so
    // later arrivals land while earlier ones are still active/queued,
    // the same shape as `bulkhead::tests::bounds_concurrency_and_rejects_past_queue`
    // but driven through the resilience facade instead of a bare `Bulkhead`.
    let mut handles = Vec::new();
    for _ in 0..20 {
        let resilience = resilience.clone();
        handles.push(tokio::spawn(async move {
            resilience
                .execute(Profile::LlmApi, "saturate", || async {
                    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                    Ok::<_, CoreError>(())
                })
                .await
        }));
    }

    let mut bulkhead_full = false;
    let mut accepted = 0;
    for handle in handles {
        match handle.await.expect("task panicked") {
            Err(CoreError::BulkheadFull { .. }) => bulkhead_full = true,
            Ok(()) => accepted += 1,
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    assert!(
        bulkhead_full,
        "expected at least one BulkheadFull error once in-flight work exceeded max_concurrent + max_queue"
    );
    assert_eq!(accepted, 15);
}
