//! Concurrent worker pool for concept extraction (`SPEC_FULL.md`
//! §4.5): up to `W` extraction tasks run at once, each gated by the
//! shared rate limiter, with errors isolated per document. Progress
//! reporting reuses the teacher's `SyncProgressReporter` trait via the
//! new `Enriching` event rather than a parallel reporting mechanism.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::config::EnrichmentConfig;
use crate::enrichment::extractor::{extract_concepts, ExtractionResult};
use crate::enrichment::rate_limiter::RateLimiter;
use crate::progress::{SyncProgressEvent, SyncProgressReporter};
use crate::resilience::ResilientExecutor;

#[derive(Debug, Clone)]
pub struct WorkItem {
    pub source: String,
    pub content_hash: String,
    pub text: String,
}

#[derive(Debug, Clone)]
pub enum WorkOutcome {
    Success {
        source: String,
        content_hash: String,
        extraction: ExtractionResult,
    },
    Failure {
        source: String,
        content_hash: String,
        error: String,
    },
}

impl WorkOutcome {
    pub fn source(&self) -> &str {
        match self {
            WorkOutcome::Success { source, .. } => source,
            WorkOutcome::Failure { source, .. } => source,
        }
    }

    pub fn content_hash(&self) -> &str {
        match self {
            WorkOutcome::Success { content_hash, .. } => content_hash,
            WorkOutcome::Failure { content_hash, .. } => content_hash,
        }
    }
}

/// Run extraction over `items` with up to `config.worker_concurrency`
/// concurrent tasks. The returned `Vec` mirrors `items`' input order,
/// not the order individual extractions complete in.
pub async fn run_worker_pool(
    items: Vec<WorkItem>,
    config: &EnrichmentConfig,
    resilience: Arc<ResilientExecutor>,
    rate_limiter: Arc<RateLimiter>,
    progress: &dyn SyncProgressReporter,
) -> Vec<WorkOutcome> {
    let total = items.len() as u64;
    let semaphore = Arc::new(Semaphore::new(config.worker_concurrency));
    let completed = Arc::new(AtomicU64::new(0));
    let config = Arc::new(config.clone());

    let mut handles = Vec::with_capacity(items.len());
    for item in items {
        let semaphore = semaphore.clone();
        let rate_limiter = rate_limiter.clone();
        let config = config.clone();
        let resilience = resilience.clone();
        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
            rate_limiter.acquire().await;
            let result = extract_concepts(&resilience, &config, &item.text).await;
            (item, result)
        }));
    }

    let mut outcomes = Vec::with_capacity(handles.len());
    for handle in handles {
        let (item, result) = handle.await.expect("worker task panicked");
        let outcome = match result {
            Ok(extraction) => WorkOutcome::Success {
                source: item.source.clone(),
                content_hash: item.content_hash.clone(),
                extraction,
            },
            Err(err) => WorkOutcome::Failure {
                source: item.source.clone(),
                content_hash: item.content_hash.clone(),
                error: err.to_string(),
            },
        };

        let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
        progress.report(SyncProgressEvent::Enriching {
            completed: done,
            total,
            current_source: item.source,
        });

        outcomes.push(outcome);
    }

    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResilienceOverrides;
    use crate::progress::NoProgress;
    use std::time::Duration;

    fn test_config() -> EnrichmentConfig {
        EnrichmentConfig {
            min_interval_ms: 0,
            worker_concurrency: 2,
            token_threshold: 100_000,
            fuzzy_match_ratio: 0.7,
            with_wordnet: false,
            concept_embedding_from_examples: false,
            llm_model: "gpt-4o-mini".to_string(),
            llm_endpoint: Some("http://127.0.0.1:1".to_string()),
        }
    }

    #[tokio::test]
    async fn output_order_mirrors_input_order_even_on_failure() {
        let config = test_config();
        let items = vec![
            WorkItem {
                source: "a.txt".to_string(),
                content_hash: "h1".to_string(),
                text: "first document".to_string(),
            },
            WorkItem {
                source: "b.txt".to_string(),
                content_hash: "h2".to_string(),
                text: "second document".to_string(),
            },
        ];
        let rate_limiter = Arc::new(RateLimiter::new(Duration::from_millis(0)));
        let resilience = Arc::new(ResilientExecutor::new(ResilienceOverrides::default()));
        let outcomes = run_worker_pool(items, &config, resilience, rate_limiter, &NoProgress).await;

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].source(), "a.txt");
        assert_eq!(outcomes[1].source(), "b.txt");
        // unreachable llm_endpoint -> every item isolates its own failure
        assert!(outcomes.iter().all(|o| matches!(o, WorkOutcome::Failure { .. })));
    }
}
