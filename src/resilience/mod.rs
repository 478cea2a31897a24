//! Resilience execution layer (`SPEC_FULL.md` §4.3): composable
//! wrappers — timeout, retry, circuit breaker, bulkhead, graceful
//! degradation — plus a [`ResilientExecutor`] that composes the first
//! four in the spec's fixed nesting order for a named operation:
//! **retry → bulkhead → circuit breaker → timeout → op.** Timeouts
//! bound each individual attempt; the circuit breaker judges health
//! per attempt (not per retry-wrapped call); the bulkhead caps total
//! in-flight work including queued retries; retry is outermost so it
//! can re-enter the whole stack.
//!
//! Circuit breakers and bulkheads are keyed by operation name and
//! memoised in `DashMap`s owned by the executor, mirroring the
//! per-name breaker registries in `marlonsc-mcp-context-browser`'s
//! resilience module.

pub mod bulkhead;
pub mod circuit_breaker;
pub mod fallback;
pub mod retry;
pub mod timeout;

pub use bulkhead::{Bulkhead, BulkheadConfig};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use fallback::{with_fallback, DegradationStats};
pub use retry::{with_retry, RetryConfig};
pub use timeout::with_timeout;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use crate::config::ResilienceOverrides;
use crate::error::CoreError;

/// One of the four predefined profiles (`SPEC_FULL.md` §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Profile {
    LlmApi,
    Embedding,
    Database,
    Search,
}

struct ProfileSpec {
    timeout: Duration,
    retry: RetryConfig,
    circuit_breaker: Option<CircuitBreakerConfig>,
    bulkhead: BulkheadConfig,
}

impl Profile {
    fn spec(self, overrides: &ResilienceOverrides) -> ProfileSpec {
        match self {
            Profile::LlmApi => ProfileSpec {
                timeout: Duration::from_secs(overrides.llm_api_timeout_secs.unwrap_or(30)),
                retry: RetryConfig {
                    max_attempts: 3,
                    ..RetryConfig::default()
                },
                circuit_breaker: Some(CircuitBreakerConfig {
                    failure_threshold: 5,
                    success_threshold: 2,
                    open_duration: Duration::from_secs(60),
                }),
                bulkhead: BulkheadConfig {
                    max_concurrent: 5,
                    max_queue: 10,
                },
            },
            Profile::Embedding => ProfileSpec {
                timeout: Duration::from_secs(overrides.embedding_timeout_secs.unwrap_or(10)),
                retry: RetryConfig {
                    max_attempts: 3,
                    ..RetryConfig::default()
                },
                circuit_breaker: Some(CircuitBreakerConfig {
                    failure_threshold: 5,
                    success_threshold: 2,
                    open_duration: Duration::from_secs(30),
                }),
                bulkhead: BulkheadConfig {
                    max_concurrent: 10,
                    max_queue: 20,
                },
            },
            Profile::Database => ProfileSpec {
                timeout: Duration::from_secs(overrides.database_timeout_secs.unwrap_or(3)),
                retry: RetryConfig {
                    max_attempts: 2,
                    ..RetryConfig::default()
                },
                circuit_breaker: None,
                bulkhead: BulkheadConfig {
                    max_concurrent: 20,
                    max_queue: 50,
                },
            },
            Profile::Search => ProfileSpec {
                timeout: Duration::from_secs(overrides.search_timeout_secs.unwrap_or(5)),
                retry: RetryConfig {
                    max_attempts: 2,
                    ..RetryConfig::default()
                },
                circuit_breaker: None,
                bulkhead: BulkheadConfig {
                    max_concurrent: 15,
                    max_queue: 30,
                },
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct HealthSummary {
    pub healthy: bool,
    pub open_circuits: Vec<String>,
    pub full_bulkheads: Vec<String>,
}

/// Owns the per-name circuit breaker and bulkhead registries and runs
/// operations through the fixed composition order for a given
/// [`Profile`].
pub struct ResilientExecutor {
    overrides: ResilienceOverrides,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    bulkheads: DashMap<String, Arc<Bulkhead>>,
}

impl ResilientExecutor {
    pub fn new(overrides: ResilienceOverrides) -> Self {
        Self {
            overrides,
            breakers: DashMap::new(),
            bulkheads: DashMap::new(),
        }
    }

    fn breaker_for(&self, name: &str, config: CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(name, config)))
            .clone()
    }

    fn bulkhead_for(&self, name: &str, config: BulkheadConfig) -> Arc<Bulkhead> {
        self.bulkheads
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Bulkhead::new(name, config)))
            .clone()
    }

    /// Run `make_op` under `profile`, named `name` for breaker/bulkhead
    /// keying. `make_op` is called once per retry attempt.
    pub async fn execute<F, Fut, T>(
        &self,
        profile: Profile,
        name: &str,
        make_op: F,
    ) -> Result<T, CoreError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        let spec = profile.spec(&self.overrides);
        let bulkhead = self.bulkhead_for(name, spec.bulkhead);
        let breaker = spec
            .circuit_breaker
            .map(|cfg| self.breaker_for(name, cfg));

        with_retry(&spec.retry, || {
            let bulkhead = bulkhead.clone();
            let breaker = breaker.clone();
            let timeout_dur = spec.timeout;
            let attempt = make_op();
            async move {
                bulkhead
                    .call(|| async move {
                        let timed = with_timeout(attempt, timeout_dur, name);
                        match &breaker {
                            Some(cb) => cb.call(|| timed).await,
                            None => timed.await,
                        }
                    })
                    .await
            }
        })
        .await
    }

    pub fn health_summary(&self) -> HealthSummary {
        let open_circuits: Vec<String> = self
            .breakers
            .iter()
            .filter(|entry| entry.value().state() == CircuitState::Open)
            .map(|entry| entry.key().clone())
            .collect();

        let full_bulkheads: Vec<String> = self
            .bulkheads
            .iter()
            .filter(|entry| {
                let metrics = entry.value().metrics();
                metrics.queued > 0 && entry.value().utilization() >= 1.0
            })
            .map(|entry| entry.key().clone())
            .collect();

        HealthSummary {
            healthy: open_circuits.is_empty() && full_bulkheads.is_empty(),
            open_circuits,
            full_bulkheads,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn database_profile_has_no_circuit_breaker() {
        let executor = ResilientExecutor::new(ResilienceOverrides::default());
        let attempts = AtomicU32::new(0);
        let result = executor
            .execute(Profile::Database, "db_query", || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, CoreError>(7) }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn healthy_with_no_activity() {
        let executor = ResilientExecutor::new(ResilienceOverrides::default());
        assert!(executor.health_summary().healthy);
    }

    #[tokio::test]
    async fn llm_profile_opens_circuit_after_repeated_failure() {
        let executor = ResilientExecutor::new(ResilienceOverrides::default());
        for _ in 0..2 {
            let _ = executor
                .execute(Profile::LlmApi, "llm_extract", || async {
                    Err::<(), _>(CoreError::transient("llm", "down"))
                })
                .await;
        }
        // 2 calls * 3 retry attempts each = 6 failures >= threshold 5.
        let summary = executor.health_summary();
        assert!(summary.open_circuits.contains(&"llm_extract".to_string()));
        assert!(!summary.healthy);
    }
}
