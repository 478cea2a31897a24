//! Named circuit breaker state machine: Closed → Open → Half-Open
//! (`SPEC_FULL.md` §4.3). Grounded on the breaker in
//! `marlonsc-mcp-context-browser`'s `infrastructure/resilience` module
//! — same state-transition shape and atomic counters, narrowed to the
//! fixed failure/success-threshold policy this spec requires instead
//! of that crate's pluggable backend trait.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use tracing::info;

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub open_duration: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            open_duration: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Default)]
pub struct CircuitBreakerMetrics {
    pub requests: u64,
    pub successes: u64,
    pub failures: u64,
    pub rejections: u64,
}

pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: RwLock<CircuitState>,
    opened_at: RwLock<Option<Instant>>,
    failure_count: AtomicU32,
    success_count: AtomicU32,
    /// Gates Half-Open admission down to exactly one in-flight probe at
    /// a time: 0 means a probe may be admitted, 1 means one is already
    /// running. Reserved via compare-and-swap, mirroring the `admitted`
    /// counter in `src/resilience/bulkhead.rs`.
    half_open_calls: AtomicU32,
    requests: AtomicU32,
    successes: AtomicU32,
    failures: AtomicU32,
    rejections: AtomicU32,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: RwLock::new(CircuitState::Closed),
            opened_at: RwLock::new(None),
            failure_count: AtomicU32::new(0),
            success_count: AtomicU32::new(0),
            half_open_calls: AtomicU32::new(0),
            requests: AtomicU32::new(0),
            successes: AtomicU32::new(0),
            failures: AtomicU32::new(0),
            rejections: AtomicU32::new(0),
        }
    }

    pub fn state(&self) -> CircuitState {
        *self.state.read().expect("circuit breaker state lock poisoned")
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fast-fail check. Transitions Open → Half-Open in place once
    /// `open_duration` has elapsed, so the next call after the window
    /// is the probe (<10ms decision — no I/O on this path). Half-Open
    /// admits exactly one probe at a time rather than every caller, so
    /// concurrent callers don't all hit a still-failing backend.
    pub fn is_call_permitted(&self) -> bool {
        let current = self.state();
        match current {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => self.try_admit_half_open_probe(),
            CircuitState::Open => {
                let elapsed = self
                    .opened_at
                    .read()
                    .expect("opened_at lock poisoned")
                    .map(|t| t.elapsed())
                    .unwrap_or_default();
                if elapsed >= self.config.open_duration {
                    self.transition_to(CircuitState::HalfOpen);
                    // Fall through the same one-probe gate as an
                    // already-Half-Open circuit: several callers can
                    // race this transition at once, and only the first
                    // should reach the backend.
                    self.try_admit_half_open_probe()
                } else {
                    self.rejections.fetch_add(1, Ordering::Relaxed);
                    false
                }
            }
        }
    }

    /// Reserve the single Half-Open probe slot via compare-and-swap.
    /// Returns `true` for exactly one caller until the slot is released
    /// by `record_success`/`record_failure` or a state transition.
    fn try_admit_half_open_probe(&self) -> bool {
        match self
            .half_open_calls
            .compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(_) => true,
            Err(_) => {
                self.rejections.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    pub fn record_success(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.successes.fetch_add(1, Ordering::Relaxed);

        match self.state() {
            CircuitState::Closed => {
                self.failure_count.store(0, Ordering::Relaxed);
            }
            CircuitState::HalfOpen => {
                // Release the probe slot before possibly transitioning so a
                // remaining Half-Open window can admit the next single probe.
                self.half_open_calls.store(0, Ordering::SeqCst);
                let successes = self.success_count.fetch_add(1, Ordering::Relaxed) + 1;
                if successes >= self.config.success_threshold {
                    self.transition_to(CircuitState::Closed);
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.failures.fetch_add(1, Ordering::Relaxed);

        match self.state() {
            CircuitState::Closed => {
                let failures = self.failure_count.fetch_add(1, Ordering::Relaxed) + 1;
                if failures >= self.config.failure_threshold {
                    self.transition_to(CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                self.half_open_calls.store(0, Ordering::SeqCst);
                self.transition_to(CircuitState::Open);
            }
            CircuitState::Open => {}
        }
    }

    fn transition_to(&self, new_state: CircuitState) {
        let mut state = self.state.write().expect("circuit breaker state lock poisoned");
        let old_state = *state;
        if old_state == new_state {
            return;
        }
        *state = new_state;
        drop(state);

        match new_state {
            CircuitState::Closed => {
                self.failure_count.store(0, Ordering::Relaxed);
                self.success_count.store(0, Ordering::Relaxed);
                self.half_open_calls.store(0, Ordering::SeqCst);
            }
            CircuitState::Open => {
                *self.opened_at.write().expect("opened_at lock poisoned") = Some(Instant::now());
                self.success_count.store(0, Ordering::Relaxed);
                self.half_open_calls.store(0, Ordering::SeqCst);
            }
            CircuitState::HalfOpen => {
                self.success_count.store(0, Ordering::Relaxed);
                self.half_open_calls.store(0, Ordering::SeqCst);
            }
        }

        info!(
            circuit_breaker = %self.name,
            from = %old_state,
            to = %new_state,
            "circuit breaker state transition"
        );
    }

    pub fn metrics(&self) -> CircuitBreakerMetrics {
        CircuitBreakerMetrics {
            requests: self.requests.load(Ordering::Relaxed) as u64,
            successes: self.successes.load(Ordering::Relaxed) as u64,
            failures: self.failures.load(Ordering::Relaxed) as u64,
            rejections: self.rejections.load(Ordering::Relaxed) as u64,
        }
    }

    /// Run `op` through the breaker: fast-fail if not permitted,
    /// otherwise run and record the outcome.
    pub async fn call<F, Fut, T>(&self, op: F) -> Result<T, CoreError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, CoreError>>,
    {
        if !self.is_call_permitted() {
            return Err(CoreError::CircuitOpen {
                operation: self.name.clone(),
            });
        }

        match op().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                self.record_failure();
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 3,
            success_threshold: 2,
            open_duration: Duration::from_millis(20),
        }
    }

    #[tokio::test]
    async fn opens_after_failure_threshold() {
        let cb = CircuitBreaker::new("llm_extract", fast_config());
        for _ in 0..3 {
            let _ = cb
                .call(|| async { Err::<(), _>(CoreError::transient("llm", "boom")) })
                .await;
        }
        assert_eq!(cb.state(), CircuitState::Open);

        let result = cb.call(|| async { Ok::<_, CoreError>(1) }).await;
        assert!(matches!(result, Err(CoreError::CircuitOpen { .. })));
    }

    #[tokio::test]
    async fn half_open_probe_closes_after_successes() {
        let cb = CircuitBreaker::new("llm_extract", fast_config());
        for _ in 0..3 {
            let _ = cb
                .call(|| async { Err::<(), _>(CoreError::transient("llm", "boom")) })
                .await;
        }
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(cb.call(|| async { Ok::<_, CoreError>(1) }).await.is_ok());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(cb.call(|| async { Ok::<_, CoreError>(1) }).await.is_ok());
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn half_open_admits_exactly_one_concurrent_probe() {
        use std::sync::atomic::AtomicU32 as Counter;
        use std::sync::Arc;

        let cb = Arc::new(CircuitBreaker::new("llm_extract", fast_config()));
        for _ in 0..3 {
            let _ = cb
                .call(|| async { Err::<(), _>(CoreError::transient("llm", "boom")) })
                .await;
        }
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cb.state(), CircuitState::Open);

        let in_flight = Arc::new(Counter::new(0));
        let max_observed = Arc::new(Counter::new(0));
        let mut handles = Vec::new();
        for _ in 0..10 {
            let cb = cb.clone();
            let in_flight = in_flight.clone();
            let max_observed = max_observed.clone();
            handles.push(tokio::spawn(async move {
                cb.call(|| async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    max_observed.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Err::<(), _>(CoreError::transient("llm", "still down"))
                })
                .await
            }));
        }

        let mut admitted = 0;
        let mut rejected = 0;
        for h in handles {
            match h.await.expect("task panicked") {
                Err(CoreError::CircuitOpen { .. }) => rejected += 1,
                _ => admitted += 1,
            }
        }

        assert_eq!(max_observed.load(Ordering::SeqCst), 1, "only one probe should run at a time");
        assert_eq!(admitted, 1);
        assert_eq!(rejected, 9);
    }

    #[tokio::test]
    async fn half_open_failure_reopens() {
        let cb = CircuitBreaker::new("llm_extract", fast_config());
        for _ in 0..3 {
            let _ = cb
                .call(|| async { Err::<(), _>(CoreError::transient("llm", "boom")) })
                .await;
        }
        tokio::time::sleep(Duration::from_millis(30)).await;
        let _ = cb
            .call(|| async { Err::<(), _>(CoreError::transient("llm", "still down")) })
            .await;
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn success_in_closed_resets_failure_count() {
        let cb = CircuitBreaker::new("llm_extract", fast_config());
        let _ = cb
            .call(|| async { Err::<(), _>(CoreError::transient("llm", "boom")) })
            .await;
        let _ = cb.call(|| async { Ok::<_, CoreError>(1) }).await;
        let _ = cb
            .call(|| async { Err::<(), _>(CoreError::transient("llm", "boom")) })
            .await;
        let _ = cb
            .call(|| async { Err::<(), _>(CoreError::transient("llm", "boom")) })
            .await;
        assert_eq!(cb.state(), CircuitState::Closed);
    }
}
