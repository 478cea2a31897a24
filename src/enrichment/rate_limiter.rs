//! Shared single-permit rate limiter for the enrichment pipeline's LLM
//! calls. Deliberately simpler than the resilience layer's bulkhead:
//! this is a minimum-interval gate between *any two* calls across all
//! workers, not a concurrency cap (`SPEC_FULL.md` §4.5).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Default)]
pub struct RateLimiterMetrics {
    pub total_requests: u64,
    pub total_wait: Duration,
    pub max_wait: Duration,
}

/// FIFO single-permit scheduler: `acquire()` resolves only once
/// `min_interval` has elapsed since the previous caller's `acquire()`
/// returned. The internal mutex serializes acquirers in arrival order,
/// giving the FIFO queuing the spec requires without a separate queue
/// data structure.
pub struct RateLimiter {
    min_interval: Duration,
    last_released: Mutex<Option<Instant>>,
    total_requests: AtomicU64,
    total_wait_micros: AtomicU64,
    max_wait_micros: AtomicU64,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_released: Mutex::new(None),
            total_requests: AtomicU64::new(0),
            total_wait_micros: AtomicU64::new(0),
            max_wait_micros: AtomicU64::new(0),
        }
    }

    /// Blocks the caller until at least `min_interval` has passed since
    /// the previous `acquire()` returned, then records this call's
    /// release time.
    pub async fn acquire(&self) {
        let mut last = self.last_released.lock().await;
        let now = Instant::now();

        let wait = match *last {
            Some(prev) => {
                let elapsed = now.saturating_duration_since(prev);
                self.min_interval.saturating_sub(elapsed)
            }
            None => Duration::ZERO,
        };

        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }

        *last = Some(Instant::now());
        drop(last);

        self.total_requests.fetch_add(1, Ordering::Relaxed);
        let wait_micros = wait.as_micros() as u64;
        self.total_wait_micros.fetch_add(wait_micros, Ordering::Relaxed);
        self.max_wait_micros.fetch_max(wait_micros, Ordering::Relaxed);
    }

    pub fn metrics(&self) -> RateLimiterMetrics {
        let total_requests = self.total_requests.load(Ordering::Relaxed);
        RateLimiterMetrics {
            total_requests,
            total_wait: Duration::from_micros(self.total_wait_micros.load(Ordering::Relaxed)),
            max_wait: Duration::from_micros(self.max_wait_micros.load(Ordering::Relaxed)),
        }
    }

    pub fn average_wait(&self) -> Duration {
        let metrics = self.metrics();
        if metrics.total_requests == 0 {
            return Duration::ZERO;
        }
        metrics.total_wait / metrics.total_requests as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn first_acquire_does_not_wait() {
        let limiter = RateLimiter::new(Duration::from_millis(50));
        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(20));
        assert_eq!(limiter.metrics().total_requests, 1);
    }

    #[tokio::test]
    async fn second_acquire_waits_out_the_interval() {
        let limiter = RateLimiter::new(Duration::from_millis(60));
        limiter.acquire().await;
        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn concurrent_acquirers_are_serialized() {
        let limiter = Arc::new(RateLimiter::new(Duration::from_millis(30)));
        let mut handles = Vec::new();
        for _ in 0..5 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                limiter.acquire().await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(limiter.metrics().total_requests, 5);
    }
}
