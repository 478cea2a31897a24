//! Named bulkhead: bounds concurrent in-flight operations with a
//! bounded FIFO wait queue (`SPEC_FULL.md` §4.3). Built on
//! `tokio::sync::Semaphore`, whose waiters are already served FIFO;
//! this wrapper adds the queue-depth accounting the spec's rejection
//! rule needs (`queued >= max_queue` → reject instead of wait).

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::error::CoreError;

#[derive(Debug, Clone, Copy)]
pub struct BulkheadConfig {
    pub max_concurrent: u32,
    pub max_queue: u32,
}

#[derive(Debug, Default)]
pub struct BulkheadMetrics {
    pub active: u32,
    pub queued: u32,
    pub rejections: u64,
}

pub struct Bulkhead {
    name: String,
    config: BulkheadConfig,
    semaphore: Arc<Semaphore>,
    /// Tasks that have passed admission control (active + queued),
    /// capped at `max_concurrent + max_queue`. Reserved via a single
    /// atomic compare-and-swap loop so concurrent arrivals can't both
    /// observe spare queue capacity and overrun it (a plain
    /// load-then-increment would race).
    admitted: AtomicU32,
    rejections: AtomicU32,
}

impl Bulkhead {
    pub fn new(name: impl Into<String>, config: BulkheadConfig) -> Self {
        Self {
            name: name.into(),
            semaphore: Arc::new(Semaphore::new(config.max_concurrent as usize)),
            config,
            admitted: AtomicU32::new(0),
            rejections: AtomicU32::new(0),
        }
    }

    fn active(&self) -> u32 {
        self.config.max_concurrent - self.semaphore.available_permits() as u32
    }

    pub fn metrics(&self) -> BulkheadMetrics {
        let active = self.active();
        let admitted = self.admitted.load(Ordering::Relaxed);
        BulkheadMetrics {
            active,
            queued: admitted.saturating_sub(active),
            rejections: self.rejections.load(Ordering::Relaxed) as u64,
        }
    }

    pub fn utilization(&self) -> f64 {
        self.active() as f64 / self.config.max_concurrent as f64
    }

    pub async fn call<F, Fut, T>(&self, op: F) -> Result<T, CoreError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, CoreError>>,
    {
        let total_capacity = self.config.max_concurrent + self.config.max_queue;
        let reserved = self
            .admitted
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                if current < total_capacity {
                    Some(current + 1)
                } else {
                    None
                }
            });

        if reserved.is_err() {
            self.rejections.fetch_add(1, Ordering::Relaxed);
            return Err(CoreError::BulkheadFull {
                operation: self.name.clone(),
                active: self.active(),
                queued: self.config.max_queue,
            });
        }

        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| CoreError::fatal("bulkhead semaphore closed"))?;

        let result = op().await;

        drop(permit);
        self.admitted.fetch_sub(1, Ordering::SeqCst);

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32 as Counter;
    use std::time::Duration;

    #[tokio::test]
    async fn bounds_concurrency_and_rejects_past_queue() {
        let bulkhead = Arc::new(Bulkhead::new(
            "extract",
            BulkheadConfig {
                max_concurrent: 5,
                max_queue: 10,
            },
        ));
        let in_flight = Arc::new(Counter::new(0));
        let max_observed = Arc::new(Counter::new(0));

        let mut handles = Vec::new();
        for _ in 0..20 {
            let bulkhead = bulkhead.clone();
            let in_flight = in_flight.clone();
            let max_observed = max_observed.clone();
            handles.push(tokio::spawn(async move {
                bulkhead
                    .call(|| async move {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        max_observed.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        Ok::<_, CoreError>(())
                    })
                    .await
            }));
        }

        let results: Vec<_> = futures_results(handles).await;
        let rejected = results
            .iter()
            .filter(|r| matches!(r, Err(CoreError::BulkheadFull { .. })))
            .count();
        let accepted = results.iter().filter(|r| r.is_ok()).count();

        assert!(max_observed.load(Ordering::SeqCst) <= 5);
        assert_eq!(accepted + rejected, 20);
        assert_eq!(rejected, 5);
        assert_eq!(accepted, 15);
    }

    async fn futures_results(
        handles: Vec<tokio::task::JoinHandle<Result<(), CoreError>>>,
    ) -> Vec<Result<(), CoreError>> {
        let mut out = Vec::new();
        for h in handles {
            out.push(h.await.expect("task panicked"));
        }
        out
    }
}
