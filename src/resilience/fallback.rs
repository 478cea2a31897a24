//! Graceful degradation: run a fallback instead of (or after) the
//! primary operation (`SPEC_FULL.md` §4.3).

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::CoreError;

#[derive(Debug, Default)]
pub struct DegradationStats {
    total: AtomicU64,
    degraded: AtomicU64,
}

impl DegradationStats {
    pub fn rate(&self) -> f64 {
        let total = self.total.load(Ordering::Relaxed) as f64;
        if total == 0.0 {
            0.0
        } else {
            self.degraded.load(Ordering::Relaxed) as f64 / total
        }
    }
}

/// Run `primary`, falling back to `fallback` either preemptively (when
/// `should_degrade` returns true) or reactively (on primary failure).
pub async fn with_fallback<P, PFut, F, FFut, T>(
    stats: &DegradationStats,
    should_degrade: impl FnOnce() -> bool,
    primary: P,
    fallback: F,
) -> Result<T, CoreError>
where
    P: FnOnce() -> PFut,
    PFut: Future<Output = Result<T, CoreError>>,
    F: FnOnce() -> FFut,
    FFut: Future<Output = Result<T, CoreError>>,
{
    stats.total.fetch_add(1, Ordering::Relaxed);

    if should_degrade() {
        stats.degraded.fetch_add(1, Ordering::Relaxed);
        return fallback().await;
    }

    match primary().await {
        Ok(value) => Ok(value),
        Err(_) => {
            stats.degraded.fetch_add(1, Ordering::Relaxed);
            fallback().await
        }
    }
}
