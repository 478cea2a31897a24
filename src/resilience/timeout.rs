//! Timeout wrapper: bounds a single attempt's wall-clock time.

use std::future::Future;
use std::time::Duration;

use crate::error::CoreError;

/// Run `op` under a deadline. On expiry the background future is
/// dropped by `tokio::time::timeout` — best-effort cancellation, per
/// `SPEC_FULL.md` §5: the runtime may still be polling it briefly if
/// it holds no `.await` point, but no further progress is observed by
/// the caller.
pub async fn with_timeout<F, T>(
    op: F,
    duration: Duration,
    name: &str,
) -> Result<T, CoreError>
where
    F: Future<Output = Result<T, CoreError>>,
{
    match tokio::time::timeout(duration, op).await {
        Ok(result) => result,
        Err(_) => Err(CoreError::Timeout {
            name: name.to_string(),
            duration,
        }),
    }
}
