//! Error taxonomy shared by the resilience layer, storage, ranking, and
//! enrichment pipeline.
//!
//! Modules that the resilience layer or the tool surface must pattern
//! match on return [`CoreError`]; CLI and orchestration code collapses
//! everything into `anyhow::Result` at the edges, matching the
//! teacher's own `main.rs`/`ingest.rs` convention.

use std::time::Duration;
use thiserror::Error;

/// The error taxonomy named in the specification: each variant carries
/// enough context for callers (resilience wrappers, tool handlers,
/// the seeding CLI's exit-code logic) to react without string matching.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed input. Never retried, never recovered — reported to
    /// the caller as-is.
    #[error("validation error: {0}")]
    Validation(String),

    /// Entity missing. Search paths treat this as an empty result, not
    /// an error; other callers may still want to observe it.
    #[error("not found: {0}")]
    NotFound(String),

    /// Network timeout, 5xx from an upstream, connection drop — retried
    /// under resilience policy, reported only once retries exhaust.
    #[error("transient error in {operation}: {message}")]
    Transient { operation: String, message: String },

    /// 429 or equivalent. Counted as a failure toward the circuit
    /// breaker and retried with extra backoff.
    #[error("rate limited by {operation}")]
    RateLimited { operation: String },

    /// The named circuit is open; fast-failed without attempting the
    /// call.
    #[error("circuit open for operation '{operation}'")]
    CircuitOpen { operation: String },

    /// The named bulkhead's queue is full.
    #[error("bulkhead full for operation '{operation}' (active={active}, queued={queued})")]
    BulkheadFull {
        operation: String,
        active: u32,
        queued: u32,
    },

    /// The operation did not complete within its allotted duration.
    #[error("operation '{name}' timed out after {duration:?}")]
    Timeout { name: String, duration: Duration },

    /// Corrupted store, schema mismatch, or anything else that should
    /// abort the current operation outright.
    #[error("fatal error: {0}")]
    Fatal(String),
}

impl CoreError {
    /// Whether the resilience retry wrapper is allowed to retry this
    /// error kind. Validation, CircuitOpen, BulkheadFull, and Fatal
    /// bypass retry per spec — they either can never succeed on retry
    /// or must not be retried by policy.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::Transient { .. } | CoreError::RateLimited { .. } | CoreError::Timeout { .. }
        )
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        CoreError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        CoreError::NotFound(msg.into())
    }

    pub fn transient(operation: impl Into<String>, message: impl Into<String>) -> Self {
        CoreError::Transient {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        CoreError::Fatal(msg.into())
    }

    /// Machine-readable error code for the tool-surface error shape
    /// `{error: {code, message, context?}}` (spec.md §6/§7).
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Validation(_) => "validation",
            CoreError::NotFound(_) => "not_found",
            CoreError::Transient { .. } => "transient",
            CoreError::RateLimited { .. } => "rate_limited",
            CoreError::CircuitOpen { .. } => "circuit_open",
            CoreError::BulkheadFull { .. } => "bulkhead_full",
            CoreError::Timeout { .. } => "timeout",
            CoreError::Fatal(_) => "fatal",
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds() {
        assert!(CoreError::transient("db", "timed out").is_retryable());
        assert!(CoreError::RateLimited {
            operation: "llm".into()
        }
        .is_retryable());
        assert!(!CoreError::validation("bad").is_retryable());
        assert!(!CoreError::CircuitOpen {
            operation: "llm".into()
        }
        .is_retryable());
        assert!(!CoreError::fatal("corrupt").is_retryable());
    }

    #[test]
    fn error_codes() {
        assert_eq!(CoreError::validation("x").code(), "validation");
        assert_eq!(CoreError::not_found("x").code(), "not_found");
        assert_eq!(
            CoreError::CircuitOpen {
                operation: "x".into()
            }
            .code(),
            "circuit_open"
        );
    }
}
