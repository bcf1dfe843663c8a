//! Error taxonomy for the engine.
//!
//! Source-level failures never escape a cycle: the [`SourceClient`](crate::sources::SourceClient)
//! folds them into a `Failed(FailureKind)` reading. Only registry problems are fatal.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Failure returned by a single upstream request attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    /// Connection reset, DNS failure, 5xx, truncated body.
    #[error("transient network error: {0}")]
    Transient(String),

    /// HTTP 429 or an equivalent throttling signal.
    #[error("rate limited by upstream")]
    RateLimited,

    /// The per-call timeout elapsed before the upstream answered.
    #[error("upstream call timed out after {0:?}")]
    Timeout(Duration),

    /// The response arrived but did not have the expected shape.
    #[error("unexpected upstream response: {0}")]
    UpstreamSchema(String),

    /// Permanent HTTP failure (4xx other than 429).
    #[error("upstream returned HTTP {status}")]
    Http { status: u16 },

    /// Missing API key, missing FIPS code, bad base URL.
    #[error("source misconfigured: {0}")]
    Misconfigured(String),
}

impl SourceError {
    /// Transient failures and rate limits share one retry budget.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SourceError::Transient(_) | SourceError::RateLimited | SourceError::Timeout(_)
        )
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            SourceError::Transient(_) => FailureKind::Transient,
            SourceError::Http { .. } => FailureKind::Rejected,
            SourceError::RateLimited => FailureKind::RateLimited,
            SourceError::Timeout(_) => FailureKind::Timeout,
            SourceError::UpstreamSchema(_) => FailureKind::UpstreamSchema,
            SourceError::Misconfigured(_) => FailureKind::Misconfigured,
        }
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return SourceError::Timeout(Duration::ZERO);
        }
        if e.is_decode() {
            return SourceError::UpstreamSchema(e.to_string());
        }
        if e.is_builder() {
            return SourceError::Misconfigured(e.to_string());
        }
        SourceError::Transient(e.to_string())
    }
}

/// Why a reading ended up `Failed`. Recorded on the reading and in metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Transient,
    RateLimited,
    Timeout,
    UpstreamSchema,
    /// Permanent HTTP refusal, e.g. a point outside NWS coverage.
    Rejected,
    Misconfigured,
    /// The cycle deadline cut the fetch short (backoff would cross it, or the task was abandoned).
    DeadlineExceeded,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Transient => "transient",
            FailureKind::RateLimited => "rate_limited",
            FailureKind::Timeout => "timeout",
            FailureKind::UpstreamSchema => "upstream_schema",
            FailureKind::Rejected => "rejected",
            FailureKind::Misconfigured => "misconfigured",
            FailureKind::DeadlineExceeded => "deadline_exceeded",
        }
    }
}

/// Errors surfaced to callers of the engine's query and startup surface.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("entity not found: {0}")]
    NotFound(String),

    #[error("entity registry is empty")]
    RegistryEmpty,

    #[error("invalid entity registry: {0}")]
    InvalidRegistry(String),
}

/// Failure writing to a cache backend. Reads never fail: they miss.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_and_transient_share_retry_budget() {
        assert!(SourceError::RateLimited.is_retryable());
        assert!(SourceError::Transient("reset".into()).is_retryable());
        assert!(SourceError::Timeout(Duration::from_secs(10)).is_retryable());
        assert!(!SourceError::UpstreamSchema("no periods".into()).is_retryable());
        assert!(!SourceError::Http { status: 404 }.is_retryable());
        assert!(!SourceError::Misconfigured("no key".into()).is_retryable());
    }

    #[test]
    fn kinds_map_one_to_one_for_labels() {
        assert_eq!(SourceError::RateLimited.kind(), FailureKind::RateLimited);
        assert_eq!(
            SourceError::UpstreamSchema("x".into()).kind().as_str(),
            "upstream_schema"
        );
    }
}
