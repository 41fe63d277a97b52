//! Error types for the benchmark engine.
//!
//! Two layers: `ClientError` is what a backend adapter reports, `BenchError`
//! is what aborts a run. Individual query failures never become a
//! `BenchError`; they are folded into the metrics as failed-request samples.

use std::time::Duration;

use thiserror::Error;

/// Error raised by a `VectorClient` operation or session setup.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The call did not complete within the client's configured timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Connection or session-level failure (cannot reach the backend).
    #[error("transport error: {0}")]
    Transport(String),

    /// The backend accepted the request and returned an error.
    #[error("backend error: {0}")]
    Backend(String),
}

impl ClientError {
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }
}

/// Rejected benchmark configuration.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("concurrency levels must be non-empty")]
    EmptyLevels,

    #[error("concurrency levels must be unique and strictly increasing: {0:?}")]
    UnsortedLevels(Vec<usize>),

    #[error("concurrency levels must be positive")]
    ZeroLevel,

    #[error("per-level duration must be greater than zero")]
    ZeroDuration,

    #[error("k must be greater than zero")]
    ZeroK,

    #[error("search timeout must be greater than zero")]
    ZeroTimeout,

    #[error("failure threshold must be within [0, 1], got {0}")]
    BadThreshold(f64),
}

/// Fatal failure that aborts a benchmark run.
#[derive(Debug, Error)]
pub enum BenchError {
    /// Load-phase insertion failed; the partial count is carried in the
    /// attached `LoadResult`, this is the short-circuit signal.
    #[error("load phase failed: {0}")]
    LoadFailed(String),

    /// Serial search failure rate exceeded the configured threshold.
    #[error("serial search failure rate {rate:.3} exceeded threshold {threshold:.3}")]
    SerialFailureRate { rate: f64, threshold: f64 },

    /// No worker session could be established at a concurrency level.
    #[error("all {concurrency} worker sessions failed to initialize at level {concurrency}: {reason}")]
    LevelInitFailed { concurrency: usize, reason: String },
}
