//! Error types for the refinement pipeline.

use std::time::Duration;

use thiserror::Error;

/// Errors raised by the pipeline stages.
///
/// Structural errors (`SegmentationInvariant`, `ReassemblyConsistency`)
/// indicate a defect in this crate and are never downgraded. Backend
/// failures only surface here after the retry policy has escalated them.
#[derive(Debug, Error)]
pub enum RefineError {
    /// Concatenated turns do not reproduce the transcript.
    #[error("segmentation invariant violated: turns cover {actual} bytes, transcript has {expected}")]
    SegmentationInvariant { expected: usize, actual: usize },

    /// Chunk planning rejected its parameters.
    #[error("planning error: {0}")]
    Planning(String),

    /// A chunk failed and the run was configured to fail fast.
    #[error("chunk {chunk_index} failed: {source}")]
    Backend {
        chunk_index: usize,
        #[source]
        source: BackendError,
    },

    /// A turn is missing or duplicated in the assembled document.
    #[error("reassembly consistency error: {0}")]
    ReassemblyConsistency(String),

    /// The summary reduce stage could not converge.
    #[error("summarization error: {0}")]
    Summarization(String),

    /// The run was cancelled before or during the given chunk.
    #[error("run cancelled at chunk {chunk_index}")]
    Cancelled { chunk_index: usize },

    /// Invalid configuration value or speaker pattern.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Convenience alias used by the library stages.
pub type Result<T> = std::result::Result<T, RefineError>;

/// Failure of a single generation call.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// The call exceeded the caller-applied timeout.
    #[error("backend call timed out after {0:?}")]
    Timeout(Duration),

    /// The backend asked us to slow down.
    #[error("rate limited by backend")]
    RateLimited { retry_after: Option<Duration> },

    /// Network hiccup or overloaded service.
    #[error("transient backend failure: {0}")]
    Transient(String),

    /// Output arrived but did not follow the segment protocol.
    #[error("malformed backend output: {0}")]
    Malformed(String),

    /// Invalid request, bad credentials, unknown model.
    #[error("permanent backend failure: {0}")]
    Permanent(String),

    /// The call was interrupted by cooperative cancellation.
    #[error("cancelled")]
    Cancelled,
}

impl BackendError {
    /// Whether the retry loop may try this call again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::RateLimited { .. } | Self::Transient(_) | Self::Malformed(_)
        )
    }

    /// Map a transport error from reqwest onto the taxonomy.
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            Self::Transient(err.to_string())
        } else if err.is_decode() {
            Self::Malformed(err.to_string())
        } else {
            Self::Permanent(err.to_string())
        }
    }

    /// Map a non-success HTTP status onto the taxonomy.
    pub fn from_status(
        status: reqwest::StatusCode,
        retry_after: Option<Duration>,
        body: &str,
    ) -> Self {
        let code = status.as_u16();
        match code {
            429 => Self::RateLimited { retry_after },
            408 | 500..=599 => Self::Transient(format!("{} - {}", status, body)),
            _ => Self::Permanent(format!("{} - {}", status, body)),
        }
    }
}
