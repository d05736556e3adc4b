//! Error taxonomy for the turn engine.
//!
//! Only the two named recoverable classes are retried; anything else is
//! fatal and aborts the batch call instead of silently degrading results.

use thiserror::Error;

/// Failure of one backend round-trip, classified for the retry loop.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Rate limit / timeout / retriable server error. Retried after a long
    /// fixed cooldown.
    #[error("transient provider error: {0}")]
    Transient(String),

    /// The provider rejected the request (malformed, oversized, policy
    /// blocked). Retried after the short request interval.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// Unclassified failure. Never retried, never recorded as a soft error;
    /// propagates out of the batch call.
    #[error(transparent)]
    Fatal(#[from] anyhow::Error),
}

impl BackendError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, BackendError::Fatal(_))
    }
}

/// The expected score pattern was absent or incomplete in the response text.
///
/// Extractors fail with this type for every input, including empty or
/// sentinel text, so the turn engine's catch set stays uniform.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    #[error("pattern `{pattern}` did not match response text")]
    PatternMissing { pattern: String },

    #[error("metric set incomplete: missing {missing:?}")]
    MissingMetrics { missing: Vec<String> },
}
