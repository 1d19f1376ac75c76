//! Upstream error classification
//!
//! The retry loop only ever retries transient errors: timeouts, HTTP 429,
//! HTTP 5xx, and transport-level resets. Everything else surfaces
//! immediately.

use thiserror::Error;

/// An error from an upstream API call, classified for retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamError {
    /// The call exceeded its deadline.
    #[error("request timed out")]
    Timeout,

    /// The upstream answered with a non-success HTTP status.
    #[error("upstream returned HTTP {0}")]
    Status(u16),

    /// Connection reset, refused, DNS failure, or any other transport fault.
    #[error("transport error: {0}")]
    Transport(String),

    /// The request itself is invalid; retrying cannot help.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The caller was cancelled while waiting or in flight.
    #[error("cancelled")]
    Cancelled,

    /// Anything else; treated as permanent.
    #[error("{0}")]
    Other(String),
}

impl UpstreamError {
    /// Whether the retry loop is willing to retry this error.
    pub fn is_transient(&self) -> bool {
        match self {
            UpstreamError::Timeout | UpstreamError::Transport(_) => true,
            UpstreamError::Status(429) => true,
            UpstreamError::Status(code) => (500..=599).contains(code),
            UpstreamError::InvalidArgument(_)
            | UpstreamError::Cancelled
            | UpstreamError::Other(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(UpstreamError::Timeout.is_transient());
        assert!(UpstreamError::Status(429).is_transient());
        assert!(UpstreamError::Status(500).is_transient());
        assert!(UpstreamError::Status(503).is_transient());
        assert!(UpstreamError::Transport("connection reset".into()).is_transient());

        assert!(!UpstreamError::Status(400).is_transient());
        assert!(!UpstreamError::Status(404).is_transient());
        assert!(!UpstreamError::InvalidArgument("bad model".into()).is_transient());
        assert!(!UpstreamError::Cancelled.is_transient());
    }
}
