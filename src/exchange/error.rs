//! Venue error taxonomy.
//!
//! Every gateway call classifies its failure as transient (worth
//! retrying) or terminal (surfaced immediately). The retry policy and
//! the per-instrument isolation in the engine both key off this split.

use thiserror::Error;

/// Failure of a single venue call.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Network-level failure (connect, timeout, TLS). Transient.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Venue throttled the request (HTTP 429). Transient.
    #[error("rate limited by venue")]
    RateLimited,

    /// Venue returned a server-side error (HTTP 5xx). Transient.
    #[error("venue unavailable (status {status})")]
    Unavailable { status: u16 },

    /// Venue rejected the request on a business rule (bad params,
    /// insufficient margin, post-only would cross). Terminal.
    #[error("venue rejected request: {message}")]
    Rejected { message: String },

    /// Response body could not be decoded. Terminal.
    #[error("malformed venue response: {0}")]
    Malformed(String),

    /// Shutdown was requested while the call was waiting to go out.
    /// Terminal.
    #[error("shutdown in progress")]
    Shutdown,
}

impl GatewayError {
    /// Whether a retry of the same request could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GatewayError::Network(_) | GatewayError::RateLimited | GatewayError::Unavailable { .. }
        )
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        GatewayError::Rejected {
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        GatewayError::Malformed(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(GatewayError::RateLimited.is_transient());
        assert!(GatewayError::Unavailable { status: 503 }.is_transient());
        assert!(!GatewayError::rejected("post-only would cross").is_transient());
        assert!(!GatewayError::malformed("truncated body").is_transient());
        assert!(!GatewayError::Shutdown.is_transient());
    }
}
