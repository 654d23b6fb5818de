//! Error taxonomy for the engine
//!
//! Every engine operation surfaces failures as values of [`Error`]; nothing
//! is swallowed mid-merge and nothing panics. Storage-internal errors arrive
//! through the `Store` variant via `anyhow`.

use thiserror::Error;

/// Errors surfaced by the synchronization engine and send pipeline.
#[derive(Debug, Error)]
pub enum Error {
    /// Credentials or line are missing; the operation refused to start and
    /// the store was not touched.
    #[error("configuration incomplete: {0}")]
    Config(String),

    /// Transport-level failure. The in-flight request is abandoned; merges
    /// from earlier requests in the chain stand.
    #[error("network error: {0}")]
    Network(String),

    /// The remote API returned a status other than `success` or `no_sms`.
    #[error("API error status: {0}")]
    Api(String),

    /// The remote payload could not be decoded. Treated like an API error.
    #[error("failed to parse API response: {0}")]
    Parse(String),

    /// Local storage failure.
    #[error("storage error: {0}")]
    Store(#[from] anyhow::Error),

    /// The session was cancelled between chained requests.
    #[error("synchronization cancelled")]
    Cancelled,
}

impl Error {
    /// Whether a caller-level retry of the whole session is reasonable.
    /// Merges are idempotent, so retrying after transport trouble converges.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Network(_) | Error::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(Error::Network("timed out".to_string()).is_retryable());
        assert!(Error::Cancelled.is_retryable());
        assert!(!Error::Api("invalid_credentials".to_string()).is_retryable());
        assert!(!Error::Config("missing line".to_string()).is_retryable());
    }
}
