//! Error types for catalog operations.

use thiserror::Error;

use crate::limits::GateClosed;

/// Errors from catalog calls.
///
/// `Network`, `Status` and `Malformed` are transient: the client retries them
/// a fixed number of times with a fixed delay, and exceeding the bound
/// abandons only the unit of work (one page, one related fetch) that hit it.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Transport-level failure (DNS, connect, TLS, per-call timeout).
    #[error("network error calling {url}: {source}")]
    Network {
        /// The endpoint that failed.
        url: String,
        /// Underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// Non-success HTTP response.
    #[error("HTTP {status} calling {url}")]
    Status {
        /// The endpoint that failed.
        url: String,
        /// Response status code.
        status: u16,
    },

    /// Body decoded but did not carry the expected content.
    #[error("malformed response from {url}: {detail}")]
    Malformed {
        /// The endpoint that returned the body.
        url: String,
        /// What was wrong with it.
        detail: String,
    },

    /// The target catalog does not offer this operation. Never retried;
    /// must surface to the operator rather than degrade into a no-op.
    #[error("catalog does not support {operation}")]
    Unsupported {
        /// The missing operation, e.g. `author listing`.
        operation: &'static str,
    },

    /// The request throttle closed mid-call; the session is shutting down.
    #[error(transparent)]
    Throttle(#[from] GateClosed),
}

impl CatalogError {
    /// Whether a bounded retry can help.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Network { .. } | Self::Status { .. } | Self::Malformed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(
            CatalogError::Status {
                url: "https://api.example/x".into(),
                status: 502,
            }
            .is_transient()
        );
        assert!(
            CatalogError::Malformed {
                url: "https://api.example/x".into(),
                detail: "empty page".into(),
            }
            .is_transient()
        );
        assert!(
            !CatalogError::Unsupported {
                operation: "author listing",
            }
            .is_transient()
        );
        assert!(!CatalogError::Throttle(GateClosed).is_transient());
    }
}
