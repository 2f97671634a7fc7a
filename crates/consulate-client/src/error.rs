//! Client error types.

use thiserror::Error;

use crate::blocking::ConsistencyIndex;

/// Client error type.
///
/// Cloneable so a watcher can keep its terminal error in the status channel
/// and still hand a copy to every caller that asks for it.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Connection or network failure (refused, reset, malformed response).
    #[error("transport error: {0}")]
    Transport(String),

    /// The client-side deadline elapsed without any response from the agent.
    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Response body could not be decoded into the expected resource.
    #[error("decode error: {0}")]
    Decode(String),

    /// The agent reported a consistency index lower than the last one seen.
    ///
    /// Informational: the watch loop handles this itself and never surfaces
    /// it as a failure.
    #[error("consistency index reset from {previous} to {current}")]
    IndexReset {
        /// Last index observed before the reset.
        previous: ConsistencyIndex,
        /// Index reported by the agent.
        current: ConsistencyIndex,
    },

    /// Operation not allowed in the handle's current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Agent returned a non-success status.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body text.
        message: String,
    },

    /// URL parsing failed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request body could not be encoded.
    #[error("encode error: {0}")]
    Encode(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Check if this is a not-found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Api { status: 404, .. })
    }

    /// Check if this is an ACL / permission error.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Error::Api { status: 403, .. })
    }

    /// Check if this is a server error.
    pub fn is_server_error(&self) -> bool {
        matches!(self, Error::Api { status, .. } if *status >= 500)
    }

    /// Whether a watch should retry after this error (with backoff).
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Transport(_) | Error::Timeout(_) => true,
            Error::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Decode(err.to_string())
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(Error::Transport("refused".into()).is_retryable());
        assert!(Error::Timeout(std::time::Duration::from_secs(1)).is_retryable());
        assert!(
            Error::Api {
                status: 503,
                message: "no leader".into()
            }
            .is_retryable()
        );
        assert!(
            Error::Api {
                status: 429,
                message: "slow down".into()
            }
            .is_retryable()
        );
        assert!(
            !Error::Api {
                status: 403,
                message: "ACL not found".into()
            }
            .is_retryable()
        );
        assert!(!Error::Decode("bad json".into()).is_retryable());
        assert!(!Error::InvalidState("stopped".into()).is_retryable());
    }

    #[test]
    fn test_status_predicates() {
        let err = Error::Api {
            status: 404,
            message: String::new(),
        };
        assert!(err.is_not_found());
        assert!(!err.is_server_error());

        let err = Error::Api {
            status: 403,
            message: String::new(),
        };
        assert!(err.is_permission_denied());
    }

    #[test]
    fn test_index_reset_display() {
        let err = Error::IndexReset {
            previous: ConsistencyIndex::new(7),
            current: ConsistencyIndex::new(3),
        };
        assert_eq!(err.to_string(), "consistency index reset from 7 to 3");
    }
}
