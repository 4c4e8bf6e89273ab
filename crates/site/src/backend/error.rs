//! Backend error types.

use thiserror::Error;

/// Errors reported by a [`Backend`](super::Backend).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// Sign-in failed (bad credential, auth service refused).
    #[error("auth error: {0}")]
    Auth(String),

    /// Authorization denied on a read or write.
    #[error("permission denied: {0}")]
    Permission(String),

    /// Transient connectivity problem.
    #[error("network error: {0}")]
    Network(String),

    /// The backend answered with something we could not understand.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::InvalidResponse(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}
