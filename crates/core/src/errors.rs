//! Error types shared across the herdbook crates.

use thiserror::Error;

/// Result type alias used throughout the engine.
pub type Result<T> = std::result::Result<T, Error>;

/// Local storage failures (pool, query, or storage-medium errors).
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Storage failure: {0}")]
    Storage(String),

    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Remote store failures, split along the retry-relevant boundary:
/// the server answered and said no, or the server never answered.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The remote store explicitly rejected the request
    /// (validation/authorization).
    #[error("Remote store rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Transport-level failure: the remote store could not be reached
    /// or did not answer in time.
    #[error("Remote store unreachable: {0}")]
    Unreachable(String),
}

impl RemoteError {
    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        Self::Rejected {
            status,
            message: message.into(),
        }
    }

    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::Unreachable(message.into())
    }

    /// HTTP status if the remote answered with a rejection.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Rejected { status, .. } => Some(*status),
            Self::Unreachable(_) => None,
        }
    }

    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Unreachable(_))
    }
}

/// Top-level error for engine operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Remote store error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_rejection_carries_status() {
        let err = RemoteError::rejected(422, "validation failed");
        assert_eq!(err.status_code(), Some(422));
        assert!(!err.is_unreachable());
    }

    #[test]
    fn transport_failure_has_no_status() {
        let err = RemoteError::unreachable("connection refused");
        assert_eq!(err.status_code(), None);
        assert!(err.is_unreachable());
    }
}
