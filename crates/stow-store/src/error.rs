use thiserror::Error;

/// Failures reported by a [`ContentStore`](crate::ContentStore).
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The request did not finish in time.
    #[error("request timed out")]
    Timeout,

    /// The service answered with a server-side error (5xx-equivalent).
    #[error("service unavailable ({status}): {message}")]
    Unavailable { status: u16, message: String },

    /// The service asked the client to slow down.
    #[error("request throttled")]
    Throttled,

    /// The connection could not be established or was reset.
    #[error("connection error: {0}")]
    Connection(String),

    /// Credentials missing, expired, or insufficient.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Storage quota exhausted.
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    /// The key does not exist.
    #[error("no such key: {0}")]
    NotFound(String),

    /// Any other request the service refuses outright (4xx-equivalent).
    #[error("request rejected: {0}")]
    Rejected(String),
}

impl StoreError {
    /// Returns `true` if the same request may succeed when retried.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::Unavailable { .. } | Self::Throttled | Self::Connection(_)
        )
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(StoreError::Timeout.is_transient());
        assert!(StoreError::Throttled.is_transient());
        assert!(StoreError::Connection("reset".into()).is_transient());
        assert!(StoreError::Unavailable {
            status: 503,
            message: "slow down".into()
        }
        .is_transient());
    }

    #[test]
    fn permanent_classification() {
        assert!(!StoreError::Unauthorized("expired token".into()).is_transient());
        assert!(!StoreError::QuotaExceeded("bucket full".into()).is_transient());
        assert!(!StoreError::NotFound("k".into()).is_transient());
        assert!(!StoreError::Rejected("bad request".into()).is_transient());
    }
}
