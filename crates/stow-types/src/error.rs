use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid object key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("invalid namespace {namespace:?}: {reason}")]
    InvalidNamespace { namespace: String, reason: String },

    #[error("invalid extension {0:?}")]
    InvalidExtension(String),
}

/// Errors returned by upload and download operations.
///
/// Every joiner of a de-duplicated request receives a clone of the exact
/// error the owning attempt produced, hence `Clone + PartialEq`.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransferError {
    /// Empty or malformed payload or key. Never retried.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Transient network or server failure. Retried, and surfaced wrapped
    /// in [`TransferError::Exhausted`] once the budget runs out.
    #[error("remote unavailable: {0}")]
    RemoteUnavailable(String),

    /// The store acknowledged or returned bytes that do not hash to the key.
    #[error("integrity mismatch for {key}: expected {expected}, got {actual}")]
    IntegrityMismatch {
        key: String,
        expected: String,
        actual: String,
    },

    /// The store does not hold the requested key.
    #[error("object not found: {0}")]
    NotFound(String),

    /// Permanent remote refusal (authorization, quota, rejected request).
    #[error("denied by remote store: {0}")]
    Denied(String),

    /// Retry budget consumed without success.
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        last: Box<TransferError>,
    },

    /// The task driving a request ended without recording an outcome.
    #[error("request abandoned: {0}")]
    Abandoned(String),
}

impl TransferError {
    /// Whether a caller could reasonably try the same call again later.
    ///
    /// Invalid input, integrity failures and denials will fail the same way.
    pub fn is_retryable_by_caller(&self) -> bool {
        matches!(
            self,
            Self::RemoteUnavailable(_) | Self::Exhausted { .. } | Self::Abandoned(_)
        )
    }
}

impl From<TypeError> for TransferError {
    fn from(err: TypeError) -> Self {
        Self::InvalidInput(err.to_string())
    }
}

/// Result alias for transfer operations.
pub type TransferResult<T> = Result<T, TransferError>;
