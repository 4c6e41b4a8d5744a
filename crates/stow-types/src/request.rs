use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::TransferError;

/// Which way a request moves bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Upload,
    Download,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upload => write!(f, "upload"),
            Self::Download => write!(f, "download"),
        }
    }
}

/// Unique identifier for one remote operation (UUID v7).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(uuid::Uuid);

impl RequestId {
    /// Generate a new time-ordered request ID.
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7())
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }

    /// Short representation (first 8 characters of UUID).
    pub fn short_id(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RequestId({})", self.short_id())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Successful result of a remote operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Completion {
    /// Upload acknowledged and verified; `etag` as returned by the store.
    Stored { etag: String },
    /// Download fetched and verified.
    Fetched(Bytes),
}

/// Terminal outcome shared by the owner and every joiner of a request.
pub type Outcome = Result<Completion, TransferError>;

/// Lifecycle of a request.
///
/// `Pending → InFlight → Verifying → Completed | Failed`. `InFlight` is
/// re-entered once per retry attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RequestStatus {
    Pending,
    InFlight { attempt: u32 },
    Verifying,
    Completed(Completion),
    Failed(TransferError),
}

impl RequestStatus {
    /// Returns `true` for `Completed` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed(_) | Self::Failed(_))
    }

    /// The outcome, if the status is terminal.
    pub fn outcome(&self) -> Option<Outcome> {
        match self {
            Self::Completed(c) => Some(Ok(c.clone())),
            Self::Failed(e) => Some(Err(e.clone())),
            _ => None,
        }
    }

    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InFlight { .. } => "in-flight",
            Self::Verifying => "verifying",
            Self::Completed(_) => "completed",
            Self::Failed(_) => "failed",
        }
    }
}

impl From<Outcome> for RequestStatus {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Ok(c) => Self::Completed(c),
            Err(e) => Self::Failed(e),
        }
    }
}
