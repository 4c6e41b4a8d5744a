use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use stow_types::{Direction, ObjectKey, Outcome, RequestId, RequestStatus, TransferError};
use tokio::sync::watch;
use tokio::time::Instant;

/// One remote operation for a `(direction, key)` slot.
///
/// Created only by [`RequestLedger::acquire`](crate::RequestLedger::acquire).
/// The status channel is the completion signal: the owner drives it through
/// `begin_attempt` / `begin_verify`, the ledger publishes the terminal
/// state, and every joiner awaits it through [`Request::wait`].
pub struct Request {
    id: RequestId,
    direction: Direction,
    key: ObjectKey,
    created_at: Instant,
    attempts: AtomicU32,
    status: watch::Sender<RequestStatus>,
}

impl Request {
    pub(crate) fn new(direction: Direction, key: ObjectKey, created_at: Instant) -> Self {
        let (status, _) = watch::channel(RequestStatus::Pending);
        Self {
            id: RequestId::new(),
            direction,
            key,
            created_at,
            attempts: AtomicU32::new(0),
            status,
        }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn key(&self) -> &ObjectKey {
        &self.key
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Remote attempts started so far.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Snapshot of the current status.
    pub fn status(&self) -> RequestStatus {
        self.status.borrow().clone()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.borrow().is_terminal()
    }

    /// Mark the start of remote attempt `attempt` (1-based).
    pub fn begin_attempt(&self, attempt: u32) {
        self.attempts.store(attempt, Ordering::SeqCst);
        self.transition(RequestStatus::InFlight { attempt });
    }

    /// Mark the remote call as done and verification as started.
    pub fn begin_verify(&self) {
        self.transition(RequestStatus::Verifying);
    }

    /// Publish the terminal outcome. Returns `false` if one was already set.
    pub(crate) fn finish(&self, outcome: Outcome) -> bool {
        self.status.send_if_modified(|status| {
            if status.is_terminal() {
                false
            } else {
                *status = outcome.into();
                true
            }
        })
    }

    /// Wait for the terminal outcome.
    ///
    /// Returns immediately if the request already finished. Every caller
    /// observes the same outcome.
    pub async fn wait(&self) -> Outcome {
        let mut rx = self.status.subscribe();
        let waited = rx
            .wait_for(RequestStatus::is_terminal)
            .await
            .map(|status| status.clone());
        let Ok(status) = waited else {
            return Err(TransferError::Abandoned(format!(
                "completion signal for {} closed",
                self.key
            )));
        };
        match status {
            RequestStatus::Completed(c) => Ok(c),
            RequestStatus::Failed(e) => Err(e),
            other => Err(TransferError::Abandoned(format!(
                "request for {} stopped in state {}",
                self.key,
                other.label()
            ))),
        }
    }

    fn transition(&self, next: RequestStatus) {
        self.status.send_if_modified(|status| {
            if status.is_terminal() {
                false
            } else {
                *status = next;
                true
            }
        });
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.id)
            .field("direction", &self.direction)
            .field("key", &self.key)
            .field("status", &self.status.borrow().label())
            .field("attempts", &self.attempts())
            .finish()
    }
}
