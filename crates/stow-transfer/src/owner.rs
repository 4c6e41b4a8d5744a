use std::future::Future;
use std::sync::Arc;

use stow_ledger::{Request, RequestLedger};
use stow_types::{Outcome, TransferError};
use tracing::warn;

/// Publishes `Abandoned` if dropped before an outcome was recorded.
struct OwnerGuard<'a> {
    ledger: &'a RequestLedger,
    request: &'a Request,
    finished: bool,
}

impl OwnerGuard<'_> {
    fn finish(mut self, outcome: Outcome) {
        self.finished = true;
        self.ledger.complete(self.request, outcome);
    }
}

impl Drop for OwnerGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            warn!(
                direction = %self.request.direction(),
                key = %self.request.key().short(),
                request = %self.request.id().short_id(),
                "owner task ended without an outcome"
            );
            self.ledger.complete(
                self.request,
                Err(TransferError::Abandoned(format!(
                    "{} of {} ended without an outcome",
                    self.request.direction(),
                    self.request.key()
                ))),
            );
        }
    }
}

/// Drive `work` for a newly created request on its own task.
///
/// The task outlives the caller that spawned it, so remote work runs to
/// completion even if every waiter goes away.
pub(crate) fn spawn_owner<Fut>(ledger: Arc<RequestLedger>, request: Arc<Request>, work: Fut)
where
    Fut: Future<Output = Outcome> + Send + 'static,
{
    tokio::spawn(async move {
        let guard = OwnerGuard {
            ledger: &ledger,
            request: &request,
            finished: false,
        };
        let outcome = work.await;
        guard.finish(outcome);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use stow_ledger::{ManualClock, DEFAULT_TTL};
    use stow_types::{Completion, ContentDigest, Direction, ObjectKey};

    fn setup() -> (Arc<RequestLedger>, Arc<Request>) {
        let ledger = Arc::new(RequestLedger::new(DEFAULT_TTL, Arc::new(ManualClock::new())));
        let key = ObjectKey::new("ns", ContentDigest::of(b"o"), "bin").unwrap();
        let request = ledger.acquire(Direction::Upload, &key).request;
        (ledger, request)
    }

    #[tokio::test]
    async fn outcome_is_published() {
        let (ledger, request) = setup();
        spawn_owner(
            Arc::clone(&ledger),
            Arc::clone(&request),
            async { Ok(Completion::Stored { etag: "e".into() }) },
        );
        assert_eq!(
            request.wait().await,
            Ok(Completion::Stored { etag: "e".into() })
        );
        assert_eq!(ledger.stats().completed, 1);
    }

    #[tokio::test]
    async fn panicking_work_is_reported_as_abandoned() {
        let (ledger, request) = setup();
        spawn_owner(Arc::clone(&ledger), Arc::clone(&request), async {
            if true {
                panic!("store client blew up");
            }
            Ok(Completion::Stored { etag: "never".into() })
        });
        assert!(matches!(
            request.wait().await,
            Err(TransferError::Abandoned(_))
        ));
        assert!(ledger.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn work_survives_without_waiters() {
        let (ledger, request) = setup();
        spawn_owner(Arc::clone(&ledger), Arc::clone(&request), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(Completion::Stored { etag: "late".into() })
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(request.is_terminal());
    }
}
