use std::sync::Arc;

use bytes::Bytes;
use stow_ledger::{Acquired, Request, RequestLedger};
use stow_store::ContentStore;
use stow_types::{
    Completion, ContentDigest, Direction, ObjectKey, Outcome, TransferError, TransferResult,
};
use tracing::{debug, info, warn};

use crate::owner::spawn_owner;
use crate::retry::{with_retries, PolicyError, RetryPolicy};

/// Downloads objects and verifies them against their key.
///
/// Concurrent downloads of one key share a single remote `get`, and the
/// verified bytes stay cached in the ledger for its TTL. Bytes that do not
/// hash to the key's digest are never returned to any caller.
#[derive(Clone)]
pub struct DownloadCoordinator {
    store: Arc<dyn ContentStore>,
    ledger: Arc<RequestLedger>,
    policy: RetryPolicy,
}

impl DownloadCoordinator {
    /// Fails if `policy` does not pass [`RetryPolicy::validate`].
    pub fn new(
        store: Arc<dyn ContentStore>,
        ledger: Arc<RequestLedger>,
        policy: RetryPolicy,
    ) -> Result<Self, PolicyError> {
        policy.validate()?;
        Ok(Self {
            store,
            ledger,
            policy,
        })
    }

    /// Fetch the bytes stored under `key`.
    pub async fn download(&self, key: &ObjectKey) -> TransferResult<Bytes> {
        let Acquired { request, is_new } = self.ledger.acquire(Direction::Download, key);

        if is_new {
            debug!(key = %key.short(), "starting download");
            let store = Arc::clone(&self.store);
            let ledger = Arc::clone(&self.ledger);
            let policy = self.policy.clone();
            let owned = Arc::clone(&request);
            spawn_owner(Arc::clone(&self.ledger), Arc::clone(&request), async move {
                get_and_verify(store.as_ref(), ledger.as_ref(), &policy, &owned).await
            });
        } else {
            debug!(
                key = %key.short(),
                request = %request.id().short_id(),
                "joining existing download"
            );
        }

        match request.wait().await? {
            Completion::Fetched(data) => Ok(data),
            Completion::Stored { .. } => Err(TransferError::Abandoned(format!(
                "download slot for {key} held an upload result"
            ))),
        }
    }
}

async fn get_and_verify(
    store: &dyn ContentStore,
    ledger: &RequestLedger,
    policy: &RetryPolicy,
    request: &Request,
) -> Outcome {
    let key = request.key();
    let data = with_retries(policy, ledger.clock().as_ref(), request, || store.get(key)).await?;

    request.begin_verify();
    let actual = ContentDigest::of(&data);
    if actual != *key.digest() {
        warn!(
            key = %key,
            expected = %key.digest(),
            actual = %actual,
            bytes = data.len(),
            "downloaded bytes do not match key"
        );
        return Err(TransferError::IntegrityMismatch {
            key: key.to_string(),
            expected: key.digest().to_hex(),
            actual: actual.to_hex(),
        });
    }

    info!(
        key = %key,
        attempts = request.attempts(),
        bytes = data.len(),
        "download verified"
    );
    Ok(Completion::Fetched(data))
}

impl std::fmt::Debug for DownloadCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadCoordinator")
            .field("policy", &self.policy)
            .finish()
    }
}
