use std::sync::Arc;

use bytes::Bytes;
use stow_crypto::KeyGenerator;
use stow_ledger::{Acquired, Request, RequestLedger};
use stow_store::ContentStore;
use stow_types::{
    Completion, ContentDigest, Direction, ObjectKey, Outcome, TransferError, TransferResult,
};
use tracing::{debug, info, warn};

use crate::owner::spawn_owner;
use crate::retry::{with_retries, PolicyError, RetryPolicy};

/// Uploads payloads under their content-addressed key.
///
/// Concurrent uploads of identical bytes share one remote `put`, and a
/// successful upload is remembered by the ledger for its TTL, so at most one
/// `put` per key reaches the store per TTL window.
#[derive(Clone)]
pub struct UploadCoordinator {
    keys: KeyGenerator,
    store: Arc<dyn ContentStore>,
    ledger: Arc<RequestLedger>,
    policy: RetryPolicy,
}

impl UploadCoordinator {
    /// Fails if `policy` does not pass [`RetryPolicy::validate`].
    pub fn new(
        keys: KeyGenerator,
        store: Arc<dyn ContentStore>,
        ledger: Arc<RequestLedger>,
        policy: RetryPolicy,
    ) -> Result<Self, PolicyError> {
        policy.validate()?;
        Ok(Self {
            keys,
            store,
            ledger,
            policy,
        })
    }

    pub fn key_generator(&self) -> &KeyGenerator {
        &self.keys
    }

    /// Upload `payload` and return its key.
    ///
    /// Fails with `InvalidInput` for an empty payload (no remote call),
    /// `Denied` for permanent store refusals, `IntegrityMismatch` when the
    /// store acknowledges different bytes, and `Exhausted` when transient
    /// failures outlast the retry budget. Joiners get the owner's result.
    pub async fn upload(&self, payload: Bytes) -> TransferResult<ObjectKey> {
        let key = self.keys.derive_key(&payload)?;
        let Acquired { request, is_new } = self.ledger.acquire(Direction::Upload, &key);

        if is_new {
            debug!(key = %key.short(), bytes = payload.len(), "starting upload");
            let store = Arc::clone(&self.store);
            let ledger = Arc::clone(&self.ledger);
            let policy = self.policy.clone();
            let owned = Arc::clone(&request);
            spawn_owner(Arc::clone(&self.ledger), Arc::clone(&request), async move {
                put_and_verify(store.as_ref(), ledger.as_ref(), &policy, &owned, payload).await
            });
        } else {
            debug!(
                key = %key.short(),
                request = %request.id().short_id(),
                "joining existing upload"
            );
        }

        match request.wait().await? {
            Completion::Stored { .. } => Ok(key),
            Completion::Fetched(_) => Err(TransferError::Abandoned(format!(
                "upload slot for {key} held a download result"
            ))),
        }
    }
}

async fn put_and_verify(
    store: &dyn ContentStore,
    ledger: &RequestLedger,
    policy: &RetryPolicy,
    request: &Request,
    payload: Bytes,
) -> Outcome {
    let key = request.key();
    let receipt = with_retries(policy, ledger.clock().as_ref(), request, || {
        store.put(key, payload.clone())
    })
    .await?;

    request.begin_verify();
    let acknowledged = receipt.bare_etag();
    match ContentDigest::from_hex(acknowledged) {
        Ok(digest) if digest == *key.digest() => {
            info!(
                key = %key,
                attempts = request.attempts(),
                bytes = payload.len(),
                "upload verified"
            );
            Ok(Completion::Stored {
                etag: acknowledged.to_string(),
            })
        }
        _ => {
            warn!(
                key = %key,
                expected = %key.digest(),
                acknowledged,
                "store acknowledged different content"
            );
            Err(TransferError::IntegrityMismatch {
                key: key.to_string(),
                expected: key.digest().to_hex(),
                actual: acknowledged.to_string(),
            })
        }
    }
}

impl std::fmt::Debug for UploadCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadCoordinator")
            .field("keys", &self.keys)
            .field("policy", &self.policy)
            .finish()
    }
}
