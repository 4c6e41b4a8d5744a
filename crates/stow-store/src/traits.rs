use async_trait::async_trait;
use bytes::Bytes;
use stow_types::ObjectKey;

use crate::error::StoreResult;

/// Acknowledgement of a successful `put`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PutReceipt {
    /// Hex BLAKE3 digest of the bytes the store persisted. Surrounding
    /// double quotes, as HTTP stores send them, are tolerated by callers.
    pub etag: String,
}

impl PutReceipt {
    pub fn new(etag: impl Into<String>) -> Self {
        Self { etag: etag.into() }
    }

    /// The etag with any surrounding quotes removed.
    pub fn bare_etag(&self) -> &str {
        self.etag.trim_matches('"')
    }
}

/// Remote object store capability.
///
/// Implementations must:
/// - report failures as [`StoreError`](crate::StoreError) variants that
///   classify correctly via `is_transient()`;
/// - treat `put` of an existing key as an overwrite with identical content
///   (keys are content-addressed, so this is idempotent);
/// - return the etag as the digest of what was actually stored, not of
///   what was sent.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store `payload` under `key`.
    async fn put(&self, key: &ObjectKey, payload: Bytes) -> StoreResult<PutReceipt>;

    /// Fetch the bytes stored under `key`.
    async fn get(&self, key: &ObjectKey) -> StoreResult<Bytes>;
}

#[async_trait]
impl<S: ContentStore + ?Sized> ContentStore for std::sync::Arc<S> {
    async fn put(&self, key: &ObjectKey, payload: Bytes) -> StoreResult<PutReceipt> {
        (**self).put(key, payload).await
    }

    async fn get(&self, key: &ObjectKey) -> StoreResult<Bytes> {
        (**self).get(key).await
    }
}
