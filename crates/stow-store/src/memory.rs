use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use stow_types::{ContentDigest, ObjectKey};

use crate::error::{StoreError, StoreResult};
use crate::traits::{ContentStore, PutReceipt};

/// In-memory, HashMap-based content store.
///
/// Intended for tests and embedding. Objects live behind a `RwLock`; every
/// `put` and `get` is counted so tests can assert how many remote calls a
/// coordinator actually made. An optional artificial latency widens the
/// window in which concurrent callers overlap.
pub struct InMemoryContentStore {
    objects: RwLock<HashMap<ObjectKey, Bytes>>,
    latency: Option<Duration>,
    puts: AtomicUsize,
    gets: AtomicUsize,
}

impl InMemoryContentStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            latency: None,
            puts: AtomicUsize::new(0),
            gets: AtomicUsize::new(0),
        }
    }

    /// Delay every call by `latency` before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> usize {
        self.objects.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.objects.read().expect("lock poisoned").is_empty()
    }

    /// Returns `true` if `key` is stored.
    pub fn contains(&self, key: &ObjectKey) -> bool {
        self.objects.read().expect("lock poisoned").contains_key(key)
    }

    /// Store bytes under `key` without any checks.
    ///
    /// Lets tests plant content that does not match its key.
    pub fn insert_raw(&self, key: ObjectKey, data: impl Into<Bytes>) {
        self.objects
            .write()
            .expect("lock poisoned")
            .insert(key, data.into());
    }

    /// Remove all objects. Counters are left untouched.
    pub fn clear(&self) {
        self.objects.write().expect("lock poisoned").clear();
    }

    /// Total `put` calls received.
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Total `get` calls received.
    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

impl Default for InMemoryContentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn put(&self, key: &ObjectKey, payload: Bytes) -> StoreResult<PutReceipt> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        let etag = ContentDigest::of(&payload).to_hex();
        self.objects
            .write()
            .expect("lock poisoned")
            .insert(key.clone(), payload);
        tracing::trace!(key = %key, "object stored");
        Ok(PutReceipt::new(etag))
    }

    async fn get(&self, key: &ObjectKey) -> StoreResult<Bytes> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        self.objects
            .read()
            .expect("lock poisoned")
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }
}

impl std::fmt::Debug for InMemoryContentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryContentStore")
            .field("object_count", &self.len())
            .field("puts", &self.put_count())
            .field("gets", &self.get_count())
            .finish()
    }
}
