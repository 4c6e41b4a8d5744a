use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use stow_types::ObjectKey;

use crate::error::{StoreError, StoreResult};
use crate::traits::{ContentStore, PutReceipt};

/// Ways a [`FaultyStore`] can damage otherwise successful calls.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Corruption {
    /// `put` succeeds but reports this etag instead of the real one.
    Etag(String),
    /// `get` succeeds but the first byte of the payload is flipped.
    FlipFirstByte,
}

#[derive(Default)]
struct Script {
    queued: VecDeque<StoreError>,
    always: Option<StoreError>,
}

impl Script {
    fn next_failure(&mut self) -> Option<StoreError> {
        self.queued.pop_front().or_else(|| self.always.clone())
    }
}

/// Store wrapper that injects scripted failures and corruption.
///
/// Queued failures are returned first, one per call, then calls fall
/// through to `always` if set, otherwise to the inner store. Every call is
/// counted, including the failing ones.
pub struct FaultyStore<S> {
    inner: S,
    puts: Mutex<Script>,
    gets: Mutex<Script>,
    corruption: Option<Corruption>,
    put_calls: AtomicUsize,
    get_calls: AtomicUsize,
}

impl<S: ContentStore> FaultyStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            puts: Mutex::new(Script::default()),
            gets: Mutex::new(Script::default()),
            corruption: None,
            put_calls: AtomicUsize::new(0),
            get_calls: AtomicUsize::new(0),
        }
    }

    /// Fail the next `put` calls with these errors, in order.
    pub fn fail_puts(self, errors: impl IntoIterator<Item = StoreError>) -> Self {
        self.puts.lock().expect("lock poisoned").queued.extend(errors);
        self
    }

    /// Fail the next `get` calls with these errors, in order.
    pub fn fail_gets(self, errors: impl IntoIterator<Item = StoreError>) -> Self {
        self.gets.lock().expect("lock poisoned").queued.extend(errors);
        self
    }

    /// Fail every `put` once the queue is drained.
    pub fn always_fail_puts(self, error: StoreError) -> Self {
        self.puts.lock().expect("lock poisoned").always = Some(error);
        self
    }

    /// Fail every `get` once the queue is drained.
    pub fn always_fail_gets(self, error: StoreError) -> Self {
        self.gets.lock().expect("lock poisoned").always = Some(error);
        self
    }

    /// Corrupt successful calls.
    pub fn corrupt(mut self, corruption: Corruption) -> Self {
        self.corruption = Some(corruption);
        self
    }

    /// Total `put` calls, including injected failures.
    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    /// Total `get` calls, including injected failures.
    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    /// The wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: ContentStore> ContentStore for FaultyStore<S> {
    async fn put(&self, key: &ObjectKey, payload: Bytes) -> StoreResult<PutReceipt> {
        let call = self.put_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let failure = self.puts.lock().expect("lock poisoned").next_failure();
        if let Some(err) = failure {
            tracing::debug!(key = %key, call, error = %err, "injected put failure");
            return Err(err);
        }
        let receipt = self.inner.put(key, payload).await?;
        match &self.corruption {
            Some(Corruption::Etag(etag)) => Ok(PutReceipt::new(etag.clone())),
            _ => Ok(receipt),
        }
    }

    async fn get(&self, key: &ObjectKey) -> StoreResult<Bytes> {
        let call = self.get_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let failure = self.gets.lock().expect("lock poisoned").next_failure();
        if let Some(err) = failure {
            tracing::debug!(key = %key, call, error = %err, "injected get failure");
            return Err(err);
        }
        let data = self.inner.get(key).await?;
        match &self.corruption {
            Some(Corruption::FlipFirstByte) if !data.is_empty() => {
                let mut damaged = BytesMut::from(&data[..]);
                damaged[0] ^= 0xFF;
                Ok(damaged.freeze())
            }
            _ => Ok(data),
        }
    }
}

impl<S> std::fmt::Debug for FaultyStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaultyStore")
            .field("put_calls", &self.put_calls.load(Ordering::SeqCst))
            .field("get_calls", &self.get_calls.load(Ordering::SeqCst))
            .field("corruption", &self.corruption)
            .finish()
    }
}
