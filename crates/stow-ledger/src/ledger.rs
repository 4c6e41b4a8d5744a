use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use stow_types::{Direction, ObjectKey, Outcome, RequestStatus};
use tokio::time::Instant;
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::request::Request;

/// How long successful outcomes stay cached.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// Result of [`RequestLedger::acquire`].
#[derive(Debug)]
pub struct Acquired {
    /// The request responsible for the slot.
    pub request: Arc<Request>,
    /// `true` if this caller created the request and must drive it.
    pub is_new: bool,
}

/// Point-in-time counts of ledger slots.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LedgerStats {
    /// Requests not yet terminal.
    pub in_flight: usize,
    /// Successful requests still cached (expired ones included until evicted).
    pub completed: usize,
    /// Age of the oldest request not yet terminal.
    pub oldest_in_flight: Option<Duration>,
}

struct Slot {
    request: Arc<Request>,
    completed_at: Option<Instant>,
}

impl Slot {
    fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        match self.completed_at {
            Some(at) => now.saturating_duration_since(at) >= ttl,
            None => false,
        }
    }

    fn is_failed(&self) -> bool {
        matches!(self.request.status(), RequestStatus::Failed(_))
    }
}

struct Slots {
    map: HashMap<(Direction, ObjectKey), Slot>,
    /// `acquire` sweeps expired slots once `now` passes this.
    next_sweep: Instant,
}

impl Slots {
    fn sweep(&mut self, now: Instant, ttl: Duration) -> usize {
        let before = self.map.len();
        self.map.retain(|_, slot| !slot.is_expired(now, ttl) && !slot.is_failed());
        self.next_sweep = now.checked_add(ttl).unwrap_or(now);
        before - self.map.len()
    }
}

/// In-memory ledger of in-flight and recently completed requests.
///
/// Exclusively owns every slot; coordinators only borrow `Arc<Request>`
/// handles for the duration of a call. Besides explicit
/// [`evict_expired`] calls, `acquire` sweeps expired slots at most once per
/// TTL, so keys that are never requested again do not accumulate.
///
/// [`evict_expired`]: RequestLedger::evict_expired
pub struct RequestLedger {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    slots: Mutex<Slots>,
}

impl RequestLedger {
    /// Create a ledger with the given TTL and clock.
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        let next_sweep = now.checked_add(ttl).unwrap_or(now);
        Self {
            ttl,
            clock,
            slots: Mutex::new(Slots {
                map: HashMap::new(),
                next_sweep,
            }),
        }
    }

    /// Create a ledger on the system clock.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self::new(ttl, Arc::new(SystemClock))
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The clock the ledger measures TTLs with.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Join the request for `(direction, key)` or create one.
    ///
    /// Atomic: of any number of concurrent callers on an empty slot,
    /// exactly one gets `is_new == true`. A slot holding a failed or
    /// expired request counts as empty.
    pub fn acquire(&self, direction: Direction, key: &ObjectKey) -> Acquired {
        let now = self.clock.now();
        let mut slots = self.slots.lock().expect("lock poisoned");

        if now >= slots.next_sweep {
            let evicted = slots.sweep(now, self.ttl);
            if evicted > 0 {
                debug!(evicted, remaining = slots.map.len(), "swept expired ledger entries");
            }
        }

        if let Some(slot) = slots.map.get(&(direction, key.clone())) {
            if !slot.is_failed() && !slot.is_expired(now, self.ttl) {
                debug!(
                    %direction,
                    key = %key.short(),
                    request = %slot.request.id().short_id(),
                    cached = slot.completed_at.is_some(),
                    "joined existing request"
                );
                return Acquired {
                    request: Arc::clone(&slot.request),
                    is_new: false,
                };
            }
        }

        let request = Arc::new(Request::new(direction, key.clone(), now));
        slots.map.insert(
            (direction, key.clone()),
            Slot {
                request: Arc::clone(&request),
                completed_at: None,
            },
        );
        debug!(
            %direction,
            key = %key.short(),
            request = %request.id().short_id(),
            "created request"
        );
        Acquired {
            request,
            is_new: true,
        }
    }

    /// Record the terminal outcome of `request` and wake its joiners.
    ///
    /// Success keeps the slot cached until the TTL passes. Failure drops the
    /// slot so the next caller starts over. A slot that has since been taken
    /// over by a newer request is left alone. Returns `false` if the request
    /// already had an outcome.
    pub fn complete(&self, request: &Request, outcome: Outcome) -> bool {
        let now = self.clock.now();
        let succeeded = outcome.is_ok();
        let slot_key = (request.direction(), request.key().clone());

        let mut slots = self.slots.lock().expect("lock poisoned");
        let owns_slot = slots
            .map
            .get(&slot_key)
            .is_some_and(|slot| slot.request.id() == request.id());

        if owns_slot {
            if succeeded {
                if let Some(slot) = slots.map.get_mut(&slot_key) {
                    slot.completed_at = Some(now);
                }
            } else {
                slots.map.remove(&slot_key);
            }
        }

        let recorded = request.finish(outcome);
        debug!(
            direction = %request.direction(),
            key = %request.key().short(),
            request = %request.id().short_id(),
            elapsed_ms = now.saturating_duration_since(request.created_at()).as_millis() as u64,
            succeeded,
            recorded,
            "request completed"
        );
        recorded
    }

    /// Drop cached outcomes older than the TTL. Returns how many were dropped.
    pub fn evict_expired(&self) -> usize {
        let now = self.clock.now();
        let mut slots = self.slots.lock().expect("lock poisoned");
        let evicted = slots.sweep(now, self.ttl);
        if evicted > 0 {
            debug!(evicted, remaining = slots.map.len(), "evicted expired ledger entries");
        }
        evicted
    }

    /// The request currently holding `(direction, key)`, if any.
    pub fn get(&self, direction: Direction, key: &ObjectKey) -> Option<Arc<Request>> {
        self.slots
            .lock()
            .expect("lock poisoned")
            .map
            .get(&(direction, key.clone()))
            .map(|slot| Arc::clone(&slot.request))
    }

    pub fn stats(&self) -> LedgerStats {
        let now = self.clock.now();
        let slots = self.slots.lock().expect("lock poisoned");
        let completed = slots
            .map
            .values()
            .filter(|s| s.completed_at.is_some())
            .count();
        let oldest_in_flight = slots
            .map
            .values()
            .filter(|s| s.completed_at.is_none())
            .map(|s| now.saturating_duration_since(s.request.created_at()))
            .max();
        LedgerStats {
            in_flight: slots.map.len() - completed,
            completed,
            oldest_in_flight,
        }
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.slots.lock().expect("lock poisoned").map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().expect("lock poisoned").map.is_empty()
    }
}

impl Default for RequestLedger {
    fn default() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }
}

impl fmt::Debug for RequestLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestLedger")
            .field("ttl", &self.ttl)
            .field("stats", &self.stats())
            .finish()
    }
}
