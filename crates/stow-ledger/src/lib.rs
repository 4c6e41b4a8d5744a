//! Request ledger for stow.
//!
//! The ledger is the only shared mutable state in a stow client. It maps
//! `(direction, key)` to the one request currently responsible for that
//! slot, which gives three guarantees:
//!
//! 1. At most one in-flight request per `(direction, key)`. The
//!    check-then-insert in [`RequestLedger::acquire`] runs under a single
//!    mutex, so exactly one caller creates a request and the rest join it.
//! 2. Successful outcomes are retained for a TTL (default 60s) so
//!    near-simultaneous duplicates are absorbed without remote I/O.
//! 3. Failures are never cached. The failed slot is dropped as the failure
//!    is published, so the next caller starts a fresh attempt.
//!
//! Each [`Request`] carries a single completion signal (a `tokio::sync::watch`
//! channel) that any number of joiners can await.
//!
//! The ledger is an ordinary value: construct one per client (or per test)
//! and share it by `Arc`.

pub mod clock;
pub mod ledger;
pub mod request;

pub use clock::{Clock, ManualClock, SystemClock};
pub use ledger::{Acquired, LedgerStats, RequestLedger, DEFAULT_TTL};
pub use request::Request;
