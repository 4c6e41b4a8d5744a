//! Upload and download coordinators for stow.
//!
//! Both coordinators follow the same shape:
//!
//! 1. Derive or validate the [`ObjectKey`](stow_types::ObjectKey).
//! 2. Acquire the `(direction, key)` slot from the shared
//!    [`RequestLedger`](stow_ledger::RequestLedger).
//! 3. The caller that created the slot spawns the remote work: the store
//!    call under the [`RetryPolicy`], then integrity verification.
//! 4. Every caller, owner included, awaits the request's completion signal.
//!
//! # Cancellation
//!
//! Cancellation is local to the caller. The remote operation runs on its own
//! tokio task and always runs to completion once started; dropping a caller's
//! future (the owner's included) only stops that caller waiting. If the
//! spawned task itself dies without an outcome, a drop guard publishes
//! [`TransferError::Abandoned`](stow_types::TransferError::Abandoned) so no
//! joiner waits forever.

pub mod download;
mod owner;
pub mod retry;
pub mod upload;

pub use download::DownloadCoordinator;
pub use retry::{PolicyError, RetryPolicy};
pub use upload::UploadCoordinator;
