//! High-level client for stow.
//!
//! [`Stow`] wires a [`KeyGenerator`], one shared [`RequestLedger`], and the
//! upload/download coordinators over an injected [`ContentStore`]. This is
//! the main entry point for applications embedding stow.

pub mod client;
pub mod config;
pub mod error;

pub use client::Stow;
pub use config::StowConfig;
pub use error::{SdkError, SdkResult};

// Re-export key types
pub use stow_crypto::{ExtensionPolicy, KeyGenerator};
pub use stow_ledger::{Clock, LedgerStats, ManualClock, RequestLedger, SystemClock};
pub use stow_store::{ContentStore, InMemoryContentStore, PutReceipt, StoreError};
pub use stow_transfer::RetryPolicy;
pub use stow_types::{ContentDigest, ObjectKey, TransferError, TransferResult};
