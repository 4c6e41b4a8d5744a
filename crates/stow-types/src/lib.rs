//! Foundation types for stow.
//!
//! stow is a content-addressed object upload/download client. This crate
//! holds the vocabulary every other stow crate shares.
//!
//! # Key Types
//!
//! - [`ContentDigest`] -- BLAKE3 digest of a payload
//! - [`ObjectKey`] -- `<namespace>/<hex-digest>.<extension>` remote key
//! - [`Direction`] -- upload or download, half of a ledger slot
//! - [`RequestId`] -- UUID v7 identifier for one remote operation
//! - [`RequestStatus`] -- the request state machine, terminal states carry the outcome
//! - [`TransferError`] -- the error taxonomy seen by callers

pub mod digest;
pub mod error;
pub mod key;
pub mod request;

pub use digest::ContentDigest;
pub use error::{TransferError, TransferResult, TypeError};
pub use key::ObjectKey;
pub use request::{Completion, Direction, Outcome, RequestId, RequestStatus};
