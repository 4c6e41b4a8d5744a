//! The remote object store as seen by stow.
//!
//! The wire protocol behind a store (HTTP multipart, range requests, SDK
//! calls) is out of scope. stow only needs two capabilities:
//!
//! - `put(key, bytes) -> etag`
//! - `get(key) -> bytes`
//!
//! and a classification of failures into transient (worth retrying) and
//! permanent ones. That contract is the [`ContentStore`] trait.
//!
//! # Backends
//!
//! - [`InMemoryContentStore`] -- `HashMap`-based store for tests and embedding
//! - [`FaultyStore`] -- wraps any store and injects scripted failures or
//!   corruption, for exercising retry and integrity paths

pub mod error;
pub mod faulty;
pub mod memory;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use faulty::{Corruption, FaultyStore};
pub use memory::InMemoryContentStore;
pub use traits::{ContentStore, PutReceipt};
