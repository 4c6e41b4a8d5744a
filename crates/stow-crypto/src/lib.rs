//! Key derivation for stow.
//!
//! Turns payload bytes into an [`ObjectKey`](stow_types::ObjectKey) of the
//! form `<namespace>/<blake3-hex>.<extension>`. Derivation is a pure
//! function of the bytes: identical payloads always land on the same key,
//! which is what lets uploads be de-duplicated and downloads verified.

pub mod keygen;
pub mod sniff;

pub use keygen::{ExtensionPolicy, KeyError, KeyGenerator, DEFAULT_NAMESPACE};
pub use sniff::{sniff_extension, ImageFormat};
