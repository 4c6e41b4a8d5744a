use serde::{Deserialize, Serialize};
use stow_types::{ContentDigest, ObjectKey, TransferError, TypeError};

use crate::sniff::sniff_extension;

/// Namespace used when the application does not configure one.
pub const DEFAULT_NAMESPACE: &str = "public/images";

/// How the extension segment of a key is chosen.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtensionPolicy {
    /// Every key gets this extension.
    Fixed(String),
    /// Detect the image format from magic bytes; use `fallback` otherwise.
    Sniff { fallback: String },
}

impl Default for ExtensionPolicy {
    fn default() -> Self {
        Self::Sniff {
            fallback: "bin".into(),
        }
    }
}

/// Errors from key derivation.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("payload is empty")]
    EmptyPayload,

    #[error(transparent)]
    Type(#[from] TypeError),
}

impl From<KeyError> for TransferError {
    fn from(err: KeyError) -> Self {
        TransferError::InvalidInput(err.to_string())
    }
}

/// Derives content-addressed keys from payload bytes.
///
/// Pure: no I/O, no clock, no randomness. Two generators with the same
/// namespace and policy always agree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyGenerator {
    namespace: String,
    extension: ExtensionPolicy,
}

impl KeyGenerator {
    /// Create a generator, validating the namespace and extensions up front
    /// so that `derive_key` can only fail on empty input.
    pub fn new(namespace: impl Into<String>, extension: ExtensionPolicy) -> Result<Self, KeyError> {
        let namespace = namespace.into();
        let extension = match extension {
            ExtensionPolicy::Fixed(ext) => ExtensionPolicy::Fixed(ext.to_ascii_lowercase()),
            ExtensionPolicy::Sniff { fallback } => ExtensionPolicy::Sniff {
                fallback: fallback.to_ascii_lowercase(),
            },
        };
        let probe = match &extension {
            ExtensionPolicy::Fixed(ext) => ext,
            ExtensionPolicy::Sniff { fallback } => fallback,
        };
        ObjectKey::new(namespace.as_str(), ContentDigest::of(b""), probe.as_str())?;
        Ok(Self {
            namespace,
            extension,
        })
    }

    /// The namespace every derived key lives under.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The extension policy.
    pub fn extension_policy(&self) -> &ExtensionPolicy {
        &self.extension
    }

    /// Derive the key for `payload`.
    pub fn derive_key(&self, payload: &[u8]) -> Result<ObjectKey, KeyError> {
        if payload.is_empty() {
            return Err(KeyError::EmptyPayload);
        }
        let extension = match &self.extension {
            ExtensionPolicy::Fixed(ext) => ext.as_str(),
            ExtensionPolicy::Sniff { fallback } => {
                sniff_extension(payload).unwrap_or(fallback.as_str())
            }
        };
        Ok(ObjectKey::new(
            self.namespace.as_str(),
            ContentDigest::of(payload),
            extension,
        )?)
    }

    /// Returns `true` if `payload` hashes to the digest embedded in `key`.
    pub fn verify(payload: &[u8], key: &ObjectKey) -> bool {
        key.digest().matches(payload)
    }
}

impl Default for KeyGenerator {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.into(),
            extension: ExtensionPolicy::default(),
        }
    }
}
