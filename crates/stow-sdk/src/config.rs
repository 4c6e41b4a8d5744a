use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use stow_crypto::{ExtensionPolicy, KeyGenerator, DEFAULT_NAMESPACE};
use stow_transfer::RetryPolicy;

use crate::error::{SdkError, SdkResult};

/// Client configuration, usually read from a `stow.toml`.
///
/// Every field has a default, so an empty document is a valid config:
///
/// ```toml
/// namespace = "public/images"
/// ledger_ttl_secs = 60
/// max_concurrent_transfers = 8
///
/// [retry]
/// max_attempts = 4
/// base_delay_ms = 200
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StowConfig {
    /// Key prefix, `/`-separated.
    pub namespace: String,
    /// Fixed extension for every key. When unset, the extension is sniffed
    /// from the payload's magic bytes.
    pub extension: Option<String>,
    /// Extension used when sniffing recognises nothing.
    pub fallback_extension: String,
    /// How long a successful transfer stays cached in the ledger.
    pub ledger_ttl_secs: u64,
    /// Upper bound on concurrent transfers in a batch.
    pub max_concurrent_transfers: usize,
    /// Period of the ledger janitor.
    pub eviction_interval_secs: u64,
    pub retry: RetryPolicy,
}

impl Default for StowConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            extension: None,
            fallback_extension: "bin".to_string(),
            ledger_ttl_secs: 60,
            max_concurrent_transfers: 8,
            eviction_interval_secs: 30,
            retry: RetryPolicy::default(),
        }
    }
}

impl StowConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> SdkResult<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> SdkResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| SdkError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> SdkResult<()> {
        self.retry.validate()?;
        if self.ledger_ttl_secs == 0 {
            return Err(SdkError::InvalidConfig(
                "ledger_ttl_secs must be at least 1".into(),
            ));
        }
        if self.max_concurrent_transfers == 0 {
            return Err(SdkError::InvalidConfig(
                "max_concurrent_transfers must be at least 1".into(),
            ));
        }
        if self.eviction_interval_secs == 0 {
            return Err(SdkError::InvalidConfig(
                "eviction_interval_secs must be at least 1".into(),
            ));
        }
        self.key_generator()?;
        Ok(())
    }

    pub fn extension_policy(&self) -> ExtensionPolicy {
        match &self.extension {
            Some(ext) => ExtensionPolicy::Fixed(ext.clone()),
            None => ExtensionPolicy::Sniff {
                fallback: self.fallback_extension.clone(),
            },
        }
    }

    /// Build the key generator this config describes.
    pub fn key_generator(&self) -> SdkResult<KeyGenerator> {
        Ok(KeyGenerator::new(
            self.namespace.clone(),
            self.extension_policy(),
        )?)
    }

    pub fn ledger_ttl(&self) -> Duration {
        Duration::from_secs(self.ledger_ttl_secs)
    }

    pub fn eviction_interval(&self) -> Duration {
        Duration::from_secs(self.eviction_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config() {
        let c = StowConfig::default();
        assert_eq!(c.namespace, "public/images");
        assert!(c.extension.is_none());
        assert_eq!(c.fallback_extension, "bin");
        assert_eq!(c.ledger_ttl(), Duration::from_secs(60));
        assert_eq!(c.retry, RetryPolicy::default());
        assert_eq!(c.max_concurrent_transfers, 8);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn empty_document_is_default() {
        assert_eq!(StowConfig::from_toml_str("").unwrap(), StowConfig::default());
    }

    #[test]
    fn partial_document_keeps_other_defaults() {
        let c = StowConfig::from_toml_str(
            r#"
            namespace = "tenants/acme/avatars"
            extension = "JPG"
            max_concurrent_transfers = 2

            [retry]
            max_attempts = 6
            base_delay_ms = 50
            "#,
        )
        .unwrap();
        assert_eq!(c.namespace, "tenants/acme/avatars");
        assert_eq!(c.extension_policy(), ExtensionPolicy::Fixed("JPG".into()));
        assert_eq!(c.max_concurrent_transfers, 2);
        assert_eq!(c.retry.max_attempts, 6);
        assert_eq!(c.retry.base_delay, Duration::from_millis(50));
        assert_eq!(c.retry.max_delay, Duration::from_secs(3));
        assert_eq!(c.ledger_ttl_secs, 60);

        let keys = c.key_generator().unwrap();
        let key = keys.derive_key(b"avatar").unwrap();
        assert!(key.to_string().starts_with("tenants/acme/avatars/"));
        assert_eq!(key.extension(), "jpg");
    }

    #[test]
    fn sniff_policy_uses_fallback() {
        let c = StowConfig {
            fallback_extension: "dat".into(),
            ..StowConfig::default()
        };
        assert_eq!(
            c.extension_policy(),
            ExtensionPolicy::Sniff {
                fallback: "dat".into()
            }
        );
    }

    #[test]
    fn rejects_zero_limits() {
        for doc in [
            "ledger_ttl_secs = 0",
            "max_concurrent_transfers = 0",
            "eviction_interval_secs = 0",
        ] {
            assert!(
                matches!(StowConfig::from_toml_str(doc), Err(SdkError::InvalidConfig(_))),
                "{doc} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_bad_retry_policy() {
        let err = StowConfig::from_toml_str("[retry]\nmax_attempts = 0").unwrap_err();
        assert!(matches!(err, SdkError::Policy(_)));
    }

    #[test]
    fn rejects_bad_namespace() {
        let err = StowConfig::from_toml_str(r#"namespace = "../escape""#).unwrap_err();
        assert!(matches!(err, SdkError::Key(_)));
    }

    #[test]
    fn rejects_malformed_toml() {
        let err = StowConfig::from_toml_str("namespace = ").unwrap_err();
        assert!(matches!(err, SdkError::Parse(_)));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "namespace = \"uploads\"").unwrap();
        writeln!(file, "ledger_ttl_secs = 5").unwrap();

        let c = StowConfig::load(file.path()).unwrap();
        assert_eq!(c.namespace, "uploads");
        assert_eq!(c.ledger_ttl(), Duration::from_secs(5));
    }

    #[test]
    fn load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        match StowConfig::load(&path) {
            Err(SdkError::Io { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected Io error, got {other:?}"),
        }
    }

    #[test]
    fn serializes_back_to_toml() {
        let c = StowConfig::default();
        let text = toml::to_string(&c).unwrap();
        assert!(text.contains("base_delay_ms = 200"));
        assert_eq!(StowConfig::from_toml_str(&text).unwrap(), c);
    }
}
