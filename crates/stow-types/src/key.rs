use std::fmt;

use serde::{Deserialize, Serialize};

use crate::digest::ContentDigest;
use crate::error::TypeError;

/// Remote key of a content-addressed object.
///
/// Rendered as `<namespace>/<hex-digest>.<extension>`. The digest segment is
/// the BLAKE3 hash of the payload, so the key alone is enough to verify any
/// bytes fetched under it.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectKey {
    namespace: String,
    digest: ContentDigest,
    extension: String,
}

impl ObjectKey {
    /// Build a key from its parts, validating namespace and extension.
    pub fn new(
        namespace: impl Into<String>,
        digest: ContentDigest,
        extension: impl Into<String>,
    ) -> Result<Self, TypeError> {
        let namespace = namespace.into();
        let extension = extension.into();
        validate_namespace(&namespace)?;
        validate_extension(&extension)?;
        Ok(Self {
            namespace,
            digest,
            extension,
        })
    }

    /// Parse a rendered key.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        let invalid = |reason: &str| TypeError::InvalidKey {
            key: s.to_string(),
            reason: reason.to_string(),
        };

        let (namespace, file) = s
            .rsplit_once('/')
            .ok_or_else(|| invalid("missing namespace"))?;
        let (hex_digest, extension) = file
            .split_once('.')
            .ok_or_else(|| invalid("missing extension"))?;

        if hex_digest.len() != ContentDigest::HEX_LEN
            || !hex_digest
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        {
            return Err(invalid("digest must be 64 lowercase hex characters"));
        }
        let digest = ContentDigest::from_hex(hex_digest)?;

        Self::new(namespace, digest, extension)
    }

    /// The namespace prefix, without a trailing slash.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The digest embedded in the key.
    pub fn digest(&self) -> &ContentDigest {
        &self.digest
    }

    /// The file extension, without the dot.
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Short form for logs: `<namespace>/<8 hex>…`.
    pub fn short(&self) -> String {
        format!("{}/{}", self.namespace, self.digest.short_hex())
    }
}

fn validate_namespace(namespace: &str) -> Result<(), TypeError> {
    let invalid = |reason: &str| TypeError::InvalidNamespace {
        namespace: namespace.to_string(),
        reason: reason.to_string(),
    };

    if namespace.is_empty() {
        return Err(invalid("empty"));
    }
    for segment in namespace.split('/') {
        if segment.is_empty() {
            return Err(invalid("empty path segment"));
        }
        if segment == "." || segment == ".." {
            return Err(invalid("relative path segment"));
        }
        if !segment
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
        {
            return Err(invalid("unsupported character"));
        }
    }
    Ok(())
}

fn validate_extension(extension: &str) -> Result<(), TypeError> {
    if extension.is_empty() || !extension.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(TypeError::InvalidExtension(extension.to_string()));
    }
    Ok(())
}

impl fmt::Debug for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectKey({})", self.short())
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}.{}", self.namespace, self.digest, self.extension)
    }
}

impl TryFrom<String> for ObjectKey {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ObjectKey> for String {
    fn from(key: ObjectKey) -> Self {
        key.to_string()
    }
}

impl std::str::FromStr for ObjectKey {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn key_for(data: &[u8]) -> ObjectKey {
        ObjectKey::new("public/images", ContentDigest::of(data), "jpg").unwrap()
    }

    #[test]
    fn display_layout() {
        let key = key_for(b"cat");
        let rendered = key.to_string();
        assert!(rendered.starts_with("public/images/"));
        assert!(rendered.ends_with(".jpg"));
        assert_eq!(rendered.len(), "public/images/".len() + 64 + ".jpg".len());
    }

    #[test]
    fn parse_roundtrip() {
        let key = key_for(b"cat");
        let parsed = ObjectKey::parse(&key.to_string()).unwrap();
        assert_eq!(parsed, key);
        assert_eq!(parsed.namespace(), "public/images");
        assert_eq!(parsed.extension(), "jpg");
        assert_eq!(parsed.digest(), &ContentDigest::of(b"cat"));
    }

    #[test]
    fn parse_rejects_missing_namespace() {
        let hex = ContentDigest::of(b"x").to_hex();
        let err = ObjectKey::parse(&format!("{hex}.jpg")).unwrap_err();
        assert!(matches!(err, TypeError::InvalidKey { .. }));
    }

    #[test]
    fn parse_rejects_missing_extension() {
        let hex = ContentDigest::of(b"x").to_hex();
        assert!(ObjectKey::parse(&format!("public/{hex}")).is_err());
    }

    #[test]
    fn parse_rejects_uppercase_digest() {
        let hex = ContentDigest::of(b"x").to_hex().to_uppercase();
        assert!(ObjectKey::parse(&format!("public/{hex}.jpg")).is_err());
    }

    #[test]
    fn parse_rejects_uuid_style_keys() {
        // Random identifiers carry no digest and cannot be verified.
        let err = ObjectKey::parse("public/images/6F9619FF-8B86-D011-B42D-00C04FC964FF.jpg")
            .unwrap_err();
        assert!(matches!(err, TypeError::InvalidKey { .. }));
    }

    #[test]
    fn namespace_rules() {
        let d = ContentDigest::of(b"x");
        assert!(ObjectKey::new("", d, "jpg").is_err());
        assert!(ObjectKey::new("/public", d, "jpg").is_err());
        assert!(ObjectKey::new("public/", d, "jpg").is_err());
        assert!(ObjectKey::new("public//images", d, "jpg").is_err());
        assert!(ObjectKey::new("public/../etc", d, "jpg").is_err());
        assert!(ObjectKey::new("public images", d, "jpg").is_err());
        assert!(ObjectKey::new("tenant-1/photos_v2", d, "jpg").is_ok());
    }

    #[test]
    fn extension_rules() {
        let d = ContentDigest::of(b"x");
        assert!(matches!(
            ObjectKey::new("public", d, ""),
            Err(TypeError::InvalidExtension(_))
        ));
        assert!(ObjectKey::new("public", d, "tar.gz").is_err());
        assert!(ObjectKey::new("public", d, "heic").is_ok());
    }

    #[test]
    fn serde_uses_string_form() {
        let key = key_for(b"serde");
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, format!("\"{key}\""));
        let back: ObjectKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }

    #[test]
    fn serde_rejects_malformed() {
        assert!(serde_json::from_str::<ObjectKey>("\"not-a-key\"").is_err());
    }

    proptest! {
        #[test]
        fn parse_inverts_display(data in proptest::collection::vec(any::<u8>(), 1..256)) {
            let key = key_for(&data);
            prop_assert_eq!(ObjectKey::parse(&key.to_string()).unwrap(), key);
        }
    }
}
