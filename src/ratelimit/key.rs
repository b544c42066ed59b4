//! Storage key derivation for bucket identities.

use std::fmt;
use std::sync::Arc;

use crate::error::{QuotaError, Result};

/// Namespace prepended to every identity unless configured otherwise.
pub const DEFAULT_KEY_PREFIX: &str = "rate_limit:";

/// The store key of one identity's bucket.
///
/// The key is the configured prefix followed by the identity verbatim, so two
/// identities share a key only if they are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BucketKey(Arc<str>);

impl BucketKey {
    /// Derive the key for `identity` under `prefix`.
    pub fn new(prefix: &str, identity: &str) -> Result<Self> {
        if identity.is_empty() {
            return Err(QuotaError::InvalidArgument(
                "identity must not be empty".to_string(),
            ));
        }

        Ok(Self(Arc::from(format!("{}{}", prefix, identity))))
    }

    /// The key as stored.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for BucketKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_key_creation() {
        let key = BucketKey::new(DEFAULT_KEY_PREFIX, "user-42").unwrap();
        assert_eq!(key.as_str(), "rate_limit:user-42");
        assert_eq!(key.to_string(), "rate_limit:user-42");
    }

    #[test]
    fn test_bucket_key_equality() {
        let key1 = BucketKey::new("p:", "alice").unwrap();
        let key2 = BucketKey::new("p:", "alice").unwrap();
        let key3 = BucketKey::new("p:", "bob").unwrap();

        assert_eq!(key1, key2);
        assert_ne!(key1, key3);
    }

    #[test]
    fn test_empty_identity_is_rejected() {
        let err = BucketKey::new(DEFAULT_KEY_PREFIX, "").unwrap_err();
        assert!(matches!(err, QuotaError::InvalidArgument(_)));
    }
}
