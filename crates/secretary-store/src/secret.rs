//! The secret value returned by providers

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A resolved secret: value, optional version and optional expiry.
///
/// A secret is immutable once constructed. Backends without versioning leave
/// the version empty.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct Secret {
    value: String,
    version: Option<String>,
    expires_at: Option<DateTime<Utc>>,
}

impl Secret {
    /// Create an unversioned secret
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            version: None,
            expires_at: None,
        }
    }

    /// Create a secret with a backend-specific version identifier
    pub fn versioned(value: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            version: Some(version.into()),
            expires_at: None,
        }
    }

    /// Set the expiry reported by the backend
    pub fn expiring_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Whether the backend-reported expiry has passed
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Utc::now())
    }

    pub fn into_value(self) -> String {
        self.value
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret")
            .field("value", &format_args!("[REDACTED {} bytes]", self.value.len()))
            .field("version", &self.version)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_unversioned_secret() {
        let secret = Secret::new("s3cr3t");
        assert_eq!(secret.value(), "s3cr3t");
        assert_eq!(secret.version(), None);
        assert!(!secret.is_expired());
    }

    #[test]
    fn test_expiry() {
        let past = Secret::versioned("old", "1").expiring_at(Utc::now() - Duration::hours(1));
        assert!(past.is_expired());

        let future = Secret::versioned("new", "2").expiring_at(Utc::now() + Duration::hours(1));
        assert!(!future.is_expired());
        assert_eq!(future.version(), Some("2"));
    }

    #[test]
    fn test_debug_redacts_value() {
        let secret = Secret::new("sensitive");
        let debug_str = format!("{:?}", secret);
        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("sensitive"));
    }
}
