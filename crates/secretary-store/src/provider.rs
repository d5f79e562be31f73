//! Secret provider contract and optional capabilities
//!
//! Every backend implements [`SecretProvider`]. A backend that can also answer
//! synchronously, honour cache bypass/invalidation, or return historical
//! versions advertises that through [`SecretProvider::capabilities`], which the
//! store reads once at registration time.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::cache::CacheConfiguration;
use crate::error::SecretError;
use crate::secret::Secret;

/// Allows typed access to a registered provider behind `Arc<dyn SecretProvider>`
pub trait AsAny: Any + Send + Sync {
    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// A backend capable of looking up secrets by name
///
/// `Ok(None)` means the backend does not have the secret. Errors are reserved
/// for failures; the store treats them as misses unless a critical rule says
/// otherwise.
#[async_trait]
pub trait SecretProvider: AsAny {
    /// Look up a secret
    async fn get_secret(&self, name: &str) -> Result<Option<Secret>, SecretError>;

    /// Look up only the secret value
    async fn get_raw_secret(&self, name: &str) -> Result<Option<String>, SecretError> {
        Ok(self.get_secret(name).await?.map(Secret::into_value))
    }

    /// Human-readable description for diagnostics
    fn description(&self) -> Option<String> {
        None
    }

    /// Optional capabilities of this provider
    ///
    /// Called once when the provider is registered.
    fn capabilities(self: Arc<Self>) -> Capabilities {
        Capabilities::default()
    }
}

/// Synchronous lookups, for providers that never block on I/O
pub trait SyncSecretProvider: Send + Sync {
    fn get_secret_sync(&self, name: &str) -> Result<Option<Secret>, SecretError>;

    fn get_raw_secret_sync(&self, name: &str) -> Result<Option<String>, SecretError> {
        Ok(self.get_secret_sync(name)?.map(Secret::into_value))
    }
}

/// Cache-aware lookups
#[async_trait]
pub trait CachedSecretProvider: Send + Sync {
    fn cache_configuration(&self) -> CacheConfiguration;

    /// Look up a secret, optionally bypassing the cache for the read
    async fn get_secret_with_cache(
        &self,
        name: &str,
        ignore_cache: bool,
    ) -> Result<Option<Secret>, SecretError>;

    async fn get_raw_secret_with_cache(
        &self,
        name: &str,
        ignore_cache: bool,
    ) -> Result<Option<String>, SecretError> {
        Ok(self
            .get_secret_with_cache(name, ignore_cache)
            .await?
            .map(Secret::into_value))
    }

    /// Whether a live cache entry exists for the secret
    fn is_cached(&self, name: &str) -> Result<bool, SecretError>;

    /// Drop any cached entry for the secret
    async fn invalidate_secret(&self, name: &str) -> Result<(), SecretError>;
}

/// Retrieval of historical secret versions
#[async_trait]
pub trait VersionedSecretProvider: Send + Sync {
    /// Up to `amount` versions of the secret, most recent first
    async fn get_secret_versions(
        &self,
        name: &str,
        amount: usize,
    ) -> Result<Vec<Secret>, SecretError>;

    async fn get_raw_secret_versions(
        &self,
        name: &str,
        amount: usize,
    ) -> Result<Vec<String>, SecretError> {
        Ok(self
            .get_secret_versions(name, amount)
            .await?
            .into_iter()
            .map(Secret::into_value)
            .collect())
    }
}

/// Optional capabilities advertised by a provider
#[derive(Clone, Default)]
pub struct Capabilities {
    pub sync: Option<Arc<dyn SyncSecretProvider>>,
    pub cached: Option<Arc<dyn CachedSecretProvider>>,
    pub versioned: Option<Arc<dyn VersionedSecretProvider>>,
}

impl Capabilities {
    pub fn with_sync(mut self, provider: Arc<dyn SyncSecretProvider>) -> Self {
        self.sync = Some(provider);
        self
    }

    pub fn with_cached(mut self, provider: Arc<dyn CachedSecretProvider>) -> Self {
        self.cached = Some(provider);
        self
    }

    pub fn with_versioned(mut self, provider: Arc<dyn VersionedSecretProvider>) -> Self {
        self.versioned = Some(provider);
        self
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capabilities")
            .field("sync", &self.sync.is_some())
            .field("cached", &self.cached.is_some())
            .field("versioned", &self.versioned.is_some())
            .finish()
    }
}

/// A provider together with its capabilities, resolved once
#[derive(Clone)]
pub struct ProviderHandle {
    provider: Arc<dyn SecretProvider>,
    capabilities: Capabilities,
}

impl ProviderHandle {
    pub fn new(provider: Arc<dyn SecretProvider>) -> Self {
        let capabilities = Arc::clone(&provider).capabilities();
        Self {
            provider,
            capabilities,
        }
    }

    pub fn provider(&self) -> &Arc<dyn SecretProvider> {
        &self.provider
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn sync(&self) -> Option<&Arc<dyn SyncSecretProvider>> {
        self.capabilities.sync.as_ref()
    }

    pub fn cached(&self) -> Option<&Arc<dyn CachedSecretProvider>> {
        self.capabilities.cached.as_ref()
    }

    pub fn versioned(&self) -> Option<&Arc<dyn VersionedSecretProvider>> {
        self.capabilities.versioned.as_ref()
    }

    pub fn description(&self) -> Option<String> {
        self.provider.description()
    }
}

impl fmt::Debug for ProviderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderHandle")
            .field("description", &self.provider.description())
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

/// Error for a capability the wrapped provider does not have
pub(crate) fn unsupported(capability: &str, name: &str) -> SecretError {
    SecretError::NotSupported(format!(
        "Cannot look up secret '{}': provider does not support {} retrieval",
        name, capability
    ))
}
