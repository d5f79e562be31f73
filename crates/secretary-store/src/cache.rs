//! In-memory caching decorator
//!
//! [`CachedProvider`] memoizes successful lookups of the wrapped provider for a
//! fixed duration. One cache lives in each decorator instance; concurrent
//! lookups of the same name are collapsed into a single upstream call.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::SecretError;
use crate::provider::{
    unsupported, CachedSecretProvider, Capabilities, ProviderHandle, SecretProvider,
    SyncSecretProvider, VersionedSecretProvider,
};
use crate::secret::Secret;

/// How long a cached secret stays valid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfiguration {
    duration: Duration,
}

impl CacheConfiguration {
    /// Default cache duration (5 minutes)
    pub const DEFAULT_DURATION: Duration = Duration::from_secs(5 * 60);

    pub fn new(duration: Duration) -> Result<Self, SecretError> {
        if duration.is_zero() {
            return Err(SecretError::InvalidArgument(
                "cache duration must be greater than zero".to_string(),
            ));
        }
        Ok(Self { duration })
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}

impl Default for CacheConfiguration {
    fn default() -> Self {
        Self {
            duration: Self::DEFAULT_DURATION,
        }
    }
}

#[derive(Debug)]
struct CacheEntry {
    secret: Secret,
    expires_at: Instant,
}

/// Provider decorator caching successful lookups
pub struct CachedProvider {
    inner: ProviderHandle,
    config: CacheConfiguration,
    entries: DashMap<String, CacheEntry>,
    /// Per-name guard so only one upstream fetch runs for a name at a time
    fetches: DashMap<String, Arc<Mutex<()>>>,
}

impl CachedProvider {
    pub fn new(inner: ProviderHandle, config: CacheConfiguration) -> Self {
        Self {
            inner,
            config,
            entries: DashMap::new(),
            fetches: DashMap::new(),
        }
    }

    /// Wrap a provider and return the decorated handle
    pub fn wrap(inner: ProviderHandle, config: CacheConfiguration) -> ProviderHandle {
        ProviderHandle::new(Arc::new(Self::new(inner, config)))
    }

    /// Live entry for a name, if any; an expired entry is dropped
    fn lookup(&self, name: &str) -> Option<Secret> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(name) {
            if now < entry.expires_at {
                return Some(entry.secret.clone());
            }
        }
        self.entries.remove_if(name, |_, entry| entry.expires_at <= now);
        None
    }

    fn store(&self, name: &str, secret: &Secret) {
        self.entries.insert(
            name.to_string(),
            CacheEntry {
                secret: secret.clone(),
                expires_at: Instant::now() + self.config.duration,
            },
        );
    }

    fn fetch_guard(&self, name: &str) -> Arc<Mutex<()>> {
        self.fetches.entry(name.to_string()).or_default().clone()
    }

    async fn fetch(&self, name: &str) -> Result<Option<Secret>, SecretError> {
        let secret = self.inner.provider().get_secret(name).await?;
        if let Some(secret) = &secret {
            self.store(name, secret);
        }
        Ok(secret)
    }

    /// Fetch under the name's guard, reusing an entry stored while waiting unless bypassing
    async fn fetch_exclusive(
        &self,
        name: &str,
        ignore_cache: bool,
    ) -> Result<Option<Secret>, SecretError> {
        let guard = self.fetch_guard(name);
        let result = {
            let _fetching = guard.lock().await;
            let stored = if ignore_cache { None } else { self.lookup(name) };
            match stored {
                Some(secret) => {
                    tracing::debug!(secret = name, "Cache hit");
                    Ok(Some(secret))
                }
                None => self.fetch(name).await,
            }
        };

        drop(guard);
        self.fetches
            .remove_if(name, |_, guard| Arc::strong_count(guard) == 1);
        result
    }
}

#[async_trait]
impl SecretProvider for CachedProvider {
    async fn get_secret(&self, name: &str) -> Result<Option<Secret>, SecretError> {
        self.get_secret_with_cache(name, false).await
    }

    fn description(&self) -> Option<String> {
        self.inner
            .description()
            .map(|description| format!("{} (cached)", description))
    }

    fn capabilities(self: Arc<Self>) -> Capabilities {
        let mut capabilities = Capabilities::default().with_cached(self.clone());
        if self.inner.sync().is_some() {
            capabilities = capabilities.with_sync(self.clone());
        }
        if self.inner.versioned().is_some() {
            capabilities = capabilities.with_versioned(self);
        }
        capabilities
    }
}

#[async_trait]
impl CachedSecretProvider for CachedProvider {
    fn cache_configuration(&self) -> CacheConfiguration {
        self.config
    }

    async fn get_secret_with_cache(
        &self,
        name: &str,
        ignore_cache: bool,
    ) -> Result<Option<Secret>, SecretError> {
        if ignore_cache {
            tracing::debug!(secret = name, "Bypassing cache");
            return self.fetch_exclusive(name, true).await;
        }

        if let Some(secret) = self.lookup(name) {
            tracing::debug!(secret = name, "Cache hit");
            return Ok(Some(secret));
        }

        tracing::debug!(secret = name, "Cache miss");
        self.fetch_exclusive(name, false).await
    }

    fn is_cached(&self, name: &str) -> Result<bool, SecretError> {
        Ok(self.lookup(name).is_some())
    }

    async fn invalidate_secret(&self, name: &str) -> Result<(), SecretError> {
        if self.entries.remove(name).is_some() {
            tracing::debug!(secret = name, "Invalidated cached secret");
        }
        Ok(())
    }
}

impl SyncSecretProvider for CachedProvider {
    fn get_secret_sync(&self, name: &str) -> Result<Option<Secret>, SecretError> {
        let sync = self
            .inner
            .sync()
            .ok_or_else(|| unsupported("synchronous", name))?;

        if let Some(secret) = self.lookup(name) {
            tracing::debug!(secret = name, "Cache hit");
            return Ok(Some(secret));
        }

        let secret = sync.get_secret_sync(name)?;
        if let Some(secret) = &secret {
            self.store(name, secret);
        }
        Ok(secret)
    }
}

/// Version listings are not cached
#[async_trait]
impl VersionedSecretProvider for CachedProvider {
    async fn get_secret_versions(
        &self,
        name: &str,
        amount: usize,
    ) -> Result<Vec<Secret>, SecretError> {
        let versioned = self
            .inner
            .versioned()
            .ok_or_else(|| unsupported("versioned", name))?;
        versioned.get_secret_versions(name, amount).await
    }
}
