//! Secret name mutation decorator
//!
//! [`MutatedProvider`] rewrites the caller's secret name before delegating, e.g.
//! to map `Arcus.Foo` onto an environment variable called `ARCUS_FOO`. It wraps
//! any provider handle and forwards whichever capabilities the wrapped
//! provider has.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::cache::CacheConfiguration;
use crate::error::{BoxError, SecretError};
use crate::provider::{
    unsupported, CachedSecretProvider, Capabilities, ProviderHandle, SecretProvider,
    SyncSecretProvider, VersionedSecretProvider,
};
use crate::secret::Secret;

type MutationFn = dyn Fn(&str) -> Result<String, BoxError> + Send + Sync;

/// A function rewriting secret names
#[derive(Clone)]
pub struct NameMutation {
    mutate: Arc<MutationFn>,
}

impl NameMutation {
    /// Infallible mutation
    pub fn new<F>(mutate: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self {
            mutate: Arc::new(move |name: &str| Ok(mutate(name))),
        }
    }

    /// Mutation that may reject a name
    pub fn try_new<F, E>(mutate: F) -> Self
    where
        F: Fn(&str) -> Result<String, E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        Self {
            mutate: Arc::new(move |name: &str| mutate(name).map_err(Into::into)),
        }
    }

    /// Apply the mutation
    ///
    /// A rejected name, or a mutation producing a blank name, is reported as
    /// [`SecretError::MutationFailed`].
    pub fn apply(&self, name: &str) -> Result<String, SecretError> {
        match (self.mutate)(name) {
            Ok(mutated) if !mutated.trim().is_empty() => Ok(mutated),
            Ok(_) => Err(self.failed(name, "mutation produced a blank name".to_string())),
            Err(e) => Err(self.failed(name, e.to_string())),
        }
    }

    fn failed(&self, name: &str, reason: String) -> SecretError {
        tracing::warn!(secret = name, %reason, "Secret name mutation failed");
        SecretError::MutationFailed {
            name: name.to_string(),
            reason,
        }
    }
}

impl fmt::Debug for NameMutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("NameMutation(..)")
    }
}

/// Provider decorator applying a [`NameMutation`] to every lookup
pub struct MutatedProvider {
    inner: ProviderHandle,
    mutation: NameMutation,
}

impl MutatedProvider {
    pub fn new(inner: ProviderHandle, mutation: NameMutation) -> Self {
        Self { inner, mutation }
    }

    /// Wrap a provider and return the decorated handle
    pub fn wrap(inner: ProviderHandle, mutation: NameMutation) -> ProviderHandle {
        ProviderHandle::new(Arc::new(Self::new(inner, mutation)))
    }

    fn mutate(&self, name: &str) -> Result<String, SecretError> {
        let mutated = self.mutation.apply(name)?;
        tracing::trace!(secret = name, mutated = %mutated, "Mutated secret name");
        Ok(mutated)
    }
}

#[async_trait]
impl SecretProvider for MutatedProvider {
    async fn get_secret(&self, name: &str) -> Result<Option<Secret>, SecretError> {
        let mutated = self.mutate(name)?;
        self.inner.provider().get_secret(&mutated).await
    }

    async fn get_raw_secret(&self, name: &str) -> Result<Option<String>, SecretError> {
        let mutated = self.mutate(name)?;
        self.inner.provider().get_raw_secret(&mutated).await
    }

    fn description(&self) -> Option<String> {
        self.inner.description()
    }

    fn capabilities(self: Arc<Self>) -> Capabilities {
        let mut capabilities = Capabilities::default();
        if self.inner.sync().is_some() {
            capabilities = capabilities.with_sync(self.clone());
        }
        if self.inner.cached().is_some() {
            capabilities = capabilities.with_cached(self.clone());
        }
        if self.inner.versioned().is_some() {
            capabilities = capabilities.with_versioned(self);
        }
        capabilities
    }
}

impl SyncSecretProvider for MutatedProvider {
    fn get_secret_sync(&self, name: &str) -> Result<Option<Secret>, SecretError> {
        let sync = self
            .inner
            .sync()
            .ok_or_else(|| unsupported("synchronous", name))?;
        sync.get_secret_sync(&self.mutate(name)?)
    }

    fn get_raw_secret_sync(&self, name: &str) -> Result<Option<String>, SecretError> {
        let sync = self
            .inner
            .sync()
            .ok_or_else(|| unsupported("synchronous", name))?;
        sync.get_raw_secret_sync(&self.mutate(name)?)
    }
}

#[async_trait]
impl CachedSecretProvider for MutatedProvider {
    fn cache_configuration(&self) -> CacheConfiguration {
        self.inner
            .cached()
            .map(|cached| cached.cache_configuration())
            .unwrap_or_default()
    }

    async fn get_secret_with_cache(
        &self,
        name: &str,
        ignore_cache: bool,
    ) -> Result<Option<Secret>, SecretError> {
        let cached = self
            .inner
            .cached()
            .ok_or_else(|| unsupported("cached", name))?;
        cached
            .get_secret_with_cache(&self.mutate(name)?, ignore_cache)
            .await
    }

    fn is_cached(&self, name: &str) -> Result<bool, SecretError> {
        match self.inner.cached() {
            Some(cached) => cached.is_cached(&self.mutate(name)?),
            None => Ok(false),
        }
    }

    async fn invalidate_secret(&self, name: &str) -> Result<(), SecretError> {
        let cached = self
            .inner
            .cached()
            .ok_or_else(|| unsupported("cached", name))?;
        cached.invalidate_secret(&self.mutate(name)?).await
    }
}

#[async_trait]
impl VersionedSecretProvider for MutatedProvider {
    async fn get_secret_versions(
        &self,
        name: &str,
        amount: usize,
    ) -> Result<Vec<Secret>, SecretError> {
        let versioned = self
            .inner
            .versioned()
            .ok_or_else(|| unsupported("versioned", name))?;
        versioned
            .get_secret_versions(&self.mutate(name)?, amount)
            .await
    }
}
