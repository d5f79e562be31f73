//! Composite secret resolution
//!
//! [`SecretResolver`] consults its registered providers in registration order
//! and returns the first hit. Provider failures are misses unless the critical
//! exception policy matches them; critical failures from one lookup are
//! collected and surfaced together once every provider has been visited.

use std::any::type_name;
use std::ops::ControlFlow;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::{self, BoxFuture};
use futures_util::FutureExt;

use crate::cache::CacheConfiguration;
use crate::critical::CriticalExceptionPolicy;
use crate::entry::{ProviderContext, ProviderEntry};
use crate::error::SecretError;
use crate::provider::{
    CachedSecretProvider, Capabilities, ProviderHandle, SecretProvider, SyncSecretProvider,
    VersionedSecretProvider,
};
use crate::secret::Secret;

/// Resolves secrets against an ordered set of providers
pub struct SecretResolver {
    entries: Vec<Arc<ProviderEntry>>,
    policy: CriticalExceptionPolicy,
    context: ProviderContext,
}

/// Outcome bookkeeping for one fan-out across the entries
struct FanOut<'a> {
    name: &'a str,
    policy: &'a CriticalExceptionPolicy,
    critical: Vec<SecretError>,
}

impl<'a> FanOut<'a> {
    fn new(name: &'a str, policy: &'a CriticalExceptionPolicy) -> Self {
        Self {
            name,
            policy,
            critical: Vec::new(),
        }
    }

    /// Record one entry's outcome; `Break` ends the fan-out with a result
    fn record<T>(
        &mut self,
        position: usize,
        outcome: Result<Option<T>, SecretError>,
    ) -> ControlFlow<Result<T, SecretError>> {
        match outcome {
            Ok(Some(value)) if self.critical.is_empty() => ControlFlow::Break(Ok(value)),
            Ok(Some(_)) => {
                tracing::trace!(
                    secret = self.name,
                    position,
                    "Discarding hit after critical failure"
                );
                ControlFlow::Continue(())
            }
            Ok(None) => {
                tracing::trace!(secret = self.name, position, "Provider has no such secret");
                ControlFlow::Continue(())
            }
            Err(error) if !self.policy.is_critical(&error) => {
                tracing::trace!(
                    secret = self.name,
                    position,
                    error = %error,
                    "Provider failed, trying next provider"
                );
                ControlFlow::Continue(())
            }
            // Name mutation failures stop the fan-out instead of being collected
            Err(error @ SecretError::MutationFailed { .. }) => {
                tracing::warn!(secret = self.name, position, error = %error, "Critical name mutation failure");
                ControlFlow::Break(Err(self.abort(error)))
            }
            Err(error) => {
                tracing::warn!(secret = self.name, position, error = %error, "Critical provider failure");
                self.critical.push(error);
                ControlFlow::Continue(())
            }
        }
    }

    /// Stop the fan-out with a fatal error, keeping critical failures collected so far
    fn abort(&mut self, error: SecretError) -> SecretError {
        if self.critical.is_empty() {
            return error;
        }
        tracing::warn!(
            secret = self.name,
            collected = self.critical.len(),
            error = %error,
            "Resolution aborted after critical failures"
        );
        let mut failures = std::mem::take(&mut self.critical);
        failures.push(error);
        SecretError::Aggregate(failures)
    }

    /// Nothing matched: surface the critical failures, or not found
    fn finish<T>(mut self) -> Result<T, SecretError> {
        match self.critical.len() {
            0 => {
                tracing::debug!(secret = self.name, "Secret not found in any provider");
                Err(SecretError::not_found(self.name))
            }
            1 => Err(self.critical.remove(0)),
            _ => Err(SecretError::Aggregate(self.critical)),
        }
    }
}

fn validate_name(name: &str) -> Result<(), SecretError> {
    if name.trim().is_empty() {
        return Err(SecretError::InvalidArgument(
            "secret name must not be blank".to_string(),
        ));
    }
    Ok(())
}

fn validate_amount(amount: usize) -> Result<(), SecretError> {
    if amount == 0 {
        return Err(SecretError::InvalidArgument(
            "amount of versions must be at least one".to_string(),
        ));
    }
    Ok(())
}

/// Turn a resolver result back into provider-contract form
fn into_lookup<T>(result: Result<T, SecretError>) -> Result<Option<T>, SecretError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(SecretError::NotFound { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

impl SecretResolver {
    pub(crate) fn new(
        entries: Vec<Arc<ProviderEntry>>,
        policy: CriticalExceptionPolicy,
        context: ProviderContext,
    ) -> Self {
        Self {
            entries,
            policy,
            context,
        }
    }

    /// Start building a resolver
    pub fn builder() -> crate::builder::SecretResolverBuilder {
        crate::builder::SecretResolverBuilder::new()
    }

    pub fn entries(&self) -> &[Arc<ProviderEntry>] {
        &self.entries
    }

    pub fn policy(&self) -> &CriticalExceptionPolicy {
        &self.policy
    }

    pub fn context(&self) -> &ProviderContext {
        &self.context
    }

    /// Run one lookup per entry, in order, until one hits
    async fn fan_out<'a, T, F>(&'a self, name: &'a str, mut lookup: F) -> Result<T, SecretError>
    where
        F: FnMut(&'a ProviderHandle) -> BoxFuture<'a, Result<Option<T>, SecretError>>,
    {
        self.fan_out_entries(name, move |_, handle| lookup(handle))
            .await
    }

    /// Like `fan_out`, with the lookup also seeing the entry's registration options
    async fn fan_out_entries<'a, T, F>(
        &'a self,
        name: &'a str,
        mut lookup: F,
    ) -> Result<T, SecretError>
    where
        F: FnMut(&'a ProviderEntry, &'a ProviderHandle) -> BoxFuture<'a, Result<Option<T>, SecretError>>,
    {
        let mut fan_out = FanOut::new(name, &self.policy);
        for (position, entry) in self.entries.iter().enumerate() {
            let handle = entry.handle(&self.context).map_err(|e| fan_out.abort(e))?;
            let outcome = lookup(entry.as_ref(), handle).await;
            if let ControlFlow::Break(result) = fan_out.record(position, outcome) {
                return result;
            }
        }
        fan_out.finish()
    }

    /// Look up a secret in every provider, first hit wins
    pub async fn get_secret(&self, name: &str) -> Result<Secret, SecretError> {
        validate_name(name)?;
        tracing::debug!(secret = name, "Resolving secret");
        self.fan_out(name, |handle| handle.provider().get_secret(name))
            .await
    }

    /// Look up a secret value in every provider, first hit wins
    pub async fn get_raw_secret(&self, name: &str) -> Result<String, SecretError> {
        validate_name(name)?;
        tracing::debug!(secret = name, "Resolving raw secret");
        self.fan_out(name, |handle| handle.provider().get_raw_secret(name))
            .await
    }

    /// Look up a secret in the cache-aware providers, optionally bypassing their caches
    ///
    /// Providers without a cache count as misses.
    pub async fn get_secret_with_cache(
        &self,
        name: &str,
        ignore_cache: bool,
    ) -> Result<Secret, SecretError> {
        validate_name(name)?;
        self.fan_out(name, |handle| match handle.cached() {
            Some(cached) => cached.get_secret_with_cache(name, ignore_cache),
            None => future::ready(Ok(None)).boxed(),
        })
        .await
    }

    pub async fn get_raw_secret_with_cache(
        &self,
        name: &str,
        ignore_cache: bool,
    ) -> Result<String, SecretError> {
        validate_name(name)?;
        self.fan_out(name, |handle| match handle.cached() {
            Some(cached) => cached.get_raw_secret_with_cache(name, ignore_cache),
            None => future::ready(Ok(None)).boxed(),
        })
        .await
    }

    /// Drop the cached entry of the first provider currently caching the secret
    pub async fn invalidate_secret(&self, name: &str) -> Result<(), SecretError> {
        validate_name(name)?;
        self.fan_out(name, |handle| {
            Box::pin(async move {
                let Some(cached) = handle.cached() else {
                    return Ok(None);
                };
                if !cached.is_cached(name)? {
                    return Ok(None);
                }
                cached.invalidate_secret(name).await?;
                tracing::debug!(secret = name, "Secret invalidated");
                Ok::<_, SecretError>(Some(()))
            })
        })
        .await
    }

    /// All declared versions of a secret
    ///
    /// Entries declaring `name` as a versioned secret answer with up to their
    /// declared number of versions, first hit wins. When none of them has the
    /// secret the ordinary lookup is returned as a single version.
    pub async fn get_secrets(&self, name: &str) -> Result<Vec<Secret>, SecretError> {
        validate_name(name)?;
        let declared = self
            .entries
            .iter()
            .any(|entry| entry.versioned_secret_count(name).is_some());
        if !declared {
            return Ok(vec![self.get_secret(name).await?]);
        }

        tracing::debug!(secret = name, "Resolving declared secret versions");
        let versions = self
            .fan_out_entries(name, |entry, handle| {
                Box::pin(async move {
                    let (Some(amount), Some(versioned)) =
                        (entry.versioned_secret_count(name), handle.versioned())
                    else {
                        return Ok(None);
                    };
                    let mut secrets = versioned.get_secret_versions(name, amount).await?;
                    secrets.truncate(amount);
                    Ok::<_, SecretError>((!secrets.is_empty()).then_some(secrets))
                })
            })
            .await;

        match versions {
            Err(error) if error.is_not_found() => Ok(vec![self.get_secret(name).await?]),
            result => result,
        }
    }

    pub async fn get_raw_secrets(&self, name: &str) -> Result<Vec<String>, SecretError> {
        Ok(self
            .get_secrets(name)
            .await?
            .into_iter()
            .map(Secret::into_value)
            .collect())
    }

    /// Up to `amount` versions of a secret, most recent first
    ///
    /// Providers without versioning answer with their single current value.
    pub async fn get_secret_versions(
        &self,
        name: &str,
        amount: usize,
    ) -> Result<Vec<Secret>, SecretError> {
        validate_name(name)?;
        validate_amount(amount)?;
        self.fan_out(name, |handle| {
            Box::pin(async move {
                let secrets = match handle.versioned() {
                    Some(versioned) => versioned.get_secret_versions(name, amount).await?,
                    None => handle.provider().get_secret(name).await?.into_iter().collect(),
                };
                let found = !secrets.is_empty();
                Ok::<_, SecretError>(found.then(|| secrets.into_iter().take(amount).collect()))
            })
        })
        .await
    }

    pub async fn get_raw_secret_versions(
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

    /// Synchronous lookup
    ///
    /// Every provider consulted must support synchronous retrieval; reaching one
    /// that does not fails with [`SecretError::NotSupported`].
    pub fn get_secret_sync(&self, name: &str) -> Result<Secret, SecretError> {
        self.fan_out_sync(name, |sync| sync.get_secret_sync(name))
    }

    pub fn get_raw_secret_sync(&self, name: &str) -> Result<String, SecretError> {
        self.fan_out_sync(name, |sync| sync.get_raw_secret_sync(name))
    }

    fn fan_out_sync<T, F>(&self, name: &str, mut lookup: F) -> Result<T, SecretError>
    where
        F: FnMut(&dyn SyncSecretProvider) -> Result<Option<T>, SecretError>,
    {
        validate_name(name)?;
        let mut fan_out = FanOut::new(name, &self.policy);
        for (position, entry) in self.entries.iter().enumerate() {
            let handle = entry.handle(&self.context).map_err(|e| fan_out.abort(e))?;
            let Some(sync) = handle.sync() else {
                tracing::debug!(
                    secret = name,
                    position,
                    "Provider does not support synchronous lookups"
                );
                return Err(fan_out.abort(SecretError::NotSupported(format!(
                    "Cannot look up secret '{}' synchronously: provider #{} ({}) only supports asynchronous lookups",
                    name,
                    position,
                    entry.name().unwrap_or("unnamed")
                ))));
            };
            let outcome = match lookup(sync.as_ref()) {
                // A nested resolver reached an asynchronous-only provider
                Err(error @ SecretError::NotSupported(_)) => return Err(fan_out.abort(error)),
                outcome => outcome,
            };
            if let ControlFlow::Break(result) = fan_out.record(position, outcome) {
                return result;
            }
        }
        fan_out.finish()
    }

    fn named(&self, name: &str) -> Vec<Arc<ProviderEntry>> {
        self.entries
            .iter()
            .filter(|entry| entry.name() == Some(name))
            .cloned()
            .collect()
    }

    /// The provider registered under `name`
    ///
    /// When several providers share the name, the result resolves against all
    /// of them in registration order.
    pub fn get_provider(&self, name: &str) -> Result<Arc<dyn SecretProvider>, SecretError> {
        let mut matches = self.named(name);
        match matches.len() {
            0 => Err(SecretError::ProviderNotFound {
                name: name.to_string(),
            }),
            1 => {
                let entry = matches.remove(0);
                Ok(Arc::clone(entry.handle(&self.context)?.provider()))
            }
            _ => Ok(Arc::new(SecretResolver::new(
                matches,
                self.policy.clone(),
                self.context.clone(),
            ))),
        }
    }

    /// The provider registered under `name`, as its concrete type
    ///
    /// Fails with [`SecretError::InvalidOperation`] if several providers share
    /// the name or the provider is not a `T`.
    pub fn get_provider_as<T: SecretProvider>(&self, name: &str) -> Result<Arc<T>, SecretError> {
        let matches = self.named(name);
        match matches.as_slice() {
            [] => Err(SecretError::ProviderNotFound {
                name: name.to_string(),
            }),
            [entry] => Arc::clone(entry.provider(&self.context)?)
                .as_any_arc()
                .downcast::<T>()
                .map_err(|_| {
                    SecretError::InvalidOperation(format!(
                        "secret provider '{}' is not a {}",
                        name,
                        type_name::<T>()
                    ))
                }),
            _ => Err(SecretError::InvalidOperation(format!(
                "{} secret providers are registered with name '{}', cannot pick one as {}",
                matches.len(),
                name,
                type_name::<T>()
            ))),
        }
    }

    /// The cache-aware provider registered under `name`
    pub fn get_cached_provider(
        &self,
        name: &str,
    ) -> Result<Arc<dyn CachedSecretProvider>, SecretError> {
        let provider = self.get_provider(name)?;
        ProviderHandle::new(provider)
            .cached()
            .cloned()
            .ok_or_else(|| {
                SecretError::NotSupported(format!(
                    "secret provider '{}' is not configured with a cache",
                    name
                ))
            })
    }
}

#[async_trait]
impl SecretProvider for SecretResolver {
    async fn get_secret(&self, name: &str) -> Result<Option<Secret>, SecretError> {
        into_lookup(SecretResolver::get_secret(self, name).await)
    }

    async fn get_raw_secret(&self, name: &str) -> Result<Option<String>, SecretError> {
        into_lookup(SecretResolver::get_raw_secret(self, name).await)
    }

    fn description(&self) -> Option<String> {
        let names: Vec<String> = self
            .entries
            .iter()
            .map(|entry| entry.name().unwrap_or("unnamed").to_string())
            .collect();
        Some(format!("composite [{}]", names.join(", ")))
    }

    fn capabilities(self: Arc<Self>) -> Capabilities {
        Capabilities::default()
            .with_sync(self.clone())
            .with_cached(self.clone())
            .with_versioned(self)
    }
}

impl SyncSecretProvider for SecretResolver {
    fn get_secret_sync(&self, name: &str) -> Result<Option<Secret>, SecretError> {
        into_lookup(SecretResolver::get_secret_sync(self, name))
    }

    fn get_raw_secret_sync(&self, name: &str) -> Result<Option<String>, SecretError> {
        into_lookup(SecretResolver::get_raw_secret_sync(self, name))
    }
}

#[async_trait]
impl CachedSecretProvider for SecretResolver {
    /// Configuration of the first cache-aware entry
    fn cache_configuration(&self) -> CacheConfiguration {
        self.entries
            .iter()
            .filter_map(|entry| entry.created_handle())
            .find_map(|handle| handle.cached().map(|cached| cached.cache_configuration()))
            .unwrap_or_default()
    }

    async fn get_secret_with_cache(
        &self,
        name: &str,
        ignore_cache: bool,
    ) -> Result<Option<Secret>, SecretError> {
        into_lookup(SecretResolver::get_secret_with_cache(self, name, ignore_cache).await)
    }

    fn is_cached(&self, name: &str) -> Result<bool, SecretError> {
        for entry in &self.entries {
            if let Some(cached) = entry.created_handle().and_then(|handle| handle.cached()) {
                if cached.is_cached(name)? {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    async fn invalidate_secret(&self, name: &str) -> Result<(), SecretError> {
        SecretResolver::invalidate_secret(self, name).await
    }
}

#[async_trait]
impl VersionedSecretProvider for SecretResolver {
    async fn get_secret_versions(
        &self,
        name: &str,
        amount: usize,
    ) -> Result<Vec<Secret>, SecretError> {
        match SecretResolver::get_secret_versions(self, name, amount).await {
            Err(SecretError::NotFound { .. }) => Ok(Vec::new()),
            other => other,
        }
    }
}
