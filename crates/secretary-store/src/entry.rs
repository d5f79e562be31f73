//! Registered provider entries

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::cache::{CacheConfiguration, CachedProvider};
use crate::config::lookup_setting;
use crate::error::{BoxError, SecretError};
use crate::mutation::{MutatedProvider, NameMutation};
use crate::provider::{ProviderHandle, SecretProvider};

/// Factory creating a provider on first use
pub type ProviderFactory = dyn Fn(&ProviderContext) -> Result<Option<Arc<dyn SecretProvider>>, BoxError>
    + Send
    + Sync;

/// Runtime context handed to lazy provider factories
#[derive(Debug, Clone, Default)]
pub struct ProviderContext {
    settings: Arc<toml::Table>,
    properties: HashMap<String, String>,
}

impl ProviderContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Application settings available to factories
    pub fn with_settings(mut self, settings: toml::Table) -> Self {
        self.settings = Arc::new(settings);
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn settings(&self) -> &toml::Table {
        &self.settings
    }

    pub(crate) fn shared_settings(&self) -> Arc<toml::Table> {
        Arc::clone(&self.settings)
    }

    /// A scalar setting addressed by a dotted key such as `vault.address`
    pub fn setting(&self, key: &str) -> Option<String> {
        lookup_setting(&self.settings, key)
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}

/// Registration options for one provider
#[derive(Debug, Clone, Default)]
pub struct ProviderOptions {
    name: Option<String>,
    mutation: Option<NameMutation>,
    cache: Option<CacheConfiguration>,
    versioned_secrets: HashMap<String, usize>,
}

impl ProviderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options for a provider retrievable under `name`
    pub fn named(name: impl Into<String>) -> Self {
        Self::new().name(name)
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Rewrite secret names before they reach the provider
    pub fn mutate_secret_name<F>(self, mutate: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.mutation(NameMutation::new(mutate))
    }

    /// Rewrite secret names, rejecting names the mutation cannot handle
    pub fn try_mutate_secret_name<F, E>(self, mutate: F) -> Self
    where
        F: Fn(&str) -> Result<String, E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        self.mutation(NameMutation::try_new(mutate))
    }

    pub fn mutation(mut self, mutation: NameMutation) -> Self {
        self.mutation = Some(mutation);
        self
    }

    /// Cache successful lookups
    pub fn cache(mut self, config: CacheConfiguration) -> Self {
        self.cache = Some(config);
        self
    }

    /// Declare a secret with `versions` retrievable versions
    pub fn versioned_secret(mut self, secret_name: impl Into<String>, versions: usize) -> Self {
        self.versioned_secrets.insert(secret_name.into(), versions);
        self
    }

    pub(crate) fn validate(&self) -> Result<(), SecretError> {
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(SecretError::InvalidArgument(
                    "provider name must not be blank".to_string(),
                ));
            }
        }

        for (secret_name, versions) in &self.versioned_secrets {
            if secret_name.trim().is_empty() {
                return Err(SecretError::InvalidArgument(
                    "versioned secret name must not be blank".to_string(),
                ));
            }
            if *versions == 0 {
                return Err(SecretError::InvalidArgument(format!(
                    "versioned secret '{}' must allow at least one version",
                    secret_name
                )));
            }
        }
        Ok(())
    }

    /// Apply the configured decorators: cache innermost, name mutation outermost
    fn decorate(&self, provider: Arc<dyn SecretProvider>) -> ProviderHandle {
        let mut handle = ProviderHandle::new(provider);
        if let Some(cache) = self.cache {
            handle = CachedProvider::wrap(handle, cache);
        }
        if let Some(mutation) = &self.mutation {
            handle = MutatedProvider::wrap(handle, mutation.clone());
        }
        handle
    }
}

/// The undecorated provider and its decorated handle
struct Resolved {
    provider: Arc<dyn SecretProvider>,
    handle: ProviderHandle,
}

enum Source {
    Ready(Resolved),
    Lazy {
        factory: Box<ProviderFactory>,
        resolved: OnceLock<Result<Resolved, String>>,
    },
}

/// A provider registered in a store, with its options
pub struct ProviderEntry {
    options: ProviderOptions,
    source: Source,
}

impl ProviderEntry {
    pub(crate) fn new(provider: Arc<dyn SecretProvider>, options: ProviderOptions) -> Self {
        let handle = options.decorate(Arc::clone(&provider));
        Self {
            options,
            source: Source::Ready(Resolved { provider, handle }),
        }
    }

    pub(crate) fn lazy<F>(factory: F, options: ProviderOptions) -> Self
    where
        F: Fn(&ProviderContext) -> Result<Option<Arc<dyn SecretProvider>>, BoxError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            options,
            source: Source::Lazy {
                factory: Box::new(factory),
                resolved: OnceLock::new(),
            },
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.options.name.as_deref()
    }

    pub fn is_lazy(&self) -> bool {
        matches!(self.source, Source::Lazy { .. })
    }

    /// Number of versions declared for a secret, if this entry declares it
    pub fn versioned_secret_count(&self, secret_name: &str) -> Option<usize> {
        self.options.versioned_secrets.get(secret_name).copied()
    }

    pub(crate) fn options(&self) -> &ProviderOptions {
        &self.options
    }

    /// The decorated provider, creating it on first use for lazy entries
    pub fn handle(&self, context: &ProviderContext) -> Result<&ProviderHandle, SecretError> {
        self.resolve(context).map(|resolved| &resolved.handle)
    }

    /// The provider as registered, without decorators
    pub fn provider(
        &self,
        context: &ProviderContext,
    ) -> Result<&Arc<dyn SecretProvider>, SecretError> {
        self.resolve(context).map(|resolved| &resolved.provider)
    }

    /// Handle of an already-created provider, without triggering creation
    pub fn created_handle(&self) -> Option<&ProviderHandle> {
        match &self.source {
            Source::Ready(resolved) => Some(&resolved.handle),
            Source::Lazy { resolved, .. } => match resolved.get() {
                Some(Ok(resolved)) => Some(&resolved.handle),
                _ => None,
            },
        }
    }

    fn resolve(&self, context: &ProviderContext) -> Result<&Resolved, SecretError> {
        match &self.source {
            Source::Ready(resolved) => Ok(resolved),
            Source::Lazy { factory, resolved } => resolved
                .get_or_init(|| self.create(factory, context))
                .as_ref()
                .map_err(|message| SecretError::Configuration(message.clone())),
        }
    }

    fn create(
        &self,
        factory: &ProviderFactory,
        context: &ProviderContext,
    ) -> Result<Resolved, String> {
        let label = self.name().unwrap_or("<unnamed>");
        tracing::debug!(provider = label, "Creating lazily registered secret provider");

        match factory(context) {
            Ok(Some(provider)) => {
                let handle = self.options.decorate(Arc::clone(&provider));
                Ok(Resolved { provider, handle })
            }
            Ok(None) => {
                tracing::error!(provider = label, "Secret provider factory returned no provider");
                Err(format!(
                    "factory for secret provider '{}' returned no provider",
                    label
                ))
            }
            Err(e) => {
                tracing::error!(provider = label, error = %e, "Secret provider factory failed");
                Err(format!(
                    "factory for secret provider '{}' failed: {}",
                    label, e
                ))
            }
        }
    }
}

impl fmt::Debug for ProviderEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderEntry")
            .field("name", &self.options.name)
            .field("lazy", &self.is_lazy())
            .field("handle", &self.created_handle())
            .finish()
    }
}
