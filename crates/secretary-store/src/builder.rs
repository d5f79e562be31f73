//! Secret store registration

use std::collections::HashMap;
use std::error::Error as StdError;
use std::sync::Arc;

use crate::critical::{CriticalExceptionPolicy, CriticalExceptionRule};
use crate::entry::{ProviderContext, ProviderEntry, ProviderOptions};
use crate::error::{BoxError, SecretError};
use crate::provider::SecretProvider;
use crate::resolver::SecretResolver;

/// Collects providers and critical rules, then builds a [`SecretResolver`]
///
/// Providers are consulted in the order they are added.
#[derive(Default)]
pub struct SecretResolverBuilder {
    entries: Vec<ProviderEntry>,
    policy: CriticalExceptionPolicy,
    context: ProviderContext,
}

impl SecretResolverBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider with default options
    pub fn add_provider<P: SecretProvider>(self, provider: P) -> Self {
        self.add_provider_with(provider, ProviderOptions::new())
    }

    /// Register a provider with a name, cache, name mutation or versioned secrets
    pub fn add_provider_with<P: SecretProvider>(self, provider: P, options: ProviderOptions) -> Self {
        self.add_shared_provider(Arc::new(provider), options)
    }

    /// Register a provider that is already shared elsewhere
    pub fn add_shared_provider(
        mut self,
        provider: Arc<dyn SecretProvider>,
        options: ProviderOptions,
    ) -> Self {
        self.entries.push(ProviderEntry::new(provider, options));
        self
    }

    /// Register a provider created on first use
    ///
    /// The factory runs at most once, with the builder's [`ProviderContext`].
    /// A factory returning an error or no provider leaves the entry unusable:
    /// every later lookup reaching it fails with [`SecretError::Configuration`].
    pub fn add_lazy_provider<F>(mut self, factory: F, options: ProviderOptions) -> Self
    where
        F: Fn(&ProviderContext) -> Result<Option<Arc<dyn SecretProvider>>, BoxError>
            + Send
            + Sync
            + 'static,
    {
        self.entries.push(ProviderEntry::lazy(factory, options));
        self
    }

    pub fn add_critical_rule(mut self, rule: CriticalExceptionRule) -> Self {
        self.policy.add(rule);
        self
    }

    /// Treat every failure of type `E` as critical
    pub fn add_critical_error<E: StdError + 'static>(self) -> Self {
        self.add_critical_rule(CriticalExceptionRule::of_type::<E>())
    }

    /// Treat failures of type `E` matching `predicate` as critical
    pub fn add_critical_error_when<E, F>(self, predicate: F) -> Self
    where
        E: StdError + 'static,
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.add_critical_rule(CriticalExceptionRule::new::<E, F>(predicate))
    }

    /// Context handed to lazy provider factories
    pub fn with_context(mut self, context: ProviderContext) -> Self {
        self.context = context;
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn build(self) -> Result<SecretResolver, SecretError> {
        let mut names: HashMap<&str, usize> = HashMap::new();
        for entry in &self.entries {
            entry.options().validate()?;
            if let Some(name) = entry.name() {
                *names.entry(name).or_default() += 1;
            }
        }
        for (name, count) in names {
            if count > 1 {
                tracing::debug!(
                    provider = name,
                    count,
                    "Several secret providers share a name, lookups by name will combine them"
                );
            }
        }

        tracing::debug!(
            providers = self.entries.len(),
            critical_rules = self.policy.rules().len(),
            "Built secret store"
        );

        let entries = self.entries.into_iter().map(Arc::new).collect();
        Ok(SecretResolver::new(entries, self.policy, self.context))
    }
}
