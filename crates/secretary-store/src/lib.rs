//! Composite secret store with multiple backend support
//!
//! A [`SecretResolver`] looks secrets up across an ordered list of providers and
//! returns the first hit. Each registered provider can be decorated with:
//!
//! - **Caching** ([`CacheConfiguration`]): successful lookups are reused for a fixed duration
//! - **Name mutation** ([`NameMutation`]): the secret name is rewritten before it reaches the provider
//! - **Versioned secrets**: declared secrets resolve to several historical values
//!
//! Provider failures are treated as misses unless a [`CriticalExceptionRule`]
//! marks them critical, in which case they abort resolution.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use secretary_store::{CacheConfiguration, EnvironmentProvider, ProviderOptions, SecretResolver};
//!
//! let resolver = SecretResolver::builder()
//!     .add_provider_with(
//!         EnvironmentProvider::new(),
//!         ProviderOptions::named("env")
//!             .mutate_secret_name(|name| name.replace('.', "_").to_uppercase())
//!             .cache(CacheConfiguration::new(Duration::from_secs(60))?),
//!     )
//!     .build()?;
//!
//! let password = resolver.get_raw_secret("Database.Password").await?;
//! ```
//!
//! # Features
//!
//! - `env` (default): environment variable provider
//! - `config` (default): provider over an in-memory TOML table
//! - `hashicorp-vault`: HashiCorp Vault KV v2 provider via `vaultrs`
//! - `azure-key-vault`: Azure Key Vault provider over its REST API

mod backends;
mod builder;
mod cache;
mod config;
mod critical;
mod entry;
mod error;
mod mutation;
mod provider;
mod resolver;
mod secret;

pub use builder::SecretResolverBuilder;
pub use cache::{CacheConfiguration, CachedProvider};
pub use config::{CriticalKind, MutationConfig, ProviderConfig, ProviderKind, StoreConfig};
pub use critical::{CriticalExceptionPolicy, CriticalExceptionRule};
pub use entry::{ProviderContext, ProviderEntry, ProviderFactory, ProviderOptions};
pub use error::{BoxError, SecretError};
pub use mutation::{MutatedProvider, NameMutation};
pub use provider::{
    AsAny, CachedSecretProvider, Capabilities, ProviderHandle, SecretProvider,
    SyncSecretProvider, VersionedSecretProvider,
};
pub use resolver::SecretResolver;
pub use secret::Secret;

#[cfg(feature = "env")]
pub use backends::env::EnvironmentProvider;

#[cfg(feature = "config")]
pub use backends::configuration::ConfigurationProvider;

#[cfg(feature = "hashicorp-vault")]
pub use backends::hashicorp::{HashiCorpVaultProvider, HashiCorpVaultSettings};

#[cfg(feature = "azure-key-vault")]
pub use backends::azure::{AzureKeyVaultProvider, StaticToken, TokenCredential};
