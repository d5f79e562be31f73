//! Store configuration file
//!
//! Settings are resolved in this order (first found wins):
//! 1. Environment variables (SECRETARY_*)
//! 2. Config file (secretary.toml)
//! 3. Default values (where applicable)
//!
//! ```toml
//! critical = ["access-denied"]
//!
//! [[providers]]
//! kind = "environment"
//! name = "env"
//! [providers.mutation]
//! replace = [[".", "_"]]
//! uppercase = true
//!
//! [[providers]]
//! kind = "hashicorp-vault"
//! address = "https://vault.internal:8200"
//! [providers.cache]
//! duration_secs = 60
//! [providers.versions]
//! "db/password" = 2
//!
//! [settings.database]
//! user = "app"
//! ```

use std::collections::HashMap;
use std::env;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::builder::SecretResolverBuilder;
use crate::cache::CacheConfiguration;
use crate::critical::CriticalExceptionRule;
use crate::entry::{ProviderContext, ProviderOptions};
use crate::error::SecretError;
use crate::mutation::NameMutation;

/// Environment variable prefix
const ENV_PREFIX: &str = "SECRETARY";

/// Get environment variable with prefix
fn get_env(name: &str) -> Option<String> {
    env::var(format!("{}_{}", ENV_PREFIX, name)).ok()
}

/// Store configuration (parsed from TOML, can be overridden by env)
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct StoreConfig {
    /// Providers, consulted in this order
    pub providers: Vec<ProviderConfig>,

    /// Built-in failure kinds that abort resolution instead of counting as a miss
    pub critical: Vec<CriticalKind>,

    /// Application settings, read by `configuration` providers and lazy factories
    pub settings: toml::Table,
}

/// One `[[providers]]` table
#[derive(Debug, Deserialize)]
pub struct ProviderConfig {
    #[serde(flatten)]
    pub kind: ProviderKind,

    /// Name the provider is retrievable under
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub cache: Option<CacheConfig>,

    #[serde(default)]
    pub mutation: Option<MutationConfig>,

    /// Secret name to number of retrievable versions
    #[serde(default)]
    pub versions: HashMap<String, usize>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ProviderKind {
    Environment {
        #[serde(default)]
        prefix: Option<String>,
    },
    Configuration {
        /// Dotted path of the table secrets are read from (e.g. "secrets")
        #[serde(default)]
        section: Option<String>,
    },
    HashicorpVault {
        #[serde(default)]
        address: Option<String>,
        #[serde(default)]
        token: Option<String>,
        /// KV v2 mount (default: "secret")
        #[serde(default)]
        mount: Option<String>,
        /// Field of the stored map holding the value (default: "value")
        #[serde(default)]
        key: Option<String>,
        #[serde(default)]
        namespace: Option<String>,
    },
    AzureKeyVault {
        #[serde(default)]
        vault_uri: Option<String>,
        #[serde(default)]
        token: Option<String>,
    },
}

impl ProviderKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Environment { .. } => "environment",
            Self::Configuration { .. } => "configuration",
            Self::HashicorpVault { .. } => "hashicorp-vault",
            Self::AzureKeyVault { .. } => "azure-key-vault",
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_secs")]
    pub duration_secs: u64,
}

fn default_cache_secs() -> u64 {
    CacheConfiguration::DEFAULT_DURATION.as_secs()
}

/// Declarative secret name mutation
///
/// Applied as: replacements, then case change, then prefix.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MutationConfig {
    pub prefix: Option<String>,
    pub uppercase: bool,
    pub lowercase: bool,
    pub replace: Vec<(String, String)>,
}

impl MutationConfig {
    fn validate(&self) -> Result<(), SecretError> {
        if self.uppercase && self.lowercase {
            return Err(SecretError::InvalidArgument(
                "name mutation cannot be both uppercase and lowercase".to_string(),
            ));
        }
        if self.replace.iter().any(|(from, _)| from.is_empty()) {
            return Err(SecretError::InvalidArgument(
                "name mutation replacement pattern must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn apply(&self, name: &str) -> String {
        let mut mutated = name.to_string();
        for (from, to) in &self.replace {
            mutated = mutated.replace(from.as_str(), to);
        }
        if self.uppercase {
            mutated = mutated.to_uppercase();
        } else if self.lowercase {
            mutated = mutated.to_lowercase();
        }
        match &self.prefix {
            Some(prefix) => format!("{}{}", prefix, mutated),
            None => mutated,
        }
    }

    fn into_mutation(self) -> NameMutation {
        NameMutation::new(move |name| self.apply(name))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CriticalKind {
    /// Backend runtime failures (unreachable vault, bad response)
    Backend,
    AccessDenied,
    /// Unsupported call shapes and rejected name mutations
    NotSupported,
}

impl CriticalKind {
    fn rule(self) -> CriticalExceptionRule {
        CriticalExceptionRule::new::<SecretError, _>(move |error| match self {
            Self::Backend => matches!(error, SecretError::BackendError { .. }),
            Self::AccessDenied => matches!(error, SecretError::AccessDenied(_)),
            Self::NotSupported => error.is_not_supported(),
        })
    }
}

/// Require a non-blank setting
#[cfg(any(feature = "hashicorp-vault", feature = "azure-key-vault"))]
fn required(value: Option<String>, message: &str) -> Result<String, SecretError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| SecretError::InvalidArgument(message.to_string()))
}

impl StoreConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SecretError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SecretError::Configuration(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&content)?;
        tracing::info!(
            path = %path.display(),
            providers = config.providers.len(),
            "Loaded secret store configuration"
        );
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, SecretError> {
        toml::from_str(content)
            .map_err(|e| SecretError::Configuration(format!("invalid store configuration: {}", e)))
    }

    /// Turn the configuration into a builder, validating every provider
    pub fn into_builder(self) -> Result<SecretResolverBuilder, SecretError> {
        let context = ProviderContext::new().with_settings(self.settings);
        let settings = context.shared_settings();
        let mut builder = SecretResolverBuilder::new().with_context(context);

        for kind in self.critical {
            builder = builder.add_critical_rule(kind.rule());
        }

        for (position, provider) in self.providers.into_iter().enumerate() {
            tracing::debug!(
                position,
                kind = provider.kind.label(),
                name = provider.name.as_deref(),
                "Registering configured secret provider"
            );
            let options = provider_options(
                provider.name,
                provider.cache,
                provider.mutation,
                provider.versions,
            )?;
            builder = register(builder, provider.kind, options, &settings)?;
        }

        Ok(builder)
    }
}

fn provider_options(
    name: Option<String>,
    cache: Option<CacheConfig>,
    mutation: Option<MutationConfig>,
    versions: HashMap<String, usize>,
) -> Result<ProviderOptions, SecretError> {
    let mut options = ProviderOptions::new();
    if let Some(name) = name {
        options = options.name(name);
    }
    if let Some(cache) = cache {
        let duration = Duration::from_secs(cache.duration_secs);
        options = options.cache(CacheConfiguration::new(duration)?);
    }
    if let Some(mutation) = mutation {
        mutation.validate()?;
        options = options.mutation(mutation.into_mutation());
    }
    for (secret_name, count) in versions {
        options = options.versioned_secret(secret_name, count);
    }
    options.validate()?;
    Ok(options)
}

#[allow(unused_variables)]
fn register(
    builder: SecretResolverBuilder,
    kind: ProviderKind,
    options: ProviderOptions,
    settings: &Arc<toml::Table>,
) -> Result<SecretResolverBuilder, SecretError> {
    match kind {
        #[cfg(feature = "env")]
        ProviderKind::Environment { prefix } => {
            let provider = match get_env("ENV_PREFIX").or(prefix) {
                Some(prefix) => crate::backends::env::EnvironmentProvider::with_prefix(prefix),
                None => crate::backends::env::EnvironmentProvider::new(),
            };
            Ok(builder.add_provider_with(provider, options))
        }

        #[cfg(feature = "config")]
        ProviderKind::Configuration { section } => {
            let mut provider =
                crate::backends::configuration::ConfigurationProvider::new(Arc::clone(settings));
            if let Some(section) = section {
                provider = provider.with_section(section);
            }
            Ok(builder.add_provider_with(provider, options))
        }

        #[cfg(feature = "hashicorp-vault")]
        ProviderKind::HashicorpVault {
            address,
            token,
            mount,
            key,
            namespace,
        } => {
            use crate::backends::hashicorp::{HashiCorpVaultProvider, HashiCorpVaultSettings};

            // SECRETARY_VAULT_* > config > the standard VAULT_* variables
            let address = required(
                get_env("VAULT_ADDR")
                    .or(address)
                    .or_else(|| env::var("VAULT_ADDR").ok()),
                "HashiCorp Vault address required. Set SECRETARY_VAULT_ADDR or address in config",
            )?;
            let token = required(
                get_env("VAULT_TOKEN")
                    .or(token)
                    .or_else(|| env::var("VAULT_TOKEN").ok()),
                "HashiCorp Vault token required. Set SECRETARY_VAULT_TOKEN or token in config",
            )?;

            let mut vault = HashiCorpVaultSettings::new(address, token)?;
            if let Some(mount) = get_env("VAULT_MOUNT").or(mount) {
                vault = vault.mount(mount);
            }
            if let Some(key) = key {
                vault = vault.key(key);
            }
            if let Some(namespace) = get_env("VAULT_NAMESPACE").or(namespace) {
                vault = vault.namespace(namespace);
            }

            Ok(builder.add_lazy_provider(
                move |_: &ProviderContext| {
                    let provider = HashiCorpVaultProvider::new(vault.clone())?;
                    Ok(Some(Arc::new(provider) as Arc<dyn crate::SecretProvider>))
                },
                options,
            ))
        }

        #[cfg(feature = "azure-key-vault")]
        ProviderKind::AzureKeyVault { vault_uri, token } => {
            use crate::backends::azure::{AzureKeyVaultProvider, StaticToken};

            let vault_uri = required(
                get_env("AZURE_VAULT_URI").or(vault_uri),
                "Azure Key Vault URI required. Set SECRETARY_AZURE_VAULT_URI or vault_uri in config",
            )?;
            let token = required(
                get_env("AZURE_TOKEN").or(token),
                "Azure Key Vault token required. Set SECRETARY_AZURE_TOKEN or token in config",
            )?;

            Ok(builder.add_lazy_provider(
                move |_: &ProviderContext| {
                    let provider = AzureKeyVaultProvider::new(
                        vault_uri.clone(),
                        Arc::new(StaticToken::new(token.clone())),
                    )?;
                    Ok(Some(Arc::new(provider) as Arc<dyn crate::SecretProvider>))
                },
                options,
            ))
        }

        #[allow(unreachable_patterns)]
        other => Err(SecretError::disabled(other.label())),
    }
}

/// A scalar setting addressed by a dotted key such as `database.password`
pub(crate) fn lookup_setting(table: &toml::Table, dotted_key: &str) -> Option<String> {
    let mut parts = dotted_key.split('.');
    let mut current = table.get(parts.next()?)?;
    for part in parts {
        current = current.as_table()?.get(part)?;
    }
    match current {
        toml::Value::String(s) => Some(s.clone()),
        toml::Value::Integer(i) => Some(i.to_string()),
        toml::Value::Float(f) => Some(f.to_string()),
        toml::Value::Boolean(b) => Some(b.to_string()),
        toml::Value::Datetime(d) => Some(d.to_string()),
        toml::Value::Array(_) | toml::Value::Table(_) => None,
    }
}
