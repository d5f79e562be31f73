//! HashiCorp Vault KV v2 backend
//!
//! A secret name maps onto a KV path below the configured mount; the value is
//! read from one field of the stored map.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use vaultrs::client::{VaultClient, VaultClientSettingsBuilder};
use vaultrs::error::ClientError;
use vaultrs::kv2;

use crate::error::SecretError;
use crate::provider::{Capabilities, SecretProvider, VersionedSecretProvider};
use crate::secret::Secret;

const BACKEND: &str = "hashicorp-vault";

/// Connection settings for [`HashiCorpVaultProvider`]
#[derive(Clone)]
pub struct HashiCorpVaultSettings {
    address: String,
    token: String,
    mount: String,
    key: String,
    namespace: Option<String>,
}

impl HashiCorpVaultSettings {
    pub const DEFAULT_MOUNT: &'static str = "secret";
    pub const DEFAULT_KEY: &'static str = "value";

    pub fn new(address: impl Into<String>, token: impl Into<String>) -> Result<Self, SecretError> {
        let address = address.into();
        let token = token.into();
        if address.trim().is_empty() {
            return Err(SecretError::InvalidArgument(
                "HashiCorp Vault address must not be blank".to_string(),
            ));
        }
        if token.trim().is_empty() {
            return Err(SecretError::InvalidArgument(
                "HashiCorp Vault token must not be blank".to_string(),
            ));
        }
        Ok(Self {
            address,
            token,
            mount: Self::DEFAULT_MOUNT.to_string(),
            key: Self::DEFAULT_KEY.to_string(),
            namespace: None,
        })
    }

    /// KV v2 engine mount point
    pub fn mount(mut self, mount: impl Into<String>) -> Self {
        self.mount = mount.into();
        self
    }

    /// Field of the stored map holding the secret value
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

impl std::fmt::Debug for HashiCorpVaultSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashiCorpVaultSettings")
            .field("address", &self.address)
            .field("token", &"<redacted>")
            .field("mount", &self.mount)
            .field("key", &self.key)
            .field("namespace", &self.namespace)
            .finish()
    }
}

/// Reads secrets from a HashiCorp Vault KV v2 engine
pub struct HashiCorpVaultProvider {
    client: VaultClient,
    settings: HashiCorpVaultSettings,
}

impl HashiCorpVaultProvider {
    pub fn new(settings: HashiCorpVaultSettings) -> Result<Self, SecretError> {
        let mut builder = VaultClientSettingsBuilder::default();
        builder.address(&settings.address);
        builder.token(&settings.token);
        if let Some(namespace) = &settings.namespace {
            builder.namespace(Some(namespace.clone()));
        }

        let client_settings = builder
            .build()
            .map_err(|e| SecretError::InvalidArgument(format!("invalid Vault settings: {}", e)))?;
        let client = VaultClient::new(client_settings)
            .map_err(|e| SecretError::backend(BACKEND, e.to_string()))?;

        tracing::debug!(
            address = %settings.address,
            mount = %settings.mount,
            "Created HashiCorp Vault client"
        );
        Ok(Self { client, settings })
    }

    fn value_of(&self, name: &str, data: &Value) -> Result<Option<String>, SecretError> {
        match data.get(&self.settings.key) {
            Some(Value::String(value)) => Ok(Some(value.clone())),
            Some(_) => Err(SecretError::backend(
                BACKEND,
                format!(
                    "field '{}' of secret '{}' is not a string",
                    self.settings.key, name
                ),
            )),
            None => {
                tracing::trace!(
                    secret = name,
                    key = %self.settings.key,
                    "Vault secret has no such field"
                );
                Ok(None)
            }
        }
    }

    /// Versions that can still be read, newest first
    async fn readable_versions(&self, name: &str) -> Result<Vec<u64>, SecretError> {
        let metadata = match kv2::read_metadata(&self.client, &self.settings.mount, name).await {
            Ok(metadata) => metadata,
            Err(e) => {
                classify::<()>(e, name)?;
                return Ok(Vec::new());
            }
        };

        Ok((1..=metadata.current_version)
            .rev()
            .filter(|version| {
                metadata
                    .versions
                    .get(&version.to_string())
                    .map(|v| !v.destroyed && v.deletion_time.is_empty())
                    .unwrap_or(false)
            })
            .collect())
    }
}

/// Map a Vault client error onto a lookup outcome
fn classify<T>(error: ClientError, name: &str) -> Result<Option<T>, SecretError> {
    match error {
        ClientError::APIError { code: 404, .. } => Ok(None),
        ClientError::APIError { code: 403, .. } => Err(SecretError::AccessDenied(format!(
            "Vault denied access to '{}'",
            name
        ))),
        other => Err(SecretError::backend(BACKEND, other.to_string())),
    }
}

#[async_trait]
impl SecretProvider for HashiCorpVaultProvider {
    async fn get_secret(&self, name: &str) -> Result<Option<Secret>, SecretError> {
        match kv2::read::<Value>(&self.client, &self.settings.mount, name).await {
            Ok(data) => Ok(self.value_of(name, &data)?.map(Secret::new)),
            Err(e) => classify(e, name),
        }
    }

    fn description(&self) -> Option<String> {
        Some(format!(
            "HashiCorp Vault {} ({})",
            self.settings.address, self.settings.mount
        ))
    }

    fn capabilities(self: Arc<Self>) -> Capabilities {
        Capabilities::default().with_versioned(self)
    }
}

#[async_trait]
impl VersionedSecretProvider for HashiCorpVaultProvider {
    async fn get_secret_versions(
        &self,
        name: &str,
        amount: usize,
    ) -> Result<Vec<Secret>, SecretError> {
        let mut secrets = Vec::new();
        for version in self.readable_versions(name).await? {
            if secrets.len() >= amount {
                break;
            }
            let data =
                match kv2::read_version::<Value>(&self.client, &self.settings.mount, name, version)
                    .await
                {
                    Ok(data) => data,
                    Err(e) => {
                        // Deleted between the metadata read and now
                        classify::<()>(e, name)?;
                        continue;
                    }
                };
            if let Some(value) = self.value_of(name, &data)? {
                secrets.push(Secret::versioned(value, version.to_string()));
            }
        }
        tracing::debug!(
            secret = name,
            found = secrets.len(),
            amount,
            "Read Vault secret versions"
        );
        Ok(secrets)
    }
}
