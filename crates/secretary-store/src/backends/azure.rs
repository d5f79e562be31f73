//! Azure Key Vault backend (REST API)

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::SecretError;
use crate::provider::{Capabilities, SecretProvider, VersionedSecretProvider};
use crate::secret::Secret;

const BACKEND: &str = "azure-key-vault";
const API_VERSION: &str = "7.4";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Source of bearer tokens for Key Vault requests
#[async_trait]
pub trait TokenCredential: Send + Sync {
    async fn token(&self) -> Result<String, SecretError>;
}

/// A fixed, externally acquired access token
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenCredential for StaticToken {
    async fn token(&self) -> Result<String, SecretError> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Deserialize)]
struct SecretBundle {
    value: String,
    id: String,
    #[serde(default)]
    attributes: Attributes,
}

#[derive(Debug, Deserialize)]
struct Attributes {
    #[serde(default = "enabled_by_default")]
    enabled: bool,
    /// Expiry, in seconds since the epoch
    exp: Option<i64>,
    /// Creation time, in seconds since the epoch
    created: Option<i64>,
}

fn enabled_by_default() -> bool {
    true
}

impl Default for Attributes {
    fn default() -> Self {
        Self {
            enabled: true,
            exp: None,
            created: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SecretItem {
    id: String,
    #[serde(default)]
    attributes: Attributes,
}

#[derive(Debug, Deserialize)]
struct SecretVersions {
    value: Vec<SecretItem>,
    #[serde(rename = "nextLink")]
    next_link: Option<String>,
}

/// Version identifier: the last segment of a secret id
fn version_of(id: &str) -> Option<&str> {
    id.trim_end_matches('/').rsplit('/').next().filter(|v| !v.is_empty())
}

/// Key Vault names: 1-127 ASCII letters, digits and dashes
fn validate_secret_name(name: &str) -> Result<(), SecretError> {
    let valid = !name.is_empty()
        && name.len() <= 127
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
    if valid {
        Ok(())
    } else {
        Err(SecretError::NotSupported(format!(
            "'{}' is not a valid Azure Key Vault secret name (only letters, digits and dashes)",
            name
        )))
    }
}

/// Reads secrets from an Azure Key Vault
pub struct AzureKeyVaultProvider {
    client: Client,
    vault_uri: String,
    credential: Arc<dyn TokenCredential>,
}

impl AzureKeyVaultProvider {
    pub fn new(
        vault_uri: impl Into<String>,
        credential: Arc<dyn TokenCredential>,
    ) -> Result<Self, SecretError> {
        let vault_uri = vault_uri.into().trim().trim_end_matches('/').to_string();
        if vault_uri.is_empty() {
            return Err(SecretError::InvalidArgument(
                "Azure Key Vault URI must not be blank".to_string(),
            ));
        }
        if !vault_uri.starts_with("https://") && !vault_uri.starts_with("http://") {
            return Err(SecretError::InvalidArgument(format!(
                "Azure Key Vault URI must be an http(s) URL: {}",
                vault_uri
            )));
        }

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SecretError::backend(BACKEND, e.to_string()))?;

        Ok(Self {
            client,
            vault_uri,
            credential,
        })
    }

    pub fn vault_uri(&self) -> &str {
        &self.vault_uri
    }

    /// GET a Key Vault resource; `None` when the vault answers 404
    async fn fetch<T: DeserializeOwned>(
        &self,
        url: &str,
        name: &str,
    ) -> Result<Option<T>, SecretError> {
        let token = self.credential.token().await?;
        let mut request = self.client.get(url).bearer_auth(token);
        // Continuation links already carry the API version
        if !url.contains("api-version=") {
            request = request.query(&[("api-version", API_VERSION)]);
        }
        let response = request
            .send()
            .await
            .map_err(|e| SecretError::backend(BACKEND, e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(SecretError::AccessDenied(
                format!("Key Vault {} denied access to '{}'", self.vault_uri, name),
            )),
            status if !status.is_success() => Err(SecretError::backend(
                BACKEND,
                format!("unexpected status {} reading '{}'", status, name),
            )),
            _ => response
                .json::<T>()
                .await
                .map(Some)
                .map_err(|e| SecretError::backend(BACKEND, e.to_string())),
        }
    }

    async fn secret(
        &self,
        name: &str,
        version: Option<&str>,
    ) -> Result<Option<Secret>, SecretError> {
        let url = match version {
            Some(version) => format!("{}/secrets/{}/{}", self.vault_uri, name, version),
            None => format!("{}/secrets/{}", self.vault_uri, name),
        };
        let Some(bundle) = self.fetch::<SecretBundle>(&url, name).await? else {
            return Ok(None);
        };
        Ok(Some(into_secret(bundle)))
    }
}

fn into_secret(bundle: SecretBundle) -> Secret {
    let secret = match version_of(&bundle.id) {
        Some(version) => Secret::versioned(bundle.value, version),
        None => Secret::new(bundle.value),
    };
    match bundle.attributes.exp.and_then(|exp| DateTime::from_timestamp(exp, 0)) {
        Some(expires_at) => secret.expiring_at(expires_at),
        None => secret,
    }
}

#[async_trait]
impl SecretProvider for AzureKeyVaultProvider {
    async fn get_secret(&self, name: &str) -> Result<Option<Secret>, SecretError> {
        validate_secret_name(name)?;
        self.secret(name, None).await
    }

    fn description(&self) -> Option<String> {
        Some(format!("Azure Key Vault {}", self.vault_uri))
    }

    fn capabilities(self: Arc<Self>) -> Capabilities {
        Capabilities::default().with_versioned(self)
    }
}

#[async_trait]
impl VersionedSecretProvider for AzureKeyVaultProvider {
    async fn get_secret_versions(
        &self,
        name: &str,
        amount: usize,
    ) -> Result<Vec<Secret>, SecretError> {
        validate_secret_name(name)?;

        let mut items = Vec::new();
        let mut next = Some(format!("{}/secrets/{}/versions", self.vault_uri, name));
        while let Some(url) = next {
            let Some(page) = self.fetch::<SecretVersions>(&url, name).await? else {
                return Ok(Vec::new());
            };
            items.extend(page.value.into_iter().filter(|item| item.attributes.enabled));
            next = page.next_link;
        }
        items.sort_by(|a, b| b.attributes.created.cmp(&a.attributes.created));

        let mut secrets = Vec::new();
        for item in items.iter().take(amount) {
            let Some(version) = version_of(&item.id) else {
                continue;
            };
            if let Some(secret) = self.secret(name, Some(version)).await? {
                secrets.push(secret);
            }
        }
        tracing::debug!(
            secret = name,
            found = secrets.len(),
            amount,
            "Read Key Vault secret versions"
        );
        Ok(secrets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uri_validated() {
        let credential: Arc<dyn TokenCredential> = Arc::new(StaticToken::new("t"));
        assert!(matches!(
            AzureKeyVaultProvider::new("  ", credential.clone()),
            Err(SecretError::InvalidArgument(_))
        ));
        assert!(matches!(
            AzureKeyVaultProvider::new("vault.azure.net", credential.clone()),
            Err(SecretError::InvalidArgument(_))
        ));
        let provider =
            AzureKeyVaultProvider::new("https://contoso.vault.azure.net/", credential).unwrap();
        assert_eq!(provider.vault_uri(), "https://contoso.vault.azure.net");
    }

    #[test]
    fn test_secret_name_rules() {
        assert!(validate_secret_name("db-password-1").is_ok());
        assert!(validate_secret_name("Arcus.Foo").unwrap_err().is_not_supported());
        assert!(validate_secret_name("").is_err());
    }

    #[test]
    fn test_bundle_conversion() {
        let bundle: SecretBundle = serde_json::from_value(serde_json::json!({
            "value": "hunter2",
            "id": "https://contoso.vault.azure.net/secrets/db/4f2a9c",
            "attributes": { "enabled": true, "exp": 1893456000 }
        }))
        .unwrap();

        let secret = into_secret(bundle);
        assert_eq!(secret.value(), "hunter2");
        assert_eq!(secret.version(), Some("4f2a9c"));
        assert_eq!(secret.expires_at().unwrap().timestamp(), 1893456000);
    }

    #[test]
    fn test_versions_page_parsing() {
        let page: SecretVersions = serde_json::from_value(serde_json::json!({
            "value": [
                { "id": "https://v/secrets/db/aaa", "attributes": { "enabled": false, "created": 1 } },
                { "id": "https://v/secrets/db/bbb", "attributes": { "enabled": true, "created": 2 } }
            ],
            "nextLink": null
        }))
        .unwrap();
        assert_eq!(page.value.len(), 2);
        assert!(!page.value[0].attributes.enabled);
        assert_eq!(version_of(&page.value[1].id), Some("bbb"));
        assert!(page.next_link.is_none());
    }
}
