//! Environment variable backend

use std::env::{self, VarError};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::SecretError;
use crate::provider::{Capabilities, SecretProvider, SyncSecretProvider};
use crate::secret::Secret;

/// Reads secrets from process environment variables
///
/// An unset variable is a miss.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentProvider {
    prefix: Option<String>,
}

impl EnvironmentProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up `<prefix><name>` instead of `<name>`
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
        }
    }

    fn variable(&self, name: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}{}", prefix, name),
            None => name.to_string(),
        }
    }

    fn read(&self, name: &str) -> Result<Option<Secret>, SecretError> {
        let variable = self.variable(name);
        match env::var(&variable) {
            Ok(value) => Ok(Some(Secret::new(value))),
            Err(VarError::NotPresent) => Ok(None),
            Err(VarError::NotUnicode(_)) => Err(SecretError::backend(
                "environment",
                format!("variable {} is not valid unicode", variable),
            )),
        }
    }
}

#[async_trait]
impl SecretProvider for EnvironmentProvider {
    async fn get_secret(&self, name: &str) -> Result<Option<Secret>, SecretError> {
        self.read(name)
    }

    fn description(&self) -> Option<String> {
        Some(match &self.prefix {
            Some(prefix) => format!("environment variables ({}*)", prefix),
            None => "environment variables".to_string(),
        })
    }

    fn capabilities(self: Arc<Self>) -> Capabilities {
        Capabilities::default().with_sync(self)
    }
}

impl SyncSecretProvider for EnvironmentProvider {
    fn get_secret_sync(&self, name: &str) -> Result<Option<Secret>, SecretError> {
        self.read(name)
    }
}
