//! Application configuration backend

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::lookup_setting;
use crate::error::SecretError;
use crate::provider::{Capabilities, SecretProvider, SyncSecretProvider};
use crate::secret::Secret;

/// Reads secrets from an in-memory TOML table
///
/// Secret names are dotted keys (`database.password`), optionally relative to
/// a section. Keys holding tables or arrays are misses.
#[derive(Debug, Clone)]
pub struct ConfigurationProvider {
    settings: Arc<toml::Table>,
    section: Option<String>,
}

impl ConfigurationProvider {
    pub fn new(settings: Arc<toml::Table>) -> Self {
        Self {
            settings,
            section: None,
        }
    }

    pub fn from_table(settings: toml::Table) -> Self {
        Self::new(Arc::new(settings))
    }

    /// Resolve names below `section` (itself a dotted key)
    pub fn with_section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(section.into());
        self
    }

    fn read(&self, name: &str) -> Option<Secret> {
        let key = match &self.section {
            Some(section) => format!("{}.{}", section, name),
            None => name.to_string(),
        };
        lookup_setting(&self.settings, &key).map(Secret::new)
    }
}

#[async_trait]
impl SecretProvider for ConfigurationProvider {
    async fn get_secret(&self, name: &str) -> Result<Option<Secret>, SecretError> {
        Ok(self.read(name))
    }

    fn description(&self) -> Option<String> {
        Some(match &self.section {
            Some(section) => format!("configuration [{}]", section),
            None => "configuration".to_string(),
        })
    }

    fn capabilities(self: Arc<Self>) -> Capabilities {
        Capabilities::default().with_sync(self)
    }
}

impl SyncSecretProvider for ConfigurationProvider {
    fn get_secret_sync(&self, name: &str) -> Result<Option<Secret>, SecretError> {
        Ok(self.read(name))
    }
}
