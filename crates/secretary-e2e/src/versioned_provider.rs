//! Provider double keeping a version history per secret

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use secretary_store::{
    Capabilities, Secret, SecretError, SecretProvider, VersionedSecretProvider,
};

/// A provider where every secret has numbered versions, `1` being the oldest
#[derive(Default)]
pub struct VersionedMockProvider {
    history: RwLock<HashMap<String, Vec<String>>>,
    version_calls: AtomicUsize,
}

impl VersionedMockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Values from oldest to newest
    pub fn with_versions(self, name: &str, values: &[&str]) -> Self {
        self.history.write().insert(
            name.to_string(),
            values.iter().map(|v| v.to_string()).collect(),
        );
        self
    }

    /// Add a new current version
    pub fn rotate(&self, name: &str, value: &str) {
        self.history
            .write()
            .entry(name.to_string())
            .or_default()
            .push(value.to_string());
    }

    /// Number of version listings served
    pub fn version_calls(&self) -> usize {
        self.version_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SecretProvider for VersionedMockProvider {
    async fn get_secret(&self, name: &str) -> Result<Option<Secret>, SecretError> {
        let history = self.history.read();
        Ok(history.get(name).and_then(|values| {
            values
                .last()
                .map(|value| Secret::versioned(value.clone(), values.len().to_string()))
        }))
    }

    fn capabilities(self: Arc<Self>) -> Capabilities {
        Capabilities::default().with_versioned(self)
    }
}

#[async_trait]
impl VersionedSecretProvider for VersionedMockProvider {
    async fn get_secret_versions(
        &self,
        name: &str,
        amount: usize,
    ) -> Result<Vec<Secret>, SecretError> {
        self.version_calls.fetch_add(1, Ordering::SeqCst);
        let history = self.history.read();
        let Some(values) = history.get(name) else {
            return Ok(Vec::new());
        };
        Ok(values
            .iter()
            .enumerate()
            .rev()
            .take(amount)
            .map(|(index, value)| Secret::versioned(value.clone(), (index + 1).to_string()))
            .collect())
    }
}
