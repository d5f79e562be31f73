//! In-memory provider double
//!
//! Holds a mutable map of secrets and records every lookup, so tests can
//! assert how often the store actually reached the backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use secretary_store::{Capabilities, Secret, SecretError, SecretProvider, SyncSecretProvider};

/// A provider backed by a mutable in-memory map
#[derive(Default)]
pub struct MockSecretProvider {
    secrets: RwLock<HashMap<String, String>>,
    /// Names requested, in call order
    requests: RwLock<Vec<String>>,
    calls: AtomicUsize,
    synchronous: bool,
}

impl MockSecretProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(self, name: &str, value: &str) -> Self {
        self.set_secret(name, value);
        self
    }

    /// Also answer synchronous lookups
    pub fn synchronous(mut self) -> Self {
        self.synchronous = true;
        self
    }

    pub fn set_secret(&self, name: &str, value: &str) {
        self.secrets
            .write()
            .insert(name.to_string(), value.to_string());
    }

    pub fn remove_secret(&self, name: &str) {
        self.secrets.write().remove(name);
    }

    /// Number of lookups that reached this provider
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requested_names(&self) -> Vec<String> {
        self.requests.read().clone()
    }

    fn lookup(&self, name: &str) -> Option<Secret> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.write().push(name.to_string());
        self.secrets.read().get(name).map(Secret::new)
    }
}

#[async_trait]
impl SecretProvider for MockSecretProvider {
    async fn get_secret(&self, name: &str) -> Result<Option<Secret>, SecretError> {
        tracing::trace!(secret = name, "Mock provider lookup");
        Ok(self.lookup(name))
    }

    fn description(&self) -> Option<String> {
        Some("in-memory mock".to_string())
    }

    fn capabilities(self: Arc<Self>) -> Capabilities {
        if self.synchronous {
            Capabilities::default().with_sync(self)
        } else {
            Capabilities::default()
        }
    }
}

impl SyncSecretProvider for MockSecretProvider {
    fn get_secret_sync(&self, name: &str) -> Result<Option<Secret>, SecretError> {
        Ok(self.lookup(name))
    }
}
