//! Provider double that always fails

use std::error::Error as StdError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use secretary_store::{
    Capabilities, Secret, SecretError, SecretProvider, SyncSecretProvider, VersionedSecretProvider,
};

type ErrorFactory = dyn Fn() -> SecretError + Send + Sync;

/// A provider whose every lookup fails with a fresh error
pub struct FailingProvider {
    make_error: Box<ErrorFactory>,
    calls: AtomicUsize,
    versioned: bool,
}

impl FailingProvider {
    /// Fail with a store error
    pub fn new<F>(make_error: F) -> Self
    where
        F: Fn() -> SecretError + Send + Sync + 'static,
    {
        Self {
            make_error: Box::new(make_error),
            calls: AtomicUsize::new(0),
            versioned: false,
        }
    }

    /// Fail with an arbitrary typed error, wrapped as a provider failure
    pub fn with_error<E, F>(make_error: F) -> Self
    where
        E: StdError + Send + Sync + 'static,
        F: Fn() -> E + Send + Sync + 'static,
    {
        Self::new(move || SecretError::provider(make_error()))
    }

    /// Also advertise (failing) versioned lookups
    pub fn versioned(mut self) -> Self {
        self.versioned = true;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail(&self) -> SecretError {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.make_error)()
    }
}

#[async_trait]
impl SecretProvider for FailingProvider {
    async fn get_secret(&self, _name: &str) -> Result<Option<Secret>, SecretError> {
        Err(self.fail())
    }

    fn description(&self) -> Option<String> {
        Some("failing mock".to_string())
    }

    fn capabilities(self: Arc<Self>) -> Capabilities {
        let capabilities = Capabilities::default().with_sync(self.clone());
        if self.versioned {
            capabilities.with_versioned(self)
        } else {
            capabilities
        }
    }
}

impl SyncSecretProvider for FailingProvider {
    fn get_secret_sync(&self, _name: &str) -> Result<Option<Secret>, SecretError> {
        Err(self.fail())
    }
}

#[async_trait]
impl VersionedSecretProvider for FailingProvider {
    async fn get_secret_versions(
        &self,
        _name: &str,
        _amount: usize,
    ) -> Result<Vec<Secret>, SecretError> {
        Err(self.fail())
    }
}
