//! End-to-end test utilities for the Secretary secret store
//!
//! This crate provides in-process provider doubles so the composite store can
//! be exercised without a real vault behind it.

pub mod failing_provider;
pub mod mock_provider;
pub mod versioned_provider;

pub use failing_provider::FailingProvider;
pub use mock_provider::MockSecretProvider;
pub use versioned_provider::VersionedMockProvider;
