//! Built-in secret providers

#[cfg(feature = "env")]
pub mod env;

#[cfg(feature = "config")]
pub mod configuration;

#[cfg(feature = "hashicorp-vault")]
pub mod hashicorp;

#[cfg(feature = "azure-key-vault")]
pub mod azure;
