//! Locating and loading the store configuration
//!
//! The configuration file is resolved in this order (first found wins):
//! 1. `--config <PATH>`
//! 2. SECRETARY_CONFIG environment variable
//! 3. `~/.config/secretary/secretary.toml`

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use secretary_store::{SecretResolver, StoreConfig};

/// Get the default config directory path
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("secretary")
}

/// Get the default config file path
pub fn default_path() -> PathBuf {
    config_dir().join("secretary.toml")
}

/// Resolve the configuration path from the command line, env, or default
pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
    cli_path
        .map(str::to_string)
        .or_else(|| env::var("SECRETARY_CONFIG").ok())
        .map(|path| PathBuf::from(shellexpand::tilde(&path).into_owned()))
        .unwrap_or_else(default_path)
}

/// Load the configuration file and build the store it describes
pub fn load_resolver(path: &Path) -> Result<SecretResolver> {
    if !path.exists() {
        anyhow::bail!(
            "No store configuration at {}. Use --config or set SECRETARY_CONFIG",
            path.display()
        );
    }

    let config = StoreConfig::load(path)
        .with_context(|| format!("Failed to load {}", path.display()))?;
    let resolver = config
        .into_builder()
        .and_then(|builder| builder.build())
        .with_context(|| format!("Invalid store configuration in {}", path.display()))?;

    tracing::debug!(providers = resolver.entries().len(), "Secret store ready");
    Ok(resolver)
}
