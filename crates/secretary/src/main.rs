use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use secretary_store::{ProviderEntry, Secret, SecretResolver};
use tracing_subscriber::EnvFilter;

mod config;

/// Secretary - look secrets up across several secret stores
#[derive(Parser, Debug)]
#[command(name = "secretary")]
#[command(about = "Resolve secrets from environment, configuration and vault backends")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Store configuration file (default: ~/.config/secretary/secretary.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Look a secret up, first provider with the secret wins
    Get {
        /// Secret name
        name: String,

        /// Bypass provider caches (only cache-enabled providers are consulted)
        #[arg(long)]
        ignore_cache: bool,

        /// Return up to N versions, most recent first
        #[arg(long, value_name = "N", conflicts_with = "ignore_cache")]
        versions: Option<usize>,

        /// Print the secret with its version and expiry as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the configured providers in lookup order
    Providers,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so secret values on stdout stay pipeable
    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(format!("secretary={}", level).parse()?)
                .add_directive(format!("secretary_store={}", level).parse()?),
        )
        .init();

    let path = config::resolve_path(cli.config.as_deref());
    let resolver = config::load_resolver(&path)?;

    match cli.command {
        Commands::Get {
            name,
            ignore_cache,
            versions,
            json,
        } => run_get(&resolver, &name, ignore_cache, versions, json).await,
        Commands::Providers => {
            run_providers(&resolver);
            Ok(())
        }
    }
}

async fn run_get(
    resolver: &SecretResolver,
    name: &str,
    ignore_cache: bool,
    versions: Option<usize>,
    json: bool,
) -> Result<()> {
    let secrets: Vec<Secret> = match versions {
        Some(amount) => resolver
            .get_secret_versions(name, amount)
            .await
            .with_context(|| format!("Failed to resolve versions of '{}'", name))?,
        None if ignore_cache => vec![resolver
            .get_secret_with_cache(name, true)
            .await
            .with_context(|| format!("Failed to resolve '{}'", name))?],
        None => vec![resolver
            .get_secret(name)
            .await
            .with_context(|| format!("Failed to resolve '{}'", name))?],
    };

    if json {
        let output = match (versions, secrets.as_slice()) {
            (None, [secret]) => serde_json::to_string_pretty(secret)?,
            _ => serde_json::to_string_pretty(&secrets)?,
        };
        println!("{}", output);
    } else {
        for secret in &secrets {
            println!("{}", secret.value());
        }
    }
    Ok(())
}

fn run_providers(resolver: &SecretResolver) {
    for (position, entry) in resolver.entries().iter().enumerate() {
        println!(
            "{:>2}  {:<16} {}",
            position,
            entry.name().unwrap_or("-"),
            describe(entry)
        );
    }
}

fn describe(entry: &ProviderEntry) -> String {
    let Some(handle) = entry.created_handle() else {
        return "(created on first use)".to_string();
    };

    let mut capabilities = Vec::new();
    if handle.sync().is_some() {
        capabilities.push("sync");
    }
    if handle.cached().is_some() {
        capabilities.push("cached");
    }
    if handle.versioned().is_some() {
        capabilities.push("versioned");
    }

    let description = handle
        .description()
        .unwrap_or_else(|| "custom provider".to_string());
    if capabilities.is_empty() {
        description
    } else {
        format!("{} [{}]", description, capabilities.join(", "))
    }
}
