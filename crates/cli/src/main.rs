//! Command-line front end for granary.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use granary_core::Config;
use granary_metadata::repos::RegistryRepo;
use granary_metadata::SqliteStore;
use granary_sync::{synchronise_all_with, SyncOptions, TaskContext};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

/// Granary - registry crawler and package cache
#[derive(Parser)]
#[command(name = "granary")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(
        short,
        long,
        env = "GRANARY_CONFIG",
        default_value = "granary.toml",
        global = true
    )]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct DbArgs {
    /// The SQLite database to use (overrides the config file)
    #[arg(long)]
    db: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch all package versions from all known registries
    Sync {
        #[command(flatten)]
        db: DbArgs,
    },
    /// Manipulate registries in the database
    Registry {
        #[command(subcommand)]
        command: RegistryCommands,
    },
}

#[derive(Subcommand)]
enum RegistryCommands {
    /// Add a registry to the database
    Add {
        /// The URL for the registry's GraphQL endpoint
        #[arg(short, long)]
        endpoint: String,

        /// The API token to use when querying this registry
        #[arg(short, long, default_value = "")]
        token: String,

        #[command(flatten)]
        db: DbArgs,
    },
    /// List all known registries
    List {
        /// The output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,

        #[command(flatten)]
        db: DbArgs,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Serialize)]
struct RegistryInfo {
    id: i64,
    endpoint: String,
    token: String,
    #[serde(rename = "owner-count")]
    owner_count: i64,
    #[serde(rename = "package-count")]
    package_count: i64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Sync { db } => sync(&config, &db).await,
        Commands::Registry { command } => match command {
            RegistryCommands::Add { endpoint, token, db } => {
                registry_add(&config, &db, &endpoint, &token).await
            }
            RegistryCommands::List { format, db } => registry_list(&config, &db, format).await,
        },
    }
}

/// Defaults, overlaid by the config file (when present), overlaid by
/// `GRANARY_`-prefixed environment variables.
fn load_config(path: &std::path::Path) -> Result<Config> {
    Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("GRANARY_").split("__"))
        .extract()
        .with_context(|| format!("unable to load the configuration from {}", path.display()))
}

async fn open_store(config: &Config, db: &DbArgs) -> Result<Arc<SqliteStore>> {
    let path = db.db.clone().unwrap_or_else(|| config.database.path.clone());
    let store = SqliteStore::open(&path)
        .await
        .with_context(|| format!("unable to open {}", path.display()))?;
    tracing::debug!(path = %path.display(), "Opened database");
    Ok(Arc::new(store))
}

async fn sync(config: &Config, db: &DbArgs) -> Result<()> {
    let store = open_store(config, db).await?;
    let ctx = TaskContext::new().with_database(store);

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupted; cancelling the sync");
                cancel.cancel();
            }
        }
    });

    let options = SyncOptions {
        download_concurrency: config.sync.download_concurrency(),
    };
    synchronise_all_with(&ctx, &cancel, &reqwest::Client::new(), options)
        .await
        .context("sync failed")
}

async fn registry_add(config: &Config, db: &DbArgs, endpoint: &str, token: &str) -> Result<()> {
    let endpoint: Url = endpoint
        .parse()
        .with_context(|| format!("{endpoint:?} is not a valid URL"))?;

    let store = open_store(config, db).await?;
    let registry = store
        .create_registry(endpoint.as_str(), token)
        .await
        .context("unable to save the registry")?;

    tracing::info!(id = registry.id, endpoint = %registry.endpoint, "Added");
    Ok(())
}

async fn registry_list(config: &Config, db: &DbArgs, format: OutputFormat) -> Result<()> {
    let store = open_store(config, db).await?;

    let mut results = Vec::new();
    for registry in store
        .list_registries()
        .await
        .context("unable to read the registries")?
    {
        let stats = store
            .registry_stats(registry.id)
            .await
            .with_context(|| format!("unable to load info for {}", registry.endpoint))?;
        results.push(RegistryInfo {
            id: registry.id,
            endpoint: registry.endpoint,
            token: registry.token,
            owner_count: stats.owner_count,
            package_count: stats.package_count,
        });
    }

    match format {
        OutputFormat::Text => {
            for info in &results {
                println!(
                    "[{}] {} (owners: {}, packages: {})",
                    info.id, info.endpoint, info.owner_count, info.package_count
                );
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_missing_config_file_yields_defaults() {
        let missing = PathBuf::from("/definitely/not/here/granary.toml");
        let config = load_config(&missing).unwrap();
        assert_eq!(config.database.path, PathBuf::from("granary.sqlite3"));
    }

    #[test]
    fn config_files_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("granary.toml");
        std::fs::write(&path, "[database]\npath = \"elsewhere.sqlite3\"\n").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.database.path, PathBuf::from("elsewhere.sqlite3"));
    }
}
