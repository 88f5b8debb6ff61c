//! `gemhouse` command line: run the server, or act on a repository either
//! directly on disk (`--repo`) or through a running server (`--server`).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gemhouse::{
    config::StorageConfig, Config, PackageIdentity, RemoteRepository, Repository, RepositoryApi,
    SpecQuery,
};
use gemhouse_logging::{init_subscriber, LogSettings};
use std::path::PathBuf;
use tracing::debug;
use url::Url;

#[derive(Parser)]
#[command(name = "gemhouse")]
#[command(about = "Gem repository with local and remote backends")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Server URL for client operations (takes precedence over --repo)
    #[arg(long, global = true)]
    server: Option<Url>,

    /// Local repository directory for client operations
    #[arg(long, default_value = "./data", global = true)]
    repo: PathBuf,

    /// Configuration file
    #[arg(long, default_value = "gemhouse.json", global = true)]
    config: PathBuf,

    /// Log level (overrides GEMHOUSE_LOG_LEVEL)
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server over a local repository
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(long)]
        port: Option<u16>,

        /// Data directory for gem storage
        #[arg(long)]
        data: Option<PathBuf>,
    },

    /// Publish a <name>-<version>.gem file
    Push { file: PathBuf },

    /// Hide a gem from search and the source index
    Yank { name: String, version: String },

    /// Remove a gem entirely
    Delete { name: String, version: String },

    /// Search available gems by name
    Search {
        name: String,

        /// Exact version to match
        #[arg(long)]
        version: Option<String>,
    },

    /// Print the source index
    Index,
}

async fn open_repository(cli: &Cli, config: &Config) -> Result<Box<dyn RepositoryApi>> {
    match &cli.server {
        Some(server) => {
            debug!(server = %server, "Using remote repository");
            Ok(Box::new(RemoteRepository::new(server.clone(), &config.remote)?))
        }
        None => {
            debug!(repo = %cli.repo.display(), "Using local repository");
            let storage = StorageConfig {
                data_dir: cli.repo.clone(),
                ..config.storage.clone()
            };
            let repository = Repository::local(&storage)
                .await?
                .max_gem_size(config.max_gem_size_bytes())
                .build()
                .await?;
            Ok(Box::new(repository))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = LogSettings::from_env();
    if let Some(level) = &cli.log_level {
        settings = settings.with_level(level.clone());
    }
    let _log_guard = init_subscriber(&settings);

    let mut config = Config::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;

    if let Commands::Serve { host, port, data } = &cli.command {
        if let Some(host) = host {
            config.server.host = host.clone();
        }
        if let Some(port) = port {
            config.server.port = *port;
        }
        if let Some(data) = data {
            config.storage.data_dir = data.clone();
        }
        return gemhouse::run_server(&config).await;
    }

    let repository = open_repository(&cli, &config).await?;
    match &cli.command {
        Commands::Serve { .. } => Ok(()),

        Commands::Push { file } => {
            let record = repository
                .push(file)
                .await
                .with_context(|| format!("Failed to push {}", file.display()))?;
            println!("Pushed {} (sha256 {})", record.identity, record.sha256);
            Ok(())
        }

        Commands::Yank { name, version } => {
            let identity = PackageIdentity::new(name.as_str(), version.as_str())?;
            match repository.yank(&identity).await? {
                Some(uri) => println!("Yanked {identity}; gem remains at {uri}"),
                None => println!("No available gem {identity} to yank"),
            }
            Ok(())
        }

        Commands::Delete { name, version } => {
            let identity = PackageIdentity::new(name.as_str(), version.as_str())?;
            if repository.delete(&identity).await? {
                println!("Deleted {identity}");
            } else {
                println!("No gem {identity} to delete");
            }
            Ok(())
        }

        Commands::Search { name, version } => {
            let mut query = SpecQuery::name(name.as_str());
            if let Some(version) = version {
                query = query.version(version.as_str());
            }
            for spec in repository.search_for(&query).await? {
                let uri = repository.uri_for_gem(&spec.identity).await?;
                match uri {
                    Some(uri) => println!("{} {}", spec.identity, uri),
                    None => println!("{}", spec.identity),
                }
            }
            Ok(())
        }

        Commands::Index => {
            let index = repository.source_index().await?;
            println!("{}", serde_json::to_string_pretty(&index)?);
            Ok(())
        }
    }
}
