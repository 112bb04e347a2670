//! # starlog CLI
//!
//! ## Usage
//!
//! ```bash
//! starlog --config ./config/starlog.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `starlog init` | Create the SQLite database and run schema migrations |
//! | `starlog sync` | Synchronize the starred-repository catalog once |
//! | `starlog repos` | List stored repositories |
//! | `starlog serve` | Start the HTTP server |
//!
//! Logging goes to stderr; set `RUST_LOG` (e.g. `RUST_LOG=starlog=debug`)
//! to adjust verbosity.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use starlog::{config, migrate, server};

/// starlog: starred-repository catalog sync and visit analytics.
#[derive(Parser)]
#[command(name = "starlog", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/starlog.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent; running it multiple times is safe.
    Init,

    /// Synchronize the repository catalog with GitHub once and print a summary.
    Sync,

    /// List repositories in the local catalog.
    Repos,

    /// Start the HTTP server.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Sync => {
            let services = server::Services::from_config(&cfg).await?;
            let outcome = services.synchronizer.synchronize().await?;
            println!("sync github:{}", cfg.catalog.username);
            println!("  repositories: {}", outcome.items.len());
            println!("  change detected: {}", outcome.change_detected);
            if !outcome.failed.is_empty() {
                println!("  failed: {:?}", outcome.failed);
            }
            println!("ok");
        }
        Commands::Repos => {
            let services = server::Services::from_config(&cfg).await?;
            let repos = services.store.list_repositories().await?;
            for repo in &repos {
                println!("{:<12} {:<40} {}", repo.external_id, repo.name, repo.url);
            }
            println!("{} repositories", repos.len());
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
