//! # feedsync
//!
//! CLI tool for running and inspecting feedsync pipelines.
//!
//! ## Commands
//!
//! - `watch`: Run the configured pipeline and print every published state
//! - `status`: Show the persisted snapshot
//! - `clear`: Delete the persisted snapshot
//!
//! ## Example
//!
//! ```bash
//! # Poll the configured endpoint until Ctrl-C
//! FEEDSYNC_CREDENTIAL=... feedsync --config feedsync.toml watch
//!
//! # Try it offline against canned responses
//! feedsync watch --mock --once
//!
//! # Inspect what was persisted
//! feedsync status
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::{clear, status, watch};
use config::Config;

/// Default configuration file, read from the working directory when present.
const DEFAULT_CONFIG_FILE: &str = "feedsync.toml";

/// CLI tool for running and inspecting feedsync pipelines.
#[derive(Parser, Debug)]
#[command(name = "feedsync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file (default: ./feedsync.toml if it exists)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Data directory for persisted snapshots
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Log at debug level (RUST_LOG takes precedence when set)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the pipeline and print every published state
    Watch {
        /// Credential for the endpoint
        #[arg(long, env = "FEEDSYNC_CREDENTIAL", hide_env_values = true)]
        credential: Option<String>,

        /// Serve canned responses instead of calling the network
        #[arg(long)]
        mock: bool,

        /// Stop after the first fetch result
        #[arg(long)]
        once: bool,
    },

    /// Show the persisted snapshot
    Status,

    /// Delete the persisted snapshot
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = load_config(cli.config.as_deref())?;

    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };

    match cli.command {
        Commands::Watch {
            credential,
            mock,
            once,
        } => {
            let options = watch::WatchOptions {
                credential,
                mock,
                once,
            };
            watch::run(&config, &data_dir, options).await?;
        }
        Commands::Status => {
            status::run(&config, &data_dir).await?;
        }
        Commands::Clear => {
            clear::run(&config, &data_dir).await?;
        }
    }

    Ok(())
}

/// Load the explicit config file, else `./feedsync.toml`, else defaults.
fn load_config(path: Option<&Path>) -> Result<Config> {
    if let Some(path) = path {
        return Config::from_file(path).context("Failed to load configuration");
    }

    let fallback = Path::new(DEFAULT_CONFIG_FILE);
    if fallback.exists() {
        tracing::info!("Loading configuration from {}", fallback.display());
        return Config::from_file(fallback).context("Failed to load configuration");
    }

    tracing::debug!("No configuration file, using defaults");
    Ok(Config::default())
}

/// Get the default data directory for feedsync.
fn default_data_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("io", "feedsync", "feedsync")
        .context("Could not determine home directory")?;
    Ok(dirs.data_dir().to_path_buf())
}
