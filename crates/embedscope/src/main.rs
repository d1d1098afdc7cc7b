//! embedscope: Prompt embedding visualiser
//!
//! Reads every stored prompt embedding, projects the set onto its first two
//! principal components and saves a labelled scatter plot.

mod config;
mod preview;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use config::Config;
use embedscope_core::{MIN_SAMPLES, Outcome, PgEmbeddingSource};

/// Plot stored prompt embeddings as a labelled 2D PCA scatter
#[derive(Parser)]
#[command(name = "embedscope")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to embedscope.toml (default: search current and parent directories)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// PostgreSQL connection string
    #[arg(long, global = true, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    /// Output image path
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Do not open the saved image
    #[arg(long, global = true)]
    no_preview: bool,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, reduce and plot the embeddings (default)
    Render,

    /// Write a default embedscope.toml in the current directory
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },
}

/// Initialize logging to stderr, plus an optional log file.
fn init_logging(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let file_layer = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;

            let (non_blocking, guard) = tracing_appender::non_blocking(file);

            // Dropping the guard would stop the writer thread
            static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
                std::sync::OnceLock::new();
            let _ = GUARD.set(guard);

            Some(fmt::layer().with_writer(non_blocking).with_ansi(false))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    Ok(())
}

/// Load config from an explicit file or auto-discover `embedscope.toml`.
fn load_config(override_path: Option<&PathBuf>) -> Result<Config> {
    if let Some(path) = override_path {
        let config_file = if path.is_dir() {
            path.join(config::CONFIG_FILE)
        } else {
            path.clone()
        };
        let config = Config::from_file(&config_file)?;
        info!("Loaded config from {}", config_file.display());
        return Ok(config);
    }

    match Config::find_and_load() {
        Ok(Some((config, path))) => {
            info!("Found config at {}", path.display());
            Ok(config)
        }
        Ok(None) => {
            tracing::debug!("No {} found, using defaults", config::CONFIG_FILE);
            Ok(Config::default())
        }
        Err(e) => {
            tracing::warn!("Error searching for config: {}, using defaults", e);
            Ok(Config::default())
        }
    }
}

/// Layer command-line and environment settings over the file config.
fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(url) = &cli.database_url {
        config.database.url = url.clone();
    }
    if let Some(output) = &cli.output {
        config.output.path = output.clone();
    }
    if cli.no_preview {
        config.output.preview = false;
    }
}

async fn run_render(cli: &Cli) -> Result<()> {
    let mut config = load_config(cli.config.as_ref())?;
    apply_overrides(&mut config, cli);

    let errors = config.validate();
    if !errors.is_empty() {
        for e in &errors {
            error!("{}", e);
        }
        anyhow::bail!("Invalid configuration ({} problems)", errors.len());
    }

    let mut source =
        PgEmbeddingSource::new(&config.database.url).context("Invalid database URL")?;
    let options = config.pipeline_options();

    match embedscope_core::run(&mut source, &options).await? {
        Outcome::InsufficientData { found } => {
            info!(found, required = MIN_SAMPLES, "Nothing to plot");
            println!("Need at least {} embeddings to visualize", MIN_SAMPLES);
        }
        Outcome::Saved {
            path,
            samples,
            dimensions,
            explained_variance_ratio,
        } => {
            info!(
                samples,
                dimensions,
                pc1 = explained_variance_ratio[0],
                pc2 = explained_variance_ratio[1],
                "Projection complete"
            );
            println!("Saved to {}", path.display());
            if config.output.preview {
                preview::open(&path);
            }
        }
    }

    Ok(())
}

fn run_init(force: bool) -> Result<()> {
    let config_path = PathBuf::from(config::CONFIG_FILE);

    if config_path.exists() && !force {
        anyhow::bail!(
            "{} already exists. Use --force to overwrite.",
            config::CONFIG_FILE
        );
    }

    std::fs::write(&config_path, config::DEFAULT_CONFIG)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;
    println!("Created {}", config_path.display());
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_file.as_deref())?;

    match &cli.command {
        Some(Commands::Init { force }) => run_init(*force),
        Some(Commands::Render) | None => run_render(&cli).await,
    }
}
