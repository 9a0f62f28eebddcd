//! Flagrelay - stream-relay proxy for feature flag services
//!
//! # Usage
//!
//! ```bash
//! # Run the relay
//! flagrelay run --config flagrelay.toml
//!
//! # Override the log level
//! flagrelay run --config flagrelay.toml --log-level debug
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use flagrelay::{RelayCore, RelayError, build_router};
use flagrelay_config::Config;

/// Stream-relay proxy for feature flag services
#[derive(Parser, Debug)]
#[command(name = "flagrelay")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (error if specified but not found)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the relay (default)
    Run,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref().unwrap_or("info"))?;

    match cli.command {
        Some(Command::Run) | None => run(cli.config).await,
    }
}

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("invalid log level")?;
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();
    Ok(())
}

async fn run(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environments = config.environments.len(),
        "flagrelay starting"
    );

    let core = RelayCore::with_defaults(config.clone()).context("failed to configure relay")?;

    match core.wait_for_all_clients(config.main.init_timeout).await {
        Ok(()) => info!("all environments initialized"),
        Err(RelayError::InitTimeout) => {
            warn!("timed out waiting for environments to initialize, continuing")
        }
        Err(RelayError::SomeEnvironmentsFailed) => {
            warn!("one or more environments failed to initialize, continuing")
        }
        Err(e) => {
            error!(error = %e, "initialization error");
            core.close().await;
            return Err(e.into());
        }
    }

    let bind_addr = format!("{}:{}", config.main.host, config.main.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    info!(address = %bind_addr, "listening");

    let app = build_router(Arc::clone(&core));
    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());

    let result = server.await;

    info!("shutting down");
    core.close().await;
    result.context("server error")
}

fn load_config(path: Option<PathBuf>) -> Result<Config> {
    match path {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("config file not found: {}", path.display());
            }
            Config::from_file(&path).context("failed to load configuration")
        }
        None => {
            for candidate in ["flagrelay.toml", "config/flagrelay.toml"] {
                let candidate = PathBuf::from(candidate);
                if candidate.exists() {
                    info!(config = %candidate.display(), "using config file");
                    return Config::from_file(&candidate).context("failed to load configuration");
                }
            }
            anyhow::bail!(
                "no configuration found; create flagrelay.toml with at least one environment"
            )
        }
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
