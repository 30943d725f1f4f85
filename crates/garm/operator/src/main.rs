//! GARM Operator - declarative runner pools for a GARM server
//!
//! The operator provides:
//! - Pool reconciliation (create, adopt, update, delete backend pools)
//! - Idle runner eviction down to each pool's declared floor
//! - Runner mirrors refreshed by periodic polling

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod error;
mod manifest;
mod operator;

use config::OperatorConfig;
use operator::{shutdown_signal, Operator};

/// GARM Operator CLI
#[derive(Parser)]
#[command(name = "garm-operator")]
#[command(about = "GARM Operator - reconciles declared runner pools", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "GARM_OPERATOR_CONFIG")]
    config: Option<String>,

    /// GARM server URL
    #[arg(long, env = "GARM_SERVER_URL")]
    garm_url: Option<String>,

    /// Manifest files or directories to load, repeatable
    #[arg(short, long)]
    manifests: Vec<String>,

    /// Log level
    #[arg(long, env = "GARM_OPERATOR_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "GARM_OPERATOR_LOG_JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config =
        OperatorConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    // Override with CLI args
    if let Some(url) = cli.garm_url {
        config.garm.server_url = url;
    }
    if !cli.manifests.is_empty() {
        config.operator.manifests = cli.manifests;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    config.logging.json |= cli.json;

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    config.validate()?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        garm = %config.garm.server_url,
        manifests = config.operator.manifests.len(),
        "Starting GARM operator"
    );

    let operator = Operator::new(config)
        .await
        .context("failed to start operator")?;

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    operator.run(cancel).await?;
    Ok(())
}
