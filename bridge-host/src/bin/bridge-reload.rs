//! # bridge-reload
//!
//! Connect to a running script VM and force a hot reload of its sources.
//!
//! Endpoint resolution, highest priority first: `--endpoint`, the
//! `BRIDGE_RELOAD_ENDPOINT` environment variable, the `[reload]` section of
//! the config file.

use anyhow::{bail, Context, Result};
use bridge_host::config::BridgeConfig;
use bridge_reload::{is_valid_endpoint, ReloadSession};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// VM service WebSocket endpoint (e.g. ws://127.0.0.1:5858/ws)
    #[arg(short, long, value_name = "URL")]
    endpoint: Option<String>,

    /// Connection attempts before giving up
    #[arg(short, long, value_name = "COUNT")]
    attempts: Option<u32>,

    /// Delay between connection attempts
    #[arg(short, long, value_name = "MILLIS")]
    delay_ms: Option<u64>,

    /// Config file to read instead of the default location
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => BridgeConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => BridgeConfig::load_default().unwrap_or_default(),
    };

    let mut reload = config.reload.with_env_override();
    if let Some(endpoint) = cli.endpoint {
        reload.endpoint = endpoint;
    }
    if let Some(attempts) = cli.attempts {
        reload.max_attempts = attempts;
    }
    if let Some(delay_ms) = cli.delay_ms {
        reload.retry_delay_ms = delay_ms;
    }

    if !is_valid_endpoint(&reload.endpoint) {
        bail!("Invalid VM service endpoint: {}", reload.endpoint);
    }

    let mut session = ReloadSession::new(reload);
    if !session.connect_default().await {
        bail!(
            "Could not reach the VM service at {}",
            session.config().endpoint
        );
    }

    let report = session.reload().await?;
    session.disconnect();

    println!("{}", serde_json::to_string_pretty(&report)?);

    if !report.success {
        bail!("VM reported a failed reload");
    }
    info!("Reload complete");
    Ok(())
}
