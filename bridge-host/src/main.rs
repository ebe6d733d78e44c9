//! # bridge-host
//!
//! Reference host process.
//!
//! - Builds the bridge context over an in-memory host registry
//! - Starts the script runtime and installs the demo script
//! - Ticks the dispatch table and seals the registry after startup
//! - Reinstalls script handlers on SIGHUP
//!
//! ## Running
//!
//! ```bash
//! cargo run --bin bridge-host
//!
//! # With debug logging
//! RUST_LOG=debug cargo run --bin bridge-host
//!
//! # Trigger a script reload
//! kill -HUP <pid>
//! ```

use anyhow::Result;
use bridge_core::{BridgeContext, MemoryHostRegistry};
use bridge_host::config::BridgeConfig;
use bridge_host::host::{setup_reload_signal, HostLoop};
use bridge_host::runtime::ScriptRuntime;
use bridge_host::script;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let config = BridgeConfig::load_default();

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = config
            .as_ref()
            .map(|c| c.host.log_level.clone())
            .unwrap_or_else(|_| "info".to_string());
        EnvFilter::new(level)
    });
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!("Starting bridge-host v{}", env!("CARGO_PKG_VERSION"));

    let config = match config {
        Ok(cfg) => {
            info!("Loaded configuration from default path");
            cfg
        }
        Err(e) => {
            info!("Failed to load config, using defaults: {}", e);
            BridgeConfig::default()
        }
    };

    let host_registry = Arc::new(MemoryHostRegistry::new());
    let (context, inbox) = BridgeContext::new(host_registry.clone());

    let script_ctx = context.clone();
    let mut runtime = ScriptRuntime::spawn("script", inbox, move |relay| {
        script::attach_listeners(relay);
        if let Err(e) = script::install_handlers(&script_ctx) {
            error!("Demo script failed to install: {}", e);
        }
    })?;

    let mut host = HostLoop::new(context.clone(), host_registry, config.host.clone());
    host.start();

    let mut reload_rx = setup_reload_signal();
    let mut reload_open = true;

    info!("Host running. Press Ctrl+C to exit, send SIGHUP to reload scripts.");

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!("Failed to listen for Ctrl+C: {}", e);
                }
                info!("Received shutdown signal");
                break;
            }
            changed = reload_rx.changed(), if reload_open => {
                if changed.is_err() {
                    reload_open = false;
                    continue;
                }
                let generation = context.prepare_reload();
                let ctx = context.clone();
                let queued = runtime.submit(move |_| {
                    if let Err(e) = script::install_handlers(&ctx) {
                        error!("Script reload failed: {}", e);
                    }
                });
                if queued {
                    info!(generation, "Script reload queued");
                } else {
                    error!("Script runtime is not running, reload dropped");
                }
            }
        }
    }

    host.shutdown().await;
    runtime.shutdown();
    info!("Shutdown complete");

    Ok(())
}
