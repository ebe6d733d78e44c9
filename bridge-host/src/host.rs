//! Reference host loop.
//!
//! Stands in for the engine side of the bridge:
//! - Dispatches `ServerStarting` on start and `ServerStopping` on shutdown
//! - Seals the host object registry once the startup window has passed,
//!   then dispatches `ServerStarted`
//! - Dispatches a `Tick` event on a fixed interval
//! - Turns SIGHUP into an in-process script reload
//!
//! Background tasks stop when the shutdown broadcast is dropped.

use crate::config::HostConfig;
use bridge_core::{BridgeContext, HostEvent, MemoryHostRegistry};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, info};

/// Drives host-side events into a [`BridgeContext`].
pub struct HostLoop {
    context: BridgeContext,
    registry: Arc<MemoryHostRegistry>,
    config: HostConfig,
    ticks: Arc<AtomicU64>,
    shutdown_tx: Option<broadcast::Sender<()>>,
    tasks: Vec<JoinHandle<()>>,
}

impl HostLoop {
    pub fn new(
        context: BridgeContext,
        registry: Arc<MemoryHostRegistry>,
        config: HostConfig,
    ) -> Self {
        Self {
            context,
            registry,
            config,
            ticks: Arc::new(AtomicU64::new(0)),
            shutdown_tx: None,
            tasks: Vec::new(),
        }
    }

    /// Spawn the seal and tick tasks. Must be called inside a tokio runtime.
    pub fn start(&mut self) {
        if self.shutdown_tx.is_some() {
            return;
        }
        info!(
            "Starting host loop (tick every {:?}, registry seals after {:?})",
            self.config.tick_interval(),
            self.config.startup_window()
        );

        self.context.dispatch(HostEvent::ServerStarting);

        let (shutdown_tx, _shutdown_rx) = broadcast::channel::<()>(1);
        self.tasks.push(self.spawn_seal_task(shutdown_tx.subscribe()));
        self.tasks.push(self.spawn_tick_task(shutdown_tx.subscribe()));
        self.shutdown_tx = Some(shutdown_tx);
    }

    fn spawn_seal_task(&self, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        let context = self.context.clone();
        let registry = Arc::clone(&self.registry);
        let window = self.config.startup_window();

        tokio::spawn(async move {
            tokio::select! {
                _ = sleep(window) => {
                    if registry.seal() {
                        context.dispatch(HostEvent::ServerStarted);
                    }
                }
                _ = shutdown_rx.recv() => {
                    debug!("Seal task cancelled before startup window elapsed");
                }
            }
        })
    }

    fn spawn_tick_task(&self, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        let context = self.context.clone();
        let ticks = Arc::clone(&self.ticks);
        let period = self.config.tick_interval();

        tokio::spawn(async move {
            let mut tick_interval = interval(period);
            tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = tick_interval.tick() => {
                        let tick = ticks.fetch_add(1, Ordering::SeqCst) + 1;
                        context.dispatch(HostEvent::Tick { tick });
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }

            info!("Tick task stopped after {} ticks", ticks.load(Ordering::SeqCst));
        })
    }

    /// Ticks dispatched so far.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    pub fn context(&self) -> &BridgeContext {
        &self.context
    }

    /// Stop background tasks and wait for them to exit.
    ///
    /// Handlers see `ServerStopping` while the tick task is still running.
    pub async fn shutdown(&mut self) {
        info!("Shutting down host loop");

        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            self.context.dispatch(HostEvent::ServerStopping);
            drop(shutdown_tx);
        }
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
        self.context.shutdown();
    }
}

/// Create a reload channel fed by SIGHUP.
///
/// The value is the number of reload requests received so far.
#[cfg(unix)]
pub fn setup_reload_signal() -> watch::Receiver<u64> {
    let (reload_tx, reload_rx) = watch::channel(0u64);

    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sighup = match signal(SignalKind::hangup()) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("Failed to register SIGHUP handler: {}", e);
                return;
            }
        };

        while sighup.recv().await.is_some() {
            info!("Received SIGHUP, requesting script reload");
            reload_tx.send_modify(|requests| *requests += 1);
            if reload_tx.is_closed() {
                break;
            }
        }
    });

    reload_rx
}

/// Create a reload channel (non-Unix platforms have no SIGHUP).
#[cfg(not(unix))]
pub fn setup_reload_signal() -> watch::Receiver<u64> {
    // The sender is dropped, so the receiver reports closed on first poll.
    let (_reload_tx, reload_rx) = watch::channel(0u64);
    tracing::warn!("SIGHUP reload not supported on this platform");
    reload_rx
}
