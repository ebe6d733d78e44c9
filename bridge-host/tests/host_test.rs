//! End-to-end tests for the reference host.
//!
//! These run the demo script on a real script runtime and drive it the way
//! `bridge-host` does: relay events from host threads, dispatch from the
//! tick loop, and a reload submitted while the host is running.

use bridge_core::{
    BlockPos, BridgeContext, Hand, HostEvent, HostRegistry, InteractionResult, MemoryHostRegistry,
    PlayerId, ProxyTarget, ResourceKey, Response, Slot, WorldId,
};
use bridge_host::config::HostConfig;
use bridge_host::host::HostLoop;
use bridge_host::runtime::ScriptRuntime;
use bridge_host::script::{self, DEMO_BLOCK, DEMO_NAMESPACE};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn demo_key() -> ResourceKey {
    ResourceKey::new(DEMO_NAMESPACE, DEMO_BLOCK).unwrap()
}

fn use_demo(ctx: &BridgeContext) -> Response {
    let block = ctx.registry().find_by_key(&demo_key()).unwrap();
    ctx.dispatch(HostEvent::ProxyBlockUse {
        target: ProxyTarget {
            handler: block.id(),
            world: WorldId(0),
            pos: BlockPos::new(0, 64, 0),
        },
        player: PlayerId(7),
        hand: Hand::Off,
    })
}

#[test]
fn test_script_installs_on_runtime_thread() {
    let host = Arc::new(MemoryHostRegistry::new());
    let (ctx, inbox) = BridgeContext::new(host.clone());

    let script_ctx = ctx.clone();
    let mut runtime = ScriptRuntime::spawn("script", inbox, move |relay| {
        script::attach_listeners(relay);
        script::install_handlers(&script_ctx).unwrap();
    })
    .unwrap();

    // spawn returns after init, so the block exists already
    assert_eq!(host.len(), 1);
    assert_eq!(
        use_demo(&ctx),
        Response::Interaction(InteractionResult::Success)
    );

    let sender = ctx.relay();
    assert!(sender.post_opened(1, 27, "hostbridge:chest", "Chest"));
    assert!(sender.post_closed(1));
    runtime.shutdown();

    assert_eq!(sender.ledger().outstanding(), 0);
}

#[test]
fn test_reload_through_runtime_rebinds() {
    let host = Arc::new(MemoryHostRegistry::new());
    let (ctx, inbox) = BridgeContext::new(host.clone());

    let script_ctx = ctx.clone();
    let mut runtime = ScriptRuntime::spawn("script", inbox, move |_| {
        script::install_handlers(&script_ctx).unwrap();
    })
    .unwrap();
    host.seal();

    ctx.prepare_reload();
    assert_eq!(use_demo(&ctx), Response::Interaction(InteractionResult::Pass));

    let reload_ctx = ctx.clone();
    let reinstalled = Arc::new(AtomicUsize::new(0));
    let done = Arc::clone(&reinstalled);
    assert!(runtime.submit(move |_| {
        script::install_handlers(&reload_ctx).unwrap();
        done.fetch_add(1, Ordering::SeqCst);
    }));
    // Shutdown runs every queued task first.
    runtime.shutdown();

    assert_eq!(reinstalled.load(Ordering::SeqCst), 1);
    assert_eq!(ctx.registry().count(), 1);
    assert_eq!(
        use_demo(&ctx),
        Response::Interaction(InteractionResult::Success)
    );
}

#[tokio::test]
async fn test_host_loop_ticks_demo_script() {
    let host = Arc::new(MemoryHostRegistry::new());
    let (ctx, _inbox) = BridgeContext::new(host.clone());
    script::install_handlers(&ctx).unwrap();

    let config = HostConfig {
        log_level: "info".to_string(),
        tick_interval_ms: 5,
        startup_window_ms: 20,
    };
    let mut host_loop = HostLoop::new(ctx.clone(), host.clone(), config);
    host_loop.start();
    tokio::time::sleep(Duration::from_millis(100)).await;
    host_loop.shutdown().await;

    assert!(host_loop.ticks() > 0);
    assert!(host.is_sealed());
    // Host shutdown clears the table.
    assert!(!ctx.dispatch_table().is_registered(Slot::Tick));
}
