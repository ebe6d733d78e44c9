//! Bundled demo script.
//!
//! Registers one proxy block and a few handlers so the reference host has
//! something to drive. Installing twice (as a reload does) rebinds to the
//! block created the first time instead of creating another.

use bridge_core::{
    BridgeContext, BridgeResult, EventRelay, Handler, HandlerId, InteractionResult, ResourceKey,
    Verdict,
};
use tracing::{debug, info};

pub const DEMO_NAMESPACE: &str = "hostbridge";
pub const DEMO_BLOCK: &str = "demo_block";

/// Log container lifecycle events as they reach the script thread.
pub fn attach_listeners(relay: &EventRelay) {
    relay.on_opened(|event| {
        info!(
            object_id = event.object_id,
            slots = event.slot_count,
            "Container opened: {} ({})",
            event.title,
            event.type_id
        );
    });
    relay.on_closed(|event| {
        info!(object_id = event.object_id, "Container closed");
    });
}

/// Create or rebind the demo block and register its handlers.
pub fn install_handlers(ctx: &BridgeContext) -> BridgeResult<HandlerId> {
    let key = ResourceKey::new(DEMO_NAMESPACE, DEMO_BLOCK)?;
    let registry = ctx.registry();

    let block = match registry.find_by_key(&key) {
        Some(existing) => {
            info!(id = %existing.id(), "Rebinding {}", key);
            existing.id()
        }
        None => {
            let id = registry.create_block(2.0, 6.0, true);
            registry.finalize(id, DEMO_NAMESPACE, DEMO_BLOCK)?;
            info!(%id, "Registered {}", key);
            id
        }
    };

    let table = ctx.dispatch_table();
    table.register(Handler::server_started(move || {
        info!(id = %block, "Server started, demo block live");
    }));
    table.register(Handler::tick(|tick| {
        if tick % 100 == 0 {
            debug!(tick, "Script tick");
        }
    }));
    table.register(Handler::proxy_block_use(move |target, player, hand| {
        if target.handler != block {
            return InteractionResult::Pass;
        }
        info!(player = player.0, ?hand, pos = %target.pos, "Demo block used");
        InteractionResult::Success
    }));
    table.register(Handler::proxy_block_break(move |target, player| {
        if target.handler == block {
            info!(player = player.0, pos = %target.pos, "Demo block broken");
        }
        Verdict::Allow
    }));

    Ok(block)
}
