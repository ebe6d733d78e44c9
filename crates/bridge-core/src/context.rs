//! Per-process bridge context.

use crate::dispatch::{CallbackDispatchTable, HostEvent, Response, Slot};
use crate::error::{BridgeError, BridgeResult};
use crate::registry::{HandlerRegistry, HostRegistry};
use crate::relay::{self, RelayInbox, RelaySender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Owns the dispatch table, handler registry and relay sender shared by
/// every host entry point.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct BridgeContext {
    table: Arc<CallbackDispatchTable>,
    registry: Arc<HandlerRegistry>,
    relay: RelaySender,
    generation: Arc<AtomicU64>,
}

impl BridgeContext {
    /// Build a context over `host`. The returned inbox is meant for the
    /// script runtime's thread.
    pub fn new(host: Arc<dyn HostRegistry>) -> (Self, RelayInbox) {
        let (sender, inbox) = relay::channel();
        let context = Self {
            table: Arc::new(CallbackDispatchTable::new()),
            registry: Arc::new(HandlerRegistry::new(host)),
            relay: sender,
            generation: Arc::new(AtomicU64::new(0)),
        };
        (context, inbox)
    }

    pub fn dispatch_table(&self) -> &Arc<CallbackDispatchTable> {
        &self.table
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    /// A sender for posting relay events from host threads.
    pub fn relay(&self) -> RelaySender {
        self.relay.clone()
    }

    /// Number of reloads prepared so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Route a host event to its slot.
    ///
    /// Events aimed at a proxy object are only dispatched if the handler id
    /// names a tracked object of the kind the slot serves; otherwise the slot
    /// default is returned.
    pub fn dispatch(&self, event: HostEvent) -> Response {
        let slot = event.slot();
        if let Err(err) = self.check_target(slot, &event) {
            warn!(slot = %slot, "{}", err);
            return slot.default_response();
        }
        self.table.dispatch(event)
    }

    fn check_target(&self, slot: Slot, event: &HostEvent) -> BridgeResult<()> {
        let (Some(id), Some(expected)) = (event.handler_id(), slot.proxy_kind()) else {
            return Ok(());
        };
        match self.registry.kind_of(id) {
            None => Err(BridgeError::UnknownHandler(id)),
            Some(actual) if actual != expected => Err(BridgeError::KindMismatch {
                id,
                expected,
                actual,
            }),
            Some(_) => Ok(()),
        }
    }

    /// Drop every script handler ahead of a code reload.
    ///
    /// Handler ids, proxy objects and host registrations survive; reloaded
    /// code rebinds to them with [`HandlerRegistry::find_by_key`].
    pub fn prepare_reload(&self) -> u64 {
        self.table.clear();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            generation,
            proxies = self.registry.count(),
            "Prepared for script reload"
        );
        generation
    }

    pub fn shutdown(&self) {
        self.table.clear();
        info!("Bridge context shut down");
    }
}
